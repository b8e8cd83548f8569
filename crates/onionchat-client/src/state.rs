//! Application state: the components wired together once at startup.
//!
//! [`ChatApp`] owns the single [`Registry`] and hands it to the dispatcher
//! and the session controller.  Nothing here is global; embedders create one
//! `ChatApp` and keep it alive for the lifetime of the UI.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use onionchat_store::{ChatStore, EncryptedFileStore, StorageData};

use crate::backend::Backend;
use crate::config::ClientConfig;
use crate::dispatcher::EventDispatcher;
use crate::error::Result;
use crate::events::BackendEvent;
use crate::registry::Registry;
use crate::session::ChatSession;
use crate::storage_sync::StorageSync;

pub struct ChatApp {
    config: ClientConfig,
    storage: Arc<StorageSync>,
    registry: Arc<Registry>,
    dispatcher: Arc<EventDispatcher>,
    session: ChatSession,
    /// Background tasks started by [`ChatApp::start`].
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ChatApp {
    pub fn new(config: ClientConfig, backend: Arc<dyn Backend>, store: Arc<dyn ChatStore>) -> Self {
        let storage = Arc::new(StorageSync::new(store, &config));
        let registry = Arc::new(Registry::new(Arc::clone(&backend), Arc::clone(&storage)));
        let dispatcher = Arc::new(EventDispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&storage),
        ));
        let session = ChatSession::new(backend, Arc::clone(&storage), Arc::clone(&registry));

        Self {
            config,
            storage,
            registry,
            dispatcher,
            session,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Build the app over the encrypted storage file: `config.storage_path`
    /// if set, otherwise the platform data directory.
    pub fn open_default(config: ClientConfig, backend: Arc<dyn Backend>) -> Result<Self> {
        let store = match &config.storage_path {
            Some(path) => EncryptedFileStore::open_at(path.clone()),
            None => EncryptedFileStore::open_default()?,
        };
        Ok(Self::new(config, backend, Arc::new(store)))
    }

    /// Start the storage writer and the event dispatcher.  Events sent on the
    /// returned channel are handled in order.
    pub fn start(&self) -> mpsc::Sender<BackendEvent> {
        let (tx, rx) = mpsc::channel(self.config.event_buffer);

        let writer = self.storage.spawn_writer();
        let dispatcher = tokio::spawn(Arc::clone(&self.dispatcher).run(rx));

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.push(writer);
        tasks.push(dispatcher);

        info!(event_buffer = self.config.event_buffer, "client started");
        tx
    }

    /// Unlock (or create) storage, then load the chat document.
    pub async fn unlock(&self, passphrase: &str) -> Result<StorageData> {
        self.storage.unlock_or_create(passphrase).await?;
        Ok(self.storage.load().await)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<StorageSync> {
        &self.storage
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    /// Stop background tasks and write any pending edits.
    pub async fn shutdown(&self) {
        let tasks: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            task.abort();
        }

        if let Err(e) = self.storage.flush().await {
            warn!(error = %e, "failed to save chat data on shutdown");
        }
        info!("client stopped");
    }
}
