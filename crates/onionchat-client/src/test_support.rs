//! Fakes shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use onionchat_shared::constants::ONION_HOSTNAME_LEN;
use onionchat_shared::PeerIdentity;
use onionchat_store::{ChatStore, MemoryStore, StorageData, StoreError};

use crate::backend::{Backend, BackendError};

/// A valid onion hostname derived from a short name.
pub fn peer(name: &str) -> PeerIdentity {
    let mut host: String = name
        .chars()
        .filter(|c| c.is_ascii_lowercase())
        .take(ONION_HOSTNAME_LEN)
        .collect();
    while host.len() < ONION_HOSTNAME_LEN {
        host.push('2');
    }
    PeerIdentity::new(host)
}

/// Records every request; fails them all while `failing` is set.
pub struct FakeBackend {
    failing: AtomicBool,
    connects: Mutex<Vec<PeerIdentity>>,
    sends: Mutex<Vec<(PeerIdentity, String, i64)>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            failing: AtomicBool::new(false),
            connects: Mutex::new(Vec::new()),
            sends: Mutex::new(Vec::new()),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn connects(&self) -> Vec<PeerIdentity> {
        self.connects.lock().unwrap().clone()
    }

    pub fn sends(&self) -> Vec<(PeerIdentity, String, i64)> {
        self.sends.lock().unwrap().clone()
    }

    pub fn hostname_value(&self) -> PeerIdentity {
        peer("self")
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Unreachable("fake backend offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn connect(&self, peer: &PeerIdentity) -> Result<(), BackendError> {
        self.check()?;
        self.connects.lock().unwrap().push(peer.clone());
        Ok(())
    }

    async fn send(&self, peer: &PeerIdentity, text: &str, timestamp: i64) -> Result<(), BackendError> {
        self.check()?;
        self.sends
            .lock()
            .unwrap()
            .push((peer.clone(), text.to_string(), timestamp));
        Ok(())
    }

    async fn hostname(&self) -> Result<PeerIdentity, BackendError> {
        self.check()?;
        Ok(self.hostname_value())
    }
}

/// [`MemoryStore`] with call counters, injected failures and a slow `set`.
pub struct CountingStore {
    inner: MemoryStore,
    gets: AtomicUsize,
    sets: AtomicUsize,
    fail_gets: AtomicUsize,
    fail_sets: AtomicUsize,
    set_delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl CountingStore {
    pub fn unlocked() -> Self {
        Self::with_data(StorageData::default())
    }

    pub fn with_data(data: StorageData) -> Self {
        Self {
            inner: MemoryStore::unlocked(data),
            gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
            fail_gets: AtomicUsize::new(0),
            fail_sets: AtomicUsize::new(0),
            set_delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_set_delay(mut self, delay: Duration) -> Self {
        self.set_delay = delay;
        self
    }

    pub fn fail_next_gets(&self, n: usize) {
        self.fail_gets.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_sets(&self, n: usize) {
        self.fail_sets.store(n, Ordering::SeqCst);
    }

    /// Calls to `get`, failed ones included.
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Calls to `set`, failed ones included.
    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_sets(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Current stored document, without counting a `get`.
    pub fn snapshot(&self) -> StorageData {
        self.inner.snapshot().unwrap()
    }

    /// Change the stored document behind the client's back, as another
    /// session would.
    pub fn edit(&self, f: impl FnOnce(&mut StorageData)) {
        let mut data = self.snapshot();
        f(&mut data);
        self.inner.replace(data).unwrap();
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ChatStore for CountingStore {
    async fn exists(&self) -> onionchat_store::Result<bool> {
        self.inner.exists().await
    }

    async fn is_unlocked(&self) -> onionchat_store::Result<bool> {
        self.inner.is_unlocked().await
    }

    async fn unlock_or_create(&self, passphrase: &str) -> onionchat_store::Result<()> {
        self.inner.unlock_or_create(passphrase).await
    }

    async fn get(&self) -> onionchat_store::Result<StorageData> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.fail_gets) {
            return Err(StoreError::Unavailable("injected get failure".into()));
        }
        self.inner.get().await
    }

    async fn set(&self, data: StorageData) -> onionchat_store::Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        if !self.set_delay.is_zero() {
            tokio::time::sleep(self.set_delay).await;
        }
        let result = if Self::take_failure(&self.fail_sets) {
            Err(StoreError::Unavailable("injected set failure".into()))
        } else {
            self.inner.set(data).await
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
