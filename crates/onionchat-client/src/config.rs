//! Client configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the client can start with zero
//! configuration.

use std::path::PathBuf;
use std::time::Duration;

use onionchat_shared::constants::{EVENT_CHANNEL_CAPACITY, STORAGE_DEBOUNCE_MS, STORAGE_RETRY_MS};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Quiet interval before pending storage edits are written.
    /// Env: `ONIONCHAT_STORAGE_DEBOUNCE_MS`
    /// Default: `350`
    pub storage_debounce: Duration,

    /// Fixed delay between storage read/write retries.
    /// Env: `ONIONCHAT_STORAGE_RETRY_MS`
    /// Default: `100`
    pub storage_retry_delay: Duration,

    /// Capacity of the backend event channel.
    /// Env: `ONIONCHAT_EVENT_BUFFER`
    /// Default: `256`
    pub event_buffer: usize,

    /// Location of the encrypted storage file.
    /// Env: `ONIONCHAT_STORAGE_PATH`
    /// Default: none (platform data directory).
    pub storage_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            storage_debounce: Duration::from_millis(STORAGE_DEBOUNCE_MS),
            storage_retry_delay: Duration::from_millis(STORAGE_RETRY_MS),
            event_buffer: EVENT_CHANNEL_CAPACITY,
            storage_path: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ONIONCHAT_STORAGE_DEBOUNCE_MS") {
            match parse_millis(&val) {
                Some(d) => config.storage_debounce = d,
                None => tracing::warn!(
                    value = %val,
                    "Invalid ONIONCHAT_STORAGE_DEBOUNCE_MS, using default"
                ),
            }
        }

        if let Ok(val) = std::env::var("ONIONCHAT_STORAGE_RETRY_MS") {
            match parse_millis(&val) {
                Some(d) => config.storage_retry_delay = d,
                None => tracing::warn!(
                    value = %val,
                    "Invalid ONIONCHAT_STORAGE_RETRY_MS, using default"
                ),
            }
        }

        if let Ok(val) = std::env::var("ONIONCHAT_EVENT_BUFFER") {
            match val.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.event_buffer = n,
                _ => tracing::warn!(
                    value = %val,
                    "Invalid ONIONCHAT_EVENT_BUFFER, using default"
                ),
            }
        }

        if let Ok(path) = std::env::var("ONIONCHAT_STORAGE_PATH") {
            if !path.is_empty() {
                config.storage_path = Some(PathBuf::from(path));
            }
        }

        config
    }
}

fn parse_millis(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.storage_debounce, Duration::from_millis(350));
        assert_eq!(config.storage_retry_delay, Duration::from_millis(100));
        assert_eq!(config.event_buffer, 256);
        assert!(config.storage_path.is_none());
    }

    #[test]
    fn test_parse_millis() {
        assert_eq!(parse_millis(" 500 "), Some(Duration::from_millis(500)));
        assert_eq!(parse_millis("-1"), None);
        assert_eq!(parse_millis("soon"), None);
    }
}
