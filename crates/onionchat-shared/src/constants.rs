/// Application name
pub const APP_NAME: &str = "onionchat";

/// Length of a v3 onion service hostname without the `.onion` suffix
pub const ONION_HOSTNAME_LEN: usize = 56;

/// Top-level domain of onion services
pub const ONION_TLD: &str = ".onion";

/// Suffixes accepted on development identities (local loopback peers)
pub const DEV_IDENTITY_SUFFIXES: [&str; 2] = ["-dev-server", "-dev-client"];

/// Quiet interval before a burst of storage edits is written (milliseconds)
pub const STORAGE_DEBOUNCE_MS: u64 = 350;

/// Fixed delay between storage retries (milliseconds)
pub const STORAGE_RETRY_MS: u64 = 100;

/// Capacity of the backend event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Key derivation context for the storage file key (BLAKE3)
pub const KDF_CONTEXT_STORAGE_KEY: &str = "onionchat-storage-key-v1";
