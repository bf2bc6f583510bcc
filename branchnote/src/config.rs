//! Application configuration constants
//!
//! Central location for defaults, resource limits, and validation
//! boundaries used throughout the application.

// ===== Remote Store =====

/// Number of entities requested per listing page
pub const DEFAULT_PAGE_SIZE: u32 = 20;
/// Smallest page size accepted from settings
pub const MIN_PAGE_SIZE: u32 = 1;
/// Largest page size accepted from settings
pub const MAX_PAGE_SIZE: u32 = 200;

/// Upper bound for a single remote call, in seconds.
/// A call that exceeds it is treated as a network failure.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 8;
/// Minimum remote timeout in seconds
pub const MIN_REQUEST_TIMEOUT_SECS: u64 = 1;
/// Maximum remote timeout in seconds
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Default server base URL
pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";

// ===== Entities =====

/// Prefix marking ids generated on this device while offline.
/// Server-assigned ids never carry it.
pub const CLIENT_ID_PREFIX: &str = "local-";

/// Title used when a file is created or saved with an empty title
pub const DEFAULT_FILE_TITLE: &str = "Untitled";
/// Title used when a folder is created or saved with an empty title
pub const DEFAULT_FOLDER_TITLE: &str = "New Folder";

/// Maximum title length in characters
pub const MAX_TITLE_LENGTH: usize = 200;

// ===== Reminders =====

/// Default reminder poll interval in seconds
pub const DEFAULT_REMINDER_INTERVAL_SECS: u64 = 60;
/// Minimum reminder poll interval in seconds
pub const MIN_REMINDER_INTERVAL_SECS: u64 = 5;
/// Maximum reminder poll interval in seconds (1 hour)
pub const MAX_REMINDER_INTERVAL_SECS: u64 = 3_600;

// ===== Local Storage =====

/// Database file name inside the data directory
pub const DATABASE_FILE: &str = "cache.db";
/// Settings file name inside the data directory
pub const SETTINGS_FILE: &str = "settings.json";
/// Keyring service name for the bearer credential
pub const KEYRING_SERVICE: &str = "Branchnote";
