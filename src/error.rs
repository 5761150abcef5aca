use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Local path not found: {path}\nMake sure the path exists and you have read permissions.")]
    LocalPathMissing { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to walk directory: {path}\nCause: {source}")]
    WalkError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid path: {path}\nPaths must be valid UTF-8.")]
    InvalidPath { path: PathBuf },

    #[error("Object store error: {0}")]
    Store(String),

    #[error("Not found in object store: {0}")]
    StoreNotFound(String),

    #[error("Store call '{operation}' exceeded the {seconds}s deadline")]
    Deadline { operation: String, seconds: u64 },

    #[error("Invalid sync mode: {0}\nValid modes: full, selective, backup, incremental")]
    InvalidMode(String),

    #[error("Invalid sync direction: {0}\nValid directions: upload, download, bidirectional")]
    InvalidDirection(String),

    #[error("Invalid conflict resolution: {0}\nValid resolutions: local, remote, both, skip")]
    InvalidResolution(String),

    #[error("Invalid filter pattern: {0}")]
    InvalidFilter(String),

    #[error("Invalid sync rule: {0}")]
    InvalidRule(String),

    #[error("Sync rule not found: {0}")]
    RuleNotFound(String),

    #[error("A sync rule with id '{0}' already exists")]
    DuplicateRuleId(String),

    #[error("No conflict recorded for path: {path}")]
    ConflictNotFound { path: PathBuf },

    #[error("Conflict for {path} was already resolved as '{resolution}'")]
    ConflictAlreadyResolved { path: PathBuf, resolution: String },

    #[error("Sync service is already running")]
    AlreadyRunning,

    #[error("Sync service is not running")]
    NotRunning,

    #[error("A sync pass is already in flight")]
    PassInFlight,

    #[error("Sync prerequisites unmet: {0}")]
    NotReady(String),

    #[error("Sync interval must be at least {minimum} seconds (got {requested})")]
    IntervalTooShort { requested: u64, minimum: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
