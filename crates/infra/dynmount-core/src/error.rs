use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DynmountError {
    #[error("Configuration file not found at {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    ConfigInvalid { message: String },

    #[error("Required tool not found: {tool}")]
    ToolNotFound { tool: String },

    #[error("Mount operation failed: {message}")]
    MountOperationFailed { message: String },

    #[error("Command '{command}' timed out after {timeout_secs}s")]
    CommandTimeout { command: String, timeout_secs: u64 },

    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("{watcher} watcher failed: {message}")]
    WatcherFailed { watcher: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Filesystem notification error: {0}")]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DynmountError>;
