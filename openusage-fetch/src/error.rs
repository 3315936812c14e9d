//! Host API error types.
//!
//! Probe-level failures live in [`crate::classify::ProbeError`]; the types
//! here describe what went wrong talking to a single host service.

use std::path::PathBuf;

use thiserror::Error;

// ============================================================================
// HTTP Error
// ============================================================================

/// HTTP-specific error type.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Transport-level failure (DNS, TLS, connection reset).
    #[error("Request error: {0}")]
    Transport(String),

    /// The request exceeded its timeout.
    #[error("Request timed out")]
    Timeout,

    /// Domain not allowed.
    #[error("Domain not allowed: {0}")]
    DomainNotAllowed(String),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The client could not be constructed.
    #[error("HTTP client unavailable: {0}")]
    Client(String),
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HttpError::Timeout
        } else if err.is_builder() {
            HttpError::InvalidUrl(err.to_string())
        } else {
            HttpError::Transport(err.to_string())
        }
    }
}

// ============================================================================
// Keychain Error
// ============================================================================

/// Error type for keychain operations.
#[derive(Debug, Error)]
pub enum KeychainError {
    /// Access denied.
    #[error("Access denied to keychain")]
    AccessDenied,

    /// Ambiguous entry (several items match service/account).
    #[error("Ambiguous keychain entry for {0}")]
    Ambiguous(String),

    /// Platform error.
    #[error("Platform error: {0}")]
    Platform(String),

    /// Generic error.
    #[error("Keychain error: {0}")]
    Other(String),
}

impl From<keyring::Error> for KeychainError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::Ambiguous(items) => {
                KeychainError::Ambiguous(format!("{} items", items.len()))
            }
            keyring::Error::PlatformFailure(e) => KeychainError::Platform(e.to_string()),
            keyring::Error::NoStorageAccess(_) => KeychainError::AccessDenied,
            _ => KeychainError::Other(err.to_string()),
        }
    }
}

// ============================================================================
// File Error
// ============================================================================

/// Error type for file operations.
#[derive(Debug, Error)]
pub enum FileError {
    /// I/O failure on a specific path.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// `~` could not be expanded.
    #[error("Home directory not available")]
    NoHomeDir,
}

impl FileError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// ============================================================================
// SQLite Error
// ============================================================================

/// Error type for the local database client.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite reported an error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database file does not exist.
    #[error("Database not found: {0}")]
    NotFound(PathBuf),

    /// sqlite3 shell dot-commands are not SQL.
    #[error("Dot-commands are not allowed")]
    DotCommand,

    /// The blocking worker failed.
    #[error("Database worker failed: {0}")]
    Worker(String),
}

// ============================================================================
// Backend Error
// ============================================================================

/// Error type for a credential backend read or write.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Keychain error.
    #[error(transparent)]
    Keychain(#[from] KeychainError),

    /// File error.
    #[error(transparent)]
    File(#[from] FileError),

    /// Database error.
    #[error(transparent)]
    Sqlite(#[from] SqliteError),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The backend does not accept writes.
    #[error("Backend {0} is read-only")]
    ReadOnly(String),
}
