//! Error types for debrid-dl
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Parse, Debrid, Config, etc.)
//! - A `DebridError` sub-enum covering every provider-side failure mode
//! - Classification of failures worth reporting back to the owning arr

use thiserror::Error;

/// Result type alias for debrid-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for debrid-dl
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "debrid.host")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Descriptor file could not be parsed into a torrent
    #[error("parse error: {0}")]
    Parse(String),

    /// Debrid provider rejected or failed the torrent
    #[error("debrid error: {0}")]
    Debrid(#[from] DebridError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shutdown in progress - not accepting new descriptors
    #[error("shutdown in progress: not accepting new descriptors")]
    ShuttingDown,

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Remote replied with a non-success HTTP status
    #[error("HTTP status {status} from {url}")]
    HttpStatus {
        /// The HTTP status code returned by the remote
        status: u16,
        /// The URL that produced the response
        url: String,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Folder watching error
    #[error("folder watch error: {0}")]
    FolderWatch(String),
}

/// Provider-side processing failures
///
/// Every variant carries the torrent name so log lines read without a lookup,
/// and the info-hash so failures can be routed back to the owning arr.
#[derive(Debug, Error)]
pub enum DebridError {
    /// Content is not in the provider's cache and uncached downloads are disabled
    #[error("torrent {name} is not cached at the provider")]
    NotCached {
        /// Info-hash of the rejected torrent
        hash: String,
        /// Display name of the rejected torrent
        name: String,
    },

    /// Provider is still downloading the content rather than serving it from cache
    #[error("torrent {name} is uncached and still downloading at the provider")]
    Uncached {
        /// Info-hash of the rejected torrent
        hash: String,
        /// Display name of the rejected torrent
        name: String,
    },

    /// Provider reported a terminal failure status (error, dead, magnet_error)
    #[error("provider reported status {status} for torrent {name}")]
    Provider {
        /// Info-hash of the failed torrent
        hash: String,
        /// Display name of the failed torrent
        name: String,
        /// The raw provider status string
        status: String,
    },

    /// Submission got a 2xx response but no torrent identifier
    #[error("provider returned an empty id for torrent {name}")]
    EmptyTorrentId {
        /// Info-hash of the torrent whose submission was rejected
        hash: String,
        /// Display name of the torrent whose submission was rejected
        name: String,
    },

    /// File selection filtered everything out - nothing video or subtitle shaped
    #[error("no video files in torrent {name}")]
    NoVideoFiles {
        /// Info-hash of the torrent with no usable files
        hash: String,
        /// Display name of the torrent with no usable files
        name: String,
    },

    /// Status polling consumed the configured attempt budget without resolution
    #[error("gave up on torrent {name} after {attempts} status polls")]
    PollBudgetExhausted {
        /// Info-hash of the stuck torrent
        hash: String,
        /// Display name of the stuck torrent
        name: String,
        /// Number of polls issued before giving up
        attempts: u32,
    },
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

impl Error {
    /// Whether this failure means the content itself is unusable
    ///
    /// Content failures (bad descriptor, provider rejection, nothing worth
    /// keeping) are reported to the owning arr so it can grab an alternative
    /// release. Transient faults (network, database, shutdown) are not - the
    /// release may be fine and the operator can resupply the descriptor.
    pub fn is_content_failure(&self) -> bool {
        matches!(self, Error::Parse(_) | Error::Debrid(_))
    }

    /// The info-hash of the torrent this failure concerns, when known
    ///
    /// Parse failures happen before a hash exists, so they return None.
    pub fn info_hash(&self) -> Option<&str> {
        match self {
            Error::Debrid(
                DebridError::NotCached { hash, .. }
                | DebridError::Uncached { hash, .. }
                | DebridError::Provider { hash, .. }
                | DebridError::EmptyTorrentId { hash, .. }
                | DebridError::NoVideoFiles { hash, .. }
                | DebridError::PollBudgetExhausted { hash, .. },
            ) => Some(hash),
            _ => None,
        }
    }
}
