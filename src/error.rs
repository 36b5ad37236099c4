//! Error types for batch-dl
//!
//! Two layers of errors exist:
//! - [`Error`] is returned synchronously to the caller (bad input, misuse,
//!   client construction).
//! - [`DownloadError`] is the terminal error of a single task. It is recorded
//!   on the task and counted in the run statistics, never propagated out of
//!   [`BatchDownloader::run`](crate::BatchDownloader::run).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for batch-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for batch-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrency")
        key: Option<String>,
    },

    /// Malformed task input, rejected before it reaches the registry
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A run is already in progress on this engine
    #[error("engine busy: a run is already in progress")]
    EngineBusy,

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Flavor of a transport-level failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkErrorKind {
    /// The per-task deadline expired
    Timeout,
    /// The run was stopped while the request was in flight, or before it was claimed
    Cancelled,
    /// DNS, TCP or TLS connection could not be established
    Connect,
    /// Any other transport failure
    Other,
}

impl std::fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NetworkErrorKind::Timeout => "timeout",
            NetworkErrorKind::Cancelled => "cancelled",
            NetworkErrorKind::Connect => "connect",
            NetworkErrorKind::Other => "transport",
        };
        f.write_str(s)
    }
}

/// Terminal error of a single download task
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadError {
    /// Transport failure, timeout or cancellation
    #[error("network error ({kind}): {message}")]
    Network {
        /// What kind of transport failure occurred
        kind: NetworkErrorKind,
        /// Underlying error message
        message: String,
    },

    /// Server answered with a status outside 200..=299
    #[error("HTTP status {code}")]
    HttpStatus {
        /// The response status code
        code: u16,
    },

    /// Destination file could not be written, or the body stream broke mid-transfer
    #[error("I/O error: {message}")]
    Io {
        /// Underlying error message
        message: String,
    },

    /// Unexpected fault (panic) while executing the task
    #[error("task fault: {message}")]
    Task {
        /// Panic payload or fault description
        message: String,
    },
}

impl DownloadError {
    /// Per-task deadline expired
    pub fn timeout(task_timeout: std::time::Duration) -> Self {
        DownloadError::Network {
            kind: NetworkErrorKind::Timeout,
            message: format!("request exceeded {:?}", task_timeout),
        }
    }

    /// Run-level cancellation reached this task
    pub fn cancelled(message: impl Into<String>) -> Self {
        DownloadError::Network {
            kind: NetworkErrorKind::Cancelled,
            message: message.into(),
        }
    }

    /// Whether this error came from the per-task deadline
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            DownloadError::Network {
                kind: NetworkErrorKind::Timeout,
                ..
            }
        )
    }

    /// Whether this error came from run-level cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            DownloadError::Network {
                kind: NetworkErrorKind::Cancelled,
                ..
            }
        )
    }

    /// HTTP status code, if the task failed on a non-2xx response
    pub fn status_code(&self) -> Option<u16> {
        match self {
            DownloadError::HttpStatus { code } => Some(*code),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(e: std::io::Error) -> Self {
        DownloadError::Io {
            message: e.to_string(),
        }
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            NetworkErrorKind::Timeout
        } else if e.is_connect() {
            NetworkErrorKind::Connect
        } else {
            NetworkErrorKind::Other
        };
        DownloadError::Network {
            kind,
            message: e.to_string(),
        }
    }
}
