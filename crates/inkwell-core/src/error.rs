//! Error types for inkwell-core

use thiserror::Error;

/// Result type alias using inkwell-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in inkwell-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The local store engine could not be opened in this environment
    #[error("Local storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Connectivity failure talking to the content service
    #[error("Network error: {0}")]
    Network(String),

    /// Content service answered with a non-success status
    #[error("Content service error ({status}): {message}")]
    Remote { status: u16, message: String },
}

impl Error {
    /// Whether this error is a transient connectivity failure.
    ///
    /// Network failures queue the change for a later sync pass instead of
    /// surfacing as a hard error.
    pub const fn is_network(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Remote { status, .. } => matches!(*status, 408 | 429 | 500..=599),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            Self::Remote {
                status: status.as_u16(),
                message: error.to_string(),
            }
        } else if error.is_decode() {
            Self::InvalidInput(format!("unexpected response payload: {error}"))
        } else {
            Self::Network(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_classification() {
        assert!(Error::Network("connection refused".into()).is_network());
        assert!(Error::Remote {
            status: 503,
            message: "unavailable".into()
        }
        .is_network());
        assert!(!Error::Remote {
            status: 404,
            message: "missing".into()
        }
        .is_network());
        assert!(!Error::StorageUnavailable("no engine".into()).is_network());
    }
}
