//! Updater error taxonomy

use thiserror::Error;

use crate::engine::config::ConfigError;

/// Errors surfaced by every stage of the update pipeline.
///
/// None of these are fatal to the host process: after any of them the
/// updater is back in `Idle` and the install location is either untouched
/// or restored from its backup.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Connection refused, DNS failure or timeout
    #[error("Network error: {0}")]
    Network(String),
    #[error("Server returned HTTP status {status}")]
    HttpStatus { status: u16 },
    /// Malformed manifest JSON or base64 payload
    #[error("Failed to decode manifest: {0}")]
    Decode(String),
    #[error("Download interrupted: {0}")]
    DownloadInterrupted(String),
    #[error("SHA256 verification failed - expected {expected}, got {actual}")]
    Integrity { expected: String, actual: String },
    #[error("Failed to apply update: {0}")]
    Install(String),
    #[error("Update file not found: {0}")]
    ArtifactNotFound(String),
    #[error("Another update operation is already running for {0}")]
    Busy(String),
    #[error("Unknown component: {0}")]
    UnknownComponent(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl UpdateError {
    /// Classify a transport-level failure from the HTTP client.
    pub(crate) fn from_request(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return Self::HttpStatus {
                status: status.as_u16(),
            };
        }
        if e.is_timeout() {
            Self::Network(format!("Request timed out: {}", e))
        } else if e.is_connect() {
            Self::Network(format!("Connection failed: {}", e))
        } else {
            Self::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_message_mentions_sha256() {
        let err = UpdateError::Integrity {
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert!(err.to_string().contains("SHA256"));
    }

    #[test]
    fn test_http_status_message() {
        let err = UpdateError::HttpStatus { status: 500 };
        assert_eq!(err.to_string(), "Server returned HTTP status 500");
    }
}
