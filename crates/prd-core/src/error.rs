//! Error types for prd.

use thiserror::Error;

/// Result type alias using prd's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP statuses that are retried a bounded number of times.
pub const TRANSIENT_STATUSES: [u16; 5] = [408, 500, 502, 503, 504];

/// HTTP status the remote platform uses for rate limiting.
pub const RATE_LIMITED_STATUS: u16 = 429;

/// Core error type for prd operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Resource not found (locally or on the remote)
    #[error("Not found: {0}")]
    NotFound(String),

    /// The remote platform answered with a non-success status
    #[error("Remote error {status}: {message}")]
    Remote {
        status: u16,
        /// Value of the `Retry-After` header in seconds, when present.
        retry_after: Option<f64>,
        message: String,
    },

    /// Connection-level failure talking to the remote platform
    #[error("Network error: {0}")]
    Network(String),

    /// Organization could not be downloaded (bad id or token)
    #[error("Download failed for organization {org_id}: {message}")]
    Download { org_id: i64, message: String },

    /// Local and remote state diverged and the operation was refused
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Version-control command failed
    #[error("VCS error: {0}")]
    Vcs(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a remote error from a status code and response text.
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        Error::Remote {
            status,
            retry_after: None,
            message: message.into(),
        }
    }

    /// HTTP status of a remote error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 429 responses. Never terminal for the retry policy.
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(RATE_LIMITED_STATUS)
    }

    /// 408/5xx responses and network failures. Retried a bounded number of times.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Remote { status, .. } => TRANSIENT_STATUSES.contains(status),
            Error::Network(_) => true,
            _ => false,
        }
    }

    /// Whether the remote reported the object as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_)) || self.status() == Some(404)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        Error::Config(format!("invalid subdirectory pattern: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_remote() {
        let err = Error::remote(502, "bad gateway");
        assert_eq!(err.to_string(), "Remote error 502: bad gateway");
    }

    #[test]
    fn test_error_display_download() {
        let err = Error::Download {
            org_id: 7,
            message: "401 Unauthorized".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Download failed for organization 7: 401 Unauthorized"
        );
    }

    #[test]
    fn test_rate_limited_is_not_transient() {
        let err = Error::remote(429, "slow down");
        assert!(err.is_rate_limited());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_transient_statuses() {
        for status in TRANSIENT_STATUSES {
            assert!(Error::remote(status, "").is_transient(), "{}", status);
        }
        assert!(Error::Network("reset".into()).is_transient());
        assert!(!Error::remote(400, "bad request").is_transient());
        assert!(!Error::remote(401, "unauthorized").is_transient());
    }

    #[test]
    fn test_not_found_detection() {
        assert!(Error::remote(404, "gone").is_not_found());
        assert!(Error::NotFound("queue 3".into()).is_not_found());
        assert!(!Error::remote(500, "").is_not_found());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: Error = io_err.into();
        assert!(err.to_string().starts_with("I/O error:"));
    }
}
