//! Error types for ps-core
//!
//! Every backend adapter converts its native failures into one of these
//! kinds; the dispatcher renders a single-line message and returns to the
//! loop. Only `Config` is fatal, and only at startup.

use thiserror::Error;

/// Result type alias for ps-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for ps-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid virtual path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// No mount covers the given path
    #[error("No backend mounted for: {0}")]
    NoBackend(String),

    /// Network or transport error
    #[error("Network error: {0}")]
    Network(String),

    /// Authentication failed or session expired
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Path or object missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Exists, wrong type, or non-empty directory
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Remote-side rejection for space or permissions
    #[error("Quota or permission rejection: {0}")]
    Quota(String),

    /// Local filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed server response
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// User interrupted the operation
    #[error("Cancelled")]
    Cancelled,

    /// A managed transfer is already running
    #[error("A transfer is already in progress")]
    TransferBusy,

    /// Feature not supported by this backend
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// TOML parsing error
    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("Config serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// General error
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Whether the error aborts startup.
    ///
    /// Only `Config` is fatal; everything else is rendered and the loop
    /// continues.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Whether a single token-based re-login attempt is warranted.
    pub const fn is_auth_expiry(&self) -> bool {
        matches!(self, Error::Auth(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_config_is_fatal() {
        assert!(Error::Config("bad".into()).is_fatal());
        assert!(!Error::Network("down".into()).is_fatal());
        assert!(!Error::NotFound("/x".into()).is_fatal());
        assert!(!Error::TransferBusy.is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = Error::NoBackend("/other/path".into());
        assert_eq!(err.to_string(), "No backend mounted for: /other/path");

        let err = Error::TransferBusy;
        assert_eq!(err.to_string(), "A transfer is already in progress");
    }

    #[test]
    fn test_auth_expiry_detection() {
        assert!(Error::Auth("session expired".into()).is_auth_expiry());
        assert!(!Error::Quota("denied".into()).is_auth_expiry());
    }
}
