//! Endpoint descriptors
//!
//! An endpoint descriptor is the serializable record the session manager
//! keeps per mount: which adapter kind, where it lives, and whatever
//! credential material has been established. Secrets may be absent, in which
//! case the mount starts offline and `login` is required.

use serde::{Deserialize, Serialize};

/// Adapter kind; selects which crate deserializes the descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// XML-service asset store
    Asset,
    /// S3-compatible object store
    S3,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Asset => write!(f, "asset"),
            BackendKind::S3 => write!(f, "s3"),
        }
    }
}

/// Retry budget for network calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Linear backoff step in milliseconds
    #[serde(default = "default_backoff_step")]
    pub backoff_step_ms: u64,
}

fn default_max_attempts() -> u32 {
    9
}

fn default_backoff_step() -> u64 {
    500
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_step_ms: default_backoff_step(),
        }
    }
}

/// Timeouts for network calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_secs: u64,

    /// Timeout for mount-scale operations in seconds
    #[serde(default = "default_mount_timeout")]
    pub mount_secs: u64,
}

fn default_request_timeout() -> u64 {
    120
}

fn default_mount_timeout() -> u64 {
    1800
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: default_request_timeout(),
            mount_secs: default_mount_timeout(),
        }
    }
}

/// Per-backend endpoint record persisted in the profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// Adapter kind
    pub kind: BackendKind,

    /// Endpoint base URL
    pub url: String,

    /// Access identifier (account, access key id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_id: Option<String>,

    /// Secret (password, secret key); absent means login required
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Short-lived session token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,

    /// Longer-lived delegated token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate_token: Option<String>,

    /// Authentication domain (asset store)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Retry budget override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,

    /// Timeout override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutConfig>,
}

impl EndpointDescriptor {
    /// Create a descriptor with only kind and URL; credentials come later
    pub fn new(kind: BackendKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            access_id: None,
            secret: None,
            session_token: None,
            delegate_token: None,
            domain: None,
            retry: None,
            timeout: None,
        }
    }

    /// Effective retry budget
    pub fn retry_config(&self) -> RetryConfig {
        self.retry.clone().unwrap_or_default()
    }

    /// Effective timeouts
    pub fn timeout_config(&self) -> TimeoutConfig {
        self.timeout.clone().unwrap_or_default()
    }

    /// Copy with every secret and token replaced by a marker.
    ///
    /// All diagnostic output goes through this; raw descriptors never leave
    /// the session manager.
    pub fn redacted(&self) -> Self {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "<redacted>".to_string());
        Self {
            secret: mask(&self.secret),
            session_token: mask(&self.session_token),
            delegate_token: mask(&self.delegate_token),
            ..self.clone()
        }
    }
}

/// Interactive or token credentials handed to `Backend::login`
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Authentication domain
    pub domain: Option<String>,
    /// User or access identifier
    pub user: Option<String>,
    /// Password or secret
    pub password: Option<String>,
    /// Pre-established token
    pub token: Option<String>,
}

/// Lifetime argument of `Backend::delegate`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegateLifetime {
    /// Create a token valid for this many days
    Days(u32),
    /// Destroy all delegated tokens for the actor
    Off,
}

impl std::str::FromStr for DelegateLifetime {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("off") {
            return Ok(DelegateLifetime::Off);
        }
        s.parse::<u32>().map(DelegateLifetime::Days).map_err(|_| {
            crate::error::Error::InvalidPath(format!("expected a day count or 'off', got '{s}'"))
        })
    }
}

/// One project-scoped key set returned by an SSO bootstrap
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsoKeySet {
    /// Project name; becomes the mount prefix segment
    pub project: String,
    /// Object-store endpoint URL
    pub url: String,
    /// Access key id
    pub access: String,
    /// Secret key
    pub secret: String,
}
