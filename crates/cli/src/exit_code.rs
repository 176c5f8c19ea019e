//! Exit codes for the pshell binary
//!
//! One-shot script mode returns the dispatched verb's exit code so shell
//! scripts can branch on what went wrong.

use ps_core::Error;

/// Exit codes for the pshell application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Operation completed successfully
    Success = 0,

    /// General/unspecified error
    GeneralError = 1,

    /// User input error: invalid arguments, malformed path
    UsageError = 2,

    /// Network or protocol error
    NetworkError = 3,

    /// Authentication or permission failure
    AuthError = 4,

    /// Path, object, or mount does not exist
    NotFound = 5,

    /// Conflict: exists, wrong type, non-empty, transfer busy
    Conflict = 6,

    /// Backend does not support this operation
    UnsupportedFeature = 7,

    /// Operation was interrupted
    Interrupted = 130,
}

impl ExitCode {
    /// Convert to i32 for `std::process::exit`
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::Config(_) | Error::InvalidPath(_) => ExitCode::UsageError,
            Error::Network(_) | Error::Protocol(_) => ExitCode::NetworkError,
            Error::Auth(_) => ExitCode::AuthError,
            Error::NotFound(_) | Error::NoBackend(_) => ExitCode::NotFound,
            Error::Conflict(_) | Error::TransferBusy => ExitCode::Conflict,
            Error::Unsupported(_) => ExitCode::UnsupportedFeature,
            Error::Cancelled => ExitCode::Interrupted,
            _ => ExitCode::GeneralError,
        }
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::UsageError.as_i32(), 2);
        assert_eq!(ExitCode::NetworkError.as_i32(), 3);
        assert_eq!(ExitCode::AuthError.as_i32(), 4);
        assert_eq!(ExitCode::NotFound.as_i32(), 5);
        assert_eq!(ExitCode::Conflict.as_i32(), 6);
        assert_eq!(ExitCode::UnsupportedFeature.as_i32(), 7);
        assert_eq!(ExitCode::Interrupted.as_i32(), 130);
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(ExitCode::from(&Error::NoBackend("/x".into())), ExitCode::NotFound);
        assert_eq!(ExitCode::from(&Error::TransferBusy), ExitCode::Conflict);
        assert_eq!(ExitCode::from(&Error::Cancelled), ExitCode::Interrupted);
        assert_eq!(
            ExitCode::from(&Error::Unsupported("x".into())),
            ExitCode::UnsupportedFeature
        );
        assert_eq!(
            ExitCode::from(&Error::Quota("full".into())),
            ExitCode::GeneralError
        );
    }
}
