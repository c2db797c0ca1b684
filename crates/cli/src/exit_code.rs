//! Process exit codes
//!
//! Codes are stable so that scripts can branch on them.

use bw_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    /// Bad arguments, path or pattern
    UsageError = 2,
    /// Transport failure or retry budget exhausted
    NetworkError = 3,
    AuthError = 4,
    NotFound = 5,
    UnsupportedFeature = 7,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Exit code for an error that aborted a command
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::InvalidPath(_) | Error::InvalidPattern { .. } => ExitCode::UsageError,
            Error::AliasNotFound(_) | Error::NotFound(_) => ExitCode::NotFound,
            Error::Auth(_) => ExitCode::AuthError,
            Error::ServiceUnavailable(_) | Error::RetryExhausted { .. } | Error::Network(_) => {
                ExitCode::NetworkError
            }
            Error::UnsupportedFeature(_) => ExitCode::UnsupportedFeature,
            _ => ExitCode::GeneralError,
        }
    }
}
