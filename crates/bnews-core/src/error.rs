//! Error taxonomy for session operations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::storage::StorageError;

/// Why the gateway rejected a set of credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AuthFailure {
    /// The username is not known to the server.
    UserNotFound,
    /// Wrong password or a revoked/expired token.
    InvalidCredentials,
    /// Any other rejection (validation failure, duplicate user, ...).
    Rejected {
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        message: String,
    },
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthFailure::UserNotFound => write!(f, "user not found"),
            AuthFailure::InvalidCredentials => write!(f, "invalid credentials"),
            AuthFailure::Rejected {
                status: Some(status),
                message,
            } => write!(f, "rejected (HTTP {status}): {message}"),
            AuthFailure::Rejected {
                status: None,
                message,
            } => write!(f, "rejected: {message}"),
        }
    }
}

/// Error categories, used in events and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    Network,
    Decoding,
    Storage,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Authentication => write!(f, "authentication"),
            ErrorKind::Network => write!(f, "network"),
            ErrorKind::Decoding => write!(f, "decoding"),
            ErrorKind::Storage => write!(f, "storage"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Error returned by session operations and the auth gateway.
///
/// `Clone` so a coalesced refresh can hand the same outcome to every waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Credentials rejected by the gateway.
    Authentication(AuthFailure),
    /// Transport failure (no connectivity, timeout, server unavailable).
    Network(String),
    /// Response did not match the expected shape.
    Decoding(String),
    /// Persistence rejected a token write.
    Storage(StorageError),
    /// The caller cancelled before any state was written.
    Cancelled,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Authentication(_) => ErrorKind::Authentication,
            SessionError::Network(_) => ErrorKind::Network,
            SessionError::Decoding(_) => ErrorKind::Decoding,
            SessionError::Storage(_) => ErrorKind::Storage,
            SessionError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// True when the server reported that the user does not exist.
    pub fn is_user_not_found(&self) -> bool {
        matches!(
            self,
            SessionError::Authentication(AuthFailure::UserNotFound)
        )
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Authentication(failure) => write!(f, "Authentication failed: {failure}"),
            SessionError::Network(msg) => write!(f, "Network error: {msg}"),
            SessionError::Decoding(msg) => write!(f, "Malformed response: {msg}"),
            SessionError::Storage(err) => write!(f, "Credential storage error: {err}"),
            SessionError::Cancelled => write!(f, "Operation cancelled"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        SessionError::Storage(err)
    }
}

/// Result type for session operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_reason() {
        let err = SessionError::Authentication(AuthFailure::Rejected {
            status: Some(409),
            message: "username taken".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Authentication failed: rejected (HTTP 409): username taken"
        );
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[test]
    fn test_user_not_found_detection() {
        assert!(SessionError::Authentication(AuthFailure::UserNotFound).is_user_not_found());
        assert!(
            !SessionError::Authentication(AuthFailure::InvalidCredentials).is_user_not_found()
        );
        assert!(!SessionError::Network("offline".into()).is_user_not_found());
    }

    #[test]
    fn test_storage_error_is_source() {
        use std::error::Error as _;

        let err = SessionError::from(StorageError::EmptyKey);
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(err.source().is_some());
    }
}
