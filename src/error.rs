// Error types for certmill
//
// This module provides structured error types using thiserror. Every error
// that crosses the API boundary carries a stable `kind` string so callers can
// match on it without parsing messages.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Main error type for certmill operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Requested entity does not exist
    #[error("{what} not found")]
    NotFound { what: String },

    /// Operation conflicts with current state (duplicate SAN, referenced CA)
    #[error("{message}")]
    Conflict { message: String },

    /// Invalid input from user or configuration
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// A passphrase is required and was neither supplied nor stored
    #[error("Passphrase required for certificate {fingerprint}")]
    PassphraseRequired { fingerprint: String },

    /// Vault master key is not configured; encrypted material is unreadable
    #[error("Passphrase vault is sealed (master key not configured)")]
    VaultSealed,

    /// Signing CA cannot be resolved or is unusable
    #[error("Signing CA {fingerprint} is unavailable: {reason}")]
    SignerUnavailable { fingerprint: String, reason: String },

    /// Key generation or certificate signing failed
    #[error("Issuance failed: {message}")]
    IssuanceFailed { message: String },

    /// Writing artifacts to the store failed
    #[error("Materialization failed: {message}")]
    MaterializationFailed { message: String },

    /// Moving prior artifacts into the version archive failed
    #[error("Archive failed: {message}")]
    ArchiveFailed { message: String },

    /// Operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Operation exceeded its deadline
    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Deployment target could not be reached
    #[error("{adapter} unreachable: {details}")]
    AdapterUnreachable { adapter: String, details: String },

    /// Deployment target rejected our credentials
    #[error("{adapter} authentication failed: {details}")]
    AdapterAuth { adapter: String, details: String },

    /// Deployment target accepted the request but returned an error
    #[error("{adapter} remote error: {details}")]
    AdapterRemote { adapter: String, details: String },

    /// Transient failure worth retrying within the same sweep
    #[error("Transient failure: {message}")]
    Transient { message: String },

    /// Anything that should never surface to users with detail
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable kind string surfaced in JSON responses and logs
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "NotFound",
            EngineError::Conflict { .. } => "Conflict",
            EngineError::InvalidInput { .. } => "InvalidInput",
            EngineError::PassphraseRequired { .. } => "PassphraseRequired",
            EngineError::VaultSealed => "VaultSealed",
            EngineError::SignerUnavailable { .. } => "SignerUnavailable",
            EngineError::IssuanceFailed { .. } => "IssuanceFailed",
            EngineError::MaterializationFailed { .. } => "MaterializationFailed",
            EngineError::ArchiveFailed { .. } => "ArchiveFailed",
            EngineError::Cancelled => "Cancelled",
            EngineError::Timeout { .. } => "Timeout",
            EngineError::AdapterUnreachable { .. } => "AdapterUnreachable",
            EngineError::AdapterAuth { .. } => "AdapterAuth",
            EngineError::AdapterRemote { .. } => "AdapterRemote",
            EngineError::Transient { .. } => "Transient",
            EngineError::Internal(_) => "Internal",
        }
    }

    /// Whether a renewal step hitting this error should be retried
    /// with backoff within the current sweep.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Transient { .. }
                | EngineError::Timeout { .. }
                | EngineError::AdapterUnreachable { .. }
        )
    }

    /// Shorthand for a not-found error
    pub fn not_found(what: impl Into<String>) -> Self {
        EngineError::NotFound { what: what.into() }
    }

    /// Shorthand for a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        EngineError::Conflict {
            message: message.into(),
        }
    }

    /// Shorthand for an invalid-input error
    pub fn invalid(message: impl Into<String>) -> Self {
        EngineError::InvalidInput {
            message: message.into(),
        }
    }
}

// I/O failures during store operations are usually transient (NFS blips,
// EBUSY on rename); logical failures are mapped explicitly at the call site.
impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        EngineError::Transient {
            message: format!("I/O error: {}", err),
        }
    }
}

impl From<openssl::error::ErrorStack> for EngineError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        EngineError::IssuanceFailed {
            message: format!("OpenSSL error: {}", err),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Internal(format!("Serialization error: {}", err))
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EngineError::Timeout {
                duration: Duration::from_secs(0),
            }
        } else if err.is_connect() {
            EngineError::AdapterUnreachable {
                adapter: "http".to_string(),
                details: err.to_string(),
            }
        } else {
            EngineError::AdapterRemote {
                adapter: "http".to_string(),
                details: err.to_string(),
            }
        }
    }
}

impl From<tokio::time::error::Elapsed> for EngineError {
    fn from(_err: tokio::time::error::Elapsed) -> Self {
        EngineError::Timeout {
            duration: Duration::from_secs(0),
        }
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            EngineError::Cancelled
        } else {
            EngineError::Internal(format!("Task join error: {}", err))
        }
    }
}

/// Conversion from anyhow::Error for the binary edges
impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings_are_stable() {
        assert_eq!(EngineError::not_found("certificate abc").kind(), "NotFound");
        assert_eq!(EngineError::conflict("duplicate SAN").kind(), "Conflict");
        assert_eq!(EngineError::VaultSealed.kind(), "VaultSealed");
        assert_eq!(
            EngineError::PassphraseRequired {
                fingerprint: "ab".into()
            }
            .kind(),
            "PassphraseRequired"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(EngineError::Transient {
            message: "net".into()
        }
        .is_transient());
        assert!(EngineError::Timeout {
            duration: Duration::from_secs(5)
        }
        .is_transient());
        assert!(!EngineError::conflict("duplicate SAN").is_transient());
        assert!(!EngineError::PassphraseRequired {
            fingerprint: "ab".into()
        }
        .is_transient());
    }

    #[test]
    fn test_io_error_maps_to_transient() {
        let io_err = io::Error::new(io::ErrorKind::Interrupted, "blip");
        let err: EngineError = io_err.into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_messages_name_the_subject() {
        let err = EngineError::SignerUnavailable {
            fingerprint: "deadbeef".to_string(),
            reason: "not present in store".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("deadbeef"));
        assert!(msg.contains("not present"));
    }
}
