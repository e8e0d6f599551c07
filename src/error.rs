//! Error types
//!
//! Every component has its own error enum; [`Error`] is the union returned by
//! the core-facing operations on the supervisor.

use crate::protocol::ProtocolError;
use crate::registry::RegistryError;
use crate::storage::StoreError;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Session registry failure
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Failure reported by the underlying protocol client
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Credential store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// No device matches the given identity or account number
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// No registered session is able to send
    #[error("no connected devices")]
    NoSessions,

    /// The request is malformed
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// Whether this error means the target simply does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::DeviceNotFound(_) | Error::Registry(RegistryError::NotFound(_))
        )
    }
}
