//! Registry error types

use crate::session::Identity;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No session registered under this identity
    #[error("session not found: {0}")]
    NotFound(Identity),

    /// The client has no identity yet (pairing not finished)
    #[error("client has no identity")]
    MissingIdentity,
}
