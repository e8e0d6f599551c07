//! Session identity
//!
//! An identity is the globally unique key of one authenticated account
//! connection, for example `"34600111222:7@s.whatsapp.net"`.

use serde::{Deserialize, Serialize};

/// Unique identifier for a session (account number, device and server)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Create a new identity
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Full identity string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Account number, the text before the first `:` or `@`
    pub fn user(&self) -> &str {
        let end = self.0.find([':', '@']).unwrap_or(self.0.len());
        &self.0[..end]
    }

    /// Device suffix, if the identity carries one
    pub fn device(&self) -> Option<&str> {
        let (_, rest) = self.0.split_once(':')?;
        Some(rest.split('@').next().unwrap_or(rest))
    }

    /// Check whether `selector` names this identity
    ///
    /// Callers address devices either by full identity or by account number.
    pub fn matches(&self, selector: &str) -> bool {
        !selector.is_empty() && (self.0 == selector || self.user() == selector)
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Identity {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}
