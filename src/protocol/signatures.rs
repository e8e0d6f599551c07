//! Known connect failure signatures
//!
//! Some connect failures mean the stored credentials are dead and retrying
//! will never help. The session supervisor evicts such identities instead of
//! keeping them registered.
//!
//! # Known Signatures
//!
//! ## Unauthorized
//! - Server answers the connect attempt with status 401
//!
//! ## Logged out elsewhere
//! - The account unlinked this device from another device
//!
//! ## Dead socket during the initial sync
//! - The usync query after login fails because the socket was already closed
//!   by the server. Seen only for revoked devices.

use super::ProtocolError;

/// Failure messages that mark credentials as invalid
pub const INVALID_CREDENTIAL_SIGNATURES: &[&str] = &[
    "server responded with 401",
    "got 401: logged out from another device connect failure",
    "failed to send usync query: websocket not connected",
];

/// Reason why credentials are considered invalid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialFailure {
    Unauthorized,
    LoggedOutElsewhere,
    RevokedDevice,
}

impl CredentialFailure {
    /// Detect an invalid-credential failure from a connect error
    ///
    /// Returns `None` for transient failures, which must not cause eviction.
    pub fn detect(error: &ProtocolError) -> Option<Self> {
        match error {
            ProtocolError::Status(401) => Some(CredentialFailure::Unauthorized),
            ProtocolError::LoggedOut => Some(CredentialFailure::LoggedOutElsewhere),
            ProtocolError::Other(message) => Self::from_message(message),
            _ => None,
        }
    }

    /// Match a raw failure message against the known signatures
    pub fn from_message(message: &str) -> Option<Self> {
        let message = message.trim();
        if message == INVALID_CREDENTIAL_SIGNATURES[0] {
            Some(CredentialFailure::Unauthorized)
        } else if message == INVALID_CREDENTIAL_SIGNATURES[1] {
            Some(CredentialFailure::LoggedOutElsewhere)
        } else if message == INVALID_CREDENTIAL_SIGNATURES[2] {
            Some(CredentialFailure::RevokedDevice)
        } else {
            None
        }
    }

    /// Short name for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialFailure::Unauthorized => "unauthorized",
            CredentialFailure::LoggedOutElsewhere => "logged_out_elsewhere",
            CredentialFailure::RevokedDevice => "revoked_device",
        }
    }
}

impl std::fmt::Display for CredentialFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_errors() {
        assert_eq!(
            CredentialFailure::detect(&ProtocolError::Status(401)),
            Some(CredentialFailure::Unauthorized)
        );
        assert_eq!(
            CredentialFailure::detect(&ProtocolError::LoggedOut),
            Some(CredentialFailure::LoggedOutElsewhere)
        );
    }

    #[test]
    fn test_transient_errors_are_not_evicted() {
        assert_eq!(CredentialFailure::detect(&ProtocolError::Status(503)), None);
        assert_eq!(CredentialFailure::detect(&ProtocolError::NotConnected), None);
        assert_eq!(
            CredentialFailure::detect(&ProtocolError::Other("connection reset".into())),
            None
        );
    }

    #[test]
    fn test_message_signatures() {
        for signature in INVALID_CREDENTIAL_SIGNATURES {
            let err = ProtocolError::Other(signature.to_string());
            assert!(CredentialFailure::detect(&err).is_some(), "{signature}");
        }
        assert_eq!(
            CredentialFailure::from_message(
                "failed to send usync query: websocket not connected"
            ),
            Some(CredentialFailure::RevokedDevice)
        );
    }

    #[test]
    fn test_display_of_typed_errors_matches_signatures() {
        assert_eq!(
            ProtocolError::Status(401).to_string(),
            INVALID_CREDENTIAL_SIGNATURES[0]
        );
        assert_eq!(
            ProtocolError::LoggedOut.to_string(),
            INVALID_CREDENTIAL_SIGNATURES[1]
        );
    }
}
