//! Authentication error types.

use thiserror::Error;

/// Errors that can occur during integrated authentication.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthError {
    /// The identity could not be obtained (no ambient identity and login failed).
    #[error("identity acquisition failed: {0}")]
    IdentityAcquisition(String),

    /// The security context could not be created or a handshake round failed.
    #[error("security context negotiation failed: {0}")]
    ContextNegotiation(String),

    /// A realm lookup failed.
    ///
    /// Never surfaced by SPN enrichment, which degrades to the unenriched SPN.
    #[error("realm resolution failed: {0}")]
    RealmResolution(String),

    /// A host name could not be resolved or canonicalized.
    #[error("host resolution failed: {0}")]
    HostResolution(String),

    /// Releasing a credential, context or identity failed.
    #[error("release of authentication resources failed: {0}")]
    Disposal(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Error reported by the GSSAPI library.
    #[error("GSSAPI error: {0}")]
    Gssapi(String),
}

impl AuthError {
    /// Check if this error must abort the connection attempt.
    ///
    /// Realm and host resolution failures only disable SPN enrichment, and
    /// disposal failures are logged and suppressed during teardown.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::IdentityAcquisition(_)
                | Self::ContextNegotiation(_)
                | Self::Configuration(_)
                | Self::Gssapi(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(AuthError::IdentityAcquisition("no ticket".into()).is_fatal());
        assert!(AuthError::ContextNegotiation("bad token".into()).is_fatal());
        assert!(!AuthError::RealmResolution("nxdomain".into()).is_fatal());
        assert!(!AuthError::HostResolution("nxdomain".into()).is_fatal());
        assert!(!AuthError::Disposal("double free".into()).is_fatal());
    }

    #[test]
    fn test_display() {
        let err = AuthError::ContextNegotiation("no token".into());
        assert_eq!(
            err.to_string(),
            "security context negotiation failed: no token"
        );
    }
}
