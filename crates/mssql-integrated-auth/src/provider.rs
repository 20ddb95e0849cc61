//! Collaborator traits.
//!
//! Integrated authentication drives a handful of external services it does
//! not implement itself: the connection that owns it, the identity and
//! credential store, the Kerberos security-context engine, and DNS. Each is
//! a trait here so the handshake logic can be exercised without a KDC.

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::spn::ServicePrincipalName;

/// Security mechanism requested from the GSS layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Mechanism {
    /// Kerberos V5 (`1.2.840.113554.1.2.2`).
    Kerberos5,
}

impl Mechanism {
    /// Dotted OID of the mechanism.
    #[must_use]
    pub fn oid(&self) -> &'static str {
        match self {
            Self::Kerberos5 => "1.2.840.113554.1.2.2",
        }
    }
}

/// Services requested when creating a security context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextRequest {
    /// Ask the server to prove its identity as well.
    pub mutual_auth: bool,
    /// Allow the server to forward the client's credential.
    pub delegate_credentials: bool,
    /// Protect exchanged messages against tampering.
    pub integrity: bool,
}

impl ContextRequest {
    /// The services requested for SQL Server integrated authentication.
    pub const INTEGRATED: Self = Self {
        mutual_auth: true,
        delegate_credentials: true,
        integrity: true,
    };
}

impl Default for ContextRequest {
    fn default() -> Self {
        Self::INTEGRATED
    }
}

/// The connection an authentication context belongs to.
pub trait AuthConnection {
    /// Authentication settings of the connection.
    fn config(&self) -> &AuthConfig;

    /// Record a fatal authentication failure and abort the connection attempt.
    ///
    /// Returns the error to propagate to the caller of the handshake.
    fn terminate(&self, error: AuthError) -> AuthError;
}

/// Source of the client identity and its Kerberos credentials.
pub trait IdentityProvider {
    /// An authenticated principal.
    type Identity;
    /// An initiate-only credential derived from an identity.
    type Credential;

    /// The identity already established for the current execution context.
    fn ambient_identity(&self) -> Option<Self::Identity>;

    /// Log in using the named login configuration entry.
    fn login(&self, entry: &str) -> Result<Self::Identity, AuthError>;

    /// Log out an identity obtained from [`login`](Self::login).
    fn logout(&self, identity: Self::Identity) -> Result<(), AuthError>;

    /// Acquire an initiate-only credential for `identity`.
    fn acquire_credential(
        &self,
        identity: &Self::Identity,
        mechanism: Mechanism,
    ) -> Result<Self::Credential, AuthError>;

    /// Release a credential.
    fn dispose_credential(&self, credential: Self::Credential) -> Result<(), AuthError>;
}

/// A client-side security context.
pub trait SecurityContext {
    /// Run one round of the handshake.
    ///
    /// `incoming` is the token received from the server (empty on the first
    /// round). Returns the token to send back, if any.
    fn step(&mut self, incoming: &[u8]) -> Result<Option<Vec<u8>>, AuthError>;

    /// Check whether the handshake has completed.
    fn is_established(&self) -> bool;

    /// Release the context.
    fn dispose(self) -> Result<(), AuthError>
    where
        Self: Sized;
}

/// Factory for security contexts using credentials of type `C`.
pub trait SecurityContextProvider<C> {
    /// The context type created.
    type Context: SecurityContext;

    /// Create a context targeting `peer`.
    ///
    /// The provider may take over the credential's underlying handle; the
    /// credential is still passed to
    /// [`IdentityProvider::dispose_credential`] at teardown.
    fn create_context(
        &self,
        peer: &ServicePrincipalName,
        mechanism: Mechanism,
        credential: &mut C,
        request: ContextRequest,
    ) -> Result<Self::Context, AuthError>;
}

/// DNS services used to discover Kerberos realms.
pub trait RealmDiscovery: Send + Sync {
    /// Get the KDC hosts advertised in DNS for `realm`.
    fn kdc_hosts(&self, realm: &str) -> Result<Vec<String>, AuthError>;

    /// Check whether DNS advertises any KDC for `realm`.
    fn locate_realm(&self, realm: &str) -> Result<bool, AuthError> {
        Ok(!self.kdc_hosts(realm)?.is_empty())
    }

    /// Resolve the canonical (fully qualified) name of a host.
    fn canonical_hostname(&self, name: &str) -> Result<String, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrated_request_flags() {
        let request = ContextRequest::default();
        assert!(request.mutual_auth);
        assert!(request.delegate_credentials);
        assert!(request.integrity);
    }

    #[test]
    fn test_kerberos_oid() {
        assert_eq!(Mechanism::Kerberos5.oid(), "1.2.840.113554.1.2.2");
    }
}
