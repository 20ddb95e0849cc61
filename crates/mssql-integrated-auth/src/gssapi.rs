//! GSSAPI-backed identity and security-context providers.
//!
//! ## Prerequisites
//!
//! - **Kerberos libraries**: libkrb5-dev (Debian/Ubuntu) or krb5-devel (RHEL/Fedora)
//! - **Valid Kerberos ticket**: Run `kinit user@REALM` before connecting
//! - **DNS/SPN configuration**: SQL Server SPN must be registered in AD
//!
//! Login never prompts: it only picks up the default credential from the
//! ticket cache. Logging out leaves the cache untouched.

use libgssapi::{
    context::{ClientCtx, CtxFlags, SecurityContext as _},
    credential::{Cred, CredUsage},
    name::Name,
    oid::{GSS_MECH_KRB5, GSS_NT_KRB5_PRINCIPAL, Oid, OidSet},
};

use crate::error::AuthError;
use crate::provider::{
    ContextRequest, IdentityProvider, Mechanism, SecurityContext, SecurityContextProvider,
};
use crate::spn::ServicePrincipalName;

/// A Kerberos principal as seen by GSSAPI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GssIdentity {
    /// Principal name (`user@REALM`); `None` selects the default principal.
    pub principal: Option<String>,
}

/// An initiate-only GSSAPI credential.
///
/// The handle moves into the security context created from it.
pub struct GssCredential {
    cred: Option<Cred>,
}

impl std::fmt::Debug for GssCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GssCredential")
            .field("held", &self.cred.is_some())
            .finish()
    }
}

/// Identity provider backed by the Kerberos ticket cache.
#[derive(Debug, Clone, Default)]
pub struct GssapiIdentityProvider {
    ambient: Option<GssIdentity>,
}

impl GssapiIdentityProvider {
    /// Create a provider with no ambient identity; the first handshake logs
    /// in from the ticket cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `principal` as the ambient identity of this execution context.
    #[must_use]
    pub fn with_ambient_principal(mut self, principal: impl Into<String>) -> Self {
        self.ambient = Some(GssIdentity {
            principal: Some(principal.into()),
        });
        self
    }
}

fn mechanism_oid(mechanism: Mechanism) -> &'static Oid {
    match mechanism {
        Mechanism::Kerberos5 => &GSS_MECH_KRB5,
    }
}

fn mechanism_set(mechanism: Mechanism) -> Result<OidSet, AuthError> {
    let mut mechs =
        OidSet::new().map_err(|e| AuthError::Gssapi(format!("failed to create OID set: {e}")))?;
    mechs
        .add(mechanism_oid(mechanism))
        .map_err(|e| AuthError::Gssapi(format!("failed to add mechanism: {e}")))?;
    Ok(mechs)
}

fn principal_name(principal: &str) -> Result<Name, AuthError> {
    Name::new(principal.as_bytes(), Some(&GSS_NT_KRB5_PRINCIPAL))
        .map_err(|e| AuthError::Gssapi(format!("invalid principal name {principal:?}: {e}")))
}

impl IdentityProvider for GssapiIdentityProvider {
    type Identity = GssIdentity;
    type Credential = GssCredential;

    fn ambient_identity(&self) -> Option<GssIdentity> {
        self.ambient.clone()
    }

    fn login(&self, entry: &str) -> Result<GssIdentity, AuthError> {
        let mechs = mechanism_set(Mechanism::Kerberos5)?;
        let cred = Cred::acquire(None, None, CredUsage::Initiate, Some(&mechs)).map_err(|e| {
            AuthError::IdentityAcquisition(format!(
                "no usable ticket in the credential cache ({entry}): {e}"
            ))
        })?;

        let principal = cred.name().ok().map(|name| name.to_string());
        tracing::debug!(entry, principal = ?principal, "logged in from ticket cache");
        Ok(GssIdentity { principal })
    }

    fn logout(&self, identity: GssIdentity) -> Result<(), AuthError> {
        tracing::trace!(principal = ?identity.principal, "logout");
        Ok(())
    }

    fn acquire_credential(
        &self,
        identity: &GssIdentity,
        mechanism: Mechanism,
    ) -> Result<GssCredential, AuthError> {
        let mechs = mechanism_set(mechanism)?;
        let name = identity
            .principal
            .as_deref()
            .map(principal_name)
            .transpose()?;

        let cred = Cred::acquire(name.as_ref(), None, CredUsage::Initiate, Some(&mechs))
            .map_err(|e| AuthError::Gssapi(format!("failed to acquire credentials: {e}")))?;

        Ok(GssCredential { cred: Some(cred) })
    }

    fn dispose_credential(&self, credential: GssCredential) -> Result<(), AuthError> {
        drop(credential);
        Ok(())
    }
}

/// Security-context provider backed by GSSAPI.
#[derive(Debug, Clone, Copy, Default)]
pub struct GssapiContextProvider;

impl GssapiContextProvider {
    /// Create a provider.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SecurityContextProvider<GssCredential> for GssapiContextProvider {
    type Context = GssContext;

    fn create_context(
        &self,
        peer: &ServicePrincipalName,
        mechanism: Mechanism,
        credential: &mut GssCredential,
        request: ContextRequest,
    ) -> Result<GssContext, AuthError> {
        let target = principal_name(peer.as_str())?;

        let mut flags = CtxFlags::empty();
        if request.mutual_auth {
            flags |= CtxFlags::GSS_C_MUTUAL_FLAG;
        }
        if request.delegate_credentials {
            flags |= CtxFlags::GSS_C_DELEG_FLAG;
        }
        if request.integrity {
            flags |= CtxFlags::GSS_C_INTEG_FLAG;
        }

        let ctx = ClientCtx::new(
            credential.cred.take(),
            target,
            flags,
            Some(mechanism_oid(mechanism)),
        );
        Ok(GssContext { ctx })
    }
}

/// A GSSAPI client security context.
pub struct GssContext {
    ctx: ClientCtx,
}

impl SecurityContext for GssContext {
    fn step(&mut self, incoming: &[u8]) -> Result<Option<Vec<u8>>, AuthError> {
        let token = (!incoming.is_empty()).then_some(incoming);
        self.ctx
            .step(token, None)
            .map(|out| out.map(|buf| buf.to_vec()))
            .map_err(|e| AuthError::ContextNegotiation(format!("GSSAPI step failed: {e}")))
    }

    fn is_established(&self) -> bool {
        self.ctx.is_complete()
    }

    fn dispose(self) -> Result<(), AuthError> {
        drop(self.ctx);
        Ok(())
    }
}

impl std::fmt::Debug for GssContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GssContext")
            .field("complete", &self.ctx.is_complete())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambient_principal() {
        let provider = GssapiIdentityProvider::new().with_ambient_principal("user@EXAMPLE.COM");
        assert_eq!(
            provider.ambient_identity(),
            Some(GssIdentity {
                principal: Some("user@EXAMPLE.COM".into())
            })
        );
        assert_eq!(GssapiIdentityProvider::new().ambient_identity(), None);
    }

    #[test]
    fn test_logout_is_noop() {
        let provider = GssapiIdentityProvider::new();
        assert!(provider.logout(GssIdentity::default()).is_ok());
    }
}
