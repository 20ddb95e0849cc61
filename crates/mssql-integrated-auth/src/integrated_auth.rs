//! Integrated authentication (Kerberos) handshake.
//!
//! An [`IntegratedAuth`] is created per connection attempt. Creating it only
//! computes the target service principal name; the identity, credential and
//! security context are acquired on the first handshake round.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mssql_integrated_auth::IntegratedAuth;
//!
//! let mut auth = IntegratedAuth::new(connection, "sqlserver.example.com", 1433, identities, contexts)?;
//!
//! // The first round has no server token.
//! let mut step = auth.generate_client_context(&[])?;
//! while !step.done {
//!     send_sspi_packet(step.token.as_deref().unwrap_or_default())?;
//!     let server_token = receive_sspi_packet()?;
//!     step = auth.generate_client_context(&server_token)?;
//! }
//!
//! auth.release_client_context();
//! ```
//!
//! ## How It Works
//!
//! 1. The SPN is taken from the connection configuration, or built as
//!    `MSSQLSvc/host:port`, then qualified with its realm when possible
//! 2. The first round uses the ambient identity, or logs in, then acquires
//!    an initiate-only Kerberos credential and creates the security context
//!    (mutual authentication, delegation, integrity)
//! 3. Every round feeds the server token to the context and returns the
//!    token to send back, until the context reports itself established
//! 4. Teardown releases credential, context and (if logged in here) identity

use crate::config::AuthConfig;
use crate::enrich::SpnEnricher;
use crate::error::AuthError;
use crate::provider::{
    AuthConnection, ContextRequest, IdentityProvider, Mechanism, SecurityContext,
    SecurityContextProvider,
};
use crate::spn::ServicePrincipalName;

/// Progress of the security-context handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// No handshake round has run yet.
    NotStarted,
    /// The security context exists but is not established.
    InProgress,
    /// The security context is established.
    Established,
    /// A fatal error was reported to the connection.
    Failed,
}

/// Result of one handshake round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContextStep {
    /// Token to send to the server, if any.
    pub token: Option<Vec<u8>>,
    /// Whether the security context is now established.
    pub done: bool,
}

enum AcquiredIdentity<T> {
    /// Supplied by the execution context; never logged out here.
    Ambient(T),
    /// Obtained through an explicit login; logged out at teardown.
    LoggedIn(T),
}

impl<T> AcquiredIdentity<T> {
    fn get(&self) -> &T {
        match self {
            Self::Ambient(identity) | Self::LoggedIn(identity) => identity,
        }
    }
}

/// Kerberos integrated authentication for one connection.
///
/// Not `Clone`: the security context is stateful and owned by exactly one
/// connection.
pub struct IntegratedAuth<C, I, S>
where
    I: IdentityProvider,
    S: SecurityContextProvider<I::Credential>,
{
    connection: C,
    identities: I,
    contexts: S,
    spn: ServicePrincipalName,
    state: HandshakeState,
    identity: Option<AcquiredIdentity<I::Identity>>,
    credential: Option<I::Credential>,
    context: Option<S::Context>,
}

impl<C, I, S> IntegratedAuth<C, I, S>
where
    C: AuthConnection,
    I: IdentityProvider,
    S: SecurityContextProvider<I::Credential>,
{
    /// Create the authentication context for a server at `host:port`.
    ///
    /// Realms are discovered through the process-wide realm validator and
    /// the system DNS configuration.
    ///
    /// # Errors
    ///
    /// Fails (after reporting to the connection) if the server name cannot
    /// be converted to ASCII-Compatible Encoding.
    pub fn new(
        connection: C,
        host: &str,
        port: u16,
        identities: I,
        contexts: S,
    ) -> Result<Self, AuthError> {
        Self::with_enricher(
            connection,
            host,
            port,
            identities,
            contexts,
            &SpnEnricher::system(),
        )
    }

    /// Create the authentication context using a specific SPN enricher.
    pub fn with_enricher(
        connection: C,
        host: &str,
        port: u16,
        identities: I,
        contexts: S,
        enricher: &SpnEnricher,
    ) -> Result<Self, AuthError> {
        let spn = match resolve_spn(connection.config(), host, port, enricher) {
            Ok(spn) => spn,
            Err(e) => return Err(connection.terminate(e)),
        };

        Ok(Self {
            connection,
            identities,
            contexts,
            spn,
            state: HandshakeState::NotStarted,
            identity: None,
            credential: None,
            context: None,
        })
    }

    /// Run one handshake round with the token received from the server.
    ///
    /// The first call (with an empty token) acquires the identity and
    /// creates the security context. Returns the token to send and whether
    /// the context is established.
    ///
    /// # Errors
    ///
    /// Identity acquisition and negotiation failures are reported to the
    /// connection through [`AuthConnection::terminate`] and returned. Calls
    /// after a failure, after establishment or after release are rejected.
    pub fn generate_client_context(
        &mut self,
        incoming: &[u8],
    ) -> Result<ClientContextStep, AuthError> {
        match self.state {
            HandshakeState::Failed => {
                return Err(AuthError::ContextNegotiation(
                    "handshake has already failed".into(),
                ));
            }
            HandshakeState::Established => {
                return Err(AuthError::ContextNegotiation(
                    "security context is already established".into(),
                ));
            }
            HandshakeState::NotStarted => {
                if let Err(e) = self.init_context() {
                    return Err(self.fail(e));
                }
                self.state = HandshakeState::InProgress;
            }
            HandshakeState::InProgress => {}
        }

        match self.handshake(incoming) {
            Ok(step) => {
                if step.done {
                    self.state = HandshakeState::Established;
                }
                Ok(step)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn init_context(&mut self) -> Result<(), AuthError> {
        let identity = match self.identities.ambient_identity() {
            Some(identity) => {
                tracing::debug!("using ambient identity");
                AcquiredIdentity::Ambient(identity)
            }
            None => {
                let entry = &self.connection.config().login_entry;
                tracing::debug!(entry = %entry, "no ambient identity, logging in");
                AcquiredIdentity::LoggedIn(self.identities.login(entry)?)
            }
        };
        let identity = self.identity.insert(identity);

        tracing::debug!("getting client credentials");
        let credential = self
            .identities
            .acquire_credential(identity.get(), Mechanism::Kerberos5)?;
        let credential = self.credential.insert(credential);

        tracing::debug!(spn = %self.spn, "creating security context");
        let context = self.contexts.create_context(
            &self.spn,
            Mechanism::Kerberos5,
            credential,
            ContextRequest::INTEGRATED,
        )?;
        self.context = Some(context);

        Ok(())
    }

    fn handshake(&mut self, incoming: &[u8]) -> Result<ClientContextStep, AuthError> {
        let context = self.context.as_mut().ok_or_else(|| {
            AuthError::ContextNegotiation("security context has been released".into())
        })?;

        tracing::debug!(
            incoming_len = incoming.len(),
            "sending token to server over security context"
        );
        let token = context.step(incoming)?;

        if context.is_established() {
            tracing::debug!(spn = %self.spn, "authentication done");
            return Ok(ClientContextStep { token, done: true });
        }

        if token.is_none() {
            tracing::info!("security context produced no token before being established");
            return Err(AuthError::ContextNegotiation(
                "no token produced before the security context was established".into(),
            ));
        }

        Ok(ClientContextStep { token, done: false })
    }

    fn fail(&mut self, error: AuthError) -> AuthError {
        self.state = HandshakeState::Failed;
        tracing::debug!(error = %error, "integrated authentication failed");
        self.connection.terminate(error)
    }

    /// The connection this context belongs to.
    pub fn connection(&self) -> &C {
        &self.connection
    }
}

impl<C, I, S> IntegratedAuth<C, I, S>
where
    I: IdentityProvider,
    S: SecurityContextProvider<I::Credential>,
{
    /// The target service principal name.
    #[must_use]
    pub fn spn(&self) -> &ServicePrincipalName {
        &self.spn
    }

    /// Current handshake state.
    ///
    /// This is the outcome of the handshake, not whether resources are still
    /// held: [`release_client_context`](Self::release_client_context) leaves
    /// it unchanged.
    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Check if the handshake reached an established security context.
    ///
    /// Stays `true` after release, like [`state`](Self::state).
    #[must_use]
    pub fn is_established(&self) -> bool {
        self.state == HandshakeState::Established
    }

    /// Release the credential, the security context and, if it was
    /// obtained through an explicit login here, the identity.
    ///
    /// Each release is attempted independently; failures are logged and
    /// suppressed so that an earlier authentication error stays the one the
    /// caller sees. Calling this again is a no-op.
    pub fn release_client_context(&mut self) {
        if let Some(credential) = self.credential.take() {
            if let Err(e) = self.identities.dispose_credential(credential) {
                tracing::debug!(error = %e, "release of the credentials failed");
            }
        }

        if let Some(context) = self.context.take() {
            if let Err(e) = context.dispose() {
                tracing::debug!(error = %e, "release of the security context failed");
            }
        }

        match self.identity.take() {
            Some(AcquiredIdentity::LoggedIn(identity)) => {
                if let Err(e) = self.identities.logout(identity) {
                    tracing::debug!(error = %e, "logout failed");
                }
            }
            Some(AcquiredIdentity::Ambient(_)) | None => {}
        }
    }
}

impl<C, I, S> Drop for IntegratedAuth<C, I, S>
where
    I: IdentityProvider,
    S: SecurityContextProvider<I::Credential>,
{
    fn drop(&mut self) {
        self.release_client_context();
    }
}

impl<C, I, S> std::fmt::Debug for IntegratedAuth<C, I, S>
where
    I: IdentityProvider,
    S: SecurityContextProvider<I::Credential>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegratedAuth")
            .field("spn", &self.spn)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Compute the SPN to authenticate against.
///
/// A user supplied SPN is trusted as written: it is only ACE-normalized and
/// never canonicalized. A derived SPN may be canonicalized during realm
/// enrichment.
pub fn resolve_spn(
    config: &AuthConfig,
    host: &str,
    port: u16,
    enricher: &SpnEnricher,
) -> Result<ServicePrincipalName, AuthError> {
    let ace = config.server_name_as_ace;
    let (spn, user_supplied) = match &config.server_spn {
        Some(spn) => (ServicePrincipalName::normalize_user_supplied(spn, ace)?, true),
        None => (ServicePrincipalName::build(host, port, ace)?, false),
    };

    if !config.realm_discovery {
        return Ok(spn);
    }

    let enriched = enricher.enrich(spn.as_str(), !user_supplied);
    if enriched == spn.as_str() {
        return Ok(spn);
    }

    tracing::debug!(spn = %spn, enriched = %enriched, "SPN enriched");
    Ok(ServicePrincipalName::from_string(enriched))
}
