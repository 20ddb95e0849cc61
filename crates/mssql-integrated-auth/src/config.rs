//! Integrated authentication configuration.

use crate::error::AuthError;
use crate::provider::AuthConnection;

/// Login configuration entry used when no ambient identity exists.
pub const DEFAULT_LOGIN_ENTRY: &str = "SQLJDBCDriver";

/// Authentication settings taken from the connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct AuthConfig {
    /// Service principal name supplied by the user (`serverSpn`).
    ///
    /// When set it is used instead of the SPN derived from host and port,
    /// and host canonicalization is never attempted for it.
    pub server_spn: Option<String>,

    /// Whether server names must be converted to ASCII-Compatible Encoding.
    pub server_name_as_ace: bool,

    /// Name of the login configuration entry passed to the identity provider.
    pub login_entry: String,

    /// Whether to qualify SPNs lacking a realm with one found through DNS
    /// or the local Kerberos configuration (default: true).
    pub realm_discovery: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            server_spn: None,
            server_name_as_ace: false,
            login_entry: DEFAULT_LOGIN_ENTRY.to_string(),
            realm_discovery: true,
        }
    }
}

impl AuthConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the user supplied service principal name.
    #[must_use]
    pub fn server_spn(mut self, spn: impl Into<String>) -> Self {
        self.server_spn = Some(spn.into());
        self
    }

    /// Enable or disable ASCII-Compatible Encoding of server names.
    #[must_use]
    pub fn server_name_as_ace(mut self, enabled: bool) -> Self {
        self.server_name_as_ace = enabled;
        self
    }

    /// Set the login configuration entry name.
    #[must_use]
    pub fn login_entry(mut self, entry: impl Into<String>) -> Self {
        self.login_entry = entry.into();
        self
    }

    /// Enable or disable realm discovery for SPN enrichment.
    #[must_use]
    pub fn realm_discovery(mut self, enabled: bool) -> Self {
        self.realm_discovery = enabled;
        self
    }
}

/// A bare configuration can stand in for a connection when the caller owns
/// the transport: failures are logged and handed back unchanged, and the
/// caller aborts the connection on the returned error.
impl AuthConnection for AuthConfig {
    fn config(&self) -> &AuthConfig {
        self
    }

    fn terminate(&self, error: AuthError) -> AuthError {
        tracing::warn!(error = %error, "integrated authentication failed");
        error
    }
}
