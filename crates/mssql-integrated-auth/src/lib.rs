//! # mssql-integrated-auth
//!
//! Kerberos integrated authentication for SQL Server connections.
//!
//! This crate derives the server's service principal name, qualifies it
//! with a Kerberos realm discovered from DNS or the local Kerberos
//! configuration, and drives the security-context handshake whose tokens the
//! connection carries in TDS SSPI packets.
//!
//! ## Components
//!
//! | Component | Module | Description |
//! |-----------|--------|-------------|
//! | SPN builder | [`spn`] | `MSSQLSvc/host:port`, IDN conversion |
//! | Realm validation | [`realm`] | Native KDC list or DNS locator, selected once |
//! | SPN enrichment | [`enrich`] | Appends `@REALM`, canonicalizes host names |
//! | Handshake | [`integrated_auth`] | Identity, credential, context lifecycle |
//! | GSSAPI backend | `gssapi` | System Kerberos (`integrated-auth` feature) |

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod dns;
pub mod enrich;
pub mod error;
#[cfg(feature = "integrated-auth")]
pub mod gssapi;
pub mod integrated_auth;
pub mod krb5_conf;
pub mod provider;
pub mod realm;
pub mod spn;

pub use config::AuthConfig;
pub use enrich::SpnEnricher;
pub use error::AuthError;
#[cfg(feature = "integrated-auth")]
pub use gssapi::{GssapiContextProvider, GssapiIdentityProvider};
pub use integrated_auth::{ClientContextStep, HandshakeState, IntegratedAuth};
pub use provider::{
    AuthConnection, ContextRequest, IdentityProvider, Mechanism, RealmDiscovery, SecurityContext,
    SecurityContextProvider,
};
pub use realm::{RealmValidator, find_realm};
pub use spn::ServicePrincipalName;
