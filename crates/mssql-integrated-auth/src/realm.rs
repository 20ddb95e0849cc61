//! Kerberos realm validation and discovery.
//!
//! A realm is found by offering the server host name and each of its DNS
//! suffixes to a [`RealmValidator`]; the first accepted candidate wins.
//!
//! Two validators exist:
//!
//! - [`KdcListValidator`] asks the native Kerberos configuration for the
//!   realm's KDC list. It is only trusted after a self-test showing that it
//!   rejects an obviously bogus realm, since a configuration that falls back
//!   to DNS can accept anything under a wildcard zone.
//! - [`DnsLocatorValidator`] looks for the realm's `_kerberos` SRV records.
//!
//! The process-wide choice between them is made once, on first use, by
//! [`realm_validator`].

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::dns;
use crate::error::AuthError;
use crate::krb5_conf::Krb5Config;
use crate::provider::RealmDiscovery;

/// Prefix of the realm used to self-test a native KDC lookup.
pub const PROBE_REALM_PREFIX: &str = "this.might.not.exist.";

static REALM_VALIDATOR: OnceCell<Arc<dyn RealmValidator>> = OnceCell::new();

/// Answers whether a string names a known Kerberos realm.
pub trait RealmValidator: Send + Sync {
    /// Check whether `realm` is a valid realm.
    ///
    /// Lookup failures are reported as `false`.
    fn is_realm_valid(&self, realm: &str) -> bool;

    /// Short name of the strategy, for diagnostics.
    fn name(&self) -> &'static str;
}

/// Native Kerberos configuration facility able to list a realm's KDCs.
pub trait KdcLookup: Send + Sync {
    /// Get the KDC hosts configured for `realm`.
    fn kdc_list(&self, realm: &str) -> Result<Vec<String>, AuthError>;
}

/// Realm validator backed by the native Kerberos configuration.
///
/// A realm is valid when its KDC list is non-empty.
pub struct KdcListValidator {
    lookup: Box<dyn KdcLookup>,
}

impl KdcListValidator {
    /// Create a validator over a native KDC lookup.
    #[must_use]
    pub fn new(lookup: Box<dyn KdcLookup>) -> Self {
        Self { lookup }
    }
}

impl RealmValidator for KdcListValidator {
    fn is_realm_valid(&self, realm: &str) -> bool {
        match self.lookup.kdc_list(realm) {
            Ok(kdcs) => !kdcs.is_empty(),
            Err(e) => {
                tracing::trace!(realm, error = %e, "KDC list lookup failed");
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "native-kdc-list"
    }
}

impl std::fmt::Debug for KdcListValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KdcListValidator").finish_non_exhaustive()
    }
}

/// Realm validator backed by DNS realm location.
pub struct DnsLocatorValidator {
    discovery: Arc<dyn RealmDiscovery>,
}

impl DnsLocatorValidator {
    /// Create a validator over a realm discovery service.
    #[must_use]
    pub fn new(discovery: Arc<dyn RealmDiscovery>) -> Self {
        Self { discovery }
    }
}

impl RealmValidator for DnsLocatorValidator {
    fn is_realm_valid(&self, realm: &str) -> bool {
        self.discovery.locate_realm(realm).unwrap_or_else(|e| {
            tracing::trace!(realm, error = %e, "DNS realm lookup failed");
            false
        })
    }

    fn name(&self) -> &'static str {
        "dns-locator"
    }
}

impl std::fmt::Debug for DnsLocatorValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsLocatorValidator").finish_non_exhaustive()
    }
}

/// Choose between the native and DNS validators.
///
/// The native lookup is used only if it exists and rejects the probe realm
/// `this.might.not.exist.<probe_host>`.
pub fn select_realm_validator(
    native: Option<Box<dyn KdcLookup>>,
    discovery: Arc<dyn RealmDiscovery>,
    probe_host: &str,
) -> Arc<dyn RealmValidator> {
    match native {
        Some(lookup) => {
            let validator = KdcListValidator::new(lookup);
            let probe = format!("{PROBE_REALM_PREFIX}{probe_host}");
            if !validator.is_realm_valid(&probe) {
                tracing::debug!("Kerberos realm validator: using native KDC list lookup");
                return Arc::new(validator);
            }
            tracing::debug!(
                probe = %probe,
                "Kerberos realm validator: native KDC lookup accepts bogus realms, using DNS locator"
            );
        }
        None => {
            tracing::debug!(
                "Kerberos realm validator: no native Kerberos configuration, using DNS locator"
            );
        }
    }

    Arc::new(DnsLocatorValidator::new(discovery))
}

/// Get the process-wide realm validator, selecting it on first use.
///
/// The selection is never re-evaluated; later `probe_host` values are
/// ignored.
pub fn realm_validator(probe_host: &str) -> Arc<dyn RealmValidator> {
    memoized(&REALM_VALIDATOR, || {
        let discovery: Arc<dyn RealmDiscovery> = dns::system_discovery();
        let native = Krb5Config::load_default().map(|config| {
            Box::new(config.with_dns_fallback(Arc::clone(&discovery))) as Box<dyn KdcLookup>
        });
        select_realm_validator(native, discovery, probe_host)
    })
}

/// Get the validator held by `cell`, running `select` only if it is empty.
///
/// Concurrent first callers block until one selection completes and all
/// receive that instance.
fn memoized(
    cell: &OnceCell<Arc<dyn RealmValidator>>,
    select: impl FnOnce() -> Arc<dyn RealmValidator>,
) -> Arc<dyn RealmValidator> {
    let validator = cell.get_or_init(|| {
        let validator = select();
        tracing::debug!(validator = validator.name(), "selected Kerberos realm validator");
        validator
    });
    Arc::clone(validator)
}

/// Find the realm of `hostname` by testing the name and its DNS suffixes.
///
/// For `db1.example.com` the candidates are `db1.example.com`,
/// `example.com` and `com`, in that order. Candidates shorter than three
/// characters are not tried. The accepted candidate is returned upper-cased.
pub fn find_realm(validator: &dyn RealmValidator, hostname: &str) -> Option<String> {
    let mut index = 0;
    while index + 2 < hostname.len() {
        let candidate = &hostname[index..];
        tracing::trace!(candidate, "looking up realm candidate");
        if validator.is_realm_valid(candidate) {
            return Some(candidate.to_uppercase());
        }
        let first = candidate.chars().next().map_or(1, char::len_utf8);
        match candidate[first..].find('.') {
            Some(dot) => index += first + dot + 1,
            None => break,
        }
    }
    None
}
