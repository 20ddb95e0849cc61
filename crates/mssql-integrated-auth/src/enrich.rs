//! Realm enrichment of service principal names.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::dns;
use crate::provider::RealmDiscovery;
use crate::realm::{self, RealmValidator};
use crate::spn::SERVICE_CLASS;

// `MSSQLSvc/<dns name>:<port or instance>[@realm]`
static SPN_RE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"(?i)^MSSQLSvc/(.*):([^:@]+)(@.+)?$").expect("SPN pattern is valid")
});

/// Appends the Kerberos realm to SQL Server SPNs that lack one.
pub struct SpnEnricher {
    validator: Option<Arc<dyn RealmValidator>>,
    discovery: Arc<dyn RealmDiscovery>,
}

impl SpnEnricher {
    /// Create an enricher with an explicit validator and discovery service.
    #[must_use]
    pub fn new(validator: Arc<dyn RealmValidator>, discovery: Arc<dyn RealmDiscovery>) -> Self {
        Self {
            validator: Some(validator),
            discovery,
        }
    }

    /// Create an enricher using the process-wide realm validator and the
    /// system DNS configuration.
    ///
    /// The validator is selected lazily, on the first SPN that needs a realm.
    #[must_use]
    pub fn system() -> Self {
        Self {
            validator: None,
            discovery: dns::system_discovery(),
        }
    }

    fn validator(&self, probe_host: &str) -> Arc<dyn RealmValidator> {
        match &self.validator {
            Some(validator) => Arc::clone(validator),
            None => realm::realm_validator(probe_host),
        }
    }

    /// Qualify `spn` with its realm.
    ///
    /// SPNs that are not of the form `MSSQLSvc/<host>:<port or instance>`, or
    /// that already name a realm, are returned unchanged, as is any SPN whose
    /// realm cannot be found. With `allow_canonicalization` a failed lookup is
    /// retried against the canonical name of the host, which then replaces
    /// the host in the result. This must be disabled for SPNs supplied by the
    /// user.
    pub fn enrich(&self, spn: &str, allow_canonicalization: bool) -> String {
        let Some(caps) = SPN_RE.captures(spn) else {
            return spn.to_string();
        };
        if caps.get(3).is_some() {
            return spn.to_string();
        }

        let mut dns_name = caps[1].to_string();
        let port_or_instance = &caps[2];

        let validator = self.validator(&dns_name);
        let mut realm = realm::find_realm(validator.as_ref(), &dns_name);

        if realm.is_none() && allow_canonicalization {
            match self.discovery.canonical_hostname(&dns_name) {
                Ok(canonical) => {
                    realm = realm::find_realm(validator.as_ref(), &canonical);
                    dns_name = canonical;
                }
                Err(e) => {
                    tracing::debug!(host = %dns_name, error = %e, "cannot canonicalize host name");
                }
            }
        }

        match realm {
            Some(realm) => format!(
                "{SERVICE_CLASS}/{dns_name}:{port_or_instance}@{}",
                realm.to_uppercase()
            ),
            None => spn.to_string(),
        }
    }
}

impl std::fmt::Debug for SpnEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpnEnricher")
            .field(
                "validator",
                &self.validator.as_ref().map_or("process-wide", |v| v.name()),
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::AuthError;

    struct Realms(&'static [&'static str]);

    impl RealmValidator for Realms {
        fn is_realm_valid(&self, realm: &str) -> bool {
            self.0.iter().any(|r| r.eq_ignore_ascii_case(realm))
        }

        fn name(&self) -> &'static str {
            "static"
        }
    }

    struct Hosts(HashMap<&'static str, &'static str>);

    impl RealmDiscovery for Hosts {
        fn kdc_hosts(&self, _realm: &str) -> Result<Vec<String>, AuthError> {
            Ok(Vec::new())
        }

        fn canonical_hostname(&self, name: &str) -> Result<String, AuthError> {
            self.0
                .get(name)
                .map(|s| s.to_string())
                .ok_or_else(|| AuthError::HostResolution(name.to_string()))
        }
    }

    fn enricher(realms: &'static [&'static str]) -> SpnEnricher {
        let hosts = HashMap::from([("10.0.0.5", "db1.example.com"), ("db1", "db1.example.com")]);
        SpnEnricher::new(Arc::new(Realms(realms)), Arc::new(Hosts(hosts)))
    }

    #[test]
    fn test_enrich_appends_realm() {
        let e = enricher(&["EXAMPLE.COM"]);
        assert_eq!(
            e.enrich("MSSQLSvc/db1.example.com:1433", false),
            "MSSQLSvc/db1.example.com:1433@EXAMPLE.COM"
        );
    }

    #[test]
    fn test_enrich_instance_name() {
        let e = enricher(&["EXAMPLE.COM"]);
        assert_eq!(
            e.enrich("MSSQLSvc/db1.example.com:SQLEXPRESS", false),
            "MSSQLSvc/db1.example.com:SQLEXPRESS@EXAMPLE.COM"
        );
    }

    #[test]
    fn test_enrich_keeps_explicit_realm() {
        let e = enricher(&["EXAMPLE.COM"]);
        let spn = "MSSQLSvc/db1.example.com:1433@OTHER.ORG";
        assert_eq!(e.enrich(spn, true), spn);
    }

    #[test]
    fn test_enrich_ignores_custom_spn() {
        let e = enricher(&["EXAMPLE.COM"]);
        assert_eq!(e.enrich("HTTP/db1.example.com", true), "HTTP/db1.example.com");
        assert_eq!(
            e.enrich("MSSQLSvc/db1.example.com", true),
            "MSSQLSvc/db1.example.com"
        );
    }

    #[test]
    fn test_enrich_is_case_insensitive() {
        let e = enricher(&["EXAMPLE.COM"]);
        assert_eq!(
            e.enrich("mssqlsvc/db1.example.com:1433", false),
            "MSSQLSvc/db1.example.com:1433@EXAMPLE.COM"
        );
    }

    #[test]
    fn test_enrich_canonicalizes_ip_literal() {
        let e = enricher(&["EXAMPLE.COM"]);
        assert_eq!(
            e.enrich("MSSQLSvc/10.0.0.5:1433", true),
            "MSSQLSvc/db1.example.com:1433@EXAMPLE.COM"
        );
        assert_eq!(
            e.enrich("MSSQLSvc/10.0.0.5:1433", false),
            "MSSQLSvc/10.0.0.5:1433"
        );
    }

    #[test]
    fn test_enrich_canonicalizes_short_name() {
        let e = enricher(&["EXAMPLE.COM"]);
        assert_eq!(
            e.enrich("MSSQLSvc/db1:1433", true),
            "MSSQLSvc/db1.example.com:1433@EXAMPLE.COM"
        );
    }

    #[test]
    fn test_enrich_swallows_resolution_failure() {
        let e = enricher(&["EXAMPLE.COM"]);
        assert_eq!(
            e.enrich("MSSQLSvc/unknown:1433", true),
            "MSSQLSvc/unknown:1433"
        );
    }

    #[test]
    fn test_enrich_no_realm_after_canonicalization() {
        let e = enricher(&[]);
        assert_eq!(
            e.enrich("MSSQLSvc/10.0.0.5:1433", true),
            "MSSQLSvc/10.0.0.5:1433"
        );
    }
}
