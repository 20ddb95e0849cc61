#![no_main]

use std::sync::Arc;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use mssql_integrated_auth::{
    AuthError, RealmDiscovery, RealmValidator, ServicePrincipalName, SpnEnricher, find_realm,
};

/// Accepts any realm whose first byte is in the accepted set.
struct ByteRealms(Vec<u8>);

impl RealmValidator for ByteRealms {
    fn is_realm_valid(&self, realm: &str) -> bool {
        realm.bytes().next().is_some_and(|b| self.0.contains(&b))
    }

    fn name(&self) -> &'static str {
        "fuzz"
    }
}

struct EchoDns;

impl RealmDiscovery for EchoDns {
    fn kdc_hosts(&self, _realm: &str) -> Result<Vec<String>, AuthError> {
        Ok(Vec::new())
    }

    fn canonical_hostname(&self, name: &str) -> Result<String, AuthError> {
        Ok(format!("{name}.canonical.test"))
    }
}

#[derive(Debug, Arbitrary)]
struct FuzzSpnInput {
    spn: String,
    host: String,
    port: u16,
    ace: bool,
    allow_canonicalization: bool,
    realm_bytes: Vec<u8>,
}

fuzz_target!(|input: FuzzSpnInput| {
    let validator = Arc::new(ByteRealms(input.realm_bytes));

    // SPN construction and user-supplied normalization must never panic
    let _ = ServicePrincipalName::build(&input.host, input.port, input.ace);
    let _ = ServicePrincipalName::normalize_user_supplied(&input.spn, input.ace);

    // Realm search walks arbitrary (possibly multi-byte) host names
    let _ = find_realm(validator.as_ref(), &input.host);

    // Enrichment of arbitrary SPNs, with and without canonicalization
    let enricher = SpnEnricher::new(validator, Arc::new(EchoDns));
    let enriched = enricher.enrich(&input.spn, input.allow_canonicalization);
    let _ = enricher.enrich(&enriched, input.allow_canonicalization);
});
