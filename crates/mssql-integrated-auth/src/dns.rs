//! DNS realm discovery using the system resolver configuration.

use std::net::IpAddr;
use std::sync::Arc;

use hickory_resolver::Resolver;
use once_cell::sync::{Lazy, OnceCell};
use tokio::runtime::Handle;

use crate::error::AuthError;
use crate::provider::RealmDiscovery;

static SYSTEM_DISCOVERY: Lazy<Arc<DnsRealmDiscovery>> =
    Lazy::new(|| Arc::new(DnsRealmDiscovery::new()));

/// Get the process-wide DNS realm discovery service.
pub fn system_discovery() -> Arc<DnsRealmDiscovery> {
    Arc::clone(&SYSTEM_DISCOVERY)
}

/// Realm discovery over DNS.
///
/// A realm is located through its `_kerberos._udp` and `_kerberos._tcp` SRV
/// records. Canonical names are found by forward resolution followed by a
/// reverse (PTR) lookup.
#[derive(Default)]
pub struct DnsRealmDiscovery {
    resolver: OnceCell<Resolver>,
}

impl DnsRealmDiscovery {
    /// Create a discovery service; the resolver is built on first use.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn resolver(&self) -> Result<&Resolver, AuthError> {
        self.resolver.get_or_try_init(|| {
            Resolver::from_system_conf().map_err(|e| {
                AuthError::HostResolution(format!("cannot read system resolver configuration: {e}"))
            })
        })
    }
}

/// Run a blocking resolver call.
///
/// The blocking resolver drives its own runtime, which cannot be entered
/// from a thread already inside a Tokio runtime; in that case the call runs
/// on a scoped helper thread.
fn blocking<T, F>(f: F) -> Result<T, AuthError>
where
    T: Send,
    F: FnOnce() -> Result<T, AuthError> + Send,
{
    if Handle::try_current().is_err() {
        return f();
    }

    std::thread::scope(|s| {
        s.spawn(f)
            .join()
            .unwrap_or_else(|_| Err(AuthError::HostResolution("DNS lookup thread panicked".into())))
    })
}

impl RealmDiscovery for DnsRealmDiscovery {
    fn kdc_hosts(&self, realm: &str) -> Result<Vec<String>, AuthError> {
        blocking(|| self.lookup_kdc_hosts(realm))
    }

    fn canonical_hostname(&self, name: &str) -> Result<String, AuthError> {
        blocking(|| self.lookup_canonical_hostname(name))
    }
}

impl DnsRealmDiscovery {
    fn lookup_kdc_hosts(&self, realm: &str) -> Result<Vec<String>, AuthError> {
        let resolver = self.resolver()?;
        let realm = realm.trim_end_matches('.');
        let mut hosts = Vec::new();

        for (proto, query) in [
            ("udp", format!("_kerberos._udp.{realm}.")),
            ("tcp", format!("_kerberos._tcp.{realm}.")),
        ] {
            match resolver.srv_lookup(query.as_str()) {
                Ok(records) => hosts.extend(records.iter().map(|srv| {
                    let target = srv.target().to_string();
                    format!("{proto}://{}:{}", target.trim_end_matches('.'), srv.port())
                })),
                Err(e) => tracing::trace!(query = %query, error = %e, "SRV lookup failed"),
            }
            if !hosts.is_empty() {
                break;
            }
        }

        Ok(hosts)
    }

    fn lookup_canonical_hostname(&self, name: &str) -> Result<String, AuthError> {
        let resolver = self.resolver()?;

        let addr = match name.parse::<IpAddr>() {
            Ok(addr) => addr,
            Err(_) => resolver
                .lookup_ip(name)
                .map_err(|e| AuthError::HostResolution(format!("{name}: {e}")))?
                .iter()
                .next()
                .ok_or_else(|| AuthError::HostResolution(format!("{name}: no addresses")))?,
        };

        let canonical = resolver
            .reverse_lookup(addr)
            .map_err(|e| AuthError::HostResolution(format!("{addr}: {e}")))?
            .iter()
            .next()
            .map(|ptr| ptr.to_string().trim_end_matches('.').to_string())
            .ok_or_else(|| AuthError::HostResolution(format!("{addr}: no PTR record")))?;

        tracing::debug!(name, canonical = %canonical, "canonicalized host name");
        Ok(canonical)
    }
}

impl std::fmt::Debug for DnsRealmDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsRealmDiscovery")
            .field("initialized", &self.resolver.get().is_some())
            .finish()
    }
}
