//! Native Kerberos configuration (`krb5.conf`).
//!
//! Only the parts needed to answer "which KDCs serve this realm" are read:
//! `[libdefaults]` (`default_realm`, `dns_lookup_kdc`) and the `kdc` entries
//! of each `[realms]` block. Like the MIT library, a realm without
//! configured KDCs falls back to DNS when `dns_lookup_kdc` is enabled, which
//! is the default.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::AuthError;
use crate::provider::RealmDiscovery;
use crate::realm::KdcLookup;

/// Environment variable naming the Kerberos configuration file(s).
pub const KRB5_CONFIG_ENV: &str = "KRB5_CONFIG";

/// Default location of the Kerberos configuration file.
pub const DEFAULT_KRB5_CONFIG: &str = "/etc/krb5.conf";

/// Parsed Kerberos configuration.
#[derive(Clone, Default)]
pub struct Krb5Config {
    default_realm: Option<String>,
    dns_lookup_kdc: Option<bool>,
    realms: HashMap<String, Vec<String>>,
    dns: Option<Arc<dyn RealmDiscovery>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    LibDefaults,
    Realms,
    Other,
}

impl Krb5Config {
    /// Parse configuration text.
    pub fn parse(text: &str) -> Result<Self, AuthError> {
        let mut config = Self::default();
        let mut section = Section::Other;
        // Realm whose block is open, and brace depth inside [realms].
        let mut realm: Option<String> = None;
        let mut depth = 0usize;

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if depth == 0 && line.starts_with('[') {
                let name = line
                    .strip_prefix('[')
                    .and_then(|rest| rest.split_once(']'))
                    .map(|(name, _)| name.trim())
                    .ok_or_else(|| {
                        AuthError::Configuration(format!(
                            "krb5.conf line {}: malformed section header",
                            lineno + 1
                        ))
                    })?;
                section = match name {
                    "libdefaults" => Section::LibDefaults,
                    "realms" => Section::Realms,
                    _ => Section::Other,
                };
                continue;
            }

            if line.starts_with('}') {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    AuthError::Configuration(format!(
                        "krb5.conf line {}: unbalanced '}}'",
                        lineno + 1
                    ))
                })?;
                if depth == 0 {
                    realm = None;
                }
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                tracing::trace!(line = lineno + 1, "ignoring krb5.conf line without relation");
                continue;
            };
            let key = key.trim();
            let value = value.trim();

            if value == "{" {
                if depth == 0 && section == Section::Realms {
                    realm = Some(key.to_string());
                    config.realms.entry(key.to_string()).or_default();
                }
                depth += 1;
                continue;
            }

            match (section, depth) {
                (Section::LibDefaults, 0) => match key {
                    "default_realm" => config.default_realm = Some(value.to_string()),
                    "dns_lookup_kdc" => config.dns_lookup_kdc = Some(parse_bool(value)),
                    "dns_fallback" => {
                        config.dns_lookup_kdc.get_or_insert(parse_bool(value));
                    }
                    _ => {}
                },
                (Section::Realms, 1) if key == "kdc" => {
                    if let Some(realm) = &realm {
                        config
                            .realms
                            .entry(realm.clone())
                            .or_default()
                            .push(value.to_string());
                    }
                }
                _ => {}
            }
        }

        if depth != 0 {
            return Err(AuthError::Configuration(
                "krb5.conf: unterminated '{' block".into(),
            ));
        }

        Ok(config)
    }

    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            AuthError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    /// Load the configuration the Kerberos library would use.
    ///
    /// The first existing file listed in `KRB5_CONFIG` (colon separated) is
    /// used, else `/etc/krb5.conf`. Returns `None` when there is no usable
    /// configuration.
    pub fn load_default() -> Option<Self> {
        Self::load_first(
            std::env::var_os(KRB5_CONFIG_ENV).as_deref(),
            Path::new(DEFAULT_KRB5_CONFIG),
        )
    }

    /// Load the first existing file of a `KRB5_CONFIG`-style path list, or
    /// `default` when no list is given.
    fn load_first(list: Option<&OsStr>, default: &Path) -> Option<Self> {
        let candidates: Vec<PathBuf> = match list {
            Some(list) => std::env::split_paths(list).collect(),
            None => vec![default.to_path_buf()],
        };

        let path = candidates.into_iter().find(|p| p.is_file())?;
        match Self::load(&path) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "loaded Kerberos configuration");
                Some(config)
            }
            Err(e) => {
                tracing::debug!(error = %e, "ignoring unusable Kerberos configuration");
                None
            }
        }
    }

    /// Use `dns` for realms without configured KDCs when `dns_lookup_kdc`
    /// allows it.
    #[must_use]
    pub fn with_dns_fallback(mut self, dns: Arc<dyn RealmDiscovery>) -> Self {
        self.dns = Some(dns);
        self
    }

    /// The `default_realm` from `[libdefaults]`.
    #[must_use]
    pub fn default_realm(&self) -> Option<&str> {
        self.default_realm.as_deref()
    }

    /// Whether KDCs may be located through DNS.
    #[must_use]
    pub fn dns_lookup_kdc(&self) -> bool {
        self.dns_lookup_kdc.unwrap_or(true)
    }

    /// KDCs configured for `realm` (realm names compare case-insensitively).
    #[must_use]
    pub fn kdcs(&self, realm: &str) -> &[String] {
        self.realms
            .get(realm)
            .or_else(|| {
                self.realms
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(realm))
                    .map(|(_, kdcs)| kdcs)
            })
            .map_or(&[], Vec::as_slice)
    }
}

impl KdcLookup for Krb5Config {
    fn kdc_list(&self, realm: &str) -> Result<Vec<String>, AuthError> {
        let kdcs = self.kdcs(realm);
        if !kdcs.is_empty() {
            return Ok(kdcs.to_vec());
        }

        match &self.dns {
            Some(dns) if self.dns_lookup_kdc() => dns.kdc_hosts(realm),
            _ => Err(AuthError::RealmResolution(format!(
                "no KDC configured for realm {realm}"
            ))),
        }
    }
}

impl std::fmt::Debug for Krb5Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Krb5Config")
            .field("default_realm", &self.default_realm)
            .field("dns_lookup_kdc", &self.dns_lookup_kdc())
            .field("realms", &self.realms)
            .field("dns_fallback", &self.dns.is_some())
            .finish()
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "true" | "yes" | "on" | "1"
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = r"
# Sample configuration
[libdefaults]
    default_realm = EXAMPLE.COM
    dns_lookup_kdc = false

[realms]
    EXAMPLE.COM = {
        kdc = kdc1.example.com:88
        kdc = kdc2.example.com
        admin_server = kdc1.example.com
        auth_to_local = {
            kdc = not-a-kdc
        }
    }
    EMPTY.ORG = {
        admin_server = admin.empty.org
    }

[domain_realm]
    .example.com = EXAMPLE.COM
";

    struct WildcardDns;

    impl RealmDiscovery for WildcardDns {
        fn kdc_hosts(&self, realm: &str) -> Result<Vec<String>, AuthError> {
            Ok(vec![format!("kdc.{realm}")])
        }

        fn canonical_hostname(&self, name: &str) -> Result<String, AuthError> {
            Ok(name.to_string())
        }
    }

    #[test]
    fn test_parse_sample() {
        let config = Krb5Config::parse(SAMPLE).unwrap();
        assert_eq!(config.default_realm(), Some("EXAMPLE.COM"));
        assert!(!config.dns_lookup_kdc());
        assert_eq!(
            config.kdcs("EXAMPLE.COM"),
            ["kdc1.example.com:88", "kdc2.example.com"]
        );
        assert!(config.kdcs("EMPTY.ORG").is_empty());
    }

    #[test]
    fn test_realm_lookup_ignores_case() {
        let config = Krb5Config::parse(SAMPLE).unwrap();
        assert_eq!(config.kdc_list("example.com").unwrap().len(), 2);
        assert!(matches!(
            config.kdc_list("other.com"),
            Err(AuthError::RealmResolution(_))
        ));
    }

    #[test]
    fn test_dns_fallback_honors_libdefaults() {
        let config = Krb5Config::parse(SAMPLE)
            .unwrap()
            .with_dns_fallback(Arc::new(WildcardDns));
        assert!(config.kdc_list("other.com").is_err());

        let config = Krb5Config::parse("[libdefaults]\n default_realm = A.COM\n")
            .unwrap()
            .with_dns_fallback(Arc::new(WildcardDns));
        assert!(config.dns_lookup_kdc());
        assert_eq!(config.kdc_list("other.com").unwrap(), ["kdc.other.com"]);
    }

    #[test]
    fn test_unbalanced_braces() {
        assert!(Krb5Config::parse("[realms]\n A = {\n kdc = x\n").is_err());
        assert!(Krb5Config::parse("[realms]\n }\n").is_err());
    }

    #[test]
    fn test_malformed_section_header() {
        assert!(Krb5Config::parse("[realms\n").is_err());
    }

    fn write(dir: &tempfile::TempDir, name: &str, text: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_load_first_existing_file_in_list() {
        let dir = tempfile::tempdir().unwrap();
        let valid = write(&dir, "krb5.conf", SAMPLE);
        let missing = dir.path().join("missing.conf");
        let list = std::env::join_paths([&missing, &valid]).unwrap();

        let config =
            Krb5Config::load_first(Some(&list), Path::new("/nonexistent/krb5.conf")).unwrap();
        assert_eq!(config.default_realm(), Some("EXAMPLE.COM"));
    }

    #[test]
    fn test_load_list_does_not_fall_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let default = write(&dir, "default.conf", SAMPLE);
        let list = dir.path().join("missing.conf").into_os_string();

        assert!(Krb5Config::load_first(Some(&list), &default).is_none());
    }

    #[test]
    fn test_load_default_path_without_list() {
        let dir = tempfile::tempdir().unwrap();
        let default = write(&dir, "krb5.conf", SAMPLE);

        let config = Krb5Config::load_first(None, &default).unwrap();
        assert_eq!(config.kdcs("EXAMPLE.COM").len(), 2);

        assert!(Krb5Config::load_first(None, &dir.path().join("absent.conf")).is_none());
    }

    #[test]
    fn test_load_malformed_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let broken = write(&dir, "broken.conf", "[realms]\n EXAMPLE.COM = {\n kdc = kdc1\n");
        let valid = write(&dir, "krb5.conf", SAMPLE);
        let list = std::env::join_paths([&broken, &valid]).unwrap();

        assert!(Krb5Config::load(&broken).is_err());
        assert!(Krb5Config::load_first(Some(&list), &valid).is_none());
    }
}
