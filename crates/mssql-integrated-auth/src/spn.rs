//! Service principal name construction.
//!
//! SQL Server registers its Kerberos service principal as
//! `MSSQLSvc/<fqdn>:<port>`, optionally qualified with `@REALM`. When the
//! connection requests ASCII-Compatible Encoding of server names, every
//! non-ASCII host label is converted with IDNA before it reaches the
//! Kerberos library.

use std::fmt;

use crate::error::AuthError;

/// Service class used by SQL Server for its SPNs.
pub const SERVICE_CLASS: &str = "MSSQLSvc";

/// A Kerberos service principal name (`service/host[:port][@REALM]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServicePrincipalName(String);

impl ServicePrincipalName {
    /// Build the SPN for a SQL Server instance listening on `host:port`.
    ///
    /// With `ace` set, the host name is converted to its ASCII-Compatible
    /// Encoding first; otherwise it is used verbatim.
    ///
    /// # Example
    ///
    /// ```rust
    /// use mssql_integrated_auth::ServicePrincipalName;
    ///
    /// let spn = ServicePrincipalName::build("MyServer", 1433, false).unwrap();
    /// assert_eq!(spn.as_str(), "MSSQLSvc/MyServer:1433");
    /// ```
    pub fn build(host: &str, port: u16, ace: bool) -> Result<Self, AuthError> {
        tracing::debug!(server = host, port, "building SPN");

        let host = if ace { to_ace(host)? } else { host.to_string() };
        let spn = Self(format!("{SERVICE_CLASS}/{host}:{port}"));

        tracing::debug!(spn = %spn, "built SPN");
        Ok(spn)
    }

    /// Normalize an SPN supplied through the connection configuration.
    ///
    /// With `ace` set, the host part following the first `/` is converted to
    /// its ASCII-Compatible Encoding; the service class, port or instance and
    /// realm are kept as written. Without `ace` the input is returned as is.
    ///
    /// An SPN without any `/` is treated as a bare host name and encoded
    /// as a whole.
    pub fn normalize_user_supplied(spn: &str, ace: bool) -> Result<Self, AuthError> {
        if !ace {
            return Ok(Self(spn.to_string()));
        }

        let (service, rest) = match spn.split_once('/') {
            Some((service, rest)) => (Some(service), rest),
            None => {
                tracing::debug!(spn, "user supplied SPN has no service class");
                (None, spn)
            }
        };

        let host_end = rest.find([':', '@']).unwrap_or(rest.len());
        let (host, suffix) = rest.split_at(host_end);
        let host = to_ace(host)?;

        Ok(Self(match service {
            Some(service) => format!("{service}/{host}{suffix}"),
            None => format!("{host}{suffix}"),
        }))
    }

    pub(crate) fn from_string(spn: String) -> Self {
        Self(spn)
    }

    /// Get the SPN as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the realm the SPN is qualified with, if any.
    #[must_use]
    pub fn realm(&self) -> Option<&str> {
        self.0
            .rsplit_once('@')
            .map(|(_, realm)| realm)
            .filter(|realm| !realm.is_empty())
    }

    /// Consume the SPN and return the underlying string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ServicePrincipalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ServicePrincipalName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<ServicePrincipalName> for String {
    fn from(spn: ServicePrincipalName) -> Self {
        spn.0
    }
}

/// Convert a host name to its ASCII-Compatible Encoding.
///
/// ASCII labels are kept verbatim (including their case); only labels with
/// non-ASCII characters are IDNA-encoded.
pub(crate) fn to_ace(host: &str) -> Result<String, AuthError> {
    if host.is_ascii() {
        return Ok(host.to_string());
    }

    let labels = host
        .split('.')
        .map(|label| {
            if label.is_ascii() {
                Ok(label.to_string())
            } else {
                idna::domain_to_ascii(label).map_err(|e| {
                    AuthError::Configuration(format!(
                        "server name label {label:?} cannot be converted to ASCII: {e:?}"
                    ))
                })
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(labels.join("."))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_build_verbatim() {
        let spn = ServicePrincipalName::build("MyServer", 1433, false).unwrap();
        assert_eq!(spn.as_str(), "MSSQLSvc/MyServer:1433");
        assert_eq!(spn.realm(), None);
    }

    #[test]
    fn test_build_ace_ascii_host_unchanged() {
        let spn = ServicePrincipalName::build("db1.Example.com", 1433, true).unwrap();
        assert_eq!(spn.as_str(), "MSSQLSvc/db1.Example.com:1433");
    }

    #[test]
    fn test_build_ace_converts_unicode_labels() {
        let spn = ServicePrincipalName::build("bücher.example.com", 1433, true).unwrap();
        assert_eq!(spn.as_str(), "MSSQLSvc/xn--bcher-kva.example.com:1433");
    }

    #[test]
    fn test_build_ace_numeric_label_stays_a_label() {
        let spn = ServicePrincipalName::build("１２３.example.com", 1433, true).unwrap();
        assert_eq!(spn.as_str(), "MSSQLSvc/123.example.com:1433");

        let spn = ServicePrincipalName::build("db.１０", 1433, true).unwrap();
        assert_eq!(spn.as_str(), "MSSQLSvc/db.10:1433");
    }

    #[test]
    fn test_build_without_ace_keeps_unicode() {
        let spn = ServicePrincipalName::build("bücher.example.com", 1433, false).unwrap();
        assert_eq!(spn.as_str(), "MSSQLSvc/bücher.example.com:1433");
    }

    #[test]
    fn test_normalize_without_ace_is_identity() {
        let spn = ServicePrincipalName::normalize_user_supplied("anything goes", false).unwrap();
        assert_eq!(spn.as_str(), "anything goes");
    }

    #[test]
    fn test_normalize_ace_encodes_host_only() {
        let spn = ServicePrincipalName::normalize_user_supplied(
            "MSSQLSvc/bücher.example.com:1433@EXAMPLE.COM",
            true,
        )
        .unwrap();
        assert_eq!(
            spn.as_str(),
            "MSSQLSvc/xn--bcher-kva.example.com:1433@EXAMPLE.COM"
        );
        assert_eq!(spn.realm(), Some("EXAMPLE.COM"));
    }

    #[test]
    fn test_normalize_ace_without_slash() {
        let spn = ServicePrincipalName::normalize_user_supplied("bücher.example.com", true).unwrap();
        assert_eq!(spn.as_str(), "xn--bcher-kva.example.com");
    }

    #[test]
    fn test_display_and_into_string() {
        let spn = ServicePrincipalName::build("host", 1, false).unwrap();
        assert_eq!(spn.to_string(), "MSSQLSvc/host:1");
        assert_eq!(spn.into_string(), "MSSQLSvc/host:1");
    }
}
