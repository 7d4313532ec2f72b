//! Certificate templates per role and the rules that make them validate.
//!
//! A template is plain data. [`CertificateTemplate::validate`] enforces the
//! rules under which the issued chain will pass standard TLS verification:
//!
//! - the CA carries `keyCertSign` and an extended key usage of exactly
//!   `anyExtendedKeyUsage`. Chain validation requires every certificate in the
//!   chain to permit the usage being checked, so a CA restricted to
//!   `serverAuth` breaks client certificate validation.
//! - the server carries `serverAuth` and a non-empty SAN list that includes
//!   every host name it is dialed as.
//! - the client carries `clientAuth`.

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use bon::Builder;
use regex::Regex;
use tracing::warn;

use crate::cert::extensions::{ExtendedKeyUsageOption, FlagSet, KeyUsages};
use crate::cert::params::{DistinguishedName, SubjectAltNameEntry, Validity};
use crate::error::{PkiError, Result};

/// Validity of every default template: a test fixture PKI, not a production lifecycle.
pub const DEFAULT_VALIDITY_DAYS: i64 = 100 * 365;

static HOST_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$").expect("static regex")
});

/// The role a certificate plays in the PKI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Ca,
    Server,
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Ca => f.write_str("CA"),
            Role::Server => f.write_str("server"),
            Role::Client => f.write_str("client"),
        }
    }
}

/// Declarative description of a certificate to be issued.
#[derive(Clone, Debug, Builder)]
pub struct CertificateTemplate {
    pub role: Role,
    pub subject: DistinguishedName,
    pub validity: Validity,
    pub key_usage: FlagSet<KeyUsages>,
    pub extended_key_usage: Vec<ExtendedKeyUsageOption>,
    #[builder(default)]
    pub is_ca: bool,
    #[builder(default)]
    pub subject_alt_names: Vec<SubjectAltNameEntry>,
    /// Explicit serial; when absent the issuer allocates one.
    pub serial_number: Option<u64>,
}

impl CertificateTemplate {
    /// Default root CA template, valid from now.
    pub fn ca() -> Self {
        CertificateTemplate::builder()
            .role(Role::Ca)
            .subject(default_subject("ca_company", "ca_email@qq.com"))
            .validity(Validity::for_days(DEFAULT_VALIDITY_DAYS))
            .key_usage(
                KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment | KeyUsages::KeyCertSign,
            )
            .extended_key_usage(vec![ExtendedKeyUsageOption::Any])
            .is_ca(true)
            .build()
    }

    /// Default TLS server template, reachable as `myserver.com` and `127.0.0.1`.
    pub fn server() -> Self {
        CertificateTemplate::builder()
            .role(Role::Server)
            .subject(default_subject("ser_company", "ser_email@qq.com"))
            .validity(Validity::for_days(DEFAULT_VALIDITY_DAYS))
            .key_usage(KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment)
            .extended_key_usage(vec![ExtendedKeyUsageOption::ServerAuth])
            .subject_alt_names(vec![
                SubjectAltNameEntry::Dns("myserver.com".to_string()),
                SubjectAltNameEntry::Ip([127, 0, 0, 1].into()),
            ])
            .build()
    }

    /// Default TLS client template.
    pub fn client() -> Self {
        CertificateTemplate::builder()
            .role(Role::Client)
            .subject(default_subject("client_company", "cli_email@qq.com"))
            .validity(Validity::for_days(DEFAULT_VALIDITY_DAYS))
            .key_usage(KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment)
            .extended_key_usage(vec![ExtendedKeyUsageOption::ClientAuth])
            .build()
    }

    /// Returns a copy whose SAN list also contains `host`.
    ///
    /// IP literals become IP entries, everything else a DNS entry. Existing
    /// entries are kept; adding a name already present is a no-op. DNS names
    /// compare case-insensitively and ignore a trailing dot.
    pub fn with_host(&self, host: &str) -> Self {
        let mut template = self.clone();
        let entry = SubjectAltNameEntry::for_host(host);
        let present = template
            .subject_alt_names
            .iter()
            .any(|existing| existing.canonical() == entry);
        if !present {
            template.subject_alt_names.push(entry);
        }
        template
    }

    /// Checks the template against the rules for its role.
    pub fn validate(&self) -> Result<()> {
        let role = self.role;
        let fail = |msg: String| Err(PkiError::PolicyError(format!("{role} template: {msg}")));

        if self.subject.common_name.trim().is_empty() {
            return fail("common name is empty".to_string());
        }
        if let Some(country) = &self.subject.country {
            if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
                return fail(format!("country `{country}` is not a two letter code"));
            }
        }
        if let Some(email) = &self.subject.email {
            if !email.is_ascii() {
                return fail(format!("email `{email}` is not ASCII"));
            }
        }
        if self.validity.not_after <= self.validity.not_before {
            return fail("validity window ends before it starts".to_string());
        }
        if self.key_usage.is_empty() {
            return fail("key usage is empty".to_string());
        }
        if self.extended_key_usage.is_empty() {
            return fail("extended key usage is empty".to_string());
        }

        let mut seen = HashSet::new();
        for entry in &self.subject_alt_names {
            if !seen.insert(entry.canonical()) {
                return fail(format!("duplicate subject alternative name {entry}"));
            }
            if let SubjectAltNameEntry::Dns(name) = entry {
                if !is_valid_dns_name(name) {
                    return fail(format!("`{name}` is not a valid DNS name"));
                }
            }
        }

        match role {
            Role::Ca => {
                if !self.is_ca {
                    return fail("is_ca must be set".to_string());
                }
                if !self.key_usage.contains(KeyUsages::KeyCertSign) {
                    return fail("key usage must include keyCertSign".to_string());
                }
                if self.extended_key_usage != [ExtendedKeyUsageOption::Any] {
                    return fail(format!(
                        "extended key usage must be exactly [Any] so both server and client chains validate, got {:?}",
                        self.extended_key_usage
                    ));
                }
            }
            Role::Server | Role::Client => {
                let expected = if role == Role::Server {
                    ExtendedKeyUsageOption::ServerAuth
                } else {
                    ExtendedKeyUsageOption::ClientAuth
                };
                if self.is_ca {
                    return fail("a leaf certificate must not be a CA".to_string());
                }
                if self.key_usage.contains(KeyUsages::KeyCertSign) {
                    return fail("keyCertSign is reserved for CA certificates".to_string());
                }
                if !self.key_usage.contains(KeyUsages::DigitalSignature) {
                    return fail("key usage must include digitalSignature".to_string());
                }
                if self.extended_key_usage != [expected] {
                    return fail(format!(
                        "extended key usage must be exactly [{expected:?}], got {:?}",
                        self.extended_key_usage
                    ));
                }
                if role == Role::Server && self.subject_alt_names.is_empty() {
                    return fail("at least one subject alternative name is required".to_string());
                }
            }
        }
        Ok(())
    }
}

/// Templates for the three roles of one bootstrap run.
#[derive(Clone, Debug)]
pub struct PolicySet {
    pub ca: CertificateTemplate,
    pub server: CertificateTemplate,
    pub client: CertificateTemplate,
}

impl Default for PolicySet {
    fn default() -> Self {
        PolicySet {
            ca: CertificateTemplate::ca(),
            server: CertificateTemplate::server(),
            client: CertificateTemplate::client(),
        }
    }
}

impl PolicySet {
    /// Adds `host` to the server SAN list when it is a valid name.
    ///
    /// Best effort: an invalid host is logged and ignored.
    pub fn with_server_host(mut self, host: &str) -> Self {
        let host = host.trim();
        let is_ip = host.parse::<std::net::IpAddr>().is_ok();
        if !is_ip && !is_valid_dns_name(host) {
            warn!(host, "ignoring invalid server host name");
            return self;
        }
        self.server = self.server.with_host(host);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.ca.validate()?;
        self.server.validate()?;
        self.client.validate()
    }
}

/// Host name syntax check, allowing a single leading `*.` wildcard label.
pub fn is_valid_dns_name(name: &str) -> bool {
    let name = name.strip_suffix('.').unwrap_or(name);
    let name = name.strip_prefix("*.").unwrap_or(name);
    if name.is_empty() || name.len() > 253 {
        return false;
    }
    name.split('.').all(|label| HOST_LABEL.is_match(label))
}

fn default_subject(common_name: &str, email: &str) -> DistinguishedName {
    DistinguishedName::builder()
        .common_name(common_name.to_string())
        .country("CN".to_string())
        .province("beijing".to_string())
        .locality("beijing".to_string())
        .organization("Easy".to_string())
        .organizational_unit("Easy".to_string())
        .email(email.to_string())
        .build()
}
