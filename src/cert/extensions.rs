use std::net::IpAddr;

use const_oid::AssociatedOid;
use const_oid::db::rfc5912::{ID_KP_CLIENT_AUTH, ID_KP_SERVER_AUTH};
use der::{
    Decode, Encode,
    asn1::{Ia5String, OctetString},
    oid::ObjectIdentifier,
};
use x509_cert::ext::pkix::name::GeneralName;

use super::params::SubjectAltNameEntry;
use crate::error::PkiError;

/// OID of `anyExtendedKeyUsage` (RFC 5280, 4.2.1.12).
pub const ANY_EXTENDED_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.37.0");

/// An extension value that can be written into and read back from the
/// `extnValue` octets of a certificate.
///
/// ```
/// use minipki::cert::extensions::{SubjectAltName, ToAndFromX509Extension};
/// use minipki::cert::params::SubjectAltNameEntry;
///
/// let san = SubjectAltName {
///     names: vec![SubjectAltNameEntry::for_host("127.0.0.1")],
/// };
/// let value = san.to_x509_extension_value().unwrap();
/// let back = SubjectAltName::from_x509_extension_value(&value).unwrap();
/// assert_eq!(back.names, san.names);
/// ```
pub trait ToAndFromX509Extension {
    /// Extension identifier written next to the value.
    const OID: ObjectIdentifier;

    /// DER encoding of the extension value.
    fn to_x509_extension_value(&self) -> Result<Vec<u8>, PkiError>;

    /// Parses a DER extension value.
    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, PkiError>
    where
        Self: Sized;
}

/// The DNS names and IP addresses a server certificate is valid for.
#[derive(Debug, Clone, Default)]
pub struct SubjectAltName {
    pub names: Vec<SubjectAltNameEntry>,
}

impl ToAndFromX509Extension for SubjectAltName {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::SubjectAltName::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, PkiError> {
        let general_names = self
            .names
            .iter()
            .map(general_name)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(x509_cert::ext::pkix::SubjectAltName(general_names).to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, PkiError> {
        let general_names = x509_cert::ext::pkix::SubjectAltName::from_der(extension)?.0;
        let mut names = Vec::with_capacity(general_names.len());
        for name in &general_names {
            match name {
                GeneralName::DnsName(dns) => names.push(SubjectAltNameEntry::Dns(dns.to_string())),
                GeneralName::IpAddress(octets) => names.push(ip_from_octets(octets.as_bytes())?),
                // email, URI and directory names carry no host identity
                _ => {}
            }
        }
        Ok(Self { names })
    }
}

fn general_name(entry: &SubjectAltNameEntry) -> Result<GeneralName, PkiError> {
    match entry {
        SubjectAltNameEntry::Dns(dns) => Ok(GeneralName::DnsName(Ia5String::new(dns)?)),
        SubjectAltNameEntry::Ip(IpAddr::V4(v4)) => {
            Ok(GeneralName::IpAddress(OctetString::new(v4.octets().to_vec())?))
        }
        SubjectAltNameEntry::Ip(IpAddr::V6(v6)) => {
            Ok(GeneralName::IpAddress(OctetString::new(v6.octets().to_vec())?))
        }
    }
}

fn ip_from_octets(octets: &[u8]) -> Result<SubjectAltNameEntry, PkiError> {
    if let Ok(v4) = <[u8; 4]>::try_from(octets) {
        return Ok(SubjectAltNameEntry::Ip(IpAddr::from(v4)));
    }
    if let Ok(v6) = <[u8; 16]>::try_from(octets) {
        return Ok(SubjectAltNameEntry::Ip(IpAddr::from(v6)));
    }
    Err(PkiError::DecodeError(format!(
        "IP address SAN has invalid length {}",
        octets.len()
    )))
}

/// Basic constraints. Roots are issued with `max_path_length` 0, so they
/// can only sign leaves.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicConstraints {
    pub is_ca: bool,
    pub max_path_length: Option<u8>,
}

impl ToAndFromX509Extension for BasicConstraints {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::BasicConstraints::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, PkiError> {
        let constraints = x509_cert::ext::pkix::BasicConstraints {
            ca: self.is_ca,
            path_len_constraint: self.max_path_length,
        };
        Ok(constraints.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, PkiError> {
        let constraints = x509_cert::ext::pkix::BasicConstraints::from_der(extension)?;
        Ok(Self {
            is_ca: constraints.ca,
            max_path_length: constraints.path_len_constraint,
        })
    }
}

pub use der::flagset::FlagSet;
use x509_cert::ext::pkix::KeyUsage as X509KeyUsage;
pub use x509_cert::ext::pkix::KeyUsages;

/// Key usage bits. Only CAs carry `KeyCertSign`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyUsage(pub FlagSet<KeyUsages>);

impl KeyUsage {
    pub fn contains(&self, usage: KeyUsages) -> bool {
        self.0.contains(usage)
    }
}

impl ToAndFromX509Extension for KeyUsage {
    const OID: ObjectIdentifier = <X509KeyUsage as AssociatedOid>::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, PkiError> {
        Ok(X509KeyUsage::from(self.0).to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, PkiError> {
        Ok(Self(X509KeyUsage::from_der(extension)?.0))
    }
}

/// Extended key usage: the purposes a certificate's key may serve.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtendedKeyUsage {
    pub usage: Vec<ExtendedKeyUsageOption>,
}

impl ExtendedKeyUsage {
    /// Whether a key restricted by this extension may be used for `usage`.
    ///
    /// `Any` permits every purpose.
    pub fn permits(&self, usage: ExtendedKeyUsageOption) -> bool {
        self.usage
            .iter()
            .any(|u| *u == usage || *u == ExtendedKeyUsageOption::Any)
    }
}

impl ToAndFromX509Extension for ExtendedKeyUsage {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::ExtendedKeyUsage::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, PkiError> {
        let purposes = self
            .usage
            .iter()
            .copied()
            .map(ExtendedKeyUsageOption::oid)
            .collect();
        Ok(x509_cert::ext::pkix::ExtendedKeyUsage(purposes).to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, PkiError> {
        let purposes = x509_cert::ext::pkix::ExtendedKeyUsage::from_der(extension)?;
        Ok(Self {
            usage: purposes
                .0
                .into_iter()
                .map(ExtendedKeyUsageOption::from_oid)
                .collect(),
        })
    }
}

/// A key purpose listed in the extended key usage extension.
///
/// Purposes this crate never issues are kept as [`ExtendedKeyUsageOption::Other`]
/// so that foreign certificates still decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtendedKeyUsageOption {
    ServerAuth,
    ClientAuth,
    Any,
    Other(ObjectIdentifier),
}

impl ExtendedKeyUsageOption {
    pub fn oid(self) -> ObjectIdentifier {
        match self {
            ExtendedKeyUsageOption::ServerAuth => ID_KP_SERVER_AUTH,
            ExtendedKeyUsageOption::ClientAuth => ID_KP_CLIENT_AUTH,
            ExtendedKeyUsageOption::Any => ANY_EXTENDED_KEY_USAGE,
            ExtendedKeyUsageOption::Other(oid) => oid,
        }
    }

    pub fn from_oid(oid: ObjectIdentifier) -> Self {
        match oid {
            ID_KP_SERVER_AUTH => ExtendedKeyUsageOption::ServerAuth,
            ID_KP_CLIENT_AUTH => ExtendedKeyUsageOption::ClientAuth,
            ANY_EXTENDED_KEY_USAGE => ExtendedKeyUsageOption::Any,
            other => ExtendedKeyUsageOption::Other(other),
        }
    }
}

/// SHA-1 of the subject public key bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectKeyIdentifier(pub Vec<u8>);

impl ToAndFromX509Extension for SubjectKeyIdentifier {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::SubjectKeyIdentifier::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, PkiError> {
        let ski = x509_cert::ext::pkix::SubjectKeyIdentifier(OctetString::new(self.0.as_slice())?);
        Ok(ski.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, PkiError> {
        let ski = x509_cert::ext::pkix::SubjectKeyIdentifier::from_der(extension)?;
        Ok(Self(ski.0.as_bytes().to_vec()))
    }
}

/// Authority key identifier, keyIdentifier form only: the issuer's subject key
/// identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityKeyIdentifier {
    pub key_identifier: Vec<u8>,
}

impl ToAndFromX509Extension for AuthorityKeyIdentifier {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::AuthorityKeyIdentifier::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, PkiError> {
        let aki = x509_cert::ext::pkix::AuthorityKeyIdentifier {
            key_identifier: Some(OctetString::new(self.key_identifier.as_slice())?),
            authority_cert_issuer: None,
            authority_cert_serial_number: None,
        };

        Ok(aki.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, PkiError> {
        let aki = x509_cert::ext::pkix::AuthorityKeyIdentifier::from_der(extension)?;
        Ok(Self {
            key_identifier: aki
                .key_identifier
                .map(|id| id.as_bytes().to_vec())
                .unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_constraints_encoding_decoding() {
        let original = BasicConstraints {
            is_ca: true,
            max_path_length: Some(0),
        };
        let encoded = original.to_x509_extension_value().unwrap();
        let decoded = BasicConstraints::from_x509_extension_value(&encoded).unwrap();
        assert_eq!(original.is_ca, decoded.is_ca);
        assert_eq!(original.max_path_length, decoded.max_path_length);
    }

    #[test]
    fn test_subject_alt_name_keeps_dns_and_ip() {
        let original = SubjectAltName {
            names: vec![
                SubjectAltNameEntry::Dns("myserver.com".to_string()),
                SubjectAltNameEntry::Ip("127.0.0.1".parse().unwrap()),
                SubjectAltNameEntry::Ip("::1".parse().unwrap()),
            ],
        };
        let encoded = original.to_x509_extension_value().unwrap();
        let decoded = SubjectAltName::from_x509_extension_value(&encoded).unwrap();
        assert_eq!(original.names, decoded.names);
    }

    #[test]
    fn test_extended_key_usage_any_permits_everything() {
        let any = ExtendedKeyUsage {
            usage: vec![ExtendedKeyUsageOption::Any],
        };
        assert!(any.permits(ExtendedKeyUsageOption::ServerAuth));
        assert!(any.permits(ExtendedKeyUsageOption::ClientAuth));

        let server_only = ExtendedKeyUsage {
            usage: vec![ExtendedKeyUsageOption::ServerAuth],
        };
        assert!(server_only.permits(ExtendedKeyUsageOption::ServerAuth));
        assert!(!server_only.permits(ExtendedKeyUsageOption::ClientAuth));
    }

    #[test]
    fn test_extended_key_usage_any_oid() {
        let original = ExtendedKeyUsage {
            usage: vec![ExtendedKeyUsageOption::Any],
        };
        let encoded = original.to_x509_extension_value().unwrap();
        let raw = x509_cert::ext::pkix::ExtendedKeyUsage::from_der(&encoded).unwrap();
        assert_eq!(raw.0, vec![ANY_EXTENDED_KEY_USAGE]);
        let decoded = ExtendedKeyUsage::from_x509_extension_value(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_unknown_purpose_is_kept() {
        let code_signing = ExtendedKeyUsageOption::from_oid(
            const_oid::db::rfc5912::ID_KP_CODE_SIGNING,
        );
        assert!(matches!(code_signing, ExtendedKeyUsageOption::Other(_)));

        let eku = ExtendedKeyUsage {
            usage: vec![code_signing, ExtendedKeyUsageOption::ClientAuth],
        };
        let decoded =
            ExtendedKeyUsage::from_x509_extension_value(&eku.to_x509_extension_value().unwrap())
                .unwrap();
        assert_eq!(decoded, eku);
        assert!(!decoded.permits(ExtendedKeyUsageOption::ServerAuth));
    }

    #[test]
    fn test_key_usage_contains() {
        let usage = KeyUsage(KeyUsages::DigitalSignature | KeyUsages::KeyCertSign);
        let decoded =
            KeyUsage::from_x509_extension_value(&usage.to_x509_extension_value().unwrap()).unwrap();
        assert!(decoded.contains(KeyUsages::KeyCertSign));
        assert!(!decoded.contains(KeyUsages::KeyEncipherment));
    }
}
