use std::net::IpAddr;

use bon::Builder;
use const_oid::ObjectIdentifier;
use der::Tag;
use der::asn1::{Any, SetOfVec};
use time::Duration;
use time::OffsetDateTime;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{RdnSequence, RelativeDistinguishedName};

use super::extensions::ToAndFromX509Extension;
use crate::error::Result;

const OID_COUNTRY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
const OID_PROVINCE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
const OID_LOCALITY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
const OID_ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const OID_ORGANIZATIONAL_UNIT: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");
const OID_COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
const OID_EMAIL_ADDRESS: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.1");

/// Distinguished name of a certificate subject or issuer.
///
/// Purely descriptive: nothing in the trust decision looks at these values,
/// only at the byte equality of the encoded name.
///
/// # Fields
/// * `common_name` - The common name (CN).
/// * `country` - The two letter country code (C).
/// * `province` - The state or province (ST).
/// * `locality` - The locality or city (L).
/// * `organization` - The organization (O).
/// * `organizational_unit` - The organizational unit (OU).
/// * `email` - The PKCS#9 email address attribute.
#[derive(Clone, Debug, Builder, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    pub common_name: String,
    pub country: Option<String>,
    pub province: Option<String>,
    pub locality: Option<String>,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    pub email: Option<String>,
}

impl DistinguishedName {
    /// Encodes the name as an X.509 RDN sequence.
    ///
    /// Attributes are emitted in a fixed order (C, ST, L, O, OU, CN, emailAddress)
    /// and absent attributes are skipped, so equal names always encode to the
    /// same bytes.
    pub fn as_x509_name(&self) -> Result<x509_cert::name::DistinguishedName> {
        let attributes = [
            (OID_COUNTRY, Tag::PrintableString, self.country.as_deref()),
            (OID_PROVINCE, Tag::Utf8String, self.province.as_deref()),
            (OID_LOCALITY, Tag::Utf8String, self.locality.as_deref()),
            (OID_ORGANIZATION, Tag::Utf8String, self.organization.as_deref()),
            (
                OID_ORGANIZATIONAL_UNIT,
                Tag::Utf8String,
                self.organizational_unit.as_deref(),
            ),
            (OID_COMMON_NAME, Tag::Utf8String, Some(self.common_name.as_str())),
            (OID_EMAIL_ADDRESS, Tag::Ia5String, self.email.as_deref()),
        ];

        let mut rdns = Vec::new();
        for (oid, tag, value) in attributes {
            let Some(value) = value else { continue };
            let atv = AttributeTypeAndValue {
                oid,
                value: Any::new(tag, value.as_bytes())?,
            };
            rdns.push(RelativeDistinguishedName(SetOfVec::try_from(vec![atv])?));
        }
        Ok(RdnSequence(rdns))
    }

    /// Reads a name back out of an X.509 RDN sequence.
    ///
    /// Unknown attributes are ignored; string values that are not valid UTF-8
    /// are skipped.
    pub fn from_x509_name(x509dn: &x509_cert::name::DistinguishedName) -> Self {
        let mut dn = DistinguishedName::default();
        for rdn in x509dn.0.iter() {
            for attr in rdn.0.iter() {
                let Ok(value) = std::str::from_utf8(attr.value.value()) else {
                    continue;
                };
                let value = value.to_string();
                match attr.oid {
                    OID_COMMON_NAME => dn.common_name = value,
                    OID_COUNTRY => dn.country = Some(value),
                    OID_PROVINCE => dn.province = Some(value),
                    OID_LOCALITY => dn.locality = Some(value),
                    OID_ORGANIZATION => dn.organization = Some(value),
                    OID_ORGANIZATIONAL_UNIT => dn.organizational_unit = Some(value),
                    OID_EMAIL_ADDRESS => dn.email = Some(value),
                    _ => {}
                }
            }
        }
        dn
    }
}

/// Certificate validity period.
///
/// # Fields
/// * `not_before` - The start of the validity period.
/// * `not_after` - The end of the validity period.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

/// How far `not_before` is backdated so peers with a slow clock accept a
/// freshly issued certificate.
pub const CLOCK_SKEW: Duration = Duration::minutes(5);

impl Validity {
    /// Creates a validity period for the given number of days, starting
    /// [`CLOCK_SKEW`] before now.
    pub fn for_days(days: i64) -> Self {
        Self::starting_at(OffsetDateTime::now_utc() - CLOCK_SKEW, days)
    }

    /// Creates a validity period starting at `not_before` for the given number of days.
    pub fn starting_at(not_before: OffsetDateTime, days: i64) -> Self {
        Self {
            not_before,
            not_after: not_before + Duration::days(days),
        }
    }

    /// Whether `at` falls inside the window, bounds included.
    pub fn contains(&self, at: OffsetDateTime) -> bool {
        self.not_before <= at && at <= self.not_after
    }
}

/// One entry of the subject alternative name extension.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SubjectAltNameEntry {
    Dns(String),
    Ip(IpAddr),
}

impl SubjectAltNameEntry {
    /// Classifies `host` as an IP address when it parses as one, DNS otherwise.
    ///
    /// DNS names come back in canonical form, see [`Self::canonical`].
    pub fn for_host(host: &str) -> Self {
        match host.parse::<IpAddr>() {
            Ok(ip) => SubjectAltNameEntry::Ip(ip),
            Err(_) => SubjectAltNameEntry::Dns(host.to_string()).canonical(),
        }
    }

    /// DNS names lowercased and without a trailing dot; two entries naming the
    /// same host have equal canonical forms.
    pub fn canonical(&self) -> Self {
        match self {
            SubjectAltNameEntry::Dns(name) => {
                SubjectAltNameEntry::Dns(name.trim_end_matches('.').to_ascii_lowercase())
            }
            SubjectAltNameEntry::Ip(ip) => SubjectAltNameEntry::Ip(*ip),
        }
    }
}

impl std::fmt::Display for SubjectAltNameEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubjectAltNameEntry::Dns(name) => write!(f, "DNS:{name}"),
            SubjectAltNameEntry::Ip(ip) => write!(f, "IP:{ip}"),
        }
    }
}

/// Represents an X.509 extension ready for embedding in a certificate.
///
/// # Fields
/// * `oid` - The object identifier of the extension.
/// * `critical` - Indicates if the extension is critical.
/// * `value` - The DER-encoded value of the extension.
#[derive(Clone, Debug)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Creates an `ExtensionParam` from a specific extension.
    pub fn from_extension<E: ToAndFromX509Extension>(extension: &E, critical: bool) -> Result<Self> {
        Ok(Self {
            oid: E::OID,
            critical,
            value: extension.to_x509_extension_value()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use der::Encode;

    use super::*;

    fn sample() -> DistinguishedName {
        DistinguishedName::builder()
            .common_name("ca_company".to_string())
            .country("CN".to_string())
            .province("beijing".to_string())
            .locality("beijing".to_string())
            .organization("Easy".to_string())
            .organizational_unit("Easy".to_string())
            .email("ca_email@qq.com".to_string())
            .build()
    }

    #[test]
    fn test_name_encoding_is_deterministic() {
        let first = sample().as_x509_name().unwrap().to_der().unwrap();
        let second = sample().as_x509_name().unwrap().to_der().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_name_round_trip() {
        let name = sample().as_x509_name().unwrap();
        assert_eq!(name.0.len(), 7);
        assert_eq!(DistinguishedName::from_x509_name(&name), sample());
    }

    #[test]
    fn test_absent_attributes_are_skipped() {
        let dn = DistinguishedName::builder()
            .common_name("only-cn".to_string())
            .build();
        let name = dn.as_x509_name().unwrap();
        assert_eq!(name.0.len(), 1);
    }

    #[test]
    fn test_san_entry_for_host() {
        assert_eq!(
            SubjectAltNameEntry::for_host("127.0.0.1"),
            SubjectAltNameEntry::Ip("127.0.0.1".parse().unwrap())
        );
        assert_eq!(
            SubjectAltNameEntry::for_host("localhost"),
            SubjectAltNameEntry::Dns("localhost".to_string())
        );
        assert_eq!(
            SubjectAltNameEntry::for_host("MyServer.COM."),
            SubjectAltNameEntry::Dns("myserver.com".to_string())
        );
    }

    #[test]
    fn test_validity_starts_before_now() {
        let before = OffsetDateTime::now_utc();
        let validity = Validity::for_days(1);
        assert!(validity.not_before <= before - CLOCK_SKEW + Duration::seconds(1));
        assert!(validity.contains(before));
        assert_eq!(validity.not_after - validity.not_before, Duration::days(1));
    }
}
