pub mod extensions;
pub mod params;

use der::{Decode, Encode, EncodePem};
use extensions::{
    BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAltName, ToAndFromX509Extension,
};
use params::{DistinguishedName, SubjectAltNameEntry, Validity};
use rsa::RsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use time::OffsetDateTime;
use x509_cert::certificate::CertificateInner;

use crate::error::{PkiError, Result};

/// Represents the supported signature algorithms for certificates.
///
/// Only RSA keys are issued, so a single algorithm is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// SHA-256 with RSA encryption (PKCS#1 v1.5).
    Sha256WithRSA,
}

impl SignatureAlgorithm {
    /// Looks up the algorithm from its identifier OID.
    pub fn from_oid(oid: &const_oid::ObjectIdentifier) -> Option<Self> {
        match *oid {
            const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION => Some(Self::Sha256WithRSA),
            _ => None,
        }
    }
}

impl From<SignatureAlgorithm> for x509_cert::spki::AlgorithmIdentifierOwned {
    /// Converts a `SignatureAlgorithm` into an `AlgorithmIdentifierOwned`.
    ///
    /// RSA algorithm identifiers carry an explicit NULL parameter.
    fn from(value: SignatureAlgorithm) -> Self {
        match value {
            SignatureAlgorithm::Sha256WithRSA => x509_cert::spki::AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
                parameters: Some(der::asn1::Any::from(der::asn1::AnyRef::NULL)),
            },
        }
    }
}

/// Represents a signed X.509 certificate.
///
/// Certificates are never modified after signing; reissuing always produces a
/// new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// The inner representation of the certificate.
    pub inner: CertificateInner,
}

impl Certificate {
    /// Parses a DER-encoded certificate.
    pub fn from_der(der_bytes: &[u8]) -> Result<Self> {
        let inner = CertificateInner::from_der(der_bytes)?;
        Ok(Certificate { inner })
    }

    /// Encodes the certificate into DER format.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| PkiError::EncodingError(e.to_string()))
    }

    /// Encodes the certificate into PEM format with LF line endings.
    pub fn to_pem(&self) -> Result<String> {
        self.inner
            .to_pem(pkcs8::LineEnding::LF)
            .map_err(|e| PkiError::EncodingError(e.to_string()))
    }

    pub fn subject(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(&self.inner.tbs_certificate.subject)
    }

    pub fn issuer(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(&self.inner.tbs_certificate.issuer)
    }

    /// DER encoding of the subject name, for exact issuer matching.
    pub fn subject_der(&self) -> Result<Vec<u8>> {
        Ok(self.inner.tbs_certificate.subject.to_der()?)
    }

    /// DER encoding of the issuer name, for exact issuer matching.
    pub fn issuer_der(&self) -> Result<Vec<u8>> {
        Ok(self.inner.tbs_certificate.issuer.to_der()?)
    }

    /// Big-endian serial number bytes.
    pub fn serial_number(&self) -> &[u8] {
        self.inner.tbs_certificate.serial_number.as_bytes()
    }

    pub fn validity(&self) -> Validity {
        let validity = &self.inner.tbs_certificate.validity;
        Validity {
            not_before: time_to_offset(&validity.not_before),
            not_after: time_to_offset(&validity.not_after),
        }
    }

    /// The RSA public key bound into the certificate.
    pub fn public_key(&self) -> Result<RsaPublicKey> {
        let spki_der = self.inner.tbs_certificate.subject_public_key_info.to_der()?;
        RsaPublicKey::from_public_key_der(&spki_der)
            .map_err(|e| PkiError::DecodeError(format!("unsupported public key: {e}")))
    }

    /// Decodes the extension `E` if the certificate carries it.
    pub fn extension<E: ToAndFromX509Extension>(&self) -> Result<Option<E>> {
        let Some(extensions) = self.inner.tbs_certificate.extensions.as_ref() else {
            return Ok(None);
        };
        extensions
            .iter()
            .find(|ext| ext.extn_id == E::OID)
            .map(|ext| E::from_x509_extension_value(ext.extn_value.as_bytes()))
            .transpose()
    }

    /// Whether the basic constraints extension marks this certificate as a CA.
    pub fn is_ca(&self) -> Result<bool> {
        Ok(self
            .extension::<BasicConstraints>()?
            .map(|bc| bc.is_ca)
            .unwrap_or(false))
    }

    pub fn key_usage(&self) -> Result<Option<KeyUsage>> {
        self.extension::<KeyUsage>()
    }

    pub fn extended_key_usage(&self) -> Result<Option<ExtendedKeyUsage>> {
        self.extension::<ExtendedKeyUsage>()
    }

    /// DNS and IP entries of the subject alternative name extension.
    pub fn subject_alt_names(&self) -> Result<Vec<SubjectAltNameEntry>> {
        Ok(self
            .extension::<SubjectAltName>()?
            .map(|san| san.names)
            .unwrap_or_default())
    }
}

fn time_to_offset(t: &x509_cert::time::Time) -> OffsetDateTime {
    match t {
        x509_cert::time::Time::UtcTime(ut) => OffsetDateTime::from(ut.to_system_time()),
        x509_cert::time::Time::GeneralTime(gt) => OffsetDateTime::from(gt.to_system_time()),
    }
}
