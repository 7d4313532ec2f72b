use std::time::SystemTime;

use der::Encode;
use der::asn1::{GeneralizedTime, OctetString, UtcTime};
use x509_cert::Version;
use x509_cert::certificate::TbsCertificateInner;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::cert::SignatureAlgorithm;
use crate::cert::params::{DistinguishedName, ExtensionParam, Validity};
use crate::error::{PkiError, Result};

/// Represents the "To Be Signed" (TBS) portion of an X.509 certificate.
///
/// # Fields
/// * `serial_number` - Minimal positive big-endian serial bytes.
/// * `signature_algorithm` - The algorithm used to sign the certificate.
/// * `issuer` - The already encoded issuer name.
/// * `validity` - The certificate's validity period.
/// * `subject` - The distinguished name of the certificate subject.
/// * `subject_public_key` - The public key of the certificate subject.
/// * `extensions` - Additional X.509 extensions for the certificate.
pub struct TbsCertificate {
    pub serial_number: Vec<u8>,
    pub signature_algorithm: SignatureAlgorithm,
    /// Kept in encoded form so a leaf's issuer is byte-identical to the CA subject.
    pub issuer: Name,
    pub validity: Validity,
    pub subject: DistinguishedName,
    pub subject_public_key: SubjectPublicKeyInfoOwned,
    pub extensions: Vec<ExtensionParam>,
}

impl TbsCertificate {
    /// Converts the `TbsCertificate` into a `TbsCertificateInner` for DER encoding.
    pub fn to_tbs_certificate_inner(&self) -> Result<TbsCertificateInner> {
        let algorithm_id: x509_cert::spki::AlgorithmIdentifierOwned =
            self.signature_algorithm.into();

        let extensions = self
            .extensions
            .iter()
            .map(|ext| {
                Ok(x509_cert::ext::Extension {
                    extn_id: ext.oid,
                    critical: ext.critical,
                    extn_value: OctetString::new(ext.value.clone())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let validity = x509_cert::time::Validity {
            not_before: encode_time(self.validity.not_before.into())?,
            not_after: encode_time(self.validity.not_after.into())?,
        };

        let serial_number = SerialNumber::new(self.serial_number.as_slice())
            .map_err(|e| PkiError::IssuanceError(format!("invalid serial number: {e}")))?;

        Ok(TbsCertificateInner {
            version: Version::V3,
            serial_number,
            signature: algorithm_id,
            issuer: self.issuer.clone(),
            validity,
            subject: self.subject.as_x509_name()?,
            subject_public_key_info: self.subject_public_key.clone(),
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: Some(extensions),
        })
    }

    /// Encodes the `TbsCertificate` into DER format.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.to_tbs_certificate_inner()?.to_der()?)
    }
}

/// Encodes a minimal positive DER integer body for `serial`.
pub fn serial_bytes(serial: u64) -> Vec<u8> {
    let bytes = serial.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    let mut out = bytes[first..].to_vec();
    if out[0] & 0x80 != 0 {
        out.insert(0, 0);
    }
    out
}

// RFC 5280 4.1.2.5: UTCTime through 2049, GeneralizedTime from 2050 on.
fn encode_time(t: SystemTime) -> Result<x509_cert::time::Time> {
    match UtcTime::from_system_time(t) {
        Ok(utc) => Ok(x509_cert::time::Time::UtcTime(utc)),
        Err(_) => Ok(x509_cert::time::Time::GeneralTime(
            GeneralizedTime::from_system_time(t)?,
        )),
    }
}
