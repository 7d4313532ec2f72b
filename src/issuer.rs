use der::Encode;
use tracing::debug;
use x509_cert::certificate::CertificateInner;
use x509_cert::name::Name;

use crate::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAltName,
    SubjectKeyIdentifier,
};
use crate::cert::params::ExtensionParam;
use crate::cert::{Certificate, SignatureAlgorithm};
use crate::error::{PkiError, Result};
use crate::key::{KeyPair, KeyPairGenerator};
use crate::policy::CertificateTemplate;
use crate::serial::SerialNumberAllocator;
use crate::tbs_certificate::{TbsCertificate, serial_bytes};
use crate::verify;

/// Represents an entity capable of signing certificates.
pub trait Issuer {
    /// Returns the encoded issuer name written into issued certificates.
    fn issuer_name(&self) -> Result<Name>;

    /// Returns the signing key of the issuer.
    fn signing_key(&self) -> &KeyPair;

    /// Key identifier of the issuer, if it differs from the subject's own.
    fn authority_key_id(&self) -> Result<Option<Vec<u8>>>;

    /// Signs `template` bound to `subject_key` with serial `serial`.
    ///
    /// No policy checks happen here; [`CertificateIssuer`] validates templates
    /// before calling this.
    fn sign(
        &self,
        template: &CertificateTemplate,
        subject_key: &KeyPair,
        serial: u64,
    ) -> Result<Certificate> {
        let signature_algo = SignatureAlgorithm::Sha256WithRSA;

        let basic_constraints = BasicConstraints {
            is_ca: template.is_ca,
            max_path_length: template.is_ca.then_some(0),
        };

        let mut extensions = vec![
            ExtensionParam::from_extension(&basic_constraints, true)?,
            ExtensionParam::from_extension(&KeyUsage(template.key_usage), true)?,
            ExtensionParam::from_extension(
                &ExtendedKeyUsage {
                    usage: template.extended_key_usage.clone(),
                },
                false,
            )?,
            ExtensionParam::from_extension(
                &SubjectKeyIdentifier(subject_key.key_identifier()?),
                false,
            )?,
        ];

        if let Some(key_identifier) = self.authority_key_id()? {
            extensions.push(ExtensionParam::from_extension(
                &AuthorityKeyIdentifier { key_identifier },
                false,
            )?);
        }

        if !template.subject_alt_names.is_empty() {
            extensions.push(ExtensionParam::from_extension(
                &SubjectAltName {
                    names: template.subject_alt_names.clone(),
                },
                false,
            )?);
        }

        let tbs_cert = TbsCertificate {
            serial_number: serial_bytes(serial),
            signature_algorithm: signature_algo,
            issuer: self.issuer_name()?,
            validity: template.validity,
            subject: template.subject.clone(),
            subject_public_key: subject_key.as_spki()?,
            extensions,
        };

        let tbs_cert_inner = tbs_cert.to_tbs_certificate_inner()?;
        let signature = self.signing_key().sign_data(&tbs_cert_inner.to_der()?)?;

        let cert_inner = CertificateInner {
            tbs_certificate: tbs_cert_inner,
            signature_algorithm: signature_algo.into(),
            signature: der::asn1::BitString::from_bytes(&signature)?,
        };

        Ok(Certificate { inner: cert_inner })
    }
}

/// Issuer for a root certificate: the subject signs itself.
pub struct SelfIssuer<'a> {
    pub template: &'a CertificateTemplate,
    pub key: &'a KeyPair,
}

impl Issuer for SelfIssuer<'_> {
    fn issuer_name(&self) -> Result<Name> {
        self.template.subject.as_x509_name()
    }

    fn signing_key(&self) -> &KeyPair {
        self.key
    }

    fn authority_key_id(&self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// A CA ready to sign leaves: its template, certificate and private key.
#[derive(Debug, Clone)]
pub struct CertificateAuthority {
    pub template: CertificateTemplate,
    pub cert: Certificate,
    pub key: KeyPair,
}

impl Issuer for CertificateAuthority {
    fn issuer_name(&self) -> Result<Name> {
        // The name of the issuer is the subject of the certificate
        Ok(self.cert.inner.tbs_certificate.subject.clone())
    }

    fn signing_key(&self) -> &KeyPair {
        &self.key
    }

    fn authority_key_id(&self) -> Result<Option<Vec<u8>>> {
        Ok(Some(self.key.key_identifier()?))
    }
}

impl CertificateAuthority {
    /// Checks that the parts belong together: the key signs for the
    /// certificate and the certificate carries the template's subject.
    pub fn check_consistency(&self) -> Result<()> {
        if self.cert.public_key()? != *self.key.public_key() {
            return Err(PkiError::IssuanceError(
                "issuer private key does not match the issuer certificate".to_string(),
            ));
        }
        if self.cert.subject_der()? != self.template.subject.as_x509_name()?.to_der()? {
            return Err(PkiError::IssuanceError(
                "issuer certificate subject does not match the issuer template".to_string(),
            ));
        }
        if !self.cert.is_ca()? {
            return Err(PkiError::IssuanceError(
                "issuer certificate is not a CA".to_string(),
            ));
        }
        Ok(())
    }
}

/// Issues self-signed roots and CA-signed leaves.
///
/// Every produced certificate is checked against its issuer's public key
/// before it is returned.
#[derive(Debug, Default)]
pub struct CertificateIssuer {
    generator: KeyPairGenerator,
    serials: SerialNumberAllocator,
}

impl CertificateIssuer {
    pub fn new(generator: KeyPairGenerator) -> Self {
        CertificateIssuer {
            generator,
            serials: SerialNumberAllocator::random(),
        }
    }

    pub fn with_serials(generator: KeyPairGenerator, serials: SerialNumberAllocator) -> Self {
        CertificateIssuer { generator, serials }
    }

    fn next_serial(&self, template: &CertificateTemplate) -> Result<u64> {
        match template.serial_number {
            Some(serial) => self.serials.claim(serial),
            None => self.serials.allocate(),
        }
    }

    /// Generates a key pair and signs `template` with it; issuer == subject.
    pub fn issue_self_signed(&self, template: &CertificateTemplate) -> Result<(Certificate, KeyPair)> {
        template.validate().map_err(into_issuance_error)?;
        let key = self.generator.generate()?;
        let serial = self.next_serial(template)?;

        let cert = SelfIssuer {
            template,
            key: &key,
        }
        .sign(template, &key, serial)
        .map_err(into_issuance_error)?;

        verify::verify_self_signed(&cert).map_err(into_issuance_error)?;
        debug!(
            role = %template.role,
            serial,
            subject = %template.subject.common_name,
            "issued self-signed certificate"
        );
        Ok((cert, key))
    }

    /// Issues a root CA and bundles it for signing leaves.
    pub fn issue_authority(&self, template: &CertificateTemplate) -> Result<CertificateAuthority> {
        let (cert, key) = self.issue_self_signed(template)?;
        Ok(CertificateAuthority {
            template: template.clone(),
            cert,
            key,
        })
    }

    /// Generates a fresh key for the leaf and signs it with the authority's key.
    pub fn issue_signed(
        &self,
        leaf_template: &CertificateTemplate,
        authority: &CertificateAuthority,
    ) -> Result<(Certificate, KeyPair)> {
        leaf_template.validate().map_err(into_issuance_error)?;
        authority
            .template
            .validate()
            .map_err(into_issuance_error)?;
        if leaf_template.is_ca {
            return Err(PkiError::IssuanceError(
                "intermediate CA certificates are not supported".to_string(),
            ));
        }
        authority.check_consistency()?;

        let key = self.generator.generate()?;
        let serial = self.next_serial(leaf_template)?;
        let cert = authority
            .sign(leaf_template, &key, serial)
            .map_err(into_issuance_error)?;

        verify::verify_signed_by(&cert, &authority.cert).map_err(into_issuance_error)?;
        debug!(
            role = %leaf_template.role,
            serial,
            subject = %leaf_template.subject.common_name,
            issuer = %authority.template.subject.common_name,
            "issued CA-signed certificate"
        );
        Ok((cert, key))
    }
}

fn into_issuance_error(err: PkiError) -> PkiError {
    match err {
        PkiError::IssuanceError(_) => err,
        other => PkiError::IssuanceError(other.to_string()),
    }
}
