//! PEM armor for certificates and private keys.
//!
//! Keys are written as PKCS#1 `RSA PRIVATE KEY` blocks, the format most TLS
//! stacks load directly. Reading also accepts PKCS#8 `PRIVATE KEY`.

use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;

use crate::cert::Certificate;
use crate::error::{PkiError, Result};
use crate::key::KeyPair;

pub const CERTIFICATE_LABEL: &str = "CERTIFICATE";
pub const RSA_PRIVATE_KEY_LABEL: &str = "RSA PRIVATE KEY";
pub const PKCS8_PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";

/// Convert DER‑encoded data into a PEM‑encoded string with the provided label.
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    let pem = pem::Pem::new(label, der);
    pem::encode_config(
        &pem,
        pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
    )
}

/// Wraps the certificate's DER bytes in a `CERTIFICATE` block.
pub fn encode_certificate(cert: &Certificate) -> Result<String> {
    Ok(der_to_pem(&cert.to_der()?, CERTIFICATE_LABEL))
}

/// Wraps the PKCS#1 encoding of the private key in an `RSA PRIVATE KEY` block.
pub fn encode_key(key: &KeyPair) -> Result<String> {
    Ok(der_to_pem(&key.to_pkcs1_der()?, RSA_PRIVATE_KEY_LABEL))
}

/// Parses a private key out of its PEM armor.
pub fn decode_key(armored: impl AsRef<[u8]>) -> Result<KeyPair> {
    let block = parse_single(armored.as_ref())?;
    let private = match block.tag() {
        RSA_PRIVATE_KEY_LABEL => RsaPrivateKey::from_pkcs1_der(block.contents())?,
        PKCS8_PRIVATE_KEY_LABEL => RsaPrivateKey::from_pkcs8_der(block.contents())?,
        other => {
            return Err(PkiError::DecodeError(format!(
                "unsupported key encoding `{other}`"
            )));
        }
    };
    Ok(KeyPair::from_private_key(private))
}

/// Parses a certificate out of its PEM armor.
pub fn decode_certificate(armored: impl AsRef<[u8]>) -> Result<Certificate> {
    let block = parse_single(armored.as_ref())?;
    if block.tag() != CERTIFICATE_LABEL {
        return Err(PkiError::DecodeError(format!(
            "expected a `{CERTIFICATE_LABEL}` block, found `{}`",
            block.tag()
        )));
    }
    Certificate::from_der(block.contents())
}

fn parse_single(armored: &[u8]) -> Result<pem::Pem> {
    let mut blocks = pem::parse_many(armored)?;
    match blocks.len() {
        1 => Ok(blocks.remove(0)),
        0 => Err(PkiError::DecodeError("no PEM block found".to_string())),
        n => Err(PkiError::DecodeError(format!(
            "expected exactly one PEM block, found {n}"
        ))),
    }
}
