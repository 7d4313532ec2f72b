//! Chain and host name verification for issued certificates.
//!
//! Mirrors what a TLS peer checks so that a broken certificate is caught at
//! issuance time instead of at handshake time. The extended key usage rule
//! follows the strict interpretation: every certificate in the chain, the
//! trust anchor included, must either omit the extension or permit the usage
//! being verified (directly or through `anyExtendedKeyUsage`).

use std::net::IpAddr;

use der::Encode;
use rsa::RsaPublicKey;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use sha2::Sha256;
use time::OffsetDateTime;
use tracing::debug;

use crate::cert::extensions::{ExtendedKeyUsageOption, KeyUsages};
use crate::cert::params::SubjectAltNameEntry;
use crate::cert::{Certificate, SignatureAlgorithm};
use crate::error::{PkiError, Result};

fn fail<T>(msg: impl Into<String>) -> Result<T> {
    Err(PkiError::VerificationError(msg.into()))
}

/// Verifies the signature of `cert` with `issuer_key`.
pub fn verify_signature(cert: &Certificate, issuer_key: &RsaPublicKey) -> Result<()> {
    let outer = &cert.inner.signature_algorithm;
    let inner = &cert.inner.tbs_certificate.signature;
    if outer != inner {
        return fail("outer and inner signature algorithms differ");
    }
    if SignatureAlgorithm::from_oid(&outer.oid).is_none() {
        return fail(format!("unsupported signature algorithm {}", outer.oid));
    }

    let tbs_der = cert.inner.tbs_certificate.to_der()?;
    let signature = Signature::try_from(cert.inner.signature.raw_bytes())
        .map_err(|e| PkiError::VerificationError(format!("malformed signature: {e}")))?;
    VerifyingKey::<Sha256>::new(issuer_key.clone())
        .verify(&tbs_der, &signature)
        .map_err(|_| PkiError::VerificationError("signature does not verify".to_string()))
}

/// Checks that `cert` names `issuer` as its issuer and carries its signature.
pub fn verify_signed_by(cert: &Certificate, issuer: &Certificate) -> Result<()> {
    if cert.issuer_der()? != issuer.subject_der()? {
        return fail(format!(
            "issuer `{}` does not match subject `{}`",
            cert.issuer().common_name,
            issuer.subject().common_name
        ));
    }
    verify_signature(cert, &issuer.public_key()?)
}

/// Checks that a root certificate is signed by its own key.
pub fn verify_self_signed(cert: &Certificate) -> Result<()> {
    verify_signed_by(cert, cert)
}

/// Validates `leaf` for `usage` against a set of trusted roots at time `at`.
///
/// Only one level is supported: the leaf must be signed directly by one of
/// the roots. Returns the root that anchored the chain.
pub fn verify_chain<'a>(
    leaf: &Certificate,
    roots: &'a [Certificate],
    usage: ExtendedKeyUsageOption,
    at: OffsetDateTime,
) -> Result<&'a Certificate> {
    if leaf.is_ca()? {
        return fail("CA certificate used as an end entity");
    }

    let issuer_name = leaf.issuer_der()?;
    let mut candidates = Vec::new();
    for root in roots {
        if root.subject_der()? == issuer_name {
            candidates.push(root);
        }
    }
    if candidates.is_empty() {
        return fail(format!(
            "unknown issuer `{}`",
            leaf.issuer().common_name
        ));
    }

    let mut last_error = None;
    for root in candidates {
        match check_link(leaf, root, usage, at) {
            Ok(()) => {
                debug!(
                    leaf = %leaf.subject().common_name,
                    root = %root.subject().common_name,
                    ?usage,
                    "chain verified"
                );
                return Ok(root);
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| PkiError::VerificationError("no usable issuer".to_string())))
}

fn check_link(
    leaf: &Certificate,
    root: &Certificate,
    usage: ExtendedKeyUsageOption,
    at: OffsetDateTime,
) -> Result<()> {
    verify_signature(leaf, &root.public_key()?)?;

    if !root.is_ca()? {
        return fail(format!(
            "issuer `{}` is not a CA",
            root.subject().common_name
        ));
    }
    if let Some(key_usage) = root.key_usage()? {
        if !key_usage.contains(KeyUsages::KeyCertSign) {
            return fail(format!(
                "issuer `{}` may not sign certificates",
                root.subject().common_name
            ));
        }
    }

    for cert in [leaf, root] {
        if !cert.validity().contains(at) {
            return fail(format!(
                "certificate `{}` is not valid at {at}",
                cert.subject().common_name
            ));
        }
        if let Some(eku) = cert.extended_key_usage()? {
            if !eku.permits(usage) {
                return fail(format!(
                    "certificate `{}` specifies an incompatible key usage: {:?} does not permit {usage:?}",
                    cert.subject().common_name,
                    eku.usage
                ));
            }
        }
    }
    Ok(())
}

/// Checks that `cert` is valid for the host name or IP address `host`.
pub fn verify_hostname(cert: &Certificate, host: &str) -> Result<()> {
    let names = cert.subject_alt_names()?;
    let matched = match host.parse::<IpAddr>() {
        Ok(ip) => names
            .iter()
            .any(|entry| matches!(entry, SubjectAltNameEntry::Ip(candidate) if *candidate == ip)),
        Err(_) => names.iter().any(|entry| match entry {
            SubjectAltNameEntry::Dns(pattern) => dns_name_matches(pattern, host),
            SubjectAltNameEntry::Ip(_) => false,
        }),
    };
    if matched {
        Ok(())
    } else {
        let valid: Vec<String> = names.iter().map(ToString::to_string).collect();
        fail(format!(
            "certificate is not valid for name `{host}`; it is valid for [{}]",
            valid.join(", ")
        ))
    }
}

fn dns_name_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    match pattern.strip_prefix("*.") {
        Some(suffix) => match host.split_once('.') {
            Some((first, rest)) => !first.is_empty() && rest == suffix,
            None => false,
        },
        None => pattern == host,
    }
}
