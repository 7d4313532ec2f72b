//! use minipki::error::PkiError;

use std::fmt;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PkiError>;

/// Represents errors that can occur while building or using the PKI.
///
/// Every variant carries a human readable message; [`PkiError::Bootstrap`]
/// additionally records which bootstrap step failed.
#[derive(Debug, Error, Clone)]
pub enum PkiError {
    /// A certificate template breaks the policy rules for its role.
    #[error("Policy violation: {0}")]
    PolicyError(String),

    /// Key generation failed (entropy source or parameter size).
    #[error("Key generation error: {0}")]
    KeyGenerationError(String),

    /// Signing failed, or the issuer key does not belong to the issuer.
    #[error("Issuance error: {0}")]
    IssuanceError(String),

    /// Malformed PEM armor or an unsupported key/certificate encoding.
    #[error("Failed to decode data: {0}")]
    DecodeError(String),

    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    EncodingError(String),

    /// A certificate chain or host name check failed.
    #[error("Verification failed: {0}")]
    VerificationError(String),

    /// Writing artifacts to disk failed.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// Building a TLS configuration or running the handshake failed.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// A bootstrap step failed; the whole run is aborted.
    #[error("bootstrap step `{step}` failed: {source}")]
    Bootstrap {
        step: BootstrapStep,
        #[source]
        source: Box<PkiError>,
    },
}

/// The ordered steps of a PKI bootstrap run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStep {
    FinalizeServerNames,
    IssueCa,
    VerifyCaKeyRoundTrip,
    IssueServer,
    IssueClient,
}

impl fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootstrapStep::FinalizeServerNames => "finalize server names",
            BootstrapStep::IssueCa => "issue CA",
            BootstrapStep::VerifyCaKeyRoundTrip => "verify CA key round trip",
            BootstrapStep::IssueServer => "issue server certificate",
            BootstrapStep::IssueClient => "issue client certificate",
        };
        f.write_str(name)
    }
}

impl PkiError {
    /// Wraps `self` as the failure of a bootstrap step.
    pub fn at_step(self, step: BootstrapStep) -> Self {
        PkiError::Bootstrap {
            step,
            source: Box::new(self),
        }
    }

    /// Returns the failed bootstrap step, if this error came from one.
    pub fn failed_step(&self) -> Option<BootstrapStep> {
        match self {
            PkiError::Bootstrap { step, .. } => Some(*step),
            _ => None,
        }
    }
}

impl From<der::Error> for PkiError {
    /// Converts a `der::Error` into a `PkiError`.
    fn from(err: der::Error) -> Self {
        PkiError::DecodeError(err.to_string())
    }
}

impl From<pem::PemError> for PkiError {
    fn from(err: pem::PemError) -> Self {
        PkiError::DecodeError(err.to_string())
    }
}

impl From<rsa::pkcs1::Error> for PkiError {
    fn from(err: rsa::pkcs1::Error) -> Self {
        PkiError::DecodeError(err.to_string())
    }
}

impl From<pkcs8::Error> for PkiError {
    fn from(err: pkcs8::Error) -> Self {
        PkiError::DecodeError(err.to_string())
    }
}

impl From<pkcs8::spki::Error> for PkiError {
    fn from(err: pkcs8::spki::Error) -> Self {
        PkiError::DecodeError(err.to_string())
    }
}

impl From<rustls::Error> for PkiError {
    fn from(err: rustls::Error) -> Self {
        PkiError::TlsError(err.to_string())
    }
}

impl From<std::io::Error> for PkiError {
    fn from(err: std::io::Error) -> Self {
        PkiError::PersistenceError(err.to_string())
    }
}
