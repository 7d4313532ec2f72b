//! # minipki - A Private PKI for Mutual TLS
//!
//! minipki bootstraps a minimal private PKI built entirely with rustcrypto
//! libraries: a self-signed root Certificate Authority plus one TLS server and
//! one TLS client certificate signed by it. Key usage, extended key usage and
//! subject alternative names are chosen so that a mutual-TLS handshake between
//! the issued server and client succeeds.
//!
//! ## Why the policy matters
//!
//! Wrong extended key usage flags, missing SAN entries or a mismatched
//! issuer/subject link all produce certificates that encode fine and only fail
//! at handshake time. minipki validates every template before signing and
//! verifies every certificate after signing:
//!
//! - the CA carries `anyExtendedKeyUsage`. A CA restricted to `serverAuth`
//!   makes every client certificate it signs fail chain validation.
//! - the server certificate lists every host name it is dialed as.
//! - each leaf's issuer name is byte-identical to the CA's subject name.
//!
//! ## Supported Formats
//!
//! - **Keys**: RSA, 2048 bits by default, never weaker
//! - **Certificates**: DER and PEM (`CERTIFICATE`)
//! - **Private keys**: PEM, PKCS#1 (`RSA PRIVATE KEY`) on write, PKCS#1 or PKCS#8 on read
//!
//! ## Quick Start
//!
//! ### Bootstrapping a PKI
//!
//! ```rust,no_run
//! use minipki::bootstrap::{BootstrapConfig, bootstrap};
//!
//! # fn main() -> Result<(), minipki::error::PkiError> {
//! let config = BootstrapConfig::builder()
//!     .server_host("localhost".to_string())
//!     .build();
//! let bundle = bootstrap(config)?;
//!
//! for (name, pem) in bundle.artifacts()? {
//!     println!("{name}:\n{pem}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Issuing Certificates Step by Step
//!
//! ```rust,no_run
//! use minipki::{
//!     cert::extensions::ExtendedKeyUsageOption,
//!     issuer::CertificateIssuer,
//!     policy::CertificateTemplate,
//!     verify,
//! };
//!
//! # fn main() -> Result<(), minipki::error::PkiError> {
//! let issuer = CertificateIssuer::default();
//!
//! let ca = issuer.issue_authority(&CertificateTemplate::ca())?;
//! let server_template = CertificateTemplate::server().with_host("localhost");
//! let (server_cert, _server_key) = issuer.issue_signed(&server_template, &ca)?;
//!
//! let roots = [ca.cert.clone()];
//! verify::verify_chain(
//!     &server_cert,
//!     &roots,
//!     ExtendedKeyUsageOption::ServerAuth,
//!     time::OffsetDateTime::now_utc(),
//! )?;
//! verify::verify_hostname(&server_cert, "localhost")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`error::PkiError`]. Library code never
//! exits the process; a failed bootstrap reports the step that failed:
//!
//! ```rust
//! use minipki::{encoder, error::PkiError};
//!
//! match encoder::decode_key("invalid pem data") {
//!     Ok(_) => println!("Key imported successfully"),
//!     Err(PkiError::DecodeError(msg)) => println!("Failed to decode key: {}", msg),
//!     Err(e) => println!("Other error: {}", e),
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`key`]: RSA key generation and signing
//! - [`cert`]: Certificate wrapper, names and X.509 extensions
//! - [`policy`]: Per-role certificate templates and their validation rules
//! - [`issuer`]: Self-signed and CA-signed issuance
//! - [`encoder`]: PEM armor for certificates and keys
//! - [`verify`]: Chain and host name verification
//! - [`bootstrap`]: Ordered CA → server → client run
//! - [`persist`]: Writing the six artifacts to disk
//! - [`tls`]: Mutual TLS smoke test over the issued material
//! - [`error`]: Error types
//! - [`serial`]: Per-issuer serial number allocation
//! - [`tbs_certificate`]: Low-level certificate structure assembly

pub mod bootstrap;
pub mod cert;
pub mod encoder;
pub mod error;
pub mod issuer;
pub mod key;
pub mod persist;
pub mod policy;
pub mod serial;
pub mod tbs_certificate;
pub mod tls;
pub mod verify;
