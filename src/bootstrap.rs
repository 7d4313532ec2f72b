//! Orchestrates a full bootstrap run: CA, then server and client leaves.
//!
//! The steps run strictly in order and any failure aborts the run. No partial
//! bundle is ever returned.

use bon::Builder;
use tracing::info;

use crate::cert::Certificate;
use crate::encoder;
use crate::error::{BootstrapStep, PkiError, Result};
use crate::issuer::{CertificateAuthority, CertificateIssuer};
use crate::key::{DEFAULT_RSA_BITS, KeyPair, KeyPairGenerator};
use crate::policy::{CertificateTemplate, PolicySet};

/// Settings for one bootstrap run.
#[derive(Clone, Debug, Builder)]
pub struct BootstrapConfig {
    /// Host name the server will be dialed as; appended to the server SAN list.
    pub server_host: Option<String>,
    #[builder(default = DEFAULT_RSA_BITS)]
    pub key_bits: usize,
    /// Re-read the CA key from its PEM form and compare it with the in-memory key.
    #[builder(default = true)]
    pub verify_key_round_trip: bool,
    #[builder(default)]
    pub policies: PolicySet,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        BootstrapConfig::builder().build()
    }
}

/// A certificate together with its private key.
#[derive(Clone, Debug)]
pub struct IssuedPair {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl IssuedPair {
    pub fn cert_pem(&self) -> Result<String> {
        encoder::encode_certificate(&self.cert)
    }

    pub fn key_pem(&self) -> Result<String> {
        encoder::encode_key(&self.key)
    }
}

/// The six artifacts of a bootstrap run.
#[derive(Clone, Debug)]
pub struct PkiBundle {
    pub ca: IssuedPair,
    pub server: IssuedPair,
    pub client: IssuedPair,
    /// Final templates, including the server names added for this run.
    pub policies: PolicySet,
}

impl PkiBundle {
    /// PEM artifacts in persistence order: `(file name, contents)`.
    pub fn artifacts(&self) -> Result<Vec<(&'static str, String)>> {
        Ok(vec![
            ("ca.pem", self.ca.cert_pem()?),
            ("ca.key", self.ca.key_pem()?),
            ("server.pem", self.server.cert_pem()?),
            ("server.key", self.server.key_pem()?),
            ("client.pem", self.client.cert_pem()?),
            ("client.key", self.client.key_pem()?),
        ])
    }
}

pub struct PkiBootstrap {
    config: BootstrapConfig,
}

impl PkiBootstrap {
    pub fn new(config: BootstrapConfig) -> Self {
        PkiBootstrap { config }
    }

    /// Runs every step and returns the finished bundle.
    pub fn run(&self) -> Result<PkiBundle> {
        let policies = self.finalize_server_names();
        policies
            .validate()
            .map_err(|e| e.at_step(BootstrapStep::FinalizeServerNames))?;
        info!(
            server_names = ?policies
                .server
                .subject_alt_names
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            "server certificate names"
        );

        let generator = KeyPairGenerator::rsa(self.config.key_bits)
            .map_err(|e| e.at_step(BootstrapStep::IssueCa))?;
        let issuer = CertificateIssuer::new(generator);
        let authority = issuer
            .issue_authority(&policies.ca)
            .map_err(|e| e.at_step(BootstrapStep::IssueCa))?;
        info!(subject = %policies.ca.subject.common_name, "issued CA certificate");

        if self.config.verify_key_round_trip {
            verify_key_round_trip(&authority.key)
                .map_err(|e| e.at_step(BootstrapStep::VerifyCaKeyRoundTrip))?;
            info!("CA key survives PEM round trip");
        }

        let server = issue_leaf(
            &issuer,
            &policies.server,
            &authority,
            BootstrapStep::IssueServer,
        )?;
        info!(subject = %policies.server.subject.common_name, "issued server certificate");

        let client = issue_leaf(
            &issuer,
            &policies.client,
            &authority,
            BootstrapStep::IssueClient,
        )?;
        info!(subject = %policies.client.subject.common_name, "issued client certificate");

        let CertificateAuthority { cert, key, .. } = authority;
        Ok(PkiBundle {
            ca: IssuedPair { cert, key },
            server,
            client,
            policies,
        })
    }

    fn finalize_server_names(&self) -> PolicySet {
        let policies = self.config.policies.clone();
        match self.config.server_host.as_deref() {
            Some(host) => policies.with_server_host(host),
            None => policies,
        }
    }
}

fn issue_leaf(
    issuer: &CertificateIssuer,
    template: &CertificateTemplate,
    authority: &CertificateAuthority,
    step: BootstrapStep,
) -> Result<IssuedPair> {
    let (cert, key) = issuer
        .issue_signed(template, authority)
        .map_err(|e| e.at_step(step))?;
    Ok(IssuedPair { cert, key })
}

/// Encodes the key, decodes it again and checks nothing was lost.
pub fn verify_key_round_trip(key: &KeyPair) -> Result<()> {
    let armored = encoder::encode_key(key)?;
    let recovered = encoder::decode_key(&armored)?;
    if recovered != *key {
        return Err(PkiError::DecodeError(
            "CA key changed across the PEM round trip".to_string(),
        ));
    }
    Ok(())
}

/// Runs a bootstrap with `config`.
pub fn bootstrap(config: BootstrapConfig) -> Result<PkiBundle> {
    PkiBootstrap::new(config).run()
}
