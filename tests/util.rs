#![allow(dead_code)]

use std::sync::OnceLock;

use minipki::bootstrap::{BootstrapConfig, PkiBundle, bootstrap};
use minipki::cert::Certificate;
use minipki::issuer::{CertificateAuthority, CertificateIssuer};
use minipki::key::KeyPair;
use minipki::policy::CertificateTemplate;

/// One CA shared by every test in a binary; RSA key generation is slow.
pub fn shared_authority() -> &'static CertificateAuthority {
    static AUTHORITY: OnceLock<CertificateAuthority> = OnceLock::new();
    AUTHORITY.get_or_init(|| {
        CertificateIssuer::default()
            .issue_authority(&CertificateTemplate::ca())
            .unwrap()
    })
}

/// One full bundle issued for `localhost`.
pub fn shared_bundle() -> &'static PkiBundle {
    static BUNDLE: OnceLock<PkiBundle> = OnceLock::new();
    BUNDLE.get_or_init(|| {
        bootstrap(
            BootstrapConfig::builder()
                .server_host("localhost".to_string())
                .build(),
        )
        .unwrap()
    })
}

pub fn issue_server(host: &str) -> (Certificate, KeyPair) {
    let template = CertificateTemplate::server().with_host(host);
    CertificateIssuer::default()
        .issue_signed(&template, shared_authority())
        .unwrap()
}

pub fn issue_client() -> (Certificate, KeyPair) {
    CertificateIssuer::default()
        .issue_signed(&CertificateTemplate::client(), shared_authority())
        .unwrap()
}
