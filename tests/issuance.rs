mod util;

use der::Encode;
use minipki::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsageOption, KeyUsages,
    SubjectKeyIdentifier,
};
use minipki::cert::params::SubjectAltNameEntry;
use minipki::error::PkiError;
use minipki::issuer::{CertificateAuthority, CertificateIssuer, Issuer, SelfIssuer};
use minipki::key::KeyPairGenerator;
use minipki::policy::CertificateTemplate;
use minipki::serial::SerialNumberAllocator;
use minipki::verify;
use time::OffsetDateTime;

/// The root signs itself and carries the CA extensions.
#[test]
fn ca_is_self_signed_root() {
    let ca = util::shared_authority();

    verify::verify_self_signed(&ca.cert).unwrap();
    assert_eq!(ca.cert.issuer_der().unwrap(), ca.cert.subject_der().unwrap());

    let constraints = ca.cert.extension::<BasicConstraints>().unwrap().unwrap();
    assert!(constraints.is_ca);
    assert_eq!(constraints.max_path_length, Some(0));

    let key_usage = ca.cert.key_usage().unwrap().unwrap();
    assert!(key_usage.contains(KeyUsages::KeyCertSign));
    assert!(key_usage.contains(KeyUsages::DigitalSignature));
    assert!(key_usage.contains(KeyUsages::KeyEncipherment));

    let eku = ca.cert.extended_key_usage().unwrap().unwrap();
    assert_eq!(eku.usage, vec![ExtendedKeyUsageOption::Any]);
    assert!(ca.cert.subject_alt_names().unwrap().is_empty());
}

#[test]
fn ca_subject_matches_template() {
    let ca = util::shared_authority();
    let subject = ca.cert.subject();

    assert_eq!(subject, CertificateTemplate::ca().subject);
    assert_eq!(subject.common_name, "ca_company");
    assert_eq!(subject.country.as_deref(), Some("CN"));
    assert_eq!(subject.email.as_deref(), Some("ca_email@qq.com"));
}

/// Leaves name the CA as issuer byte for byte and point at its key.
#[test]
fn leaves_are_linked_to_ca() {
    let ca = util::shared_authority();
    let (server, _) = util::issue_server("localhost");
    let (client, _) = util::issue_client();

    let ca_subject = ca.cert.subject_der().unwrap();
    let ca_key_id = ca
        .cert
        .extension::<SubjectKeyIdentifier>()
        .unwrap()
        .unwrap();
    for leaf in [&server, &client] {
        assert_eq!(leaf.issuer_der().unwrap(), ca_subject);
        verify::verify_signed_by(leaf, &ca.cert).unwrap();
        assert!(!leaf.is_ca().unwrap());

        let key_usage = leaf.key_usage().unwrap().unwrap();
        assert!(!key_usage.contains(KeyUsages::KeyCertSign));
        assert!(key_usage.contains(KeyUsages::DigitalSignature));

        let aki = leaf
            .extension::<AuthorityKeyIdentifier>()
            .unwrap()
            .unwrap();
        assert_eq!(aki.key_identifier, ca_key_id.0);
    }
}

/// A peer whose clock lags slightly behind the issuer still accepts a fresh leaf.
#[test]
fn fresh_leaf_is_valid_for_slightly_slow_peer() {
    let ca = util::shared_authority();
    let roots = [ca.cert.clone()];
    let checked_before_issuance = OffsetDateTime::now_utc();
    std::thread::sleep(std::time::Duration::from_millis(1100));
    let (client, _) = util::issue_client();

    verify::verify_chain(
        &client,
        &roots,
        ExtendedKeyUsageOption::ClientAuth,
        checked_before_issuance,
    )
    .unwrap();
}

#[test]
fn leaf_validity_follows_template() {
    let (server, _) = util::issue_server("localhost");
    let validity = server.validity();
    let now = OffsetDateTime::now_utc();

    assert!(validity.contains(now));
    assert!(validity.not_after - validity.not_before >= time::Duration::days(36500));
}

/// Both leaves validate against a CA carrying anyExtendedKeyUsage.
#[test]
fn chains_validate_for_their_usage() {
    let ca = util::shared_authority();
    let roots = [ca.cert.clone()];
    let (server, _) = util::issue_server("localhost");
    let (client, _) = util::issue_client();
    let now = OffsetDateTime::now_utc();

    let anchor =
        verify::verify_chain(&server, &roots, ExtendedKeyUsageOption::ServerAuth, now).unwrap();
    assert_eq!(anchor, &ca.cert);
    verify::verify_chain(&client, &roots, ExtendedKeyUsageOption::ClientAuth, now).unwrap();

    // a leaf is only good for its own usage
    assert!(matches!(
        verify::verify_chain(&server, &roots, ExtendedKeyUsageOption::ClientAuth, now),
        Err(PkiError::VerificationError(_))
    ));
    assert!(matches!(
        verify::verify_chain(&client, &roots, ExtendedKeyUsageOption::ServerAuth, now),
        Err(PkiError::VerificationError(_))
    ));
}

#[test]
fn chain_rejects_ca_as_leaf_and_unknown_issuer() {
    let ca = util::shared_authority();
    let now = OffsetDateTime::now_utc();
    let (client, _) = util::issue_client();

    let roots = [ca.cert.clone()];
    assert!(verify::verify_chain(&ca.cert, &roots, ExtendedKeyUsageOption::ClientAuth, now).is_err());

    let no_roots: [minipki::cert::Certificate; 0] = [];
    let err = verify::verify_chain(&client, &no_roots, ExtendedKeyUsageOption::ClientAuth, now)
        .unwrap_err();
    assert!(err.to_string().contains("unknown issuer"));
}

#[test]
fn chain_rejects_expired_and_not_yet_valid() {
    let ca = util::shared_authority();
    let roots = [ca.cert.clone()];
    let (client, _) = util::issue_client();

    let before = client.validity().not_before - time::Duration::days(1);
    let after = client.validity().not_after + time::Duration::days(1);
    for at in [before, after] {
        assert!(matches!(
            verify::verify_chain(&client, &roots, ExtendedKeyUsageOption::ClientAuth, at),
            Err(PkiError::VerificationError(_))
        ));
    }
}

/// A CA restricted to serverAuth signs client certificates that never validate.
#[test]
fn server_auth_only_ca_breaks_client_chains() {
    let generator = KeyPairGenerator::default();
    let key = generator.generate().unwrap();

    let mut template = CertificateTemplate::ca();
    template.extended_key_usage = vec![ExtendedKeyUsageOption::ServerAuth];
    assert!(matches!(template.validate(), Err(PkiError::PolicyError(_))));

    // sign directly, skipping the policy check the issuer would apply
    let cert = SelfIssuer {
        template: &template,
        key: &key,
    }
    .sign(&template, &key, 1)
    .unwrap();
    let authority = CertificateAuthority {
        template,
        cert,
        key,
    };

    let client_key = generator.generate().unwrap();
    let client = authority
        .sign(&CertificateTemplate::client(), &client_key, 2)
        .unwrap();
    let server_key = generator.generate().unwrap();
    let server = authority
        .sign(&CertificateTemplate::server(), &server_key, 3)
        .unwrap();

    let roots = [authority.cert.clone()];
    let now = OffsetDateTime::now_utc();
    verify::verify_chain(&server, &roots, ExtendedKeyUsageOption::ServerAuth, now).unwrap();
    let err = verify::verify_chain(&client, &roots, ExtendedKeyUsageOption::ClientAuth, now)
        .unwrap_err();
    assert!(err.to_string().contains("incompatible key usage"));

    // the issuer refuses to sign with such an authority at all
    let err = CertificateIssuer::default()
        .issue_signed(&CertificateTemplate::client(), &authority)
        .unwrap_err();
    assert!(matches!(err, PkiError::IssuanceError(_)));
    assert!(err.to_string().contains("CA template"));
}

#[test]
fn server_names_cover_defaults_and_domain() {
    let (server, _) = util::issue_server("localhost");

    let names = server.subject_alt_names().unwrap();
    assert!(names.contains(&SubjectAltNameEntry::Dns("myserver.com".to_string())));
    assert!(names.contains(&SubjectAltNameEntry::Ip([127, 0, 0, 1].into())));
    assert!(names.contains(&SubjectAltNameEntry::Dns("localhost".to_string())));

    for host in ["localhost", "LOCALHOST", "myserver.com", "127.0.0.1"] {
        verify::verify_hostname(&server, host).unwrap();
    }
    for host in ["other.com", "127.0.0.2", "sub.localhost"] {
        assert!(matches!(
            verify::verify_hostname(&server, host),
            Err(PkiError::VerificationError(_))
        ));
    }
}

#[test]
fn client_has_no_alternative_names() {
    let (client, _) = util::issue_client();
    assert!(client.subject_alt_names().unwrap().is_empty());
}

#[test]
fn leaves_get_fresh_keys_and_distinct_serials() {
    let ca = util::shared_authority();
    let (server, server_key) = util::issue_server("localhost");
    let (client, client_key) = util::issue_client();

    assert_ne!(server_key, client_key);
    assert_ne!(&server_key, &ca.key);
    assert_eq!(server.public_key().unwrap(), *server_key.public_key());
    assert_eq!(client.public_key().unwrap(), *client_key.public_key());

    let serials = [
        ca.cert.serial_number(),
        server.serial_number(),
        client.serial_number(),
    ];
    assert_ne!(serials[0], serials[1]);
    assert_ne!(serials[0], serials[2]);
    assert_ne!(serials[1], serials[2]);
}

#[test]
fn explicit_serial_is_used_once() {
    let issuer = CertificateIssuer::default();
    let template = CertificateTemplate::builder()
        .role(minipki::policy::Role::Client)
        .subject(CertificateTemplate::client().subject)
        .validity(CertificateTemplate::client().validity)
        .key_usage(CertificateTemplate::client().key_usage)
        .extended_key_usage(vec![ExtendedKeyUsageOption::ClientAuth])
        .serial_number(1)
        .build();

    let (cert, _) = issuer
        .issue_signed(&template, util::shared_authority())
        .unwrap();
    assert_eq!(cert.serial_number(), &[1]);

    assert!(matches!(
        issuer.issue_signed(&template, util::shared_authority()),
        Err(PkiError::IssuanceError(_))
    ));
}

#[test]
fn mismatched_issuer_key_is_rejected() {
    let ca = util::shared_authority();
    let other_key = KeyPairGenerator::default().generate().unwrap();
    let forged = CertificateAuthority {
        template: ca.template.clone(),
        cert: ca.cert.clone(),
        key: other_key,
    };

    let err = CertificateIssuer::default()
        .issue_signed(&CertificateTemplate::client(), &forged)
        .unwrap_err();
    assert!(matches!(err, PkiError::IssuanceError(_)));
}

#[test]
fn leaf_signed_by_another_ca_does_not_verify() {
    let other = CertificateIssuer::default()
        .issue_authority(&CertificateTemplate::ca())
        .unwrap();
    let (client, _) = util::issue_client();

    // same subject name, different key
    assert_eq!(
        client.issuer_der().unwrap(),
        other.cert.subject_der().unwrap()
    );
    assert!(verify::verify_signed_by(&client, &other.cert).is_err());

    let roots = [other.cert.clone()];
    assert!(
        verify::verify_chain(
            &client,
            &roots,
            ExtendedKeyUsageOption::ClientAuth,
            OffsetDateTime::now_utc()
        )
        .is_err()
    );
}

#[test]
fn leaf_templates_may_not_be_authorities() {
    let mut template = CertificateTemplate::server();
    template.is_ca = true;
    assert!(matches!(
        CertificateIssuer::default().issue_signed(&template, util::shared_authority()),
        Err(PkiError::IssuanceError(_))
    ));
}

#[test]
fn invalid_root_template_is_an_issuance_error() {
    let mut template = CertificateTemplate::ca();
    template.extended_key_usage = vec![ExtendedKeyUsageOption::ServerAuth];
    let err = CertificateIssuer::default()
        .issue_self_signed(&template)
        .unwrap_err();
    assert!(matches!(err, PkiError::IssuanceError(_)));
    assert!(err.to_string().contains("extended key usage"));
}

#[test]
fn allocated_serials_cannot_be_claimed_again() {
    let issuer = CertificateIssuer::with_serials(
        KeyPairGenerator::default(),
        SerialNumberAllocator::starting_at(10),
    );
    let (cert, _) = issuer
        .issue_signed(&CertificateTemplate::client(), util::shared_authority())
        .unwrap();
    assert_eq!(cert.serial_number(), &[10]);

    let mut template = CertificateTemplate::client();
    template.serial_number = Some(10);
    assert!(matches!(
        issuer.issue_signed(&template, util::shared_authority()),
        Err(PkiError::IssuanceError(_))
    ));
}

#[test]
fn certificate_der_is_stable() {
    let ca = util::shared_authority();
    let der = ca.cert.to_der().unwrap();
    assert_eq!(der, ca.cert.inner.to_der().unwrap());
    let parsed = minipki::cert::Certificate::from_der(&der).unwrap();
    assert_eq!(parsed, ca.cert);
}
