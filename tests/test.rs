mod util;

use selfsign::cert::Certificate;
use selfsign::cert::SigningCertificate;
use selfsign::error::Error;
use selfsign::key::{DEFAULT_KEY_BITS, KeyPair};
use ::time::OffsetDateTime;
use x509_parser::prelude::*;

/// Generated code signing certificates are self-issued, carry the code
/// signing EKU and parse with an independent X.509 parser.
#[test]
fn generated_certificate_properties() {
    let signing = util::generate_code_signing_cert("LocalSign-SelfSigned");
    let der = signing.cert.to_der().unwrap();
    let (rest, cert) = X509Certificate::from_der(&der).unwrap();
    assert!(rest.is_empty());

    assert_eq!(cert.version(), X509Version::V3);
    assert_eq!(cert.subject(), cert.issuer());
    let cn = cert.subject().iter_common_name().next().unwrap();
    assert_eq!(cn.as_str().unwrap(), "LocalSign-SelfSigned");

    let eku = cert.extended_key_usage().unwrap().unwrap();
    assert!(eku.value.code_signing);
    assert!(!eku.value.server_auth);

    let key_usage = cert.key_usage().unwrap().unwrap();
    assert!(key_usage.critical);
    assert!(key_usage.value.digital_signature());

    let basic = cert.basic_constraints().unwrap().unwrap();
    assert!(basic.critical);
    assert!(!basic.value.ca);

    assert_eq!(
        cert.signature_algorithm.algorithm.to_id_string(),
        "1.2.840.113549.1.1.11"
    );

    let serial = cert.tbs_certificate.raw_serial();
    assert_eq!(serial.len(), 16);
    assert_eq!(serial[0] & 0x80, 0);

    let now = OffsetDateTime::now_utc().unix_timestamp();
    let not_before = cert.validity().not_before.timestamp();
    let not_after = cert.validity().not_after.timestamp();
    assert!(not_before <= now);
    let years = (not_after - not_before) as f64 / (365.25 * 24.0 * 3600.0);
    assert!((2.99..3.01).contains(&years), "validity is {years} years");
}

#[test]
fn certificate_verifies_with_own_key() {
    let signing = util::generate_code_signing_cert("Nightly Builds");
    assert!(signing.cert.is_self_issued());
    assert!(signing.cert.has_code_signing_usage());
    signing.cert.verify_self_signature().unwrap();
    assert_eq!(signing.subject, "Nightly Builds");
}

#[test]
fn pem_round_trip() {
    let signing = util::generate_code_signing_cert("Round Trip");
    let pem = signing.cert.to_pem().unwrap();
    assert!(pem.starts_with("-----BEGIN CERTIFICATE-----\n"));

    let parsed = Certificate::from_pem(&pem).unwrap();
    assert_eq!(parsed, signing.cert);
    assert_eq!(parsed.serial_number(), signing.cert.serial_number());
    assert_eq!(parsed.subject_string(), "CN=Round Trip");

    let key_pem = signing.key.export_pkcs8_pem().unwrap();
    let key = KeyPair::import_from_pem(&key_pem).unwrap();
    let rebuilt = SigningCertificate::new(parsed, key).unwrap();
    assert_eq!(rebuilt.subject, "Round Trip");
}

#[test]
fn mismatched_key_is_rejected() {
    let signing = util::generate_code_signing_cert("Mismatch");
    let other = KeyPair::generate_rsa(DEFAULT_KEY_BITS).unwrap();
    let err = SigningCertificate::new(signing.cert.clone(), other).unwrap_err();
    assert!(matches!(err, Error::CertificateError(_)));
}

#[test]
fn issued_certificate_is_not_self_issued() {
    let ca = util::generate_ca_cert();
    assert!(ca.cert.is_self_issued());
    assert!(!ca.cert.has_code_signing_usage());

    let leaf = util::generate_third_party_cert();
    assert!(!leaf.cert.is_self_issued());
    assert!(leaf.cert.has_code_signing_usage());
    assert_eq!(leaf.cert.issuer().common_name, "Contoso Code Signing CA");
    assert_eq!(leaf.cert.issuer().organization.as_deref(), Some("Contoso"));

    let der = leaf.cert.to_der().unwrap();
    let (_, parsed) = X509Certificate::from_der(&der).unwrap();
    assert_ne!(parsed.subject(), parsed.issuer());
    let aki = parsed
        .extensions()
        .iter()
        .find(|ext| ext.oid == x509_parser::oid_registry::OID_X509_EXT_AUTHORITY_KEY_IDENTIFIER);
    assert!(aki.is_some());
}

#[test]
fn names_are_escaped() {
    let signing = util::generate_code_signing_cert("Builds, Inc = \"Test\"");
    assert_eq!(signing.cert.subject().common_name, "Builds, Inc = \"Test\"");
}
