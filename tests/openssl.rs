mod util;

use regex::Regex;
use std::fs;
use std::process::Command;

/// Cross-checks a generated certificate with the `openssl` command line tool.
/// Ignored by default because it needs openssl on the PATH.
#[test]
#[ignore]
fn test_openssl_validate_cert() {
    let signing = util::generate_code_signing_cert("LocalSign-SelfSigned");
    let cert_pem = signing.cert.to_pem().unwrap();

    let tmp = tempfile::tempdir().unwrap();
    let cert_path = tmp.path().join("code_signing.pem");
    fs::write(&cert_path, cert_pem).expect("Failed to write certificate");

    let output = Command::new("openssl")
        .arg("x509")
        .arg("-in")
        .arg(&cert_path)
        .arg("-noout")
        .arg("-text")
        .output()
        .expect("Failed to execute OpenSSL command");

    assert!(
        output.status.success(),
        "OpenSSL command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let output_text = String::from_utf8_lossy(&output.stdout);

    assert!(
        output_text.contains("Issuer: CN=LocalSign-SelfSigned"),
        "Issuer field is incorrect"
    );
    assert!(
        output_text.contains("Subject: CN=LocalSign-SelfSigned"),
        "Subject field is incorrect"
    );
    assert!(
        output_text.contains("Version: 3 (0x2)"),
        "Version field is incorrect"
    );
    assert!(
        output_text.contains("Signature Algorithm: sha256WithRSAEncryption"),
        "Signature Algorithm field is incorrect"
    );
    assert!(
        output_text.contains("Code Signing"),
        "Extended key usage is missing code signing"
    );
    assert!(
        output_text.contains("CA:FALSE"),
        "Basic constraints should mark a non-CA certificate"
    );
    assert!(
        output_text.contains("Public-Key: (2048 bit)"),
        "Key size is incorrect"
    );

    let not_before_regex = Regex::new(r"Not Before: .+").unwrap();
    let not_after_regex = Regex::new(r"Not After : .+").unwrap();
    assert!(
        not_before_regex.is_match(&output_text),
        "Missing or incorrect Not Before field"
    );
    assert!(
        not_after_regex.is_match(&output_text),
        "Missing or incorrect Not After field"
    );

    // The self-signature must verify against the certificate itself.
    let verify = Command::new("openssl")
        .arg("verify")
        .arg("-CAfile")
        .arg(&cert_path)
        .arg("-purpose")
        .arg("any")
        .arg(&cert_path)
        .output()
        .expect("Failed to execute OpenSSL verify");
    assert!(
        String::from_utf8_lossy(&verify.stdout).contains(": OK"),
        "openssl verify failed: {}",
        String::from_utf8_lossy(&verify.stderr)
    );
}
