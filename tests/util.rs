#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use selfsign::backend::{InstallLocation, SigningBackend, TrustScope};
use selfsign::cert::params::{CertificationRequestInfo, DistinguishedName, Validity};
use selfsign::cert::{Certificate, SigningCertificate};
use selfsign::error::{Error, Result};
use selfsign::issuer::Issuer;
use selfsign::key::{DEFAULT_KEY_BITS, KeyPair};
use selfsign::orchestrator::SigningOrchestrator;
use selfsign::store::FixedStoreLocation;
use selfsign::cert::extensions::ExtendedKeyUsageOption;

/// Backend that signs with the shared sidecar format but only counts trust
/// store installs instead of touching the host.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub installs: AtomicUsize,
    pub fail_install: bool,
}

impl RecordingBackend {
    pub fn failing() -> Self {
        Self {
            installs: AtomicUsize::new(0),
            fail_install: true,
        }
    }

    pub fn install_count(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }
}

impl SigningBackend for RecordingBackend {
    fn platform(&self) -> &'static str {
        "test"
    }

    fn install_to_trust_store(&self, certificate: &Certificate) -> Result<InstallLocation> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        if self.fail_install {
            return Err(Error::InstallFailed("access denied".to_string()));
        }
        Ok(InstallLocation {
            scope: TrustScope::User,
            location: format!("test-store/{}", certificate.subject().common_name),
        })
    }
}

/// A store directory that does not exist yet, inside `root`.
pub fn store_dir(root: &Path) -> PathBuf {
    root.join("store")
}

pub fn orchestrator(store: &Path, backend: &Arc<RecordingBackend>) -> SigningOrchestrator {
    SigningOrchestrator::new(
        Arc::new(FixedStoreLocation(store.to_path_buf())),
        backend.clone(),
    )
}

/// Writes a small fake executable and returns its path.
pub fn write_binary(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("MZ fake binary {name}")).unwrap();
    path
}

pub fn generate_code_signing_cert(name: &str) -> SigningCertificate {
    let key = KeyPair::generate_rsa(DEFAULT_KEY_BITS).unwrap();
    let info = CertificationRequestInfo::code_signing(name, key.public_key());
    let cert = Certificate::new_self_signed(&info, &key, Validity::for_years(3)).unwrap();
    SigningCertificate::new(cert, key).unwrap()
}

pub fn generate_ca_cert() -> SigningCertificate {
    let ca_key = KeyPair::generate_rsa(DEFAULT_KEY_BITS).unwrap();

    let subject_dn = DistinguishedName::builder()
        .common_name("Contoso Code Signing CA".to_string())
        .organization("Contoso".to_string())
        .country("US".to_string())
        .build();

    let ca_cert_info = CertificationRequestInfo::builder()
        .subject(subject_dn)
        .subject_public_key(ca_key.public_key())
        .is_ca(true)
        .build();

    let cert = Certificate::new_self_signed(&ca_cert_info, &ca_key, Validity::for_days(30)).unwrap();
    SigningCertificate::new(cert, ca_key).unwrap()
}

/// A code signing certificate issued by a CA, i.e. not self-signed.
pub fn generate_third_party_cert() -> SigningCertificate {
    let ca = generate_ca_cert();
    let key = KeyPair::generate_rsa(DEFAULT_KEY_BITS).unwrap();
    let info = CertificationRequestInfo::builder()
        .subject(
            DistinguishedName::builder()
                .common_name("Contoso Release".to_string())
                .build(),
        )
        .subject_public_key(key.public_key())
        .usages(vec![ExtendedKeyUsageOption::CodeSigning])
        .build();
    let cert = ca.issue(&info, Validity::for_days(30)).unwrap();
    SigningCertificate::new(cert, key).unwrap()
}
