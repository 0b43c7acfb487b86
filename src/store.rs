//! The per-user certificate store and certificate acquisition.
//!
//! Layout:
//!
//! ```text
//! <store dir>/                      (0700)
//! ├── LocalSign-SelfSigned.crt      PEM certificate
//! ├── LocalSign-SelfSigned.key      PEM PKCS#8 private key (0600)
//! ├── LocalSign-OneTime-a8Zk31Qp.crt
//! └── LocalSign-OneTime-a8Zk31Qp.key
//! ```

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::{debug, info, warn};

use crate::backend::{InstallLocation, SigningBackend};
use crate::cert::params::{CertificationRequestInfo, Validity};
use crate::cert::{Certificate, SigningCertificate};
use crate::error::{Error, Result};
use crate::key::{DEFAULT_KEY_BITS, KeyPair};

/// Subject of the reusable identity used when no name is given.
pub const DEFAULT_SUBJECT: &str = "LocalSign-SelfSigned";
/// Subject prefix marking a certificate as ephemeral.
pub const ONE_TIME_PREFIX: &str = "LocalSign-OneTime";
/// Marker recognised as "created by this tool" in signatures without an
/// embedded certificate.
pub const NAMING_CONVENTION: &str = "LocalSign";
/// Length of the random part of a one-time subject.
pub const ONE_TIME_SUFFIX_LEN: usize = 8;
/// Lifetime of generated certificates.
pub const VALIDITY_YEARS: i32 = 3;
/// Environment variable overriding the store directory.
pub const STORE_DIR_ENV: &str = "SELFSIGN_CERT_DIR";

const APP_DIR: &str = "selfsign-path-tool";

/// Resolves the directory holding the certificate store.
pub trait StoreLocation: Send + Sync + fmt::Debug {
    fn certificate_dir(&self) -> Result<PathBuf>;
}

/// The real per-user location: `$SELFSIGN_CERT_DIR`, else
/// `<data dir>/selfsign-path-tool/certificates`, else a directory under the
/// system temp dir.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserStoreLocation;

impl StoreLocation for UserStoreLocation {
    fn certificate_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = std::env::var_os(STORE_DIR_ENV).filter(|d| !d.is_empty()) {
            return Ok(PathBuf::from(dir));
        }
        Ok(match dirs::data_dir() {
            Some(data) => data.join(APP_DIR).join("certificates"),
            None => std::env::temp_dir().join(format!("{APP_DIR}-certificates")),
        })
    }
}

/// A store pinned to one directory.
#[derive(Debug, Clone)]
pub struct FixedStoreLocation(pub PathBuf);

impl StoreLocation for FixedStoreLocation {
    fn certificate_dir(&self) -> Result<PathBuf> {
        Ok(self.0.clone())
    }
}

/// How to obtain the signing certificate for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireMode {
    /// Reuse `<subject>.crt`/`<subject>.key` from the store, creating them
    /// on first use.
    Named(String),
    /// Load a certificate and key supplied by the user.
    External { cert_file: PathBuf, key_file: PathBuf },
    /// Generate a throwaway identity eligible for erasure.
    OneTime,
}

/// Where an acquired certificate came from.
#[derive(Debug)]
pub enum CertificateOrigin {
    /// Loaded unchanged from the store.
    Reused,
    /// Newly generated under a reusable name; `installation` is the result
    /// of the trust-store install attempted right after generation.
    Generated {
        installation: std::result::Result<InstallLocation, String>,
    },
    /// Newly generated under the one-time prefix.
    OneTime,
    /// Loaded from user-supplied files.
    External,
}

#[derive(Debug)]
pub struct AcquiredCertificate {
    pub certificate: SigningCertificate,
    pub origin: CertificateOrigin,
}

impl AcquiredCertificate {
    pub fn is_ephemeral(&self) -> bool {
        matches!(self.origin, CertificateOrigin::OneTime)
    }
}

/// True for subjects created under the one-time naming convention.
pub fn is_ephemeral_subject(subject: &str) -> bool {
    subject
        .strip_prefix(ONE_TIME_PREFIX)
        .is_some_and(|rest| rest.starts_with('-'))
}

/// Rejects subjects that cannot double as a file stem in the store, or that
/// would be mistaken for an ephemeral identity.
pub fn validate_subject(subject: &str) -> Result<()> {
    if subject.trim().is_empty() {
        return Err(Error::Configuration("certificate name must not be empty".into()));
    }
    if subject == "." || subject == ".." || subject.contains(['/', '\\', '\0']) {
        return Err(Error::Configuration(format!(
            "certificate name '{subject}' cannot be used as a file name"
        )));
    }
    if is_ephemeral_subject(subject) {
        return Err(Error::Configuration(format!(
            "certificate name '{subject}' uses the reserved prefix '{ONE_TIME_PREFIX}-'"
        )));
    }
    Ok(())
}

/// A fresh one-time subject, `LocalSign-OneTime-<8 alphanumerics>`.
pub fn one_time_subject() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(ONE_TIME_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{ONE_TIME_PREFIX}-{suffix}")
}

/// Generate a self-issued code signing certificate for `subject`.
pub fn generate(subject: &str) -> Result<SigningCertificate> {
    let key = KeyPair::generate_rsa(DEFAULT_KEY_BITS)?;
    let info = CertificationRequestInfo::code_signing(subject, key.public_key());
    let cert = Certificate::new_self_signed(&info, &key, Validity::for_years(VALIDITY_YEARS))?;
    Ok(SigningCertificate {
        subject: subject.to_string(),
        cert,
        key,
    })
}

/// Load a certificate/key pair from PEM files.
pub fn load_from_files(cert_file: &Path, key_file: &Path) -> Result<SigningCertificate> {
    let cert_pem = fs::read_to_string(cert_file).map_err(|e| {
        Error::CertificateError(format!(
            "failed to read certificate file {}: {e}",
            cert_file.display()
        ))
    })?;
    let cert = Certificate::from_pem(&cert_pem).map_err(|e| {
        Error::CertificateError(format!(
            "failed to parse certificate from {}: {e}",
            cert_file.display()
        ))
    })?;
    let key_pem = zeroize::Zeroizing::new(fs::read_to_string(key_file).map_err(|e| {
        Error::CertificateError(format!("failed to read key file {}: {e}", key_file.display()))
    })?);
    let key = KeyPair::import_from_pem(&key_pem).map_err(|e| {
        Error::CertificateError(format!(
            "failed to parse private key from {}: {e}",
            key_file.display()
        ))
    })?;
    SigningCertificate::new(cert, key)
}

/// Locates, creates, loads and persists signing identities.
#[derive(Debug, Clone)]
pub struct CertificateStore {
    location: Arc<dyn StoreLocation>,
    backend: Arc<dyn SigningBackend>,
}

impl CertificateStore {
    pub fn new(location: Arc<dyn StoreLocation>, backend: Arc<dyn SigningBackend>) -> Self {
        Self { location, backend }
    }

    /// The store directory, created owner-only if missing.
    pub fn directory(&self) -> Result<PathBuf> {
        let dir = self.location.certificate_dir()?;
        if !dir.is_dir() {
            create_private_dir(&dir)?;
            debug!(dir = %dir.display(), "created certificate store");
        }
        Ok(dir)
    }

    pub fn cert_path(&self, subject: &str) -> Result<PathBuf> {
        Ok(self.directory()?.join(format!("{subject}.crt")))
    }

    pub fn key_path(&self, subject: &str) -> Result<PathBuf> {
        Ok(self.directory()?.join(format!("{subject}.key")))
    }

    /// Load `<subject>.crt`/`<subject>.key`. A pair with a half missing or
    /// unparsable is reported as absent.
    pub fn load(&self, subject: &str) -> Result<Option<SigningCertificate>> {
        let cert_path = self.cert_path(subject)?;
        let key_path = self.key_path(subject)?;
        if !cert_path.is_file() || !key_path.is_file() {
            return Ok(None);
        }
        match load_from_files(&cert_path, &key_path) {
            Ok(mut certificate) => {
                certificate.subject = subject.to_string();
                Ok(Some(certificate))
            }
            Err(e) => {
                warn!(subject, error = %e, "ignoring unusable stored certificate");
                Ok(None)
            }
        }
    }

    /// Write the certificate (PEM) and private key (PEM PKCS#8, owner-only).
    pub fn save(&self, certificate: &SigningCertificate) -> Result<()> {
        let cert_path = self.cert_path(&certificate.subject)?;
        let key_path = self.key_path(&certificate.subject)?;
        fs::write(&cert_path, certificate.cert.to_pem()?)?;
        let key_pem = certificate.key.export_pkcs8_pem()?;
        write_private_file(&key_path, key_pem.as_bytes())?;
        debug!(dir = %cert_path.parent().unwrap_or(Path::new("")).display(), subject = %certificate.subject, "saved certificate files");
        Ok(())
    }

    /// Obtain the certificate for a run. Every failure other than a
    /// configuration problem is reported as `CertAcquisitionFailed`.
    pub fn acquire(&self, mode: &AcquireMode) -> Result<AcquiredCertificate> {
        let acquired = match mode {
            AcquireMode::Named(subject) => {
                validate_subject(subject)?;
                self.acquire_named(subject)
            }
            AcquireMode::External {
                cert_file,
                key_file,
            } => load_from_files(cert_file, key_file).map(|certificate| {
                info!(subject = %certificate.subject, "using certificate from {}", cert_file.display());
                AcquiredCertificate {
                    certificate,
                    origin: CertificateOrigin::External,
                }
            }),
            AcquireMode::OneTime => self.acquire_one_time(),
        };
        acquired.map_err(|e| match e {
            Error::Configuration(_) | Error::CertAcquisitionFailed(_) => e,
            other => Error::CertAcquisitionFailed(other.to_string()),
        })
    }

    fn acquire_named(&self, subject: &str) -> Result<AcquiredCertificate> {
        if let Some(certificate) = self.load(subject)? {
            info!(subject, "using existing certificate");
            return Ok(AcquiredCertificate {
                certificate,
                origin: CertificateOrigin::Reused,
            });
        }

        info!(subject, "creating new self-signed certificate");
        let certificate = generate(subject)?;
        if let Err(e) = self.save(&certificate) {
            warn!(subject, error = %e, "failed to save certificate to disk");
        }
        let installation = self
            .backend
            .install_to_trust_store(&certificate.cert)
            .map_err(|e| e.to_string());
        match &installation {
            Ok(location) => info!(%location, "certificate installed to trust store"),
            Err(reason) => warn!(%reason, "certificate created but not installed to trust store"),
        }
        Ok(AcquiredCertificate {
            certificate,
            origin: CertificateOrigin::Generated { installation },
        })
    }

    fn acquire_one_time(&self) -> Result<AcquiredCertificate> {
        let subject = one_time_subject();
        info!(subject = %subject, "generating one-time certificate");
        let certificate = generate(&subject)?;
        if let Err(e) = self.save(&certificate) {
            warn!(subject = %subject, error = %e, "failed to save certificate to disk");
        }
        Ok(AcquiredCertificate {
            certificate,
            origin: CertificateOrigin::OneTime,
        })
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn write_private_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation
    file.set_permissions(fs::Permissions::from_mode(0o600))?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_time_subjects_are_ephemeral_and_distinct() {
        let a = one_time_subject();
        let b = one_time_subject();
        assert!(is_ephemeral_subject(&a));
        assert_eq!(a.len(), ONE_TIME_PREFIX.len() + 1 + ONE_TIME_SUFFIX_LEN);
        assert_ne!(a, b);
        assert!(!is_ephemeral_subject(DEFAULT_SUBJECT));
        assert!(!is_ephemeral_subject("LocalSign-OneTimeX"));
    }

    #[test]
    fn subject_validation() {
        assert!(validate_subject(DEFAULT_SUBJECT).is_ok());
        assert!(validate_subject("My Custom Cert").is_ok());
        for bad in ["", "  ", "..", "a/b", "a\\b", "LocalSign-OneTime-abc"] {
            assert!(
                matches!(validate_subject(bad), Err(Error::Configuration(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn user_location_honours_override() {
        // Only reads the variable; other tests pass explicit locations.
        let dir = UserStoreLocation.certificate_dir().unwrap();
        match std::env::var_os(STORE_DIR_ENV) {
            Some(value) if !value.is_empty() => assert_eq!(dir, PathBuf::from(value)),
            _ => assert!(dir.ends_with("certificates") || dir.ends_with("selfsign-path-tool-certificates")),
        }
    }
}
