use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, info};

use super::{InstallLocation, SigningBackend, TrustScope, anchor_file_name};
use crate::cert::Certificate;
use crate::error::{Error, Result};

/// Anchor directories of the common distributions, tried in order.
const SYSTEM_ANCHOR_DIRS: &[&str] = &[
    "/usr/local/share/ca-certificates",
    "/etc/pki/ca-trust/source/anchors",
    "/etc/ssl/certs",
];

/// Backend for Linux and other Unix-like hosts.
///
/// Installation drops a PEM copy of the certificate into the first writable
/// system anchor directory and asks the distribution's tooling to rebuild
/// its bundle. Without root it falls back to a per-user directory.
#[derive(Debug, Clone)]
pub struct UnixBackend {
    system_anchor_dirs: Vec<PathBuf>,
    user_anchor_dir: Option<PathBuf>,
}

impl Default for UnixBackend {
    fn default() -> Self {
        Self {
            system_anchor_dirs: SYSTEM_ANCHOR_DIRS.iter().map(PathBuf::from).collect(),
            user_anchor_dir: dirs::home_dir()
                .map(|home| home.join(".local").join("share").join("ca-certificates")),
        }
    }
}

impl UnixBackend {
    /// A backend that installs into the given directories instead of the
    /// real system locations.
    pub fn with_anchor_dirs(system_anchor_dirs: Vec<PathBuf>, user_anchor_dir: Option<PathBuf>) -> Self {
        Self {
            system_anchor_dirs,
            user_anchor_dir,
        }
    }

    fn install_user(&self, file_name: &Path, pem: &str) -> Result<InstallLocation> {
        let dir = self.user_anchor_dir.as_ref().ok_or_else(|| {
            Error::InstallFailed(
                "no writable system anchor directory and no home directory".to_string(),
            )
        })?;
        fs::create_dir_all(dir).map_err(|e| {
            Error::InstallFailed(format!(
                "failed to create user certificate directory {}: {e}",
                dir.display()
            ))
        })?;
        let path = dir.join(file_name);
        fs::write(&path, pem).map_err(|e| {
            Error::InstallFailed(format!(
                "failed to write certificate to {}: {e}",
                path.display()
            ))
        })?;
        info!(path = %path.display(), "certificate installed for the current user only");
        Ok(InstallLocation::file(TrustScope::User, &path))
    }
}

impl SigningBackend for UnixBackend {
    fn platform(&self) -> &'static str {
        std::env::consts::OS
    }

    fn install_to_trust_store(&self, certificate: &Certificate) -> Result<InstallLocation> {
        let pem = certificate
            .to_pem()
            .map_err(|e| Error::InstallFailed(e.to_string()))?;
        let file_name = anchor_file_name(certificate);

        for dir in &self.system_anchor_dirs {
            if !dir.is_dir() {
                debug!(dir = %dir.display(), "anchor directory does not exist");
                continue;
            }
            let path = dir.join(&file_name);
            if let Err(e) = fs::write(&path, &pem) {
                debug!(path = %path.display(), error = %e, "anchor directory not writable");
                continue;
            }
            refresh_trust_store(dir);
            info!(path = %path.display(), "certificate installed to system trust store");
            return Ok(InstallLocation::file(TrustScope::System, &path));
        }

        self.install_user(&file_name, &pem)
    }
}

/// Rebuild the distribution's certificate bundle. Best effort: a missing
/// tool or a failing run is ignored.
fn refresh_trust_store(dir: &Path) {
    let dir_name = dir.to_string_lossy();
    let tool = if dir_name.contains("ca-certificates") {
        "update-ca-certificates"
    } else if dir_name.contains("ca-trust") {
        "update-ca-trust"
    } else {
        return;
    };
    let result = Command::new(tool)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    debug!(tool, ?result, "trust store refresh");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::params::{CertificationRequestInfo, Validity};
    use crate::key::{DEFAULT_KEY_BITS, KeyPair};

    fn certificate(name: &str) -> Certificate {
        let key = KeyPair::generate_rsa(DEFAULT_KEY_BITS).unwrap();
        let info = CertificationRequestInfo::code_signing(name, key.public_key());
        Certificate::new_self_signed(&info, &key, Validity::for_days(1)).unwrap()
    }

    #[test]
    fn installs_into_first_existing_system_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing");
        let anchors = tmp.path().join("anchors");
        fs::create_dir(&anchors).unwrap();
        let backend = UnixBackend::with_anchor_dirs(
            vec![missing, anchors.clone()],
            Some(tmp.path().join("user")),
        );

        let location = backend
            .install_to_trust_store(&certificate("My Cert"))
            .unwrap();

        assert_eq!(location.scope, TrustScope::System);
        let installed = anchors.join("selfsign-path-My_Cert.crt");
        assert_eq!(location.location, installed.display().to_string());
        let pem = fs::read_to_string(installed).unwrap();
        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----"));
    }

    #[test]
    fn falls_back_to_user_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let user = tmp.path().join("user").join("ca-certificates");
        let backend =
            UnixBackend::with_anchor_dirs(vec![tmp.path().join("nope")], Some(user.clone()));

        let location = backend
            .install_to_trust_store(&certificate("LocalSign-SelfSigned"))
            .unwrap();

        assert_eq!(location.scope, TrustScope::User);
        assert!(user.join("selfsign-path-LocalSign-SelfSigned.crt").is_file());
    }

    #[test]
    fn fails_without_any_location() {
        let backend = UnixBackend::with_anchor_dirs(vec![], None);
        let err = backend
            .install_to_trust_store(&certificate("x"))
            .unwrap_err();
        assert!(matches!(err, Error::InstallFailed(_)));
    }
}
