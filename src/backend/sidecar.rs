//! Detached `<target>.sig` signatures.
//!
//! A sidecar is a small `KEY=value` text file:
//!
//! ```text
//! SIGNED_BY=LocalSign-SelfSigned
//! TIMESTAMP=2026-10-18T09:12:44.123Z
//! CERT_SUBJECT=CN=LocalSign-SelfSigned
//! CERT_ISSUER=CN=LocalSign-SelfSigned
//! PLATFORM=linux
//! DIGEST=sha256:<base64>
//! SIGNATURE=<base64 RSASSA-PKCS1-v1_5/SHA-256 over the target bytes>
//! CERTIFICATE=<base64 DER>
//! ```
//!
//! Only `SIGNED_BY` is mandatory. A sidecar without the last three lines is a
//! plain marker: it reads as `Valid` and counts as self-signed when the
//! signer follows the `LocalSign` naming convention.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, warn};

use super::{SignatureState, SignatureStatus};
use crate::cert::{Certificate, SigningCertificate};
use crate::error::{Error, Result};
use crate::store::NAMING_CONVENTION;

const SIDECAR_SUFFIX: &str = ".sig";
const DIGEST_PREFIX: &str = "sha256:";

/// `<target>.sig`, alongside the target.
pub fn sidecar_path(target: &Path) -> PathBuf {
    let mut path = target.as_os_str().to_owned();
    path.push(SIDECAR_SUFFIX);
    PathBuf::from(path)
}

/// Parsed contents of a sidecar file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SidecarRecord {
    pub signed_by: String,
    pub timestamp: Option<String>,
    pub cert_subject: Option<String>,
    pub cert_issuer: Option<String>,
    pub platform: Option<String>,
    pub digest: Option<String>,
    pub signature: Option<Vec<u8>>,
    pub certificate: Option<Vec<u8>>,
}

impl SidecarRecord {
    pub fn render(&self) -> String {
        let mut out = format!("SIGNED_BY={}\n", self.signed_by);
        let optional = [
            ("TIMESTAMP", self.timestamp.clone()),
            ("CERT_SUBJECT", self.cert_subject.clone()),
            ("CERT_ISSUER", self.cert_issuer.clone()),
            ("PLATFORM", self.platform.clone()),
            ("DIGEST", self.digest.clone()),
            ("SIGNATURE", self.signature.as_ref().map(|s| STANDARD.encode(s))),
            ("CERTIFICATE", self.certificate.as_ref().map(|c| STANDARD.encode(c))),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                out.push_str(&format!("{key}={value}\n"));
            }
        }
        out
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut record = SidecarRecord::default();
        let mut signed_by = None;
        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            match key {
                "SIGNED_BY" => signed_by = Some(value.to_string()),
                "TIMESTAMP" => record.timestamp = Some(value.to_string()),
                "CERT_SUBJECT" => record.cert_subject = Some(value.to_string()),
                "CERT_ISSUER" => record.cert_issuer = Some(value.to_string()),
                "PLATFORM" => record.platform = Some(value.to_string()),
                "DIGEST" => record.digest = Some(value.to_string()),
                "SIGNATURE" => record.signature = Some(decode_field("SIGNATURE", value)?),
                "CERTIFICATE" => record.certificate = Some(decode_field("CERTIFICATE", value)?),
                _ => {}
            }
        }
        record.signed_by = signed_by
            .ok_or_else(|| Error::DecodingError("signature file has no SIGNED_BY line".into()))?;
        Ok(record)
    }

    /// True when the record carries no cryptographic material at all.
    pub fn is_marker_only(&self) -> bool {
        self.digest.is_none() && self.signature.is_none() && self.certificate.is_none()
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value.trim())
        .map_err(|e| Error::DecodingError(format!("{name} is not valid base64: {e}")))
}

fn digest_of(data: &[u8]) -> String {
    format!("{DIGEST_PREFIX}{}", STANDARD.encode(Sha256::digest(data)))
}

/// Signs `target` by writing its sidecar.
///
/// The target itself is only read. The sidecar is written to a temporary
/// file in the same directory and renamed into place, then read back and
/// verified; a sidecar that does not verify is removed again.
pub fn sign(platform: &str, target: &Path, certificate: &SigningCertificate) -> Result<()> {
    let failed = |reason: String| Error::SigningFailed {
        path: target.to_path_buf(),
        reason,
    };

    match fs::metadata(target) {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Err(failed("not a regular file".to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(failed("file not found".to_string()));
        }
        Err(e) => return Err(failed(e.to_string())),
    }

    let data = fs::read(target).map_err(|e| failed(format!("cannot read file: {e}")))?;
    let signature = certificate
        .key
        .sign_data(&data)
        .map_err(|e| failed(e.to_string()))?;
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| failed(e.to_string()))?;

    let record = SidecarRecord {
        signed_by: certificate.subject.clone(),
        timestamp: Some(timestamp),
        cert_subject: Some(certificate.cert.subject_string()),
        cert_issuer: Some(certificate.cert.issuer_string()),
        platform: Some(platform.to_string()),
        digest: Some(digest_of(&data)),
        signature: Some(signature),
        certificate: Some(certificate.cert.to_der().map_err(|e| failed(e.to_string()))?),
    };

    let sidecar = sidecar_path(target);
    write_atomically(&sidecar, record.render().as_bytes())
        .map_err(|e| failed(format!("cannot write {}: {e}", sidecar.display())))?;

    let status = status(target);
    if status.state != SignatureState::Valid {
        if let Err(e) = fs::remove_file(&sidecar) {
            warn!(path = %sidecar.display(), error = %e, "could not remove unverifiable signature");
        }
        return Err(failed(format!(
            "signature did not verify after writing: {}",
            status.detail.unwrap_or_else(|| status.state.to_string())
        )));
    }

    debug!(target = %target.display(), sidecar = %sidecar.display(), "wrote signature");
    Ok(())
}

fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".selfsign-")
        .suffix(".sig.tmp")
        .tempfile_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Inspects `target`. Absence of a sidecar is `NotSigned`; I/O and parse
/// problems are `Error`; failed verification is `Invalid`.
pub fn status(target: &Path) -> SignatureStatus {
    let target_exists = match fs::metadata(target) {
        Ok(meta) if !meta.is_file() => {
            return SignatureStatus::unsupported("not a regular file");
        }
        Ok(_) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => return SignatureStatus::error(format!("cannot inspect file: {e}")),
    };

    let sidecar = sidecar_path(target);
    let text = match fs::read_to_string(&sidecar) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return SignatureStatus::not_signed(),
        Err(e) => return SignatureStatus::error(format!("error reading signature: {e}")),
    };

    let record = match SidecarRecord::parse(&text) {
        Ok(record) => record,
        Err(e) => return SignatureStatus::error(e.to_string()),
    };

    let signed_at = record
        .timestamp
        .as_deref()
        .and_then(|t| OffsetDateTime::parse(t, &Rfc3339).ok());

    if record.is_marker_only() {
        let identity = record.cert_subject.as_deref().unwrap_or(&record.signed_by);
        let (state, detail) = if target_exists {
            (SignatureState::Valid, None)
        } else {
            (
                SignatureState::Invalid,
                Some("signed file no longer exists".to_string()),
            )
        };
        return SignatureStatus {
            state,
            signer_identity: Some(record.signed_by.clone()),
            timestamp_identity: None,
            signed_at,
            is_self_signed: identity.contains(NAMING_CONVENTION),
            detail,
        };
    }

    let certificate = record
        .certificate
        .as_deref()
        .map(Certificate::from_der)
        .transpose();
    let (signer_identity, is_self_signed) = match &certificate {
        Ok(Some(cert)) => (cert.subject().common_name, cert.is_self_issued()),
        _ => (record.signed_by.clone(), false),
    };
    let status = |state, detail: Option<String>| SignatureStatus {
        state,
        signer_identity: Some(signer_identity.clone()),
        timestamp_identity: None,
        signed_at,
        is_self_signed,
        detail,
    };

    let certificate = match certificate {
        Ok(Some(cert)) => cert,
        Ok(None) => {
            return status(
                SignatureState::Invalid,
                Some("signature record has no certificate".to_string()),
            );
        }
        Err(e) => return status(SignatureState::Invalid, Some(e.to_string())),
    };
    let (Some(digest), Some(signature)) = (&record.digest, &record.signature) else {
        return status(
            SignatureState::Invalid,
            Some("signature record is incomplete".to_string()),
        );
    };

    let data = match fs::read(target) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return status(
                SignatureState::Invalid,
                Some("signed file no longer exists".to_string()),
            );
        }
        Err(e) => return status(SignatureState::Error, Some(format!("cannot read file: {e}"))),
    };

    if *digest != digest_of(&data) {
        return status(
            SignatureState::Invalid,
            Some("file contents changed since signing".to_string()),
        );
    }

    let verified = certificate
        .public_key()
        .and_then(|key| key.verify(&data, signature));
    if let Err(e) = verified {
        return status(SignatureState::Invalid, Some(e.to_string()));
    }

    if let Some(at) = signed_at {
        if !certificate.validity().contains(at) {
            return status(
                SignatureState::Invalid,
                Some("signed outside the certificate's validity period".to_string()),
            );
        }
    }

    status(SignatureState::Valid, None)
}

/// Removes the sidecar of `target` if, and only if, it holds a self-signature.
pub fn remove_self_signature(target: &Path) -> Result<bool> {
    let status = status(target);
    match status.state {
        SignatureState::NotSigned | SignatureState::Unsupported => return Ok(false),
        SignatureState::Error => {
            return Err(Error::InvalidInput(format!(
                "cannot inspect signature of {}: {}",
                target.display(),
                status.detail.unwrap_or_default()
            )));
        }
        SignatureState::Valid | SignatureState::Invalid => {}
    }

    if !status.is_self_signed {
        debug!(target = %target.display(), signer = ?status.signer_identity, "leaving third-party signature in place");
        return Ok(false);
    }

    match fs::remove_file(sidecar_path(target)) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_path_appends_suffix() {
        assert_eq!(
            sidecar_path(Path::new("bin/app.exe")),
            PathBuf::from("bin/app.exe.sig")
        );
    }

    #[test]
    fn record_round_trips() {
        let record = SidecarRecord {
            signed_by: "LocalSign-SelfSigned".to_string(),
            timestamp: Some("2024-01-01T00:00:00Z".to_string()),
            cert_subject: Some("CN=LocalSign-SelfSigned".to_string()),
            cert_issuer: None,
            platform: Some("linux".to_string()),
            digest: Some("sha256:AAAA".to_string()),
            signature: Some(vec![1, 2, 3]),
            certificate: Some(vec![4, 5, 6]),
        };
        assert_eq!(SidecarRecord::parse(&record.render()).unwrap(), record);
    }

    #[test]
    fn legacy_marker_parses() {
        let text = "SIGNED_BY=LocalSign-SelfSigned\nTIMESTAMP=2024-01-01T00:00:00Z\n\
                    CERT_SUBJECT=CN=LocalSign-SelfSigned\nPLATFORM=linux\n";
        let record = SidecarRecord::parse(text).unwrap();
        assert!(record.is_marker_only());
        assert_eq!(record.cert_subject.as_deref(), Some("CN=LocalSign-SelfSigned"));
    }

    #[test]
    fn missing_signer_is_an_error() {
        assert!(SidecarRecord::parse("TIMESTAMP=now\n").is_err());
    }

    #[test]
    fn bad_base64_is_an_error() {
        assert!(SidecarRecord::parse("SIGNED_BY=x\nSIGNATURE=***\n").is_err());
    }
}
