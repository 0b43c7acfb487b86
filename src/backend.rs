//! Platform signing backends.
//!
//! Every backend signs with the same detached sidecar format (see
//! [`sidecar`]); what differs per operating system is how a certificate is
//! made trusted. The concrete backend is picked at compile time by
//! [`platform_backend`].

pub mod sidecar;
#[cfg(not(windows))]
pub mod unix;
#[cfg(windows)]
pub mod windows;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use time::OffsetDateTime;

use crate::cert::{Certificate, SigningCertificate};
use crate::error::Result;

/// Result of inspecting one target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureState {
    NotSigned,
    Valid,
    Invalid,
    Unsupported,
    Error,
}

impl fmt::Display for SignatureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignatureState::NotSigned => "NotSigned",
            SignatureState::Valid => "Valid",
            SignatureState::Invalid => "Invalid",
            SignatureState::Unsupported => "Unsupported",
            SignatureState::Error => "Error",
        };
        f.write_str(s)
    }
}

/// Signature metadata derived on demand from a target's sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureStatus {
    pub state: SignatureState,
    /// Signer subject; only set for `Valid` and `Invalid`.
    pub signer_identity: Option<String>,
    /// Counter-signer identity. Always `None`: no timestamp authority is used.
    pub timestamp_identity: Option<String>,
    pub signed_at: Option<OffsetDateTime>,
    pub is_self_signed: bool,
    /// Why the state is `Invalid`, `Unsupported` or `Error`.
    pub detail: Option<String>,
}

impl SignatureStatus {
    pub fn not_signed() -> Self {
        Self::bare(SignatureState::NotSigned, None)
    }

    pub fn unsupported(detail: impl Into<String>) -> Self {
        Self::bare(SignatureState::Unsupported, Some(detail.into()))
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self::bare(SignatureState::Error, Some(detail.into()))
    }

    fn bare(state: SignatureState, detail: Option<String>) -> Self {
        Self {
            state,
            signer_identity: None,
            timestamp_identity: None,
            signed_at: None,
            is_self_signed: false,
            detail,
        }
    }
}

/// How widely an installed certificate is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustScope {
    System,
    User,
}

/// Where a certificate ended up after a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLocation {
    pub scope: TrustScope,
    /// A file path or a platform store name such as `LocalMachine\Root`.
    pub location: String,
}

impl InstallLocation {
    pub fn file(scope: TrustScope, path: &Path) -> Self {
        Self {
            scope,
            location: path.display().to_string(),
        }
    }
}

impl fmt::Display for InstallLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            TrustScope::System => write!(f, "{}", self.location),
            TrustScope::User => write!(f, "{} (current user only)", self.location),
        }
    }
}

/// The capability set each platform provides.
///
/// Callers depend only on this trait. The sign/status/remove operations
/// default to the sidecar implementation; backends supply trust-store
/// installation.
pub trait SigningBackend: Send + Sync + fmt::Debug {
    /// Short platform name recorded in sidecars.
    fn platform(&self) -> &'static str;

    /// Make `certificate` a trust anchor. Tries the system store first and at
    /// least one user-writable fallback before failing with
    /// [`Error::InstallFailed`](crate::error::Error::InstallFailed).
    fn install_to_trust_store(&self, certificate: &Certificate) -> Result<InstallLocation>;

    /// Sign `path`, replacing any earlier signature from this tool.
    fn sign(&self, path: &Path, certificate: &SigningCertificate) -> Result<()> {
        sidecar::sign(self.platform(), path, certificate)
    }

    /// Inspect `path`. Never fails: problems surface as
    /// [`SignatureState::Error`].
    fn status(&self, path: &Path) -> SignatureStatus {
        sidecar::status(path)
    }

    /// Remove a self-signature. Returns `Ok(false)` without touching anything
    /// when the file is unsigned or signed by someone else.
    fn remove_self_signature(&self, path: &Path) -> Result<bool> {
        sidecar::remove_self_signature(path)
    }
}

/// The backend for the operating system this crate was built for.
pub fn platform_backend() -> Arc<dyn SigningBackend> {
    #[cfg(windows)]
    {
        Arc::new(windows::WindowsBackend::default())
    }
    #[cfg(not(windows))]
    {
        Arc::new(unix::UnixBackend::default())
    }
}

/// Filesystem-safe rendering of a certificate common name.
pub(crate) fn sanitize_file_stem(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `selfsign-path-<CN>.crt`, the name used for installed trust anchors.
pub(crate) fn anchor_file_name(certificate: &Certificate) -> PathBuf {
    PathBuf::from(format!(
        "selfsign-path-{}.crt",
        sanitize_file_stem(&certificate.subject().common_name)
    ))
}
