//! The signing pipeline:
//! `Idle → AcquireCertificate → SignFiles → InstallCertificate → EraseKey → Done`.
//!
//! Only certificate acquisition can end a run early. Per-file signing
//! failures, installation failures and erasure problems are recorded in the
//! [`SigningOutcome`] and the pipeline moves on.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{InstallLocation, SigningBackend};
use crate::erase::{EraseWarning, SecureEraser};
use crate::error::{Error, Result};
use crate::store::{
    AcquireMode, AcquiredCertificate, CertificateOrigin, CertificateStore, ONE_TIME_PREFIX,
    StoreLocation,
};

/// Receives one human-readable line per pipeline milestone.
pub trait ProgressSink {
    fn report(&mut self, line: String);
}

impl ProgressSink for Vec<String> {
    fn report(&mut self, line: String) {
        self.push(line);
    }
}

impl ProgressSink for UnboundedSender<String> {
    fn report(&mut self, line: String) {
        // A closed receiver only means nobody is listening any more.
        let _ = self.send(line);
    }
}

/// Discards progress lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _line: String) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    AcquireCertificate,
    SignFiles,
    InstallCertificate,
    EraseKey,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileResult {
    Signed,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: FileResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed(InstallLocation),
    /// Installation was attempted and failed; the run continued.
    Warning(String),
    /// No installation was needed.
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EraseOutcome {
    /// Key zeroized and every ephemeral artifact removed.
    Erased { files: Vec<PathBuf> },
    /// A reusable identity; its files stay in the store.
    Retained,
    /// Erasure finished with problems, each listed separately.
    Warnings {
        files: Vec<PathBuf>,
        warnings: Vec<EraseWarning>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Partial,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial success",
            RunStatus::Failed => "failed",
        })
    }
}

/// Everything that happened during one signing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningOutcome {
    /// Subject of the certificate used, if one was acquired.
    pub subject: Option<String>,
    pub files: Vec<FileOutcome>,
    pub attempted: usize,
    pub succeeded: usize,
    pub installation: Option<InstallOutcome>,
    pub erasure: Option<EraseOutcome>,
    /// States visited, in order.
    pub states: Vec<RunState>,
}

impl SigningOutcome {
    fn new() -> Self {
        Self {
            subject: None,
            files: Vec::new(),
            attempted: 0,
            succeeded: 0,
            installation: None,
            erasure: None,
            states: vec![RunState::Idle],
        }
    }

    /// `Success` only if every target was signed; `Failed` if none was.
    pub fn status(&self) -> RunStatus {
        if self.succeeded == 0 {
            RunStatus::Failed
        } else if self.succeeded == self.files.len() {
            RunStatus::Success
        } else {
            RunStatus::Partial
        }
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files
            .iter()
            .filter(|f| matches!(f.result, FileResult::Failed(_)))
    }

    /// Every recorded problem, each naming its file or stage.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for file in &self.files {
            match &file.result {
                FileResult::Failed(reason) => {
                    warnings.push(format!("signing {}: {reason}", file.path.display()));
                }
                FileResult::Skipped(reason) => {
                    warnings.push(format!("skipped {}: {reason}", file.path.display()));
                }
                FileResult::Signed => {}
            }
        }
        if let Some(InstallOutcome::Warning(reason)) = &self.installation {
            warnings.push(format!("certificate installation: {reason}"));
        }
        if let Some(EraseOutcome::Warnings { warnings: erase, .. }) = &self.erasure {
            warnings.extend(erase.iter().map(|w| format!("key erasure: {w}")));
        }
        warnings
    }

    /// A run that produced an outcome completed; the exit status is 0 even
    /// if no file was signed.
    pub fn exit_code(&self) -> i32 {
        0
    }

    fn enter(&mut self, state: RunState) {
        debug!(?state, "signing run state");
        self.states.push(state);
    }
}

impl fmt::Display for SigningOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Signed {} of {} file(s) ({} attempted): {}",
            self.succeeded,
            self.files.len(),
            self.attempted,
            self.status()
        )?;
        if let Some(subject) = &self.subject {
            writeln!(f, "Certificate: {subject}")?;
        }
        match &self.installation {
            Some(InstallOutcome::Installed(location)) => writeln!(f, "Installed to: {location}")?,
            Some(InstallOutcome::Skipped(reason)) => writeln!(f, "Installation skipped: {reason}")?,
            Some(InstallOutcome::Warning(_)) | None => {}
        }
        match &self.erasure {
            Some(EraseOutcome::Erased { files }) => {
                writeln!(f, "Key material erased ({} file(s) removed)", files.len())?
            }
            Some(EraseOutcome::Retained) => writeln!(f, "Certificate kept for reuse")?,
            Some(EraseOutcome::Warnings { .. }) | None => {}
        }
        for warning in self.warnings() {
            writeln!(f, "Warning: {warning}")?;
        }
        Ok(())
    }
}

/// Runs the pipeline against a store and a backend.
#[derive(Debug, Clone)]
pub struct SigningOrchestrator {
    store: CertificateStore,
    backend: Arc<dyn SigningBackend>,
}

impl SigningOrchestrator {
    pub fn new(location: Arc<dyn StoreLocation>, backend: Arc<dyn SigningBackend>) -> Self {
        Self {
            store: CertificateStore::new(location, backend.clone()),
            backend,
        }
    }

    pub fn store(&self) -> &CertificateStore {
        &self.store
    }

    pub fn backend(&self) -> &Arc<dyn SigningBackend> {
        &self.backend
    }

    /// Sign `targets` in order.
    ///
    /// Returns `Err` only when no certificate could be obtained; in that case
    /// no file has been touched and nothing was installed. An empty target
    /// list yields a `Failed` outcome without acquiring a certificate.
    pub fn run(
        &self,
        mode: &AcquireMode,
        targets: &[PathBuf],
        progress: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<SigningOutcome> {
        let mut outcome = SigningOutcome::new();

        if targets.is_empty() {
            warn!("no files to sign");
            progress.report("No files to sign".to_string());
            outcome.enter(RunState::Done);
            return Ok(outcome);
        }

        outcome.enter(RunState::AcquireCertificate);
        let mut acquired = match self.store.acquire(mode) {
            Ok(acquired) => acquired,
            Err(e) => {
                outcome.enter(RunState::Failed);
                warn!(error = %e, "certificate acquisition failed");
                progress.report(format!("Error: {e}"));
                return Err(e);
            }
        };
        let subject = acquired.certificate.subject.clone();
        progress.report(match acquired.origin {
            CertificateOrigin::Reused => format!("Using existing certificate: {subject}"),
            CertificateOrigin::External => format!("Using certificate from file: {subject}"),
            CertificateOrigin::Generated { .. } | CertificateOrigin::OneTime => {
                format!("Created certificate: {subject}")
            }
        });
        outcome.subject = Some(subject);

        outcome.enter(RunState::SignFiles);
        for path in targets {
            let result = if cancel.is_cancelled() {
                FileResult::Skipped("cancelled".to_string())
            } else {
                outcome.attempted += 1;
                self.sign_one(path, &acquired)
            };
            progress.report(match &result {
                FileResult::Signed => format!("Signed: {}", path.display()),
                FileResult::Skipped(reason) => format!("Skipped: {} ({reason})", path.display()),
                FileResult::Failed(reason) => format!("Failed: {} - {reason}", path.display()),
            });
            if result == FileResult::Signed {
                outcome.succeeded += 1;
            }
            outcome.files.push(FileOutcome {
                path: path.clone(),
                result,
            });
        }
        info!(
            attempted = outcome.attempted,
            succeeded = outcome.succeeded,
            "signing finished"
        );

        outcome.enter(RunState::InstallCertificate);
        let installation = self.install(&acquired);
        progress.report(match &installation {
            InstallOutcome::Installed(location) => format!("Certificate installed to: {location}"),
            InstallOutcome::Warning(reason) => {
                format!("Warning: certificate not installed to trust store: {reason}")
            }
            InstallOutcome::Skipped(reason) => format!("Certificate installation skipped: {reason}"),
        });
        outcome.installation = Some(installation);

        outcome.enter(RunState::EraseKey);
        let erasure = self.erase(&mut acquired);
        match &erasure {
            EraseOutcome::Erased { .. } => progress.report("Key material erased".to_string()),
            EraseOutcome::Retained => progress.report("Certificate kept for reuse".to_string()),
            EraseOutcome::Warnings { warnings, .. } => {
                for w in warnings {
                    progress.report(format!("Warning: key erasure: {w}"));
                }
            }
        }
        outcome.erasure = Some(erasure);

        outcome.enter(RunState::Done);
        info!(status = %outcome.status(), "signing run complete");
        Ok(outcome)
    }

    fn sign_one(&self, path: &Path, acquired: &AcquiredCertificate) -> FileResult {
        match self.backend.sign(path, &acquired.certificate) {
            Ok(()) => {
                info!(path = %path.display(), "signed");
                FileResult::Signed
            }
            Err(e) => {
                let reason = match e {
                    Error::SigningFailed { reason, .. } => reason,
                    other => other.to_string(),
                };
                warn!(path = %path.display(), %reason, "signing failed");
                FileResult::Failed(reason)
            }
        }
    }

    fn install(&self, acquired: &AcquiredCertificate) -> InstallOutcome {
        let attempt = match &acquired.origin {
            CertificateOrigin::Reused => {
                return InstallOutcome::Skipped(
                    "existing certificate was installed when it was created".to_string(),
                );
            }
            // Done right after generation; report that result.
            CertificateOrigin::Generated { installation } => installation.clone(),
            CertificateOrigin::OneTime | CertificateOrigin::External => self
                .backend
                .install_to_trust_store(&acquired.certificate.cert)
                .map_err(|e| e.to_string()),
        };
        match attempt {
            Ok(location) => InstallOutcome::Installed(location),
            Err(reason) => {
                warn!(%reason, "certificate installation failed");
                InstallOutcome::Warning(reason)
            }
        }
    }

    fn erase(&self, acquired: &mut AcquiredCertificate) -> EraseOutcome {
        if !acquired.is_ephemeral() {
            return EraseOutcome::Retained;
        }
        let directory = match self.store.directory() {
            Ok(directory) => directory,
            Err(e) => {
                acquired.certificate.key.zeroize();
                return EraseOutcome::Warnings {
                    files: Vec::new(),
                    warnings: vec![EraseWarning {
                        path: None,
                        reason: format!("cannot locate certificate store: {e}"),
                    }],
                };
            }
        };
        // Sweeps leftovers of interrupted one-time sessions too.
        let report =
            SecureEraser::new(directory).erase(&mut acquired.certificate.key, ONE_TIME_PREFIX);
        if report.is_clean() {
            EraseOutcome::Erased {
                files: report.erased_files,
            }
        } else {
            EraseOutcome::Warnings {
                files: report.erased_files,
                warnings: report.warnings,
            }
        }
    }
}
