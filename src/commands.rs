//! Entry points for the three run modes.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::{SignatureState, SignatureStatus, SigningBackend, platform_backend};
use crate::config::{RunMode, SigningConfig};
use crate::error::Result;
use crate::orchestrator::{ProgressSink, SigningOrchestrator, SigningOutcome};
use crate::store::{StoreLocation, UserStoreLocation};
use crate::targets::resolve_targets;

/// Exit status when a command could not run to completion.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub entries: Vec<(PathBuf, SignatureStatus)>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (path, status) in &self.entries {
            write!(f, "{}: {}", path.display(), status.state)?;
            if let Some(signer) = &status.signer_identity {
                write!(f, " (signed by {signer}")?;
                if status.is_self_signed {
                    f.write_str(", self-signed")?;
                }
                f.write_str(")")?;
            }
            if let Some(detail) = &status.detail {
                write!(f, " - {detail}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearReport {
    pub removed: Vec<PathBuf>,
    /// Unsigned files and files signed by someone else.
    pub untouched: Vec<PathBuf>,
    pub errors: Vec<(PathBuf, String)>,
}

impl fmt::Display for ClearReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Removed {} self-signature(s), left {} file(s) untouched",
            self.removed.len(),
            self.untouched.len()
        )?;
        for (path, reason) in &self.errors {
            writeln!(f, "Warning: {}: {reason}", path.display())?;
        }
        Ok(())
    }
}

/// Inspect each file without changing anything.
pub fn report_status(backend: &dyn SigningBackend, files: &[PathBuf]) -> StatusReport {
    let entries = files
        .iter()
        .map(|path| {
            let status = backend.status(path);
            if status.state == SignatureState::Error {
                warn!(path = %path.display(), detail = ?status.detail, "could not inspect signature");
            }
            (path.clone(), status)
        })
        .collect();
    StatusReport { entries }
}

/// Remove this tool's signatures, leaving any other signature alone.
pub fn clear_self_signatures(backend: &dyn SigningBackend, files: &[PathBuf]) -> ClearReport {
    let mut report = ClearReport::default();
    for path in files {
        match backend.remove_self_signature(path) {
            Ok(true) => {
                info!(path = %path.display(), "removed self-signature");
                report.removed.push(path.clone());
            }
            Ok(false) => report.untouched.push(path.clone()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not remove signature");
                report.errors.push((path.clone(), e.to_string()));
            }
        }
    }
    report
}

/// The result of a completed [`execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReport {
    Sign(SigningOutcome),
    Status(StatusReport),
    Clear(ClearReport),
}

impl CommandReport {
    pub fn exit_code(&self) -> i32 {
        match self {
            CommandReport::Sign(outcome) => outcome.exit_code(),
            CommandReport::Status(_) | CommandReport::Clear(_) => 0,
        }
    }
}

impl fmt::Display for CommandReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandReport::Sign(outcome) => fmt::Display::fmt(outcome, f),
            CommandReport::Status(report) => fmt::Display::fmt(report, f),
            CommandReport::Clear(report) => fmt::Display::fmt(report, f),
        }
    }
}

/// Exit status for the result of [`execute`]: 0 for any completed run,
/// non-zero for configuration and certificate acquisition failures.
pub fn exit_code(result: &Result<CommandReport>) -> i32 {
    match result {
        Ok(report) => report.exit_code(),
        Err(_) => EXIT_FAILURE,
    }
}

/// Run `config` against the user's certificate store and this platform's
/// backend.
pub fn execute(config: &SigningConfig, progress: &mut dyn ProgressSink) -> Result<CommandReport> {
    execute_with(
        config,
        Arc::new(UserStoreLocation),
        platform_backend(),
        progress,
    )
}

/// [`execute`] with an explicit store location and backend.
pub fn execute_with(
    config: &SigningConfig,
    location: Arc<dyn StoreLocation>,
    backend: Arc<dyn SigningBackend>,
    progress: &mut dyn ProgressSink,
) -> Result<CommandReport> {
    let acquire = config.validate()?;
    let targets = resolve_targets(&config.patterns, config.recursive)?;
    match config.mode {
        RunMode::Status => Ok(CommandReport::Status(report_status(backend.as_ref(), &targets))),
        RunMode::Clear => Ok(CommandReport::Clear(clear_self_signatures(
            backend.as_ref(),
            &targets,
        ))),
        RunMode::Sign => {
            let orchestrator = SigningOrchestrator::new(location, backend);
            let outcome = orchestrator.run(&acquire, &targets, progress, &CancellationToken::new())?;
            Ok(CommandReport::Sign(outcome))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn any_error_that_ends_a_command_exits_non_zero() {
        for err in [
            Error::Configuration("no files given".to_string()),
            Error::CertAcquisitionFailed("store unreadable".to_string()),
            Error::DecodingError("bad pem".to_string()),
        ] {
            assert_eq!(exit_code(&Err(err)), EXIT_FAILURE);
        }

        let clear = Ok(CommandReport::Clear(ClearReport::default()));
        assert_eq!(exit_code(&clear), 0);
    }
}
