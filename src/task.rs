//! Running the pipeline off the caller's thread.

use std::path::PathBuf;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::orchestrator::{SigningOrchestrator, SigningOutcome};
use crate::store::AcquireMode;

/// A signing run in progress on the blocking thread pool.
#[derive(Debug)]
pub struct SigningTask {
    /// One line per milestone; closed when the run ends.
    pub progress: UnboundedReceiver<String>,
    cancel: CancellationToken,
    handle: JoinHandle<Result<SigningOutcome>>,
}

impl SigningTask {
    /// Ask the run to stop before its next file. Install and erase still run.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the outcome.
    pub async fn join(self) -> Result<SigningOutcome> {
        self.handle
            .await
            .map_err(|e| Error::BackgroundTask(e.to_string()))?
    }
}

/// Start `orchestrator.run` on a blocking task. Must be called within a
/// Tokio runtime.
pub fn spawn_signing(
    orchestrator: SigningOrchestrator,
    mode: AcquireMode,
    targets: Vec<PathBuf>,
) -> SigningTask {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handle = tokio::task::spawn_blocking(move || {
        let mut tx = tx;
        let outcome = orchestrator.run(&mode, &targets, &mut tx, &token);
        debug!(ok = outcome.is_ok(), "background signing run finished");
        outcome
    });
    SigningTask {
        progress: rx,
        cancel,
        handle,
    }
}
