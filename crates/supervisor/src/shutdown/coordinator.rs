//! Shutdown coordination.
//!
//! Tears down the supervised process and the renewal guardian exactly once,
//! no matter how many termination signals arrive or how far startup got.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::SupervisorContext;
use crate::process::TerminationOutcome;

/// What a shutdown did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Child termination result; `None` if terminating failed
    pub process: Option<TerminationOutcome>,
    /// Whether an armed scheduler was cancelled
    pub scheduler_cancelled: bool,
    /// Whether the scheduler timeline stopped within the drain timeout
    pub scheduler_drained: bool,
}

/// Single-use teardown of a [`SupervisorContext`]
pub struct ShutdownCoordinator {
    context: Arc<SupervisorContext>,
    /// Gate: set by the first caller of [`Self::shutdown`]
    started: AtomicBool,
    /// Fired once teardown finished
    completed: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator for a context
    pub fn new(context: Arc<SupervisorContext>) -> Self {
        Self {
            context,
            started: AtomicBool::new(false),
            completed: CancellationToken::new(),
        }
    }

    pub fn context(&self) -> &Arc<SupervisorContext> {
        &self.context
    }

    /// Whether shutdown has been requested
    pub fn is_shutdown_requested(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Whether teardown finished
    pub fn is_complete(&self) -> bool {
        self.completed.is_cancelled()
    }

    /// Wait until teardown finished
    pub async fn wait_complete(&self) {
        self.completed.cancelled().await
    }

    /// Run the teardown
    ///
    /// In order: mark the host as no longer running, terminate the child if
    /// it is alive, cancel the scheduler if it is armed. Only the first call
    /// does anything; later calls return `None` immediately.
    pub async fn shutdown(&self) -> Option<ShutdownReport> {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Shutdown already in progress");
            return None;
        }

        info!("Shutting down");
        self.context.mark_stopped();

        let process = self.context.process();
        let process_outcome = if process.is_alive() {
            match process.terminate(self.context.shutdown_grace()).await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    error!(error = %e, "Failed to terminate supervised process");
                    None
                }
            }
        } else {
            debug!("Supervised process not running");
            Some(TerminationOutcome::NotRunning)
        };

        let scheduler = self.context.scheduler();
        let scheduler_cancelled = scheduler.is_armed() && scheduler.cancel();
        let scheduler_drained = scheduler.drain(self.context.drain_timeout()).await;
        if !scheduler_drained {
            warn!("Renewal guardian did not stop in time");
        }

        let report = ShutdownReport {
            process: process_outcome,
            scheduler_cancelled,
            scheduler_drained,
        };
        info!(
            process = ?report.process,
            scheduler_cancelled = report.scheduler_cancelled,
            "Shutdown complete"
        );

        self.completed.cancel();
        Some(report)
    }
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("started", &self.is_shutdown_requested())
            .field("complete", &self.is_complete())
            .finish()
    }
}
