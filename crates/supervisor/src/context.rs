//! Shared supervisor state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::process::ProcessSupervisor;
use crate::renewal::RenewalScheduler;

/// State shared between the main control flow and the shutdown path
///
/// Owned by the main flow behind an `Arc` and handed to the
/// [`crate::shutdown::ShutdownCoordinator`].
#[derive(Debug)]
pub struct SupervisorContext {
    running: AtomicBool,
    process: ProcessSupervisor,
    scheduler: RenewalScheduler,
    shutdown_grace: Duration,
    drain_timeout: Duration,
}

impl SupervisorContext {
    /// Create a context
    ///
    /// * `shutdown_grace` - how long the child gets to exit before it is killed
    /// * `drain_timeout` - how long an in-flight renewal may take after cancel
    pub fn new(shutdown_grace: Duration, drain_timeout: Duration) -> Self {
        Self {
            running: AtomicBool::new(true),
            process: ProcessSupervisor::new(),
            scheduler: RenewalScheduler::new(),
            shutdown_grace,
            drain_timeout,
        }
    }

    pub fn process(&self) -> &ProcessSupervisor {
        &self.process
    }

    pub fn scheduler(&self) -> &RenewalScheduler {
        &self.scheduler
    }

    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Whether the host is still in its running phase
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_stopped(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
