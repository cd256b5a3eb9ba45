//! Background renewal scheduler
//!
//! Fires a task once after an initial delay and then at a fixed period on a
//! dedicated tokio task. The scheduler moves one way through
//! `Unarmed -> Armed -> Cancelled`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Work run on every firing
///
/// Implementations must contain their own failures; the scheduler only
/// guards against panics.
#[async_trait]
pub trait ScheduledTask: Send + Sync + 'static {
    /// Name used in logs
    fn name(&self) -> &str {
        "scheduled-task"
    }

    /// Run one firing
    async fn run(&self);
}

/// Observable scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Unarmed,
    Armed,
    Cancelled,
}

enum Timeline {
    Unarmed,
    Armed {
        cancel: CancellationToken,
        handle: JoinHandle<()>,
    },
    Cancelled {
        handle: Option<JoinHandle<()>>,
    },
}

/// Recurring task scheduler with at most one active timeline
///
/// Firings never overlap: the next firing is not started until the previous
/// one returned. Cancellation stops future firings but lets one already in
/// flight finish.
pub struct RenewalScheduler {
    timeline: Mutex<Timeline>,
    fired: Arc<AtomicU64>,
}

impl RenewalScheduler {
    /// Create an unarmed scheduler
    pub fn new() -> Self {
        Self {
            timeline: Mutex::new(Timeline::Unarmed),
            fired: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current state
    pub fn state(&self) -> SchedulerState {
        match &*self.timeline.lock() {
            Timeline::Unarmed => SchedulerState::Unarmed,
            Timeline::Armed { .. } => SchedulerState::Armed,
            Timeline::Cancelled { .. } => SchedulerState::Cancelled,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.state() == SchedulerState::Armed
    }

    /// Number of firings started so far
    pub fn fired_count(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }

    /// Start the timeline
    ///
    /// Fires `task` once after `initial_delay`, then every `period` measured
    /// from the start of that first firing. Must be called from within a
    /// tokio runtime.
    ///
    /// Returns `false` without starting anything if the scheduler is already
    /// armed or has been cancelled, or if `period` is zero.
    pub fn arm<T: ScheduledTask>(
        &self,
        initial_delay: Duration,
        period: Duration,
        task: Arc<T>,
    ) -> bool {
        if period.is_zero() {
            error!(task = task.name(), "Renewal period must be greater than zero, guardian not armed");
            return false;
        }

        let mut timeline = self.timeline.lock();

        match &*timeline {
            Timeline::Armed { .. } => {
                info!(task = task.name(), "Renewal guardian already running");
                return false;
            }
            Timeline::Cancelled { .. } => {
                warn!(task = task.name(), "Renewal guardian was cancelled and cannot be re-armed");
                return false;
            }
            Timeline::Unarmed => {}
        }

        info!(
            task = task.name(),
            initial_delay_secs = initial_delay.as_secs(),
            period_secs = period.as_secs(),
            "Starting renewal guardian"
        );

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_timeline(
            task,
            initial_delay,
            period,
            cancel.clone(),
            Arc::clone(&self.fired),
        ));

        *timeline = Timeline::Armed { cancel, handle };
        true
    }

    /// Stop all future firings
    ///
    /// Returns `true` if this call moved the scheduler from armed to
    /// cancelled.
    pub fn cancel(&self) -> bool {
        let mut timeline = self.timeline.lock();

        match std::mem::replace(&mut *timeline, Timeline::Unarmed) {
            Timeline::Armed { cancel, handle } => {
                cancel.cancel();
                *timeline = Timeline::Cancelled {
                    handle: Some(handle),
                };
                info!(fired = self.fired_count(), "Renewal guardian cancelled");
                true
            }
            other => {
                *timeline = other;
                debug!("Renewal guardian not armed, nothing to cancel");
                false
            }
        }
    }

    /// Wait for a cancelled timeline to wind down
    ///
    /// Gives a firing that was in flight at cancellation up to `timeout` to
    /// finish. Returns `true` if the timeline has stopped.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let handle = {
            let mut timeline = self.timeline.lock();
            match &mut *timeline {
                Timeline::Cancelled { handle } => handle.take(),
                _ => None,
            }
        };

        let Some(handle) = handle else {
            return true;
        };

        match tokio::time::timeout(timeout, handle).await {
            Ok(_) => {
                debug!("Renewal timeline stopped");
                true
            }
            Err(_) => {
                warn!(
                    timeout_secs = timeout.as_secs(),
                    "Renewal still in flight after drain timeout"
                );
                false
            }
        }
    }
}

impl Default for RenewalScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RenewalScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewalScheduler")
            .field("state", &self.state())
            .field("fired", &self.fired_count())
            .finish()
    }
}

async fn run_timeline<T: ScheduledTask>(
    task: Arc<T>,
    initial_delay: Duration,
    period: Duration,
    cancel: CancellationToken,
    fired: Arc<AtomicU64>,
) {
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(initial_delay) => {}
    }

    let first = Instant::now();
    fire(&task, &fired).await;

    let mut ticker = interval_at(first + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        debug!(task = task.name(), "Running scheduled renewal");
        fire(&task, &fired).await;
    }

    debug!(task = task.name(), "Renewal timeline finished");
}

/// Run one firing on its own task so a panic stays contained
async fn fire<T: ScheduledTask>(task: &Arc<T>, fired: &AtomicU64) {
    fired.fetch_add(1, Ordering::Relaxed);

    let task = Arc::clone(task);
    let name = task.name().to_string();
    if let Err(e) = tokio::spawn(async move { task.run().await }).await {
        error!(task = %name, error = %e, "Scheduled task panicked");
    }
}
