//! Signal handling for shutdown.
//!
//! Bridges OS termination signals with the async runtime and routes them to
//! the [`ShutdownCoordinator`].

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::coordinator::ShutdownCoordinator;

/// Signal type received by the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalType {
    /// SIGINT / Ctrl-C
    Interrupt,
    /// SIGTERM
    Terminate,
}

/// Listens for termination signals
///
/// Handlers are installed when the listener is created, so signals arriving
/// between creation and the first [`Self::recv`] are not lost.
pub struct SignalListener {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl SignalListener {
    /// Install signal handlers
    ///
    /// Must be called from within a tokio runtime.
    #[cfg(unix)]
    pub fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        debug!("Installing signal handlers");
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn new() -> std::io::Result<Self> {
        debug!("Installing Ctrl-C handler");
        Ok(Self {})
    }

    /// Wait for the next signal
    ///
    /// Returns `None` if the runtime's signal driver went away.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> Option<SignalType> {
        let signal = tokio::select! {
            received = self.interrupt.recv() => received.map(|_| SignalType::Interrupt),
            received = self.terminate.recv() => received.map(|_| SignalType::Terminate),
        };
        if let Some(ref s) = signal {
            debug!(signal = ?s, "Received signal");
        }
        signal
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> Option<SignalType> {
        tokio::signal::ctrl_c().await.ok()?;
        debug!("Received Ctrl-C");
        Some(SignalType::Interrupt)
    }
}

impl std::fmt::Debug for SignalListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalListener").finish_non_exhaustive()
    }
}

/// Register the shutdown hook
///
/// Every termination signal triggers [`ShutdownCoordinator::shutdown`]; the
/// coordinator's gate makes all but the first a no-op. The returned task
/// runs until the signal driver shuts down.
pub fn register_shutdown_hook(
    coordinator: Arc<ShutdownCoordinator>,
) -> std::io::Result<JoinHandle<()>> {
    let listener = SignalListener::new()?;
    Ok(spawn_hook(listener, coordinator))
}

fn spawn_hook(mut listener: SignalListener, coordinator: Arc<ShutdownCoordinator>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(signal) = listener.recv().await {
            if coordinator.is_shutdown_requested() {
                warn!(signal = ?signal, "Shutdown already in progress");
                continue;
            }

            info!(signal = ?signal, "Received shutdown signal, initiating graceful shutdown");
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator.shutdown().await;
            });
        }
        debug!("Signal listener stopped");
    })
}
