//! Startup narration
//!
//! Purely cosmetic: after a pause, tells the operator the workload is up.
//! Kept apart from the renewal timeline so it can be disabled or stubbed.

use std::io::Write;
use std::time::Duration;

use tracing::debug;

use crate::process::ProcessInfo;

/// Prints the "running" banner after a delay
pub struct StartupBanner<W> {
    delay: Duration,
    out: W,
}

impl StartupBanner<std::io::Stdout> {
    /// Banner written to stdout
    pub fn stdout(delay: Duration) -> Self {
        Self::new(delay, std::io::stdout())
    }
}

impl<W: Write> StartupBanner<W> {
    pub fn new(delay: Duration, out: W) -> Self {
        Self { delay, out }
    }

    /// Whether the banner is printed at all
    pub fn is_enabled(&self) -> bool {
        !self.delay.is_zero()
    }

    /// Wait, then print the banner
    ///
    /// A zero delay disables the banner entirely.
    pub async fn show(&mut self, process: Option<&ProcessInfo>, guardian_armed: bool) {
        if !self.is_enabled() {
            debug!("Startup banner disabled");
            return;
        }

        self.pause().await;
        self.print(process, guardian_armed);
    }

    /// The delay before the banner
    pub async fn pause(&self) {
        tokio::time::sleep(self.delay).await;
    }

    /// Print the banner now
    pub fn print(&mut self, process: Option<&ProcessInfo>, guardian_armed: bool) {
        if let Err(e) = self.write(process, guardian_armed) {
            debug!(error = %e, "Failed to write startup banner");
        }
    }

    fn write(&mut self, process: Option<&ProcessInfo>, guardian_armed: bool) -> std::io::Result<()> {
        writeln!(self.out)?;
        match process.and_then(|p| p.pid) {
            Some(pid) => writeln!(self.out, "Supervised process is running (pid {}).", pid)?,
            None => writeln!(self.out, "Supervised process is running.")?,
        }
        if guardian_armed {
            writeln!(self.out, "Renewal guardian is armed.")?;
        } else {
            writeln!(self.out, "Renewal guardian is not configured.")?;
        }
        writeln!(self.out, "Press Ctrl-C to stop.")?;
        self.out.flush()
    }

    /// Recover the writer
    pub fn into_inner(self) -> W {
        self.out
    }
}
