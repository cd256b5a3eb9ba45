//! Supervised child process lifecycle
//!
//! Exactly one child is launched per run. Its stdout is the host's stdout and
//! its stderr is merged into that same stream, so the child's logs show up
//! live without being captured. A crashed child is not restarted.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};
use warden_config::EffectiveConfig;

/// Errors that can occur while launching or stopping the child
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The OS refused to start the binary
    #[error("failed to spawn {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A child was already launched during this run
    #[error("a supervised process has already been launched")]
    AlreadyLaunched,

    /// Sending a termination signal failed
    #[error("failed to signal process {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    /// IO error while waiting on the child
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a termination request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// Nothing to stop: never launched, already exited, or already terminated
    NotRunning,
    /// The child exited within the grace period
    Exited(ExitStatus),
    /// The child ignored the graceful request and was killed
    Killed,
}

/// Snapshot of a launched child
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub pid: Option<u32>,
    pub path: PathBuf,
    pub started_at: DateTime<Utc>,
}

impl ProcessInfo {
    /// Time since launch
    pub fn uptime(&self) -> Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or_default()
    }
}

/// The one external child process of this run
#[derive(Debug)]
struct SupervisedProcess {
    info: ProcessInfo,
    env: EffectiveConfig,
    child: Child,
    exit_status: Option<ExitStatus>,
}

impl SupervisedProcess {
    fn poll_exit(&mut self) -> Option<ExitStatus> {
        if self.exit_status.is_none() {
            match self.child.try_wait() {
                Ok(status) => self.exit_status = status,
                Err(e) => warn!(error = %e, "Failed to poll supervised process"),
            }
        }
        self.exit_status
    }
}

/// Owns the lifecycle of the supervised child
#[derive(Debug, Default)]
pub struct ProcessSupervisor {
    process: Mutex<Option<SupervisedProcess>>,
    launched: Mutex<bool>,
}

impl ProcessSupervisor {
    /// Create a supervisor with no child
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch the binary at `path` with `env` injected
    ///
    /// The child inherits the host environment with the resolved keys layered
    /// on top.
    ///
    /// # Errors
    ///
    /// [`ProcessError::AlreadyLaunched`] on a second call, otherwise
    /// [`ProcessError::Spawn`] when the OS cannot start the binary.
    pub fn launch(&self, path: &Path, env: &EffectiveConfig) -> Result<ProcessInfo, ProcessError> {
        self.launch_with_args::<&OsStr>(path, &[], env)
    }

    /// Launch the binary with command-line arguments
    pub fn launch_with_args<A: AsRef<OsStr>>(
        &self,
        path: &Path,
        args: &[A],
        env: &EffectiveConfig,
    ) -> Result<ProcessInfo, ProcessError> {
        let mut launched = self.launched.lock();
        if *launched {
            return Err(ProcessError::AlreadyLaunched);
        }

        let spawn_err = |source| ProcessError::Spawn {
            path: path.to_path_buf(),
            source,
        };

        let child = Command::new(path)
            .args(args)
            .envs(env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(merged_stderr().map_err(spawn_err)?)
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        let info = ProcessInfo {
            pid: child.id(),
            path: path.to_path_buf(),
            started_at: Utc::now(),
        };

        info!(
            pid = ?info.pid,
            path = %path.display(),
            env_keys = env.len(),
            "Supervised process launched"
        );

        *self.process.lock() = Some(SupervisedProcess {
            info: info.clone(),
            env: env.clone(),
            child,
            exit_status: None,
        });
        *launched = true;

        Ok(info)
    }

    /// Information about the launched child, if it is still owned
    pub fn info(&self) -> Option<ProcessInfo> {
        self.process.lock().as_ref().map(|p| p.info.clone())
    }

    /// Environment the child was launched with
    pub fn environment(&self) -> Option<EffectiveConfig> {
        self.process.lock().as_ref().map(|p| p.env.clone())
    }

    /// Whether a child was ever launched during this run
    pub fn was_launched(&self) -> bool {
        *self.launched.lock()
    }

    /// Whether the child is currently running
    pub fn is_alive(&self) -> bool {
        match self.process.lock().as_mut() {
            Some(process) => process.poll_exit().is_none(),
            None => false,
        }
    }

    /// Exit status of the child if it has exited on its own
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.process.lock().as_mut().and_then(|p| p.poll_exit())
    }

    /// Stop the child
    ///
    /// Sends a graceful termination request, waits up to `grace` for the
    /// child to exit and force-kills it afterwards. Calling this when no
    /// child is running is a no-op returning [`TerminationOutcome::NotRunning`].
    pub async fn terminate(&self, grace: Duration) -> Result<TerminationOutcome, ProcessError> {
        let taken = self.process.lock().take();
        let Some(mut process) = taken else {
            debug!("No supervised process to terminate");
            return Ok(TerminationOutcome::NotRunning);
        };

        if let Some(status) = process.poll_exit() {
            debug!(status = %status, "Supervised process already exited");
            return Ok(TerminationOutcome::NotRunning);
        }

        let pid = process.info.pid;
        info!(pid = ?pid, grace_secs = grace.as_secs_f64(), "Terminating supervised process");

        if !request_termination(&mut process.child, pid)? {
            let status = process.child.wait().await?;
            return Ok(TerminationOutcome::Exited(status));
        }

        match tokio::time::timeout(grace, process.child.wait()).await {
            Ok(Ok(status)) => {
                info!(pid = ?pid, status = %status, "Supervised process terminated");
                Ok(TerminationOutcome::Exited(status))
            }
            Ok(Err(e)) => Err(ProcessError::Io(e)),
            Err(_) => {
                warn!(
                    pid = ?pid,
                    grace_secs = grace.as_secs_f64(),
                    "Supervised process ignored termination request, killing"
                );
                process.child.kill().await?;
                Ok(TerminationOutcome::Killed)
            }
        }
    }
}

/// Ask the child to exit
///
/// Returns `false` when the child turned out to be gone already.
#[cfg(unix)]
fn request_termination(_child: &mut Child, pid: Option<u32>) -> Result<bool, ProcessError> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else {
        return Ok(false);
    };

    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(errno) => Err(ProcessError::Signal {
            pid,
            source: std::io::Error::from(errno),
        }),
    }
}

/// Ask the child to exit
///
/// Without POSIX signals the only request available is a hard kill.
#[cfg(not(unix))]
fn request_termination(child: &mut Child, _pid: Option<u32>) -> Result<bool, ProcessError> {
    child.start_kill()?;
    Ok(true)
}

/// A handle for the child's stderr that writes into the host's stdout
#[cfg(unix)]
fn merged_stderr() -> std::io::Result<Stdio> {
    use std::os::fd::AsFd;

    let fd = std::io::stdout().as_fd().try_clone_to_owned()?;
    Ok(Stdio::from(fd))
}

#[cfg(not(unix))]
fn merged_stderr() -> std::io::Result<Stdio> {
    Ok(Stdio::inherit())
}
