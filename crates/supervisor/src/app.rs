//! Startup sequence and host run loop.
//!
//! Startup runs strictly in order: resolve the child environment, provision
//! the binary, launch it, arm the renewal guardian. Any failure before the
//! launch is fatal. Afterwards the host idles until a termination signal
//! arrives or, with `exit_with_child`, until the child exits.

use std::ffi::OsStr;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use warden_config::{ConfigResolver, EffectiveConfig, SupervisorSettings};

use crate::banner::StartupBanner;
use crate::context::SupervisorContext;
use crate::errors::StartupError;
use crate::process::ProcessInfo;
use crate::provision::{is_cached, Architecture, BinaryProvisioner};
use crate::renewal::{RenewalClient, ScheduledTask};
use crate::shutdown::ShutdownCoordinator;

/// How often the run loop checks whether the child is still alive
pub const LIVENESS_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Key fragments whose values are masked in [`StartupPlan::render`]
const SECRET_MARKERS: &[&str] = &["KEY", "TOKEN", "AUTH", "UUID", "SECRET"];

/// How the run loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Shutdown was requested and has completed
    Shutdown,
    /// The child exited and `exit_with_child` is set
    ChildExited(ExitStatus),
}

impl RunOutcome {
    /// Whether warden should exit with a success code
    pub fn is_success(&self) -> bool {
        match self {
            RunOutcome::Shutdown => true,
            RunOutcome::ChildExited(status) => status.success(),
        }
    }
}

/// What a run would do, computed without touching the network
#[derive(Debug, Clone)]
pub struct StartupPlan {
    pub environment: EffectiveConfig,
    pub architecture: Architecture,
    pub download_url: String,
    pub cache_path: PathBuf,
    pub cached: bool,
    pub renewal_enabled: bool,
}

impl StartupPlan {
    /// Human-readable summary with secret-looking values masked
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Environment:");
        for (key, value) in self.environment.iter() {
            let _ = writeln!(out, "  {}={}", key, mask_value(key, value));
        }
        let _ = writeln!(out, "Binary:");
        let _ = writeln!(out, "  architecture: {}", self.architecture);
        let _ = writeln!(out, "  cache path:   {}", self.cache_path.display());
        let _ = writeln!(out, "  cached:       {}", self.cached);
        let _ = writeln!(out, "  download url: {}", self.download_url);
        let _ = writeln!(
            out,
            "Renewal: {}",
            if self.renewal_enabled { "enabled" } else { "disabled" }
        );
        out
    }
}

/// Mask a value if its key looks like it holds a credential
pub fn mask_value<'a>(key: &str, value: &'a str) -> &'a str {
    let upper = key.to_ascii_uppercase();
    if !value.is_empty() && SECRET_MARKERS.iter().any(|m| upper.contains(m)) {
        "****"
    } else {
        value
    }
}

/// The host process
///
/// Owns the shared [`SupervisorContext`] and the [`ShutdownCoordinator`] for
/// it. Register the coordinator with
/// [`crate::shutdown::register_shutdown_hook`] before calling [`Self::run`].
pub struct Supervisor {
    settings: SupervisorSettings,
    context: Arc<SupervisorContext>,
    coordinator: Arc<ShutdownCoordinator>,
}

impl Supervisor {
    pub fn new(settings: SupervisorSettings) -> Self {
        // An in-flight renewal is bounded by its own timeouts.
        let drain_timeout = settings.renewal.connect_timeout() + settings.renewal.read_timeout();
        let context = Arc::new(SupervisorContext::new(
            settings.process.shutdown_grace(),
            drain_timeout,
        ));
        let coordinator = Arc::new(ShutdownCoordinator::new(Arc::clone(&context)));

        Self {
            settings,
            context,
            coordinator,
        }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    pub fn context(&self) -> &Arc<SupervisorContext> {
        &self.context
    }

    pub fn coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.coordinator
    }

    /// Resolve the environment for the child
    pub fn resolve_environment(&self) -> Result<EffectiveConfig, StartupError> {
        Ok(ConfigResolver::new(&self.settings.override_file).resolve()?)
    }

    /// Describe what [`Self::run`] would do for the host architecture
    pub fn plan(&self) -> Result<StartupPlan, StartupError> {
        let environment = self.resolve_environment()?;
        let architecture = Architecture::host()?;
        let binary = &self.settings.binary;

        Ok(StartupPlan {
            environment,
            architecture,
            download_url: architecture.download_url(&binary.url_template),
            cache_path: binary.cache_path.clone(),
            cached: is_cached(&binary.cache_path),
            renewal_enabled: self.settings.renewal.is_enabled(),
        })
    }

    /// Make sure the binary is in the cache and executable
    pub async fn provision(&self) -> Result<PathBuf, StartupError> {
        let provisioner =
            BinaryProvisioner::from_settings(&self.settings.binary).map_err(StartupError::HttpClient)?;
        Ok(provisioner.ensure_binary().await?)
    }

    /// Launch the child and arm the renewal guardian from settings
    pub async fn launch(
        &self,
        binary: &Path,
        env: &EffectiveConfig,
    ) -> Result<ProcessInfo, StartupError> {
        let client =
            RenewalClient::from_settings(&self.settings.renewal).map_err(StartupError::HttpClient)?;
        self.launch_with::<&OsStr, _>(binary, &[], env, client).await
    }

    /// Launch the child with arguments and arm `renewal` if given
    ///
    /// If shutdown starts while this runs, whatever was started is torn down
    /// again and [`StartupError::Interrupted`] is returned.
    pub async fn launch_with<A, T>(
        &self,
        binary: &Path,
        args: &[A],
        env: &EffectiveConfig,
        renewal: Option<T>,
    ) -> Result<ProcessInfo, StartupError>
    where
        A: AsRef<OsStr>,
        T: ScheduledTask,
    {
        if !self.context.is_running() {
            return Err(StartupError::Interrupted);
        }

        let info = self.context.process().launch_with_args(binary, args, env)?;

        match renewal {
            Some(task) => {
                let renewal = &self.settings.renewal;
                self.context
                    .scheduler()
                    .arm(renewal.initial_delay(), renewal.period(), Arc::new(task));
            }
            None => warn!("Renewal endpoint or API key not configured, renewal guardian disabled"),
        }

        if !self.context.is_running() {
            debug!("Shutdown raced with startup, undoing launch");
            self.context.scheduler().cancel();
            if let Err(e) = self
                .context
                .process()
                .terminate(self.context.shutdown_grace())
                .await
            {
                warn!(error = %e, "Failed to stop supervised process after interrupted startup");
            }
            return Err(StartupError::Interrupted);
        }

        Ok(info)
    }

    /// Run the whole startup sequence, then idle until shutdown
    ///
    /// A shutdown that completes while startup is still in progress ends the
    /// run with [`RunOutcome::Shutdown`].
    pub async fn run(&self) -> Result<RunOutcome, StartupError> {
        let startup = async {
            let env = self.resolve_environment()?;
            let binary = self.provision().await?;
            self.launch(&binary, &env).await
        };

        let info = tokio::select! {
            result = startup => match result {
                Ok(info) => info,
                Err(StartupError::Interrupted) => {
                    self.coordinator.wait_complete().await;
                    return Ok(RunOutcome::Shutdown);
                }
                Err(e) => return Err(e),
            },
            _ = self.coordinator.wait_complete() => return Ok(RunOutcome::Shutdown),
        };

        let armed = self.context.scheduler().is_armed();
        let mut banner = StartupBanner::stdout(self.settings.banner.delay());
        let context = Arc::clone(&self.context);
        let banner = tokio::spawn(async move {
            if !banner.is_enabled() {
                return;
            }
            banner.pause().await;
            if context.is_running() {
                banner.print(Some(&info), armed);
            }
        });

        let outcome = self.wait().await;
        banner.abort();
        Ok(outcome)
    }

    /// Idle until shutdown completes or the child exits
    ///
    /// The child's exit is logged once. With `exit_with_child` set, it also
    /// triggers a full shutdown.
    pub async fn wait(&self) -> RunOutcome {
        let mut ticker = tokio::time::interval(LIVENESS_POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut exit_logged = false;

        loop {
            tokio::select! {
                _ = self.coordinator.wait_complete() => return RunOutcome::Shutdown,
                _ = ticker.tick() => {
                    if exit_logged || self.coordinator.is_shutdown_requested() {
                        continue;
                    }
                    let Some(status) = self.context.process().exit_status() else {
                        continue;
                    };

                    exit_logged = true;
                    let uptime_secs = self
                        .context
                        .process()
                        .info()
                        .map(|info| info.uptime().as_secs());
                    if status.success() {
                        info!(status = %status, uptime_secs = ?uptime_secs, "Supervised process exited");
                    } else {
                        warn!(
                            status = %status,
                            uptime_secs = ?uptime_secs,
                            "Supervised process exited with failure"
                        );
                    }

                    if self.settings.process.exit_with_child {
                        info!("Stopping because the supervised process exited");
                        self.coordinator.shutdown().await;
                        self.coordinator.wait_complete().await;
                        return RunOutcome::ChildExited(status);
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("settings", &self.settings)
            .field("running", &self.context.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renewal::SchedulerState;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct NoopTask;

    #[async_trait]
    impl ScheduledTask for NoopTask {
        async fn run(&self) {}
    }

    fn settings(dir: &TempDir) -> SupervisorSettings {
        let mut settings = SupervisorSettings::default();
        settings.override_file = dir.path().join(".env");
        settings.binary.cache_path = dir.path().join("sbx");
        settings.process.shutdown_grace_secs = 1;
        settings.banner.delay_secs = 0;
        settings
    }

    #[test]
    fn test_mask_value() {
        assert_eq!(mask_value("UUID", "e95c61f3"), "****");
        assert_eq!(mask_value("ARGO_AUTH", "token"), "****");
        assert_eq!(mask_value("ARGO_AUTH", ""), "");
        assert_eq!(mask_value("NAME", "Mc"), "Mc");
    }

    #[test]
    fn test_plan_uses_settings() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(".env"), "NAME=planned\n").unwrap();
        let supervisor = Supervisor::new(settings(&dir));

        // Hosts outside the supported set have nothing to plan.
        let Ok(plan) = supervisor.plan() else {
            return;
        };

        assert_eq!(plan.environment.get("NAME"), Some("planned"));
        assert!(!plan.cached);
        assert!(!plan.renewal_enabled);
        assert!(plan.download_url.starts_with("https://"));
        assert!(!plan.download_url.contains("{arch}"));

        let rendered = plan.render();
        assert!(rendered.contains("NAME=planned"));
        assert!(rendered.contains("UUID=****"));
        assert!(rendered.contains("Renewal: disabled"));
    }

    #[test]
    fn test_plan_fails_on_unreadable_override_file() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(&dir);
        // A directory cannot be read as a file.
        settings.override_file = dir.path().to_path_buf();

        let err = Supervisor::new(settings).plan().unwrap_err();
        assert!(matches!(err, StartupError::Config(_)));
    }

    #[tokio::test]
    async fn test_launch_refused_after_shutdown() {
        let dir = TempDir::new().unwrap();
        let supervisor = Supervisor::new(settings(&dir));
        supervisor.coordinator().shutdown().await;

        let err = supervisor
            .launch_with::<&str, _>(
                Path::new("/bin/sh"),
                &[],
                &EffectiveConfig::default(),
                Some(NoopTask),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StartupError::Interrupted));
        assert!(!supervisor.context().process().was_launched());
        assert_eq!(supervisor.context().scheduler().state(), SchedulerState::Unarmed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_arms_guardian() {
        let dir = TempDir::new().unwrap();
        let supervisor = Supervisor::new(settings(&dir));

        let info = supervisor
            .launch_with(
                Path::new("/bin/sh"),
                &["-c", "sleep 30"],
                &EffectiveConfig::default(),
                Some(NoopTask),
            )
            .await
            .unwrap();

        assert!(info.pid.is_some());
        assert!(supervisor.context().scheduler().is_armed());

        let report = supervisor.coordinator().shutdown().await.unwrap();
        assert!(report.scheduler_cancelled);
        assert!(!supervisor.context().process().is_alive());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_without_renewal_leaves_guardian_unarmed() {
        let dir = TempDir::new().unwrap();
        let supervisor = Supervisor::new(settings(&dir));

        supervisor
            .launch_with::<_, NoopTask>(
                Path::new("/bin/sh"),
                &["-c", "sleep 30"],
                &EffectiveConfig::default(),
                None,
            )
            .await
            .unwrap();

        assert_eq!(supervisor.context().scheduler().state(), SchedulerState::Unarmed);
        supervisor.coordinator().shutdown().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wait_returns_when_child_exits_with_exit_with_child() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(&dir);
        settings.process.exit_with_child = true;
        let supervisor = Supervisor::new(settings);

        supervisor
            .launch_with::<_, NoopTask>(
                Path::new("/bin/sh"),
                &["-c", "exit 3"],
                &EffectiveConfig::default(),
                None,
            )
            .await
            .unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(10), supervisor.wait())
            .await
            .unwrap();

        match outcome {
            RunOutcome::ChildExited(status) => assert_eq!(status.code(), Some(3)),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!outcome.is_success());
        assert!(supervisor.coordinator().is_complete());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wait_keeps_running_after_child_exit_by_default() {
        let dir = TempDir::new().unwrap();
        let supervisor = Arc::new(Supervisor::new(settings(&dir)));

        supervisor
            .launch_with::<_, NoopTask>(
                Path::new("/bin/sh"),
                &["-c", "exit 0"],
                &EffectiveConfig::default(),
                None,
            )
            .await
            .unwrap();

        let waiter = Arc::clone(&supervisor);
        let wait = tokio::spawn(async move { waiter.wait().await });

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!wait.is_finished());

        supervisor.coordinator().shutdown().await;
        let outcome = tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, RunOutcome::Shutdown);
    }
}
