//! Warden - main entry point
//!
//! Provisions and launches the supervised binary, keeps its lease renewed
//! and tears everything down on SIGINT/SIGTERM.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use warden::{register_shutdown_hook, Supervisor};
use warden_config::SupervisorSettings;

/// Warden - keeps a leased workload running
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Settings file (TOML)
    #[arg(short = 's', long = "settings", env = "WARDEN_SETTINGS", global = true)]
    settings: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(flatten)]
    overrides: SettingsOverrides,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Provision, launch and supervise (default)
    Run,
    /// Print the effective configuration and download URL, then exit
    Check,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

/// Settings that can be overridden from the command line or environment
#[derive(Args, Debug)]
struct SettingsOverrides {
    /// Override file for the supervised process environment
    #[arg(long, env = "WARDEN_OVERRIDE_FILE", global = true)]
    override_file: Option<PathBuf>,

    /// Cache location of the supervised binary
    #[arg(long, env = "WARDEN_BINARY_CACHE", global = true)]
    binary_cache: Option<PathBuf>,

    /// Download URL template containing `{arch}`
    #[arg(long, env = "WARDEN_BINARY_URL_TEMPLATE", global = true)]
    binary_url_template: Option<String>,

    /// Renewal endpoint URL
    #[arg(long, env = "WARDEN_RENEWAL_ENDPOINT", global = true)]
    renewal_endpoint: Option<String>,

    /// Bearer credential for the renewal endpoint
    #[arg(long, env = "WARDEN_RENEWAL_API_KEY", hide_env_values = true, global = true)]
    renewal_api_key: Option<String>,

    /// Seconds before the first renewal
    #[arg(long, env = "WARDEN_RENEWAL_INITIAL_DELAY_SECS", global = true)]
    renewal_initial_delay_secs: Option<u64>,

    /// Seconds between renewals
    #[arg(long, env = "WARDEN_RENEWAL_PERIOD_SECS", global = true)]
    renewal_period_secs: Option<u64>,

    /// Seconds the child gets to exit before it is killed
    #[arg(long, env = "WARDEN_SHUTDOWN_GRACE_SECS", global = true)]
    shutdown_grace_secs: Option<u64>,

    /// Stop warden when the supervised process exits
    #[arg(long, env = "WARDEN_EXIT_WITH_CHILD", global = true)]
    exit_with_child: bool,

    /// Seconds before the startup banner; 0 disables it
    #[arg(long, env = "WARDEN_BANNER_DELAY_SECS", global = true)]
    banner_delay_secs: Option<u64>,
}

impl SettingsOverrides {
    fn apply(self, settings: &mut SupervisorSettings) {
        if let Some(path) = self.override_file {
            settings.override_file = path;
        }
        if let Some(path) = self.binary_cache {
            settings.binary.cache_path = path;
        }
        if let Some(template) = self.binary_url_template {
            settings.binary.url_template = template;
        }
        if let Some(endpoint) = self.renewal_endpoint {
            settings.renewal.endpoint = Some(endpoint);
        }
        if let Some(key) = self.renewal_api_key {
            settings.renewal.api_key = Some(key);
        }
        if let Some(secs) = self.renewal_initial_delay_secs {
            settings.renewal.initial_delay_secs = secs;
        }
        if let Some(secs) = self.renewal_period_secs {
            settings.renewal.period_secs = secs;
        }
        if let Some(secs) = self.shutdown_grace_secs {
            settings.process.shutdown_grace_secs = secs;
        }
        if self.exit_with_child {
            settings.process.exit_with_child = true;
        }
        if let Some(secs) = self.banner_delay_secs {
            settings.banner.delay_secs = secs;
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let settings = load_settings(cli.settings.as_deref(), cli.overrides)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Check => check(settings),
        Commands::Run => run(settings),
    }
}

fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    match format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

/// Defaults, then the settings file, then command line and environment
fn load_settings(path: Option<&Path>, overrides: SettingsOverrides) -> Result<SupervisorSettings> {
    let mut settings = match path {
        Some(path) => {
            info!("Loading settings from: {}", path.display());
            SupervisorSettings::from_file(path).context("Failed to load settings file")?
        }
        None => SupervisorSettings::default(),
    };

    overrides.apply(&mut settings);
    settings.validate().context("Settings validation failed")?;
    Ok(settings)
}

/// Print what a run would do and exit
fn check(settings: SupervisorSettings) -> Result<ExitCode> {
    let supervisor = Supervisor::new(settings);
    let plan = supervisor.plan().context("Configuration check failed")?;

    print!("{}", plan.render());
    println!("warden: configuration check is successful");

    Ok(ExitCode::SUCCESS)
}

fn run(settings: SupervisorSettings) -> Result<ExitCode> {
    info!(version = env!("CARGO_PKG_VERSION"), "Starting warden");

    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async {
        let supervisor = Supervisor::new(settings);
        let _hook = register_shutdown_hook(std::sync::Arc::clone(supervisor.coordinator()))
            .context("Failed to register signal handlers")?;

        match supervisor.run().await {
            Ok(outcome) => {
                info!(outcome = ?outcome, "Warden stopped");
                Ok(if outcome.is_success() {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                })
            }
            Err(e) => {
                error!(error = %e, "Startup failed");
                supervisor.coordinator().shutdown().await;
                Err(anyhow::Error::new(e).context("Startup failed"))
            }
        }
    })
}
