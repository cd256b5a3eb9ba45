//! Warden - host-side supervisor for a leased workload
//!
//! Warden resolves the environment for a single supervised binary, downloads
//! that binary for the host architecture if it is not cached, launches it,
//! and keeps the hosting lease alive with a periodic renewal call until the
//! host is told to stop.
//!
//! # Architecture
//!
//! - [`provision`] - architecture mapping, download and cache
//! - [`process`] - the one supervised child
//! - [`renewal`] - the renewal timeline and its HTTP call
//! - [`shutdown`] - signal handling and one-shot teardown
//! - [`app`] - the startup sequence tying them together
//!
//! Environment resolution and settings live in the `warden-config` crate.

pub mod app;
pub mod banner;
pub mod context;
pub mod errors;
pub mod process;
pub mod provision;
pub mod renewal;
pub mod shutdown;

pub use app::{mask_value, RunOutcome, StartupPlan, Supervisor};
pub use banner::StartupBanner;
pub use context::SupervisorContext;
pub use errors::StartupError;
pub use process::{ProcessError, ProcessInfo, ProcessSupervisor, TerminationOutcome};
pub use provision::{Architecture, BinaryProvisioner, BinarySource, HttpBinarySource, ProvisionError};
pub use renewal::{
    RenewalClient, RenewalEndpoint, RenewalOutcome, RenewalScheduler, ScheduledTask,
    SchedulerState,
};
pub use shutdown::{register_shutdown_hook, ShutdownCoordinator, ShutdownReport};
