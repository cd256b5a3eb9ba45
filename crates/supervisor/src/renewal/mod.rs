//! Lease renewal guardian
//!
//! - [`RenewalScheduler`] - one background timeline, armed once, cancelled once
//! - [`RenewalClient`] - the HTTP call, implementing [`ScheduledTask`]
//!
//! Renewal failures are logged and otherwise ignored; they never reach the
//! scheduler's timeline or the supervised process.

mod client;
mod scheduler;

pub use client::{RenewalClient, RenewalEndpoint, RenewalOutcome};
pub use scheduler::{RenewalScheduler, ScheduledTask, SchedulerState};
