//! Host shutdown
//!
//! [`register_shutdown_hook`] wires SIGINT/SIGTERM to a
//! [`ShutdownCoordinator`], which stops the supervised process and cancels
//! the renewal guardian exactly once.

mod coordinator;
mod signals;

pub use coordinator::{ShutdownCoordinator, ShutdownReport};
pub use signals::{register_shutdown_hook, SignalListener, SignalType};
