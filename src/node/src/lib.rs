//! Garm daemon
//!
//! Loads the configuration file, wires the mapping engine, the credential
//! manager and the policy-service client into the traffic and liveness
//! listeners, and runs them until a signal or a listener failure.

pub mod config;
pub mod daemon;
pub mod logging;

pub use config::Config;
pub use daemon::Daemon;
pub use logging::{init_tracing, TraceToggles};
