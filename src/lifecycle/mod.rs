//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → server stops accepting → drain → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//!     SIGHUP → reload the configuration file
//! ```
//!
//! # Design Decisions
//! - Config and gateway are built before the listener binds
//! - One broadcast channel fans shutdown out to every long-running task

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
