//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Running:
//!     handlers → tasks.rs (register background work, e.g. emails)
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Draining → stop accepting → in-flight requests
//!     get a bounded grace period → wait for background tasks → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain requests, drain tasks, stop
//! - Request drain has a deadline; the background-task drain does not

pub mod shutdown;
pub mod signals;
pub mod tasks;

pub use shutdown::{Shutdown, ShutdownState};
pub use tasks::BackgroundTasks;
