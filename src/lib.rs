//! Counter-Warden Library
//!
//! A counter shared by cooperating processes through a named memory segment,
//! with master election, failover and supervised worker processes.

pub mod commands;
pub mod config;
pub mod core;
pub mod election;
pub mod error;
pub mod journal;
pub mod platform;
pub mod runtime;
pub mod signal;
pub mod supervisor;
pub mod tasks;
pub mod utils;
pub mod worker;

// Re-export commonly used types for convenience
pub use config::Settings;
pub use core::models::{Role, SharedRecord, WorkerRole, WorkerSlot};
pub use core::shared_record::SharedStore;
pub use election::{Election, ElectionOutcome};
pub use error::{WardenError, WardenResult};
pub use journal::Journal;
pub use platform::{Liveness, ProcessControl, ReapStatus, SystemProcessControl};
pub use supervisor::{TickReport, WorkerSupervisor};
pub use tasks::{CancellationToken, TaskSet};
