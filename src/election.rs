//! Master election
//!
//! Runs once per process, as one critical section on the shared record. The
//! only check made under the lock is the null-signal existence check, which
//! never blocks.

use crate::core::models::{Role, SharedRecord};
use crate::core::shared_record::SharedStore;
use crate::error::WardenResult;
use crate::platform::ProcessControl;
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionOutcome {
    /// First process on a fresh record.
    Initialized,
    /// The record already names this pid as master.
    Reentered,
    /// Another live master exists.
    Joined { master: u32 },
    /// The recorded master is dead; this process took over.
    FailedOver { previous: u32 },
    /// Record in use but no master claimed (the last one shut down cleanly).
    Claimed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Election {
    pub role: Role,
    pub outcome: ElectionOutcome,
}

impl fmt::Display for ElectionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElectionOutcome::Initialized => {
                write!(f, "This process is MASTER (initialized shared memory)")
            }
            ElectionOutcome::Reentered => write!(f, "This process already holds MASTER"),
            ElectionOutcome::Joined { master } => write!(
                f,
                "Master already exists (PID: {master}). This process is SUBORDINATE"
            ),
            ElectionOutcome::FailedOver { previous } => {
                write!(f, "Master (PID: {previous}) died. This process is now MASTER")
            }
            ElectionOutcome::Claimed => write!(f, "No master found. This process is now MASTER"),
        }
    }
}

/// The decision itself, on an already locked record.
pub fn decide(record: &mut SharedRecord, self_pid: u32, control: &dyn ProcessControl) -> Election {
    let outcome = if record.is_fresh() {
        record.claim_master(self_pid);
        record.last_respawn_time = 0;
        record.reset_workers();
        ElectionOutcome::Initialized
    } else if record.is_master_held {
        if record.master_id == self_pid {
            ElectionOutcome::Reentered
        } else if control.is_alive(record.master_id) {
            ElectionOutcome::Joined {
                master: record.master_id,
            }
        } else {
            let previous = record.master_id;
            record.claim_master(self_pid);
            // workers of the dead master are abandoned, counter carries over
            record.reset_workers();
            ElectionOutcome::FailedOver { previous }
        }
    } else {
        record.claim_master(self_pid);
        ElectionOutcome::Claimed
    };

    let role = match outcome {
        ElectionOutcome::Joined { .. } => Role::Subordinate,
        _ => Role::Master,
    };

    Election { role, outcome }
}

/// Lock, decide, unlock, then log.
pub fn elect(store: &SharedStore, control: &dyn ProcessControl) -> WardenResult<Election> {
    let self_pid = control.current_pid();
    let election = store.with_lock(|record| decide(record, self_pid, control))?;

    match election.outcome {
        ElectionOutcome::FailedOver { previous } => {
            warn!(previous, pid = self_pid, "stale master detected, failing over");
        }
        outcome => info!(pid = self_pid, role = %election.role, "{outcome}"),
    }

    Ok(election)
}

/// Give the role back on shutdown, unless a newer master already took it.
pub fn release(store: &SharedStore, self_pid: u32) -> WardenResult<bool> {
    let released = store.with_lock(|record| record.release_master(self_pid))?;
    if released {
        info!(pid = self_pid, "master role released");
    } else {
        warn!(pid = self_pid, "master role no longer ours, leaving record untouched");
    }
    Ok(released)
}
