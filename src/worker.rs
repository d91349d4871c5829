//! Short-lived worker processes.
//!
//! A worker attaches to the existing segment (it never creates one), performs
//! its single operation on the counter and exits. Workers do not take part in
//! the election.

use crate::config::Settings;
use crate::core::models::WorkerRole;
use crate::core::shared_record::SharedStore;
use crate::error::WardenResult;
use crate::journal::Journal;
use std::thread;
use std::time::Duration;
use tracing::{error, info};

/// `counter += increment` in one locked step. Returns the new value.
pub fn add(store: &SharedStore, increment: i64) -> WardenResult<i64> {
    store.with_lock(|record| {
        record.counter = record.counter.wrapping_add(increment);
        record.counter
    })
}

/// Multiply, hold without the lock, divide back. Each step is journaled as
/// soon as the lock is released. Returns the values after each step.
///
/// Other processes observe the inflated value during `hold`, and increments
/// made meanwhile are divided too.
pub fn multiply_and_restore(
    store: &SharedStore,
    factor: i64,
    hold: Duration,
    journal: &Journal,
) -> WardenResult<(i64, i64)> {
    let multiplied = store.with_lock(|record| {
        record.counter = record.counter.wrapping_mul(factor);
        record.counter
    })?;
    info!(multiplied, factor, "multiplied");
    journal.record(
        WorkerRole::Multiplier,
        format!("Multiplied by {factor}. New value: {multiplied}"),
    );

    thread::sleep(hold);

    let restored = store.with_lock(|record| {
        record.counter = record.counter.wrapping_div(factor);
        record.counter
    })?;
    info!(restored, factor, "divided back");
    journal.record(
        WorkerRole::Multiplier,
        format!("Divided by {factor}. Restored value: {restored}"),
    );

    Ok((multiplied, restored))
}

/// Entry point of `counter-warden worker <role>`.
pub fn run_worker(role: WorkerRole, settings: &Settings) -> WardenResult<()> {
    let journal = Journal::new(&settings.log_path);
    journal.record(role, "started");

    let store = match SharedStore::open(&settings.segment_name, false) {
        Ok(store) => store,
        Err(err) => {
            error!(%role, error = %err, "worker cannot attach to shared segment");
            journal.record(role, format!("Failed to open shared memory: {err}"));
            return Err(err);
        }
    };

    match role {
        WorkerRole::Adder => {
            let value = add(&store, settings.adder_increment)?;
            info!(%role, value, "added {}", settings.adder_increment);
            journal.record(
                role,
                format!("Added {} -> {value}", settings.adder_increment),
            );
        }
        WorkerRole::Multiplier => {
            multiply_and_restore(
                &store,
                settings.multiplier_factor,
                settings.multiplier_hold(),
                &journal,
            )?;
        }
    }

    journal.record(role, "exited");
    Ok(())
}
