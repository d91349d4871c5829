//! Worker supervision, run by the master's respawn task.
//!
//! A tick has three phases so the shared lock is never held across process
//! creation or reaping:
//!
//! 1. read the worker slots under the lock;
//! 2. reap or check recorded workers and spawn replacements, unlocked;
//! 3. write the results back under the lock.
//!
//! Only the master's single respawn thread writes worker slots, so nothing can
//! change them between phase 1 and phase 3. The write-back still compares pids
//! before clearing a slot.

use crate::core::models::{Role, WorkerRole, WorkerSlot};
use crate::core::shared_record::SharedStore;
use crate::error::WardenResult;
use crate::journal::Journal;
use crate::platform::{ProcessControl, ReapStatus};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a single tick observed and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Roles whose recorded worker is still running.
    pub busy: Vec<WorkerRole>,
    /// Workers confirmed terminated and cleared.
    pub reaped: Vec<(WorkerRole, u32)>,
    pub spawned: Vec<(WorkerRole, u32)>,
    /// Roles whose spawn failed; their slot stays empty until the next tick.
    pub failed: Vec<WorkerRole>,
    /// Set when the record no longer names this process as master.
    pub skipped: bool,
}

pub struct WorkerSupervisor {
    store: Arc<SharedStore>,
    control: Arc<dyn ProcessControl>,
    journal: Journal,
}

impl WorkerSupervisor {
    pub fn new(store: Arc<SharedStore>, control: Arc<dyn ProcessControl>, journal: Journal) -> Self {
        Self {
            store,
            control,
            journal,
        }
    }

    pub fn tick(&self) -> WardenResult<TickReport> {
        let self_pid = self.control.current_pid();
        let mut report = TickReport::default();

        let (slots, master_id) = self
            .store
            .with_lock(|record| (record.workers, record.master_id))?;
        if master_id != self_pid {
            warn!(
                pid = self_pid,
                master = master_id,
                "record names another master, skipping respawn"
            );
            report.skipped = true;
            return Ok(report);
        }

        for role in WorkerRole::ALL {
            let slot: WorkerSlot = slots[role.slot_index()];
            if slot.is_empty() {
                continue;
            }
            match self.control.reap(slot.id) {
                ReapStatus::Running => {
                    info!(%role, pid = slot.id, "Skipping spawn: {role} still running");
                    self.journal.record(
                        Role::Master,
                        format!("Skipping spawn: {role} still running (PID: {})", slot.id),
                    );
                    report.busy.push(role);
                }
                ReapStatus::Exited(code) => {
                    match code {
                        Some(0) | None => debug!(%role, pid = slot.id, ?code, "worker exited"),
                        Some(code) => warn!(%role, pid = slot.id, code, "worker exited with failure"),
                    }
                    report.reaped.push((role, slot.id));
                }
            }
        }

        for role in WorkerRole::ALL {
            if report.busy.contains(&role) {
                continue;
            }
            match self.control.spawn_worker(role) {
                Ok(pid) => report.spawned.push((role, pid)),
                Err(err) => {
                    warn!(%role, error = %err, "worker spawn failed, retrying next tick");
                    self.journal
                        .record(Role::Master, format!("Failed to spawn {role}: {err}"));
                    report.failed.push(role);
                }
            }
        }

        let now = Utc::now().timestamp();
        self.store.with_lock(|record| {
            for role in &report.busy {
                let slot = record.slot_mut(*role);
                if slot.id == slots[role.slot_index()].id {
                    slot.alive = true;
                }
            }
            for (role, pid) in &report.reaped {
                let slot = record.slot_mut(*role);
                if slot.id == *pid {
                    slot.clear();
                }
            }
            for (role, pid) in &report.spawned {
                record.slot_mut(*role).occupy(*pid);
            }
            if !report.spawned.is_empty() {
                record.last_respawn_time = now;
            }
        })?;

        if !report.spawned.is_empty() {
            let summary = report
                .spawned
                .iter()
                .map(|(role, pid)| format!("{role} (PID: {pid})"))
                .collect::<Vec<_>>()
                .join(", ");
            info!("Spawned {summary}");
            self.journal.record(Role::Master, format!("Spawned {summary}"));
        }

        Ok(report)
    }
}

impl std::fmt::Debug for WorkerSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerSupervisor")
            .field("store", &self.store)
            .field("journal", &self.journal)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WardenError;
    use crate::platform::Liveness;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::io;

    const MASTER: u32 = 4000;

    #[derive(Default)]
    struct FakeState {
        next_pid: u32,
        running: HashSet<u32>,
        fail_spawns: bool,
        spawn_calls: Vec<WorkerRole>,
    }

    struct FakeControl {
        state: Mutex<FakeState>,
    }

    impl FakeControl {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(FakeState {
                    next_pid: 5000,
                    ..FakeState::default()
                }),
            })
        }

        fn kill(&self, pid: u32) {
            self.state.lock().running.remove(&pid);
        }

        fn set_failing(&self, failing: bool) {
            self.state.lock().fail_spawns = failing;
        }

        fn spawn_calls(&self) -> Vec<WorkerRole> {
            self.state.lock().spawn_calls.clone()
        }
    }

    impl ProcessControl for FakeControl {
        fn current_pid(&self) -> u32 {
            MASTER
        }

        fn liveness(&self, pid: u32) -> Liveness {
            if self.state.lock().running.contains(&pid) {
                Liveness::Alive
            } else {
                Liveness::Dead
            }
        }

        fn spawn_worker(&self, role: WorkerRole) -> WardenResult<u32> {
            let mut state = self.state.lock();
            state.spawn_calls.push(role);
            if state.fail_spawns {
                return Err(WardenError::SpawnFailed {
                    role: role.to_string(),
                    source: io::Error::new(io::ErrorKind::Other, "fork failed"),
                });
            }
            state.next_pid += 1;
            let pid = state.next_pid;
            state.running.insert(pid);
            Ok(pid)
        }

        fn reap(&self, pid: u32) -> ReapStatus {
            if self.state.lock().running.contains(&pid) {
                ReapStatus::Running
            } else {
                ReapStatus::Exited(Some(0))
            }
        }
    }

    struct Fixture {
        name: String,
        store: Arc<SharedStore>,
        control: Arc<FakeControl>,
        supervisor: WorkerSupervisor,
        _dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let id = uuid::Uuid::new_v4().simple().to_string();
            let name = format!("cw_{}", &id[..12]);
            let store = Arc::new(SharedStore::open(&name, true).unwrap());
            store.with_lock(|r| r.claim_master(MASTER)).unwrap();
            let control = FakeControl::new();
            let dir = tempfile::tempdir().unwrap();
            let journal = Journal::new(dir.path().join("journal.log"));
            let supervisor = WorkerSupervisor::new(
                Arc::clone(&store),
                Arc::clone(&control) as Arc<dyn ProcessControl>,
                journal,
            );
            Self {
                name,
                store,
                control,
                supervisor,
                _dir: dir,
            }
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = SharedStore::remove(&self.name);
        }
    }

    #[test]
    fn empty_slots_are_filled() {
        let fx = Fixture::new();
        let report = fx.supervisor.tick().unwrap();

        assert_eq!(
            report.spawned,
            vec![(WorkerRole::Adder, 5001), (WorkerRole::Multiplier, 5002)]
        );
        let record = fx.store.snapshot().unwrap();
        assert_eq!(record.slot(WorkerRole::Adder).id, 5001);
        assert_eq!(record.slot(WorkerRole::Multiplier).id, 5002);
        assert!(record.last_respawn_time > 0);
    }

    #[test]
    fn running_worker_is_never_doubled() {
        let fx = Fixture::new();
        fx.supervisor.tick().unwrap();

        // adder finished, multiplier still holding
        fx.control.kill(5001);
        let report = fx.supervisor.tick().unwrap();

        assert_eq!(report.busy, vec![WorkerRole::Multiplier]);
        assert_eq!(report.reaped, vec![(WorkerRole::Adder, 5001)]);
        assert_eq!(report.spawned, vec![(WorkerRole::Adder, 5003)]);

        let record = fx.store.snapshot().unwrap();
        assert_eq!(record.slot(WorkerRole::Multiplier).id, 5002);
        assert_eq!(record.slot(WorkerRole::Adder).id, 5003);
        assert_eq!(
            fx.control.spawn_calls(),
            vec![WorkerRole::Adder, WorkerRole::Multiplier, WorkerRole::Adder]
        );

        let journal = std::fs::read_to_string(fx._dir.path().join("journal.log")).unwrap();
        assert!(journal.contains("master] Skipping spawn: multiplier still running (PID: 5002)"));
    }

    #[test]
    fn failed_spawn_leaves_slot_empty_and_retries() {
        let fx = Fixture::new();
        fx.control.set_failing(true);

        let report = fx.supervisor.tick().unwrap();
        assert_eq!(report.failed, WorkerRole::ALL.to_vec());
        let record = fx.store.snapshot().unwrap();
        assert!(record.workers.iter().all(WorkerSlot::is_empty));
        assert_eq!(record.last_respawn_time, 0);

        fx.control.set_failing(false);
        let report = fx.supervisor.tick().unwrap();
        assert_eq!(report.spawned.len(), 2);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn exited_worker_is_cleared_even_if_respawn_fails() {
        let fx = Fixture::new();
        fx.supervisor.tick().unwrap();
        fx.control.kill(5001);
        fx.control.kill(5002);
        fx.control.set_failing(true);

        let report = fx.supervisor.tick().unwrap();
        assert_eq!(report.reaped.len(), 2);
        let record = fx.store.snapshot().unwrap();
        assert!(record.workers.iter().all(WorkerSlot::is_empty));
    }

    #[test]
    fn not_master_anymore_skips_tick() {
        let fx = Fixture::new();
        fx.store.with_lock(|r| r.claim_master(MASTER + 1)).unwrap();

        let report = fx.supervisor.tick().unwrap();
        assert!(report.skipped);
        assert!(fx.control.spawn_calls().is_empty());
    }

    #[test]
    fn counter_is_untouched_by_supervision() {
        let fx = Fixture::new();
        fx.store.with_lock(|r| r.counter = 77).unwrap();
        fx.supervisor.tick().unwrap();
        fx.supervisor.tick().unwrap();
        assert_eq!(fx.store.snapshot().unwrap().counter, 77);
    }
}
