//! 统一数据模型定义
//!
//! 共享记录的内存布局以及进程角色

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role decided once by the election and passed down unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Master,
    Subordinate,
}

impl Role {
    pub fn is_master(self) -> bool {
        matches!(self, Role::Master)
    }

    pub fn banner_name(self) -> &'static str {
        match self {
            Role::Master => "MASTER",
            Role::Subordinate => "SUBORDINATE",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Master => f.write_str("master"),
            Role::Subordinate => f.write_str("subordinate"),
        }
    }
}

/// The two supervised worker kinds. Each owns one slot in the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WorkerRole {
    /// Adds a fixed increment in one locked step.
    Adder,
    /// Multiplies, waits unlocked, then divides back.
    Multiplier,
}

impl WorkerRole {
    pub const ALL: [WorkerRole; 2] = [WorkerRole::Adder, WorkerRole::Multiplier];

    pub fn slot_index(self) -> usize {
        match self {
            WorkerRole::Adder => 0,
            WorkerRole::Multiplier => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerRole::Adder => "adder",
            WorkerRole::Multiplier => "multiplier",
        }
    }
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supervisor bookkeeping for one worker. `id == 0` means no worker.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerSlot {
    pub id: u32,
    pub alive: bool,
}

impl WorkerSlot {
    pub fn is_empty(&self) -> bool {
        self.id == 0
    }

    pub fn occupy(&mut self, pid: u32) {
        self.id = pid;
        self.alive = true;
    }

    pub fn clear(&mut self) {
        *self = WorkerSlot::default();
    }
}

/// The record living in the shared segment.
///
/// # Safety
/// The layout is `#[repr(C)]` and made of plain integers and bools so that an
/// all-zero page (what the OS hands out for a new segment) is a valid, fresh
/// record. Changing field order or types changes the on-segment layout and
/// makes older running processes misread it.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SharedRecord {
    pub counter: i64,
    pub is_master_held: bool,
    /// Set by the first claim and never cleared, so a released record is
    /// never mistaken for a new one.
    pub ever_claimed: bool,
    pub master_id: u32,
    /// Unix seconds of the last (re)spawn, 0 if never.
    pub last_respawn_time: i64,
    pub workers: [WorkerSlot; 2],
}

impl SharedRecord {
    /// Nobody ever counted and no master was ever claimed.
    pub fn is_fresh(&self) -> bool {
        self.counter == 0 && !self.ever_claimed && !self.is_master_held
    }

    pub fn slot(&self, role: WorkerRole) -> &WorkerSlot {
        &self.workers[role.slot_index()]
    }

    pub fn slot_mut(&mut self, role: WorkerRole) -> &mut WorkerSlot {
        &mut self.workers[role.slot_index()]
    }

    pub fn claim_master(&mut self, pid: u32) {
        self.is_master_held = true;
        self.ever_claimed = true;
        self.master_id = pid;
    }

    pub fn reset_workers(&mut self) {
        for slot in self.workers.iter_mut() {
            slot.clear();
        }
    }

    /// Clears the master claim only if `pid` still owns it.
    pub fn release_master(&mut self, pid: u32) -> bool {
        if self.is_master_held && self.master_id == pid {
            self.is_master_held = false;
            self.master_id = 0;
            true
        } else {
            false
        }
    }
}
