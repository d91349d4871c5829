//! Process control capability
//!
//! The election and the supervisor only see [`ProcessControl`]. The OS
//! specific probing and command preparation live in `unix.rs` / `windows.rs`
//! and are picked at build time.

use crate::config::Settings;
use crate::core::models::WorkerRole;
use crate::error::{WardenError, WardenResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use tracing::{debug, warn};

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as os;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use self::windows as os;

/// Outcome of a raw existence check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Dead,
    /// The OS answered with something other than "exists" or "no such
    /// process". Callers must treat this as alive.
    Inconclusive(String),
}

/// Result of a non-blocking reap of a supervised worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReapStatus {
    Running,
    /// Termination confirmed. The exit code is known only for our own
    /// children.
    Exited(Option<i32>),
}

pub trait ProcessControl: Send + Sync {
    fn current_pid(&self) -> u32 {
        std::process::id()
    }

    /// Raw, non-blocking existence check.
    fn liveness(&self, pid: u32) -> Liveness;

    /// Start a worker process for `role` without waiting on it.
    fn spawn_worker(&self, role: WorkerRole) -> WardenResult<u32>;

    /// Non-blocking reap of a worker previously reported by `spawn_worker`
    /// (or recorded by an earlier master of the same segment).
    fn reap(&self, pid: u32) -> ReapStatus;

    /// `false` for pid 0 without checking; inconclusive checks count as alive
    /// so two processes never both believe the master is gone.
    fn is_alive(&self, pid: u32) -> bool {
        if pid == 0 {
            return false;
        }
        match self.liveness(pid) {
            Liveness::Alive => true,
            Liveness::Dead => false,
            Liveness::Inconclusive(message) => {
                let err = WardenError::LivenessInconclusive { pid, message };
                warn!(error = %err, "treating process as alive");
                true
            }
        }
    }
}

/// How to re-launch this program as a worker.
#[derive(Debug, Clone)]
pub struct WorkerLaunch {
    pub program: PathBuf,
    pub segment: String,
    pub log_path: PathBuf,
    pub config_file: Option<PathBuf>,
    pub log_level: Option<String>,
}

impl WorkerLaunch {
    pub fn new(program: impl Into<PathBuf>, settings: &Settings) -> Self {
        Self {
            program: program.into(),
            segment: settings.segment_name.clone(),
            log_path: settings.log_path.clone(),
            config_file: None,
            log_level: settings.log_level.clone(),
        }
    }

    /// Launch settings pointing at the running executable.
    pub fn current_exe(settings: &Settings, config_file: Option<&Path>) -> WardenResult<Self> {
        let program = std::env::current_exe()?;
        let mut launch = Self::new(program, settings);
        launch.config_file = config_file.map(Path::to_path_buf);
        Ok(launch)
    }

    pub fn worker_args(&self, role: WorkerRole) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        if let Some(config) = &self.config_file {
            args.push("--config".into());
            args.push(config.clone().into_os_string());
        }
        if let Some(level) = &self.log_level {
            args.push("--log-level".into());
            args.push(level.into());
        }
        args.push("--segment".into());
        args.push(self.segment.clone().into());
        args.push("--log-file".into());
        args.push(self.log_path.clone().into_os_string());
        args.push("worker".into());
        args.push(role.as_str().into());
        args
    }
}

/// The real implementation: spawns this executable and keeps the `Child`
/// handles in a process-local table so terminated workers are reaped.
pub struct SystemProcessControl {
    launch: WorkerLaunch,
    children: Mutex<HashMap<u32, Child>>,
}

impl SystemProcessControl {
    pub fn new(launch: WorkerLaunch) -> Self {
        Self {
            launch,
            children: Mutex::new(HashMap::new()),
        }
    }

    pub fn tracked_children(&self) -> usize {
        self.children.lock().len()
    }
}

impl ProcessControl for SystemProcessControl {
    fn liveness(&self, pid: u32) -> Liveness {
        os::liveness(pid)
    }

    fn spawn_worker(&self, role: WorkerRole) -> WardenResult<u32> {
        let mut command = Command::new(&self.launch.program);
        command
            .args(self.launch.worker_args(role))
            .stdin(Stdio::null())
            .stdout(Stdio::null());
        os::prepare_command(&mut command);

        let child = command.spawn().map_err(|source| WardenError::SpawnFailed {
            role: role.to_string(),
            source,
        })?;
        let pid = child.id();
        debug!(%role, pid, "worker process started");
        self.children.lock().insert(pid, child);
        Ok(pid)
    }

    fn reap(&self, pid: u32) -> ReapStatus {
        let mut children = self.children.lock();
        if let Some(child) = children.get_mut(&pid) {
            return match child.try_wait() {
                Ok(Some(status)) => {
                    children.remove(&pid);
                    ReapStatus::Exited(status.code())
                }
                Ok(None) => ReapStatus::Running,
                Err(err) => {
                    let err = WardenError::LivenessInconclusive {
                        pid,
                        message: err.to_string(),
                    };
                    warn!(error = %err, "keeping worker slot busy");
                    ReapStatus::Running
                }
            };
        }
        drop(children);

        // not spawned by us: fall back to an existence check
        if self.is_alive(pid) {
            ReapStatus::Running
        } else {
            ReapStatus::Exited(None)
        }
    }
}
