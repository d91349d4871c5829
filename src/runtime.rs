//! Coordinator process lifecycle: open, elect, run, shut down.

use crate::commands::console::{spawn_stdin_reader, Console, ExitReason};
use crate::config::Settings;
use crate::core::models::Role;
use crate::core::shared_record::SharedStore;
use crate::election::{self, Election};
use crate::error::WardenResult;
use crate::journal::Journal;
use crate::platform::{ProcessControl, SystemProcessControl, WorkerLaunch};
use crate::signal;
use crate::supervisor::WorkerSupervisor;
use crate::tasks::{CancellationToken, TaskSet};
use crossbeam::channel::bounded;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a running coordinator owns after the election.
pub struct Session {
    pub settings: Settings,
    pub store: Arc<SharedStore>,
    pub control: Arc<dyn ProcessControl>,
    pub journal: Journal,
    pub election: Election,
    pub token: CancellationToken,
    tasks: TaskSet,
}

impl Session {
    /// Attach (creating if needed), elect and start the background tasks.
    /// A segment that cannot be opened fails here, before any role exists.
    pub fn start(settings: Settings, control: Arc<dyn ProcessControl>) -> WardenResult<Self> {
        let store = Arc::new(SharedStore::open(&settings.segment_name, true)?);
        let journal = Journal::new(&settings.log_path);

        let election = election::elect(&store, control.as_ref())?;
        journal.record(election.role, "Application started");
        journal.record(election.role, election.outcome.to_string());

        let token = CancellationToken::new();
        let supervisor = election.role.is_master().then(|| {
            WorkerSupervisor::new(Arc::clone(&store), Arc::clone(&control), journal.clone())
        });
        let tasks = match TaskSet::start(
            election.role,
            &settings,
            &store,
            &journal,
            supervisor,
            &token,
        ) {
            Ok(tasks) => tasks,
            Err(err) => {
                if election.role.is_master() {
                    election::release(&store, control.current_pid())?;
                }
                return Err(err);
            }
        };

        Ok(Self {
            settings,
            store,
            control,
            journal,
            election,
            token,
            tasks,
        })
    }

    pub fn role(&self) -> Role {
        self.election.role
    }

    /// Stop every task (bounded), then give up the master role. The segment
    /// itself is left in place for other processes.
    pub fn shutdown(self) -> WardenResult<()> {
        let role = self.role();
        let abandoned = self.tasks.shutdown(self.settings.join_timeout());
        if abandoned > 0 {
            self.journal.record(
                role,
                format!("{abandoned} background task(s) did not stop in time"),
            );
        }

        if role.is_master() {
            self.journal.record(role, "Master shutting down");
            election::release(&self.store, self.control.current_pid())?;
        }

        self.journal.record(role, "Application exiting");
        info!(role = %role, "shutdown complete");
        Ok(())
    }
}

/// `counter-warden run`: the interactive coordinator.
pub fn run(settings: Settings, config_file: Option<&Path>) -> WardenResult<()> {
    let launch = WorkerLaunch::current_exe(&settings, config_file)?;
    let control: Arc<dyn ProcessControl> = Arc::new(SystemProcessControl::new(launch));
    let session = Session::start(settings, control)?;

    let (shutdown_tx, shutdown_rx) = bounded(1);
    let guard = signal::install(session.token.clone(), shutdown_tx);
    if let Err(err) = &guard {
        warn!(error = %err, "signal handler unavailable, use 'exit' to stop");
    }

    let console = Console::new(
        Arc::clone(&session.store),
        session.journal.clone(),
        session.role(),
    );
    let result = drive_console(&console, session.control.current_pid(), shutdown_rx);

    drop(guard);
    session.shutdown()?;
    result.map(|reason| info!(?reason, "console closed"))
}

fn drive_console(
    console: &Console,
    pid: u32,
    shutdown: crossbeam::channel::Receiver<()>,
) -> WardenResult<ExitReason> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    console.print_banner(&mut out, pid)?;
    let lines = spawn_stdin_reader()?;
    let reason = console.run(lines, shutdown, &mut out)?;
    out.flush()?;
    Ok(reason)
}
