//! Interactive command loop
//!
//! Runs on the main thread. Stdin is read on a helper thread and delivered as
//! lines over a channel, so the loop can also wake up on a shutdown signal.

use crate::core::models::Role;
use crate::core::shared_record::SharedStore;
use crate::error::{WardenError, WardenResult};
use crate::journal::Journal;
use crossbeam::channel::{unbounded, Receiver};
use std::io::{self, BufRead, Write};
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

pub const HELP: &str = "\
Commands:
  set <value>  - Set counter value
  get          - Get current counter value
  exit         - Exit application (also: quit)
  help         - Show this help";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Set(i64),
    Get,
    Help,
    Exit,
}

impl FromStr for ConsoleCommand {
    type Err = WardenError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut words = input.split_whitespace();
        let command = match words.next() {
            Some(word) => word,
            None => return Err(WardenError::invalid_command(input, "Empty command")),
        };

        let parsed = match command {
            "set" => {
                let raw = words
                    .next()
                    .ok_or_else(|| WardenError::invalid_command(input, "Missing value for 'set'"))?;
                let value = raw.parse::<i64>().map_err(|e| {
                    WardenError::invalid_command(input, format!("Invalid value '{raw}': {e}"))
                })?;
                ConsoleCommand::Set(value)
            }
            "get" => ConsoleCommand::Get,
            "help" => ConsoleCommand::Help,
            "exit" | "quit" => ConsoleCommand::Exit,
            _ => return Err(WardenError::invalid_command(input, "Unknown command")),
        };

        if words.next().is_some() {
            return Err(WardenError::invalid_command(input, "Too many arguments"));
        }
        Ok(parsed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Command,
    EndOfInput,
    Signal,
}

pub struct Console {
    store: Arc<SharedStore>,
    journal: Journal,
    role: Role,
}

impl Console {
    pub fn new(store: Arc<SharedStore>, journal: Journal, role: Role) -> Self {
        Self {
            store,
            journal,
            role,
        }
    }

    pub fn print_banner(&self, out: &mut impl Write, pid: u32) -> io::Result<()> {
        writeln!(out, "\n=== Counter Application ===")?;
        writeln!(out, "PID: {pid}")?;
        writeln!(out, "Status: {}", self.role.banner_name())?;
        writeln!(out, "\n{HELP}")?;
        writeln!(out, "================================\n")?;
        out.flush()
    }

    pub fn execute(&self, command: ConsoleCommand, out: &mut impl Write) -> WardenResult<Flow> {
        match command {
            ConsoleCommand::Set(value) => {
                self.store.with_lock(|record| record.counter = value)?;
                writeln!(out, "Counter set to: {value}")?;
                info!(value, "counter set by operator");
                self.journal
                    .record(self.role, format!("User set counter to {value}"));
            }
            ConsoleCommand::Get => {
                let value = self.store.with_lock(|record| record.counter)?;
                writeln!(out, "Current counter value: {value}")?;
            }
            ConsoleCommand::Help => writeln!(out, "\n{HELP}")?,
            ConsoleCommand::Exit => return Ok(Flow::Exit),
        }
        Ok(Flow::Continue)
    }

    /// Parse and execute one line. Operator mistakes and lock failures are
    /// reported on `out`; only a broken `out` is an error.
    pub fn handle_line(&self, line: &str, out: &mut impl Write) -> WardenResult<Flow> {
        if line.trim().is_empty() {
            return Ok(Flow::Continue);
        }

        let result = line
            .parse::<ConsoleCommand>()
            .and_then(|command| self.execute(command, out));
        match result {
            Ok(flow) => Ok(flow),
            Err(WardenError::Io(err)) => Err(WardenError::Io(err)),
            Err(err) => {
                debug!(error = %err, "console command rejected");
                writeln!(out, "{}", err.user_message())?;
                Ok(Flow::Continue)
            }
        }
    }

    /// Prompt, read, execute until `exit`, end of input or a shutdown
    /// notification.
    pub fn run(
        &self,
        lines: Receiver<String>,
        shutdown: Receiver<()>,
        out: &mut impl Write,
    ) -> WardenResult<ExitReason> {
        loop {
            write!(out, "> ")?;
            out.flush()?;

            crossbeam::select! {
                recv(lines) -> line => match line {
                    Ok(line) => {
                        if self.handle_line(&line, out)? == Flow::Exit {
                            return Ok(ExitReason::Command);
                        }
                    }
                    Err(_) => {
                        writeln!(out)?;
                        info!("end of input, shutting down");
                        return Ok(ExitReason::EndOfInput);
                    }
                },
                recv(shutdown) -> _ => {
                    writeln!(out)?;
                    return Ok(ExitReason::Signal);
                }
            }
        }
    }
}

/// Read stdin lines on a detached thread. The channel disconnects at end of
/// input.
pub fn spawn_stdin_reader() -> WardenResult<Receiver<String>> {
    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("cw-stdin".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to read stdin");
                        break;
                    }
                }
            }
        })
        .map_err(|source| WardenError::Thread {
            name: "stdin".to_string(),
            source,
        })?;
    Ok(rx)
}
