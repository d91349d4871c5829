//! CLI 命令行参数解析
//!
//! 使用 clap 定义命令行接口；全局参数会传给派生出的 worker 进程。

use crate::config::Settings;
use crate::core::models::WorkerRole;
use crate::error::WardenResult;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "counter-warden",
    version,
    about = "Shared counter with master election and supervised workers"
)]
pub struct Cli {
    /// Settings file (toml, yaml or json)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Name of the shared memory segment
    #[arg(long, global = true, value_name = "NAME")]
    pub segment: Option<String>,

    /// Journal file shared by all processes
    #[arg(long = "log-file", global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Diagnostic log filter, e.g. `debug` or `counter_warden=trace`
    #[arg(long = "log-level", global = true, value_name = "FILTER")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Join the election and run the interactive console (default)
    Run,

    /// Run a single worker operation and exit
    #[command(hide = true)]
    Worker {
        #[arg(value_enum)]
        role: WorkerRole,
    },

    /// Print the shared record without joining the election
    Status {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Unlink the shared segment
    Teardown,
}

impl Cli {
    /// Loaded settings with command line flags applied on top.
    pub fn settings(&self) -> WardenResult<Settings> {
        let mut settings = Settings::load(self.config.as_deref())?;
        if let Some(segment) = &self.segment {
            settings.segment_name = segment.clone();
        }
        if let Some(log_file) = &self.log_file {
            settings.log_path = log_file.clone();
        }
        if let Some(level) = &self.log_level {
            settings.log_level = Some(level.clone());
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}
