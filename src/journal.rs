//! Durable append-only journal
//!
//! One line per event: `<ISO-8601 timestamp> [pid <id> <tag>] <message>`.
//! The file is opened in append mode for every write, so masters, subordinates
//! and workers can share one journal without tearing each other's lines.

use crate::error::WardenResult;
use chrono::{Local, SecondsFormat};
use std::fmt::Display;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
    pid: u32,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pid: std::process::id(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format_line(pid: u32, tag: impl Display, message: &str) -> String {
        format!(
            "{} [pid {} {}] {}\n",
            Local::now().to_rfc3339_opts(SecondsFormat::Millis, false),
            pid,
            tag,
            message
        )
    }

    pub fn append(&self, tag: impl Display, message: impl AsRef<str>) -> WardenResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let line = Self::format_line(self.pid, tag, message.as_ref());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        // single write so O_APPEND keeps the line contiguous
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Append, and on failure log instead of failing the caller.
    pub fn record(&self, tag: impl Display, message: impl AsRef<str>) {
        if let Err(err) = self.append(tag, message.as_ref()) {
            tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "failed to append journal line: {}",
                message.as_ref()
            );
        }
    }
}
