#![allow(dead_code)]

use assert_cmd::prelude::*;
use counter_warden::SharedStore;
use crossbeam::channel::{unbounded, Receiver};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

/// A private segment name and journal for one test.
pub struct Harness {
    pub dir: TempDir,
    pub segment: String,
}

impl Harness {
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self {
            dir: TempDir::new().expect("temp dir"),
            segment: format!("cw_{}", &id[..12]),
        }
    }

    pub fn journal_path(&self) -> PathBuf {
        self.dir.path().join("counter.log")
    }

    pub fn journal(&self) -> String {
        std::fs::read_to_string(self.journal_path()).unwrap_or_default()
    }

    /// The binary with this harness' segment and journal, quiet diagnostics
    /// and no background activity unless a test turns it on.
    pub fn process(&self) -> Command {
        let mut cmd = Command::cargo_bin("counter-warden").expect("binary built");
        cmd.arg("--segment")
            .arg(&self.segment)
            .arg("--log-file")
            .arg(self.journal_path())
            .env("RUST_LOG", "off")
            .env("COUNTER_WARDEN_COUNTER_PERIOD_MS", "600000")
            .env("COUNTER_WARDEN_SNAPSHOT_PERIOD_MS", "600000")
            .env("COUNTER_WARDEN_RESPAWN_PERIOD_MS", "600000");
        cmd
    }

    /// Same as [`Harness::process`], wrapped for `write_stdin` / `assert`.
    pub fn command(&self) -> assert_cmd::Command {
        assert_cmd::Command::from_std(self.process())
    }

    pub fn store(&self) -> SharedStore {
        SharedStore::open(&self.segment, true).expect("open segment")
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = SharedStore::remove(&self.segment);
    }
}

/// A coordinator process driven over its stdin/stdout.
pub struct Coordinator {
    pub child: Child,
    stdin: Option<ChildStdin>,
    lines: Receiver<String>,
}

impl Coordinator {
    pub fn spawn(mut cmd: Command) -> Self {
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn coordinator");

        let stdout = child.stdout.take().expect("stdout");
        let (tx, lines) = unbounded();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            stdin: child.stdin.take(),
            child,
            lines,
        }
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Block until a stdout line contains `needle`, returning that line.
    pub fn wait_for(&self, needle: &str) -> String {
        loop {
            let line = self
                .lines
                .recv_timeout(Duration::from_secs(10))
                .unwrap_or_else(|_| panic!("no line containing {needle:?}"));
            if line.contains(needle) {
                return line;
            }
        }
    }

    pub fn send(&mut self, line: &str) {
        let stdin = self.stdin.as_mut().expect("stdin open");
        writeln!(stdin, "{line}").expect("write stdin");
        stdin.flush().expect("flush stdin");
    }

    /// Close stdin and wait for a clean exit.
    pub fn finish(mut self) -> std::process::ExitStatus {
        drop(self.stdin.take());
        self.child.wait().expect("wait coordinator")
    }

    /// SIGKILL and reap, leaving no zombie behind.
    pub fn kill(mut self) {
        self.child.kill().expect("kill coordinator");
        self.child.wait().expect("reap coordinator");
    }
}
