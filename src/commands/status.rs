//! `status` 子命令：只读查看共享记录，不参与选举

use crate::core::models::{SharedRecord, WorkerRole};
use crate::core::shared_record::SharedStore;
use crate::error::WardenResult;
use chrono::{TimeZone, Utc};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct StatusView<'a> {
    segment: &'a str,
    #[serde(flatten)]
    record: SharedRecord,
}

pub fn render_text(segment: &str, record: &SharedRecord) -> String {
    let master = if record.is_master_held {
        format!("PID {}", record.master_id)
    } else {
        "none".to_string()
    };
    let last_respawn = match record.last_respawn_time {
        0 => "never".to_string(),
        secs => Utc
            .timestamp_opt(secs, 0)
            .single()
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| secs.to_string()),
    };

    let mut text = format!(
        "Segment: {segment}\nCounter: {}\nMaster: {master}\nLast respawn: {last_respawn}\n",
        record.counter
    );
    for role in WorkerRole::ALL {
        let slot = record.slot(role);
        if slot.is_empty() {
            text.push_str(&format!("Worker {role}: none\n"));
        } else {
            text.push_str(&format!("Worker {role}: PID {}\n", slot.id));
        }
    }
    text
}

pub fn render_json(segment: &str, record: &SharedRecord) -> WardenResult<String> {
    let view = StatusView {
        segment,
        record: *record,
    };
    serde_json::to_string_pretty(&view)
        .map_err(|e| crate::error::WardenError::Io(std::io::Error::other(e)))
}

/// Attach without creating and print one locked snapshot.
pub fn print_status(segment: &str, json: bool, out: &mut impl Write) -> WardenResult<()> {
    let store = SharedStore::open(segment, false)?;
    let record = store.snapshot()?;
    if json {
        writeln!(out, "{}", render_json(segment, &record)?)?;
    } else {
        write!(out, "{}", render_text(segment, &record))?;
    }
    Ok(())
}
