pub mod classify;
pub mod filter;

pub use classify::{NarrativeEvent, Significance};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

/// Event type names used on the wire.
pub mod types {
    pub const WORK_ASSIGNED: &str = "work_assigned";
    pub const WORK_DONE: &str = "work_done";
    pub const HANDOFF: &str = "handoff";
    pub const MERGE_STARTED: &str = "merge_started";
    pub const MERGED: &str = "merged";
    pub const MERGE_FAILED: &str = "merge_failed";
    pub const MERGE_SKIPPED: &str = "merge_skipped";
    pub const SPAWN: &str = "spawn";
    pub const KILL: &str = "kill";
    pub const BOOT: &str = "boot";
    pub const HALT: &str = "halt";
    pub const MASS_DEATH: &str = "mass_death";
    pub const HOOK: &str = "hook";
    pub const UNHOOK: &str = "unhook";
    pub const MAIL: &str = "mail";
    pub const NUDGE: &str = "nudge";
    pub const SESSION_DEATH: &str = "session_death";
    pub const ESCALATION_SENT: &str = "escalation_sent";
    pub const ESCALATION_ACKED: &str = "escalation_acked";
    pub const ESCALATION_CLOSED: &str = "escalation_closed";
    pub const SESSION_START: &str = "session_start";
    pub const SESSION_END: &str = "session_end";
    pub const PATROL_STARTED: &str = "patrol_started";
    pub const PATROL_COMPLETE: &str = "patrol_complete";
    pub const WORKER_CHECKED: &str = "worker_checked";
    pub const WORKER_NUDGED: &str = "worker_nudged";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Narrative,
    Audit,
}

/// A single record from the append-only activity stream. Immutable once
/// appended; this core only consumes, never writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub actor: String,
    #[serde(default)]
    pub payload: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub visibility: Visibility,
}

impl Event {
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }

    pub fn payload_i64(&self, key: &str) -> Option<i64> {
        self.payload.get(key).and_then(|v| v.as_i64())
    }
}

/// Offset-tracked reader over the shared event stream.
///
/// The cursor is a byte offset, never a line number, so a partially written
/// trailing line is simply left for the next read. Malformed complete lines
/// are skipped, not fatal.
pub struct EventReader {
    path: PathBuf,
    offset: u64,
}

impl EventReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Resume from a previously recorded offset.
    pub fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    /// Read records appended since the last read and advance the cursor.
    pub fn read_new(&mut self) -> Result<Vec<NarrativeEvent>> {
        let (events, end) = self.read_from(self.offset)?;
        if end > self.offset {
            self.offset = end;
        }
        Ok(events)
    }

    /// Replay the whole stream without touching the cursor.
    pub fn read_all(&self) -> Result<Vec<NarrativeEvent>> {
        let (events, _) = self.read_from(0)?;
        Ok(events)
    }

    fn read_from(&self, start: u64) -> Result<(Vec<NarrativeEvent>, u64)> {
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            // No events yet
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), start)),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("opening event stream {}", self.path.display())))
            }
        };

        if start > 0 {
            file.seek(SeekFrom::Start(start))
                .with_context(|| format!("seeking to offset {start}"))?;
        }

        let mut buf = Vec::new();
        file.read_to_end(&mut buf).context("reading event stream")?;

        // Only consume complete newline-terminated lines; a concurrent
        // writer may still be appending the last one.
        let complete = match buf.iter().rposition(|&b| b == b'\n') {
            Some(pos) => pos + 1,
            None => return Ok((Vec::new(), start)),
        };

        let mut result = Vec::new();
        for line in buf[..complete].split(|&b| b == b'\n') {
            let line = match std::str::from_utf8(line) {
                Ok(s) => s.trim(),
                Err(_) => continue,
            };
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(line) {
                Ok(event) => result.push(NarrativeEvent::from_event(event)),
                // Skip malformed lines
                Err(_) => continue,
            }
        }

        Ok((result, start + complete as u64))
    }
}
