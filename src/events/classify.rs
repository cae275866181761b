use serde::{Deserialize, Serialize};

use super::{types, Event, Visibility};
use crate::types::address::{workspace_of, Address};

/// Narrative importance of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Significance {
    /// Ignored for narrative purposes.
    None,
    /// Minor, may be summarized or batched.
    Low,
    /// Notable, worth mentioning individually.
    Medium,
    /// Major, requires detailed treatment.
    High,
}

impl Significance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Significance::None => "none",
            Significance::Low => "low",
            Significance::Medium => "medium",
            Significance::High => "high",
        }
    }
}

/// An event enriched with derived narrative metadata.
#[derive(Debug, Clone)]
pub struct NarrativeEvent {
    pub event: Event,
    pub significance: Significance,
    /// Originating workspace, when one can be determined.
    pub workspace: Option<String>,
    /// The actor's parsed role, when the path is recognizable.
    pub role: Option<Address>,
    /// One-line human-readable description.
    pub summary: String,
}

impl NarrativeEvent {
    pub fn from_event(event: Event) -> Self {
        let significance = classify(&event);
        let workspace = extract_workspace(&event);
        let role = Address::parse(&event.actor);
        let summary = build_summary(&event);
        Self {
            event,
            significance,
            workspace,
            role,
            summary,
        }
    }
}

/// Map an event to its significance tier.
///
/// Audit-only records are never narrative material, whatever their type.
/// Unrecognized types default to Low rather than being dropped.
pub fn classify(event: &Event) -> Significance {
    if event.visibility == Visibility::Audit {
        return Significance::None;
    }

    match event.event_type.as_str() {
        // Lifecycle-defining events
        types::WORK_ASSIGNED
        | types::WORK_DONE
        | types::HANDOFF
        | types::MERGED
        | types::MERGE_FAILED
        | types::SPAWN
        | types::KILL
        | types::BOOT
        | types::HALT
        | types::MASS_DEATH => Significance::High,

        // Routine coordination
        types::HOOK
        | types::UNHOOK
        | types::MAIL
        | types::NUDGE
        | types::SESSION_DEATH
        | types::ESCALATION_SENT
        | types::ESCALATION_ACKED
        | types::ESCALATION_CLOSED
        | types::MERGE_STARTED
        | types::MERGE_SKIPPED => Significance::Medium,

        // Background telemetry, and anything unrecognized
        _ => Significance::Low,
    }
}

fn extract_workspace(event: &Event) -> Option<String> {
    if let Some(ws) = event.payload_str("workspace") {
        if !ws.is_empty() {
            return Some(ws.to_string());
        }
    }
    workspace_of(&event.actor).map(|s| s.to_string())
}

/// Build a one-line summary from type-specific payload fields, with a
/// generic fallback when expected fields are absent.
pub fn build_summary(event: &Event) -> String {
    let p = |key: &str| event.payload_str(key).unwrap_or("");

    match event.event_type.as_str() {
        types::WORK_ASSIGNED => match (p("work"), p("target")) {
            ("", _) | (_, "") => "Work assignment dispatched".to_string(),
            (work, target) => format!("Work {work} assigned to {target}"),
        },
        types::WORK_DONE => match p("work") {
            "" => "Work completed".to_string(),
            work => format!("Completed work {work}"),
        },
        types::HOOK => match p("work") {
            "" => "Work hooked".to_string(),
            work => format!("Hooked work {work}"),
        },
        types::UNHOOK => match p("work") {
            "" => "Work unhooked".to_string(),
            work => format!("Unhooked work {work}"),
        },
        types::HANDOFF => match p("subject") {
            "" => "Session handoff".to_string(),
            subject => format!("Handoff: {subject}"),
        },
        types::MAIL => match (p("to"), p("subject")) {
            ("", _) | (_, "") => "Mail sent".to_string(),
            (to, subject) => format!("Mail to {to}: {subject}"),
        },
        types::SPAWN => match (p("worker"), p("workspace")) {
            ("", _) | (_, "") => "Worker spawned".to_string(),
            (worker, ws) => format!("Spawned worker {worker} in {ws}"),
        },
        types::KILL => match (p("target"), p("reason")) {
            ("", _) => "Process killed".to_string(),
            (target, "") => format!("Killed {target}"),
            (target, reason) => format!("Killed {target}: {reason}"),
        },
        types::BOOT => match p("workspace") {
            "" => "Workspace booted".to_string(),
            ws => format!("Booted workspace {ws}"),
        },
        types::HALT => "Services halted".to_string(),
        types::NUDGE => match (p("target"), p("reason")) {
            ("", _) => "Agent nudged".to_string(),
            (target, "") => format!("Nudged {target}"),
            (target, reason) => format!("Nudged {target}: {reason}"),
        },
        types::MERGE_STARTED => match p("worker") {
            "" => "Merge started".to_string(),
            worker => format!("Merge started for {worker}"),
        },
        types::MERGED => match p("worker") {
            "" => "Work merged".to_string(),
            worker => format!("Merged work from {worker}"),
        },
        types::MERGE_FAILED => match (p("worker"), p("reason")) {
            ("", _) => "Merge failed".to_string(),
            (worker, "") => format!("Merge failed for {worker}"),
            (worker, reason) => format!("Merge failed for {worker}: {reason}"),
        },
        types::MERGE_SKIPPED => match p("reason") {
            "" => "Merge skipped".to_string(),
            reason => format!("Merge skipped: {reason}"),
        },
        types::SESSION_START => match (p("role"), p("topic")) {
            ("", _) => "Session started".to_string(),
            (role, "") => format!("{role} session started"),
            (role, topic) => format!("{role} session started: {topic}"),
        },
        types::SESSION_END => match p("role") {
            "" => "Session ended".to_string(),
            role => format!("{role} session ended"),
        },
        types::SESSION_DEATH => match (p("agent"), p("reason")) {
            ("", _) => "Session died".to_string(),
            (agent, "") => format!("Session died: {agent}"),
            (agent, reason) => format!("Session died: {agent} ({reason})"),
        },
        types::MASS_DEATH => match (event.payload_i64("count"), p("possible_cause")) {
            (Some(n), "") if n > 0 => format!("Mass death: {n} sessions"),
            (Some(n), cause) if n > 0 => format!("Mass death: {n} sessions ({cause})"),
            _ => "Mass death event".to_string(),
        },
        types::PATROL_STARTED => match event.payload_i64("worker_count") {
            Some(n) if n > 0 => format!("Patrol started ({n} workers)"),
            _ => "Patrol started".to_string(),
        },
        types::PATROL_COMPLETE => match event.payload_i64("worker_count") {
            Some(n) if n > 0 => format!("Patrol complete ({n} workers)"),
            _ => "Patrol complete".to_string(),
        },
        types::WORKER_CHECKED => match (p("worker"), p("status")) {
            ("", _) | (_, "") => "Worker checked".to_string(),
            (worker, status) => format!("Checked {worker}: {status}"),
        },
        types::WORKER_NUDGED => match p("worker") {
            "" => "Worker nudged".to_string(),
            worker => format!("Nudged {worker}"),
        },
        types::ESCALATION_SENT => match (p("target"), p("to")) {
            ("", _) | (_, "") => "Escalation sent".to_string(),
            (target, to) => format!("Escalated {target} to {to}"),
        },
        types::ESCALATION_ACKED => "Escalation acknowledged".to_string(),
        types::ESCALATION_CLOSED => "Escalation closed".to_string(),
        other => other.to_string(),
    }
}
