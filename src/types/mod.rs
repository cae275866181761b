pub mod address;

pub use address::Address;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Running state of a supervised agent session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Stopped,
    Starting,
    Running,
    Paused,
    Zombie,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Stopped => "stopped",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Paused => "paused",
            SessionState::Zombie => "zombie",
        }
    }
}

/// Persisted record for a supervised agent session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSession {
    pub id: String,
    pub role: String,
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl AgentSession {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            state: SessionState::Stopped,
            started_at: None,
        }
    }
}

impl Default for AgentSession {
    fn default() -> Self {
        Self::new("", "")
    }
}

/// Outcome of a single task dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunResult {
    Success,
    Failure,
}

/// Persisted run-state for a task, keyed by task id.
///
/// `run_count` only ever increases; `next_eligible`, once set, only advances
/// forward in time. Both are enforced by the dispatcher, the only writer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<RunResult>,
    #[serde(default)]
    pub run_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_eligible: Option<DateTime<Utc>>,
}

impl RunState {
    /// Record a dispatch attempt. Failures bump the counter only, so the
    /// cooldown keeps measuring time since the last successful run and the
    /// task retries on the next cycle.
    pub fn record_attempt(
        &mut self,
        result: RunResult,
        now: DateTime<Utc>,
        next_eligible: Option<DateTime<Utc>>,
    ) {
        self.run_count += 1;
        self.last_result = Some(result);
        if result == RunResult::Success {
            self.last_run = Some(now);
            if let Some(next) = next_eligible {
                // next_eligible never moves backwards
                if self.next_eligible.map(|cur| next > cur).unwrap_or(true) {
                    self.next_eligible = Some(next);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_record_success_advances_everything() {
        let now = Utc::now();
        let mut rs = RunState::default();
        rs.record_attempt(RunResult::Success, now, Some(now + Duration::hours(24)));

        assert_eq!(rs.run_count, 1);
        assert_eq!(rs.last_result, Some(RunResult::Success));
        assert_eq!(rs.last_run, Some(now));
        assert_eq!(rs.next_eligible, Some(now + Duration::hours(24)));
    }

    #[test]
    fn test_record_failure_keeps_last_run() {
        let now = Utc::now();
        let earlier = now - Duration::hours(1);
        let mut rs = RunState {
            last_run: Some(earlier),
            last_result: Some(RunResult::Success),
            run_count: 3,
            next_eligible: None,
        };
        rs.record_attempt(RunResult::Failure, now, Some(now + Duration::hours(24)));

        assert_eq!(rs.run_count, 4);
        assert_eq!(rs.last_result, Some(RunResult::Failure));
        assert_eq!(rs.last_run, Some(earlier));
        assert!(rs.next_eligible.is_none());
    }

    #[test]
    fn test_next_eligible_never_regresses() {
        let now = Utc::now();
        let far = now + Duration::hours(48);
        let mut rs = RunState {
            next_eligible: Some(far),
            ..Default::default()
        };
        rs.record_attempt(RunResult::Success, now, Some(now + Duration::hours(1)));

        assert_eq!(rs.next_eligible, Some(far));
    }
}
