pub mod schedule;

pub use schedule::{parse_duration, CronSchedule};

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

use crate::types::RunState;

/// Admission gate for a registered task.
///
/// A gate that failed validation at load time is carried as `Invalid` and
/// evaluates permanently closed until the definition is corrected.
#[derive(Debug, Clone, PartialEq)]
pub enum Gate {
    Cooldown {
        interval: Duration,
    },
    Cron {
        schedule: CronSchedule,
    },
    Condition {
        check: String,
        operator: Operator,
        threshold: f64,
        cooldown: Option<Duration>,
    },
    Event {
        trigger: Trigger,
    },
    Invalid {
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Gt,
    Lt,
    Eq,
    Ge,
    Le,
}

impl Operator {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gt" => Some(Operator::Gt),
            "lt" => Some(Operator::Lt),
            "eq" => Some(Operator::Eq),
            "ge" => Some(Operator::Ge),
            "le" => Some(Operator::Le),
            _ => None,
        }
    }

    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::Gt => value > threshold,
            Operator::Lt => value < threshold,
            Operator::Eq => value == threshold,
            Operator::Ge => value >= threshold,
            Operator::Le => value <= threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Fires at most once per supervisor process lifetime.
    Startup,
    /// Fires on every evaluation cycle.
    Heartbeat,
    /// Fires when the named mailbox has pending messages.
    Mailbox(String),
}

impl Trigger {
    pub fn parse(s: &str) -> Self {
        match s {
            "startup" => Trigger::Startup,
            "heartbeat" => Trigger::Heartbeat,
            name => Trigger::Mailbox(name.to_string()),
        }
    }
}

/// Pending trigger facts for event gates, assembled by the patrol loop
/// before evaluation so the evaluator itself stays pure.
#[derive(Debug, Clone, Default)]
pub struct TriggerContext {
    /// True until the first cycle of this supervisor process has run.
    pub startup_pending: bool,
    /// Mailboxes with at least one pending message.
    pub pending_mailboxes: HashSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateStatus {
    Open,
    Closed { reason: String },
}

impl GateStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, GateStatus::Open)
    }

    fn closed(reason: impl Into<String>) -> Self {
        GateStatus::Closed {
            reason: reason.into(),
        }
    }
}

impl Gate {
    /// Cooldown interval to project `next_eligible` from on success.
    pub fn cooldown_interval(&self) -> Option<Duration> {
        match self {
            Gate::Cooldown { interval } => Some(*interval),
            Gate::Condition { cooldown, .. } => *cooldown,
            _ => None,
        }
    }

    /// Whether evaluation needs an external probe value.
    pub fn needs_probe(&self) -> Option<&str> {
        match self {
            Gate::Condition { check, .. } => Some(check),
            _ => None,
        }
    }
}

/// Decide whether a gate admits its task right now.
///
/// Pure function of the gate, the task's run-state, the clock, an optional
/// probe value, and the pending trigger facts. Errors never escape: anything
/// wrong yields `Closed` with a reason and the task is skipped, not crashed.
pub fn evaluate(
    gate: &Gate,
    run_state: &RunState,
    now: DateTime<Utc>,
    probe: Option<f64>,
    triggers: &TriggerContext,
) -> GateStatus {
    match gate {
        Gate::Invalid { reason } => GateStatus::closed(format!("invalid gate: {reason}")),

        Gate::Cooldown { interval } => match run_state.last_run {
            None => GateStatus::Open,
            Some(last) if now - last >= *interval => GateStatus::Open,
            Some(last) => {
                let remaining = *interval - (now - last);
                GateStatus::closed(format!("cooldown: {remaining} remaining"))
            }
        },

        Gate::Cron { schedule } => match schedule.prev_fire(now) {
            None => GateStatus::closed("no scheduled slot within horizon"),
            Some(slot) => match run_state.last_run {
                Some(last) if last >= slot => {
                    GateStatus::closed(format!("already ran for slot {slot}"))
                }
                _ => GateStatus::Open,
            },
        },

        Gate::Condition {
            operator,
            threshold,
            cooldown,
            ..
        } => {
            if let (Some(cd), Some(last)) = (cooldown, run_state.last_run) {
                if now - last < *cd {
                    return GateStatus::closed("cooldown not elapsed");
                }
            }
            match probe {
                None => GateStatus::closed("probe produced no numeric value"),
                Some(value) if operator.holds(value, *threshold) => GateStatus::Open,
                Some(value) => {
                    GateStatus::closed(format!("condition not met: {value} vs {threshold}"))
                }
            }
        }

        Gate::Event { trigger } => match trigger {
            Trigger::Heartbeat => GateStatus::Open,
            Trigger::Startup if triggers.startup_pending => GateStatus::Open,
            Trigger::Startup => GateStatus::closed("startup already fired"),
            Trigger::Mailbox(name) if triggers.pending_mailboxes.contains(name) => {
                GateStatus::Open
            }
            Trigger::Mailbox(name) => GateStatus::closed(format!("mailbox {name} empty")),
        },
    }
}
