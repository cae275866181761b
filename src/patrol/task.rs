use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::gate::{parse_duration, CronSchedule, Gate, Operator, Trigger};

/// A registered task: an admission gate plus opaque instructions for the
/// responsible agent. The scheduler never interprets the instructions.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub gate: Gate,
    pub parallel: bool,
    /// Address of the agent responsible for executing this task.
    pub agent: Option<String>,
    pub instructions: String,
}

/// Structured front-matter header of a task document.
#[derive(Debug, Deserialize)]
struct TaskHeader {
    gate: String,
    interval: Option<String>,
    schedule: Option<String>,
    check: Option<String>,
    operator: Option<String>,
    threshold: Option<serde_yaml::Value>,
    trigger: Option<String>,
    cooldown: Option<String>,
    #[serde(default)]
    parallel: bool,
    agent: Option<String>,
}

/// Parse a task document: YAML front matter between `---` fences, followed
/// by free-form instructions.
///
/// A malformed header or gate spec does not fail the load; the task is kept
/// with a permanently closed `Invalid` gate so the configuration error is
/// visible every cycle until corrected.
pub fn parse_task(id: &str, content: &str) -> Task {
    match parse_parts(content) {
        Ok((header, instructions)) => {
            let (gate, parallel, agent) = match build_gate(&header) {
                Ok(gate) => (gate, header.parallel, header.agent),
                Err(e) => (
                    Gate::Invalid {
                        reason: e.to_string(),
                    },
                    header.parallel,
                    header.agent,
                ),
            };
            Task {
                id: id.to_string(),
                gate,
                parallel,
                agent,
                instructions,
            }
        }
        Err(e) => Task {
            id: id.to_string(),
            gate: Gate::Invalid {
                reason: e.to_string(),
            },
            parallel: false,
            agent: None,
            instructions: String::new(),
        },
    }
}

fn parse_parts(content: &str) -> Result<(TaskHeader, String)> {
    let rest = content
        .strip_prefix("---")
        .ok_or_else(|| anyhow!("missing front matter"))?;
    let (front, body) = rest
        .split_once("\n---")
        .ok_or_else(|| anyhow!("unterminated front matter"))?;
    let header: TaskHeader = serde_yaml::from_str(front).context("parsing task header")?;
    let instructions = body.trim_start_matches('\n').trim().to_string();
    Ok((header, instructions))
}

fn build_gate(header: &TaskHeader) -> Result<Gate> {
    match header.gate.as_str() {
        "cooldown" => {
            let interval = header
                .interval
                .as_deref()
                .ok_or_else(|| anyhow!("cooldown gate needs interval"))?;
            Ok(Gate::Cooldown {
                interval: parse_duration(interval)?,
            })
        }
        "cron" => {
            let schedule = header
                .schedule
                .as_deref()
                .ok_or_else(|| anyhow!("cron gate needs schedule"))?;
            Ok(Gate::Cron {
                schedule: CronSchedule::parse(schedule)?,
            })
        }
        "condition" => {
            let check = header
                .check
                .as_deref()
                .ok_or_else(|| anyhow!("condition gate needs check"))?;
            let operator = header
                .operator
                .as_deref()
                .ok_or_else(|| anyhow!("condition gate needs operator"))?;
            let operator = Operator::parse(operator)
                .ok_or_else(|| anyhow!("unknown operator {operator:?}"))?;
            let threshold = match &header.threshold {
                Some(serde_yaml::Value::Number(n)) => n
                    .as_f64()
                    .ok_or_else(|| anyhow!("non-numeric threshold"))?,
                Some(other) => return Err(anyhow!("non-numeric threshold {other:?}")),
                None => return Err(anyhow!("condition gate needs threshold")),
            };
            let cooldown = header
                .cooldown
                .as_deref()
                .map(parse_duration)
                .transpose()?;
            Ok(Gate::Condition {
                check: check.to_string(),
                operator,
                threshold,
                cooldown,
            })
        }
        "event" => {
            let trigger = header
                .trigger
                .as_deref()
                .ok_or_else(|| anyhow!("event gate needs trigger"))?;
            Ok(Gate::Event {
                trigger: Trigger::parse(trigger),
            })
        }
        other => Err(anyhow!("unknown gate type {other:?}")),
    }
}

/// Load every task document (*.md) from a directory, sorted by id.
/// A missing directory means no tasks, not an error.
pub fn load_tasks(dir: &Path) -> Result<Vec<Task>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("reading tasks directory {}", dir.display())))
        }
    };

    let mut tasks = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match std::fs::read_to_string(&path) {
            Ok(content) => tasks.push(parse_task(id, &content)),
            Err(e) => log::warn!("skipping unreadable task {}: {e}", path.display()),
        }
    }
    tasks.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_parse_cooldown_task() {
        let doc = "---\ngate: cooldown\ninterval: 24h\nparallel: true\nagent: gastown/toast\n---\nSweep the yard.\n";
        let task = parse_task("yard-sweep", doc);
        assert_eq!(
            task.gate,
            Gate::Cooldown {
                interval: Duration::hours(24)
            }
        );
        assert!(task.parallel);
        assert_eq!(task.agent.as_deref(), Some("gastown/toast"));
        assert_eq!(task.instructions, "Sweep the yard.");
    }

    #[test]
    fn test_parse_condition_task() {
        let doc = "---\ngate: condition\ncheck: \"queue-depth\"\noperator: gt\nthreshold: 100\ncooldown: 30m\n---\nDrain the queue.\n";
        let task = parse_task("queue-drain", doc);
        match task.gate {
            Gate::Condition {
                operator,
                threshold,
                cooldown,
                ..
            } => {
                assert_eq!(operator, Operator::Gt);
                assert_eq!(threshold, 100.0);
                assert_eq!(cooldown, Some(Duration::minutes(30)));
            }
            other => panic!("unexpected gate {other:?}"),
        }
    }

    #[test]
    fn test_parse_event_task() {
        let doc = "---\ngate: event\ntrigger: startup\n---\nAnnounce the town is up.\n";
        let task = parse_task("boot-notice", doc);
        assert_eq!(
            task.gate,
            Gate::Event {
                trigger: Trigger::Startup
            }
        );
    }

    #[test]
    fn test_bad_duration_yields_invalid_gate() {
        let doc = "---\ngate: cooldown\ninterval: soon\n---\nNever mind.\n";
        let task = parse_task("broken", doc);
        assert!(matches!(task.gate, Gate::Invalid { .. }));
    }

    #[test]
    fn test_unknown_operator_yields_invalid_gate() {
        let doc = "---\ngate: condition\ncheck: x\noperator: within\nthreshold: 5\n---\nx\n";
        let task = parse_task("broken", doc);
        match task.gate {
            Gate::Invalid { reason } => assert!(reason.contains("operator")),
            other => panic!("unexpected gate {other:?}"),
        }
    }

    #[test]
    fn test_non_numeric_threshold_yields_invalid_gate() {
        let doc = "---\ngate: condition\ncheck: x\noperator: gt\nthreshold: lots\n---\nx\n";
        let task = parse_task("broken", doc);
        assert!(matches!(task.gate, Gate::Invalid { .. }));
    }

    #[test]
    fn test_missing_front_matter_yields_invalid_gate() {
        let task = parse_task("broken", "just some prose");
        assert!(matches!(task.gate, Gate::Invalid { .. }));
    }

    #[test]
    fn test_load_tasks_sorted() {
        let dir = tempfile::TempDir::new().unwrap();
        let write = |name: &str| {
            std::fs::write(
                dir.path().join(name),
                "---\ngate: event\ntrigger: heartbeat\n---\ngo\n",
            )
            .unwrap()
        };
        write("b-task.md");
        write("a-task.md");
        std::fs::write(dir.path().join("notes.txt"), "not a task").unwrap();

        let tasks = load_tasks(dir.path()).unwrap();
        let ids: Vec<_> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a-task", "b-task"]);
    }

    #[test]
    fn test_load_tasks_missing_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let tasks = load_tasks(&dir.path().join("absent")).unwrap();
        assert!(tasks.is_empty());
    }
}
