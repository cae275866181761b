use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Session id prefix for every supervised session.
pub const SESSION_PREFIX: &str = "gt-";

/// Town-wide configuration, constructed once at the process edge and passed
/// into every component. Components never read the environment themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TownConfig {
    /// Root directory holding town state, tasks, and the event log.
    pub town_root: PathBuf,
    /// Maximum concurrent tasks in the parallel dispatch group.
    pub parallel_limit: usize,
    /// How long to wait for a worker process to reach a ready state.
    pub ready_timeout: Duration,
    /// Settling delay between dependent session startup steps.
    pub settle_delay: Duration,
    /// Grace period between a graceful interrupt and a forced kill.
    pub stop_grace: Duration,
    /// Poll interval for the restart-watch loop.
    pub watch_interval: Duration,
    /// Command launched inside a fresh worker session.
    pub agent_command: String,
}

impl TownConfig {
    pub fn new(town_root: impl Into<PathBuf>) -> Self {
        Self {
            town_root: town_root.into(),
            parallel_limit: 4,
            ready_timeout: Duration::from_secs(60),
            settle_delay: Duration::from_millis(500),
            stop_grace: Duration::from_secs(2),
            watch_interval: Duration::from_secs(10),
            agent_command: "agent".to_string(),
        }
    }

    /// Resolve the town root from GT_TOWN_ROOT, falling back to ~/gt.
    pub fn from_env() -> Self {
        let root = std::env::var("GT_TOWN_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                Path::new(&home).join("gt")
            });
        Self::new(root)
    }

    /// Directory holding task definition documents.
    pub fn tasks_dir(&self) -> PathBuf {
        self.town_root.join("tasks")
    }

    /// Directory holding per-entity persisted state records.
    pub fn state_dir(&self) -> PathBuf {
        self.town_root.join("state")
    }

    /// Path of the shared append-only event stream.
    pub fn events_path(&self) -> PathBuf {
        self.town_root.join(".events.jsonl")
    }

    /// Directory used by the restart-watch loop for trigger and activity files.
    pub fn daemon_dir(&self) -> PathBuf {
        self.town_root.join("daemon")
    }
}
