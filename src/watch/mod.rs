//! Supervisor self-recovery: a fixed-interval polling loop that acts on a
//! restart trigger file, plus best-effort activity signaling.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::TownConfig;
use crate::session::{LifecycleError, SessionManager, SessionSpec};

const TRIGGER_FILE: &str = "restart.trigger";
const ACTIVITY_FILE: &str = "activity.json";

/// Town-level activity signal, touched on every supervisor action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivitySignal {
    pub last_command: String,
    pub timestamp: DateTime<Utc>,
}

impl ActivitySignal {
    /// Age of the signal; effectively infinite when absent.
    pub fn age(signal: Option<&ActivitySignal>) -> Duration {
        match signal {
            Some(s) => Utc::now() - s.timestamp,
            None => Duration::days(365),
        }
    }
}

/// Record activity best-effort; errors are ignored, this is a status signal
/// for idle-backoff decisions, not state.
pub fn touch_activity(daemon_dir: &Path, command: &str) {
    if std::fs::create_dir_all(daemon_dir).is_err() {
        return;
    }
    let signal = ActivitySignal {
        last_command: command.to_string(),
        timestamp: Utc::now(),
    };
    if let Ok(data) = serde_json::to_vec(&signal) {
        let _ = std::fs::write(daemon_dir.join(ACTIVITY_FILE), data);
    }
}

/// Read the current activity signal, tolerating absence and corruption.
pub fn read_activity(daemon_dir: &Path) -> Option<ActivitySignal> {
    let data = std::fs::read(daemon_dir.join(ACTIVITY_FILE)).ok()?;
    serde_json::from_slice(&data).ok()
}

/// Request a restart on the next watch poll.
pub fn request_restart(daemon_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(daemon_dir)?;
    std::fs::write(daemon_dir.join(TRIGGER_FILE), b"restart\n")?;
    Ok(())
}

/// Single-threaded restart watcher. Sleeps a fixed interval, checks for the
/// trigger file, restarts the watched sessions, repeats. A triggered
/// restart blocks the loop for its duration; restarts are rare.
pub struct RestartWatch {
    daemon_dir: PathBuf,
    interval: std::time::Duration,
    manager: Arc<SessionManager>,
    watched: Vec<SessionSpec>,
}

impl RestartWatch {
    pub fn new(config: &TownConfig, manager: Arc<SessionManager>, watched: Vec<SessionSpec>) -> Self {
        Self {
            daemon_dir: config.daemon_dir(),
            interval: config.watch_interval,
            manager,
            watched,
        }
    }

    /// One poll: act if the trigger file is present. Returns whether a
    /// restart was performed.
    pub fn check_once(&self) -> bool {
        let trigger = self.daemon_dir.join(TRIGGER_FILE);
        if !trigger.exists() {
            return false;
        }
        // Consume the trigger before acting so a failed restart does not
        // retrigger forever.
        if let Err(e) = std::fs::remove_file(&trigger) {
            log::warn!("removing restart trigger: {e}");
            return false;
        }

        for spec in &self.watched {
            match self.manager.restart(spec) {
                Ok(_) => log::info!("restarted session {}", spec.id),
                Err(LifecycleError::AlreadyRunning) => {}
                Err(e) => log::error!("restarting session {}: {e}", spec.id),
            }
        }
        touch_activity(&self.daemon_dir, "restart-watch");
        true
    }

    /// Run forever. No work happens concurrently with the loop itself.
    pub fn run(&self) -> ! {
        loop {
            std::thread::sleep(self.interval);
            self.check_once();
        }
    }
}
