pub mod dispatcher;
pub mod task;

pub use dispatcher::{CycleReport, Dispatcher, TaskOutcome, TaskRunner};
pub use task::{load_tasks, parse_task, Task};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::config::TownConfig;
use crate::gate::{self, Gate, Trigger, TriggerContext};
use crate::mail::WorkLedger;
use crate::session::{LifecycleError, SessionController, SessionManager, SessionSpec};
use crate::state::StateStore;
use crate::types::address::{session_id_for, Address};

/// The supervisory loop: evaluate gates, dispatch open tasks, persist
/// outcomes. One cycle runs to completion before the next begins.
pub struct Patrol {
    config: TownConfig,
    store: Arc<StateStore>,
    runner: Arc<dyn TaskRunner>,
    ledger: Option<Arc<dyn WorkLedger>>,
    startup_fired: bool,
}

impl Patrol {
    pub fn new(
        config: TownConfig,
        runner: Arc<dyn TaskRunner>,
        ledger: Option<Arc<dyn WorkLedger>>,
    ) -> Self {
        let store = Arc::new(StateStore::new(config.state_dir()));
        Self {
            config,
            store,
            runner,
            ledger,
            startup_fired: false,
        }
    }

    /// Run one patrol cycle. Never fails wholesale because a task failed;
    /// only infrastructure errors (unreadable task directory) surface.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let tasks = load_tasks(&self.config.tasks_dir())?;
        let triggers = self.assemble_triggers(&tasks);
        let now = Utc::now();

        let mut open = Vec::new();
        let mut skipped = Vec::new();
        for task in tasks {
            let probe = match task.gate.needs_probe() {
                Some(check) => run_probe(check).await,
                None => None,
            };
            let run_state = match self.store.run_state(&task.id).load() {
                Ok(rs) => rs,
                Err(e) => {
                    log::warn!("run-state for {} unreadable, using default: {e:#}", task.id);
                    Default::default()
                }
            };
            match gate::evaluate(&task.gate, &run_state, now, probe, &triggers) {
                gate::GateStatus::Open => open.push(task),
                gate::GateStatus::Closed { reason } => {
                    log::debug!("task {} closed: {reason}", task.id);
                    skipped.push((task.id, reason));
                }
            }
        }

        let dispatcher = Dispatcher::new(
            self.store.clone(),
            self.runner.clone(),
            self.config.parallel_limit,
        );
        let mut report = dispatcher.dispatch(open).await;
        report.skipped = skipped;

        self.startup_fired = true;
        log::info!(
            "patrol cycle: {} succeeded, {} failed, {} skipped",
            report.succeeded,
            report.failed,
            report.skipped.len()
        );
        Ok(report)
    }

    /// Run cycles forever at a fixed cadence, each to completion.
    pub async fn run_loop(&mut self, interval: Duration) -> Result<()> {
        loop {
            if let Err(e) = self.run_cycle().await {
                log::error!("patrol cycle failed: {e:#}");
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Collect pending trigger facts for this cycle's event gates.
    fn assemble_triggers(&self, tasks: &[Task]) -> TriggerContext {
        let mut triggers = TriggerContext {
            startup_pending: !self.startup_fired,
            ..Default::default()
        };

        let Some(ledger) = &self.ledger else {
            return triggers;
        };
        for task in tasks {
            if let Gate::Event {
                trigger: Trigger::Mailbox(name),
            } = &task.gate
            {
                match ledger.pending_for(name) {
                    Ok(n) if n > 0 => {
                        triggers.pending_mailboxes.insert(name.clone());
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("mailbox probe for {name} failed: {e}"),
                }
            }
        }
        triggers
    }
}

/// Run a condition gate's check command and parse its output as a number.
/// Any failure (spawn error, non-zero exit, non-numeric output) yields None
/// and the gate fails closed.
async fn run_probe(check: &str) -> Option<f64> {
    let output = match tokio::process::Command::new("sh")
        .arg("-c")
        .arg(check)
        .output()
        .await
    {
        Ok(out) => out,
        Err(e) => {
            log::warn!("probe {check:?} failed to spawn: {e}");
            return None;
        }
    };
    if !output.status.success() {
        log::warn!("probe {check:?} exited with {}", output.status);
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    match stdout.trim().parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("probe {check:?} produced non-numeric output");
            None
        }
    }
}

/// Runs a task by making sure the responsible agent's session is alive and
/// handing it the instructions.
pub struct SessionTaskRunner {
    config: TownConfig,
    manager: Arc<SessionManager>,
    controller: Arc<dyn SessionController>,
}

impl SessionTaskRunner {
    pub fn new(
        config: TownConfig,
        manager: Arc<SessionManager>,
        controller: Arc<dyn SessionController>,
    ) -> Self {
        Self {
            config,
            manager,
            controller,
        }
    }

    fn spec_for(&self, address: &str, session_id: &str) -> SessionSpec {
        let role = Address::parse(address)
            .map(|a| a.role().to_string())
            .unwrap_or_else(|| "worker".to_string());
        SessionSpec {
            id: session_id.to_string(),
            role: role.clone(),
            dir: self.config.town_root.join(address.trim_end_matches('/')),
            command: self.config.agent_command.clone(),
            env: vec![
                ("GT_ROLE".to_string(), role),
                (
                    "GT_TOWN_ROOT".to_string(),
                    self.config.town_root.display().to_string(),
                ),
            ],
        }
    }
}

#[async_trait]
impl TaskRunner for SessionTaskRunner {
    async fn run(&self, task: &Task) -> Result<()> {
        let Some(address) = task.agent.clone() else {
            bail!("task {} names no responsible agent", task.id);
        };
        let Some(session_id) = session_id_for(&address) else {
            bail!("task {} has unroutable agent address {address:?}", task.id);
        };

        let spec = self.spec_for(&address, &session_id);
        let manager = self.manager.clone();
        let controller = self.controller.clone();
        let instructions = task.instructions.clone();

        // Lifecycle calls block on the terminal-control collaborator.
        tokio::task::spawn_blocking(move || -> Result<()> {
            if !manager.is_running(&spec.id)? {
                match manager.start(&spec) {
                    Ok(_) | Err(LifecycleError::AlreadyRunning) => {}
                    Err(e) => return Err(e.into()),
                }
            }
            controller.send_keys(&spec.id, &instructions)?;
            Ok(())
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateStatus;
    use crate::types::RunState;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct CountingRunner {
        ran: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TaskRunner for CountingRunner {
        async fn run(&self, task: &Task) -> Result<()> {
            self.ran.lock().unwrap().push(task.id.clone());
            Ok(())
        }
    }

    struct StubLedger {
        pending: HashSet<String>,
    }

    impl WorkLedger for StubLedger {
        fn create_record(&self, _: &crate::mail::LedgerRecord) -> Result<()> {
            Ok(())
        }
        fn pending_for(&self, assignee: &str) -> Result<usize> {
            Ok(usize::from(self.pending.contains(assignee)))
        }
    }

    fn write_task(dir: &std::path::Path, id: &str, body: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(format!("{id}.md")), body).unwrap();
    }

    #[tokio::test]
    async fn test_startup_gate_fires_once_per_process() {
        let dir = TempDir::new().unwrap();
        let config = TownConfig::new(dir.path());
        write_task(
            &config.tasks_dir(),
            "boot-notice",
            "---\ngate: event\ntrigger: startup\n---\nannounce\n",
        );

        let runner = Arc::new(CountingRunner {
            ran: Mutex::new(Vec::new()),
        });
        let mut patrol = Patrol::new(config, runner.clone(), None);

        let first = patrol.run_cycle().await.unwrap();
        assert_eq!(first.succeeded, 1);

        let second = patrol.run_cycle().await.unwrap();
        assert_eq!(second.succeeded, 0);
        assert_eq!(second.skipped.len(), 1);
        assert_eq!(*runner.ran.lock().unwrap(), vec!["boot-notice"]);
    }

    #[tokio::test]
    async fn test_mailbox_gate_uses_ledger() {
        let dir = TempDir::new().unwrap();
        let config = TownConfig::new(dir.path());
        write_task(
            &config.tasks_dir(),
            "check-mail",
            "---\ngate: event\ntrigger: deacon\n---\nread your mail\n",
        );

        let runner = Arc::new(CountingRunner {
            ran: Mutex::new(Vec::new()),
        });

        let empty = Arc::new(StubLedger {
            pending: HashSet::new(),
        });
        let mut patrol = Patrol::new(config.clone(), runner.clone(), Some(empty));
        let report = patrol.run_cycle().await.unwrap();
        assert_eq!(report.succeeded, 0);

        let full = Arc::new(StubLedger {
            pending: HashSet::from(["deacon".to_string()]),
        });
        let mut patrol = Patrol::new(config, runner.clone(), Some(full));
        let report = patrol.run_cycle().await.unwrap();
        assert_eq!(report.succeeded, 1);
    }

    #[tokio::test]
    async fn test_invalid_task_is_skipped_with_reason() {
        let dir = TempDir::new().unwrap();
        let config = TownConfig::new(dir.path());
        write_task(
            &config.tasks_dir(),
            "broken",
            "---\ngate: cooldown\ninterval: whenever\n---\nx\n",
        );

        let runner = Arc::new(CountingRunner {
            ran: Mutex::new(Vec::new()),
        });
        let mut patrol = Patrol::new(config, runner.clone(), None);
        let report = patrol.run_cycle().await.unwrap();

        assert_eq!(report.succeeded + report.failed, 0);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].1.contains("invalid gate"));
        assert!(runner.ran.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_probe_numeric_output() {
        assert_eq!(run_probe("echo 120").await, Some(120.0));
        assert_eq!(run_probe("echo not-a-number").await, None);
        assert_eq!(run_probe("exit 3").await, None);
    }

    #[test]
    fn test_closed_gate_status_carries_reason() {
        let gate = Gate::Invalid {
            reason: "bad spec".to_string(),
        };
        let status = gate::evaluate(
            &gate,
            &RunState::default(),
            Utc::now(),
            None,
            &TriggerContext::default(),
        );
        assert!(matches!(status, GateStatus::Closed { .. }));
    }
}
