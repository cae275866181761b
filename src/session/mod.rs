pub mod controller;
pub mod poll;
pub mod tmux;

pub use controller::SessionController;
pub use tmux::TmuxController;

use anyhow::Result;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::TownConfig;
use crate::state::StateStore;
use crate::types::{AgentSession, SessionState};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("session already running")]
    AlreadyRunning,
    #[error("session not running")]
    NotRunning,
    #[error("worker failed to become ready within {0:?}")]
    ReadyTimeout(Duration),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Everything needed to launch one supervised session.
#[derive(Debug, Clone)]
pub struct SessionSpec {
    pub id: String,
    pub role: String,
    /// Working directory for the session; created if absent.
    pub dir: PathBuf,
    /// Initial command the session runs.
    pub command: String,
    /// Session-scoped environment, applied best-effort after creation.
    pub env: Vec<(String, String)>,
}

/// Outcome of one best-effort auxiliary step during a lifecycle transition.
/// Failures here are logged and recorded but never fail the operation.
#[derive(Debug, Clone)]
pub struct AuxOutcome {
    pub label: String,
    pub ok: bool,
    pub detail: Option<String>,
}

/// Report returned from a successful Start.
#[derive(Debug)]
pub struct StartReport {
    pub session: AgentSession,
    /// Whether a zombie container was killed before recreation.
    pub replaced_zombie: bool,
    pub aux: Vec<AuxOutcome>,
}

/// Read-only status view: persisted state plus live attachment info.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub session: AgentSession,
    pub container_present: bool,
    pub worker_alive: bool,
}

/// Lifecycle manager for supervised worker sessions.
///
/// Transitions: Stopped -Start-> Starting -> Running; Running -Stop->
/// Stopped; a Running session whose worker dies while the container
/// survives is a Zombie, and Start on a Zombie kills the container first.
/// Every completed transition is persisted before control returns.
pub struct SessionManager {
    config: TownConfig,
    store: StateStore,
    controller: Arc<dyn SessionController>,
}

impl SessionManager {
    pub fn new(config: TownConfig, controller: Arc<dyn SessionController>) -> Self {
        let store = StateStore::new(config.state_dir());
        Self {
            config,
            store,
            controller,
        }
    }

    /// Start a session. Idempotent: a verified-running session yields
    /// `AlreadyRunning` with no side effects. A zombie container is killed
    /// and recreated.
    pub fn start(&self, spec: &SessionSpec) -> Result<StartReport, LifecycleError> {
        let state_file = self.store.session(&spec.id);
        let mut replaced_zombie = false;

        if self.controller.has_session(&spec.id).map_err(LifecycleError::Other)? {
            if self
                .controller
                .worker_alive(&spec.id)
                .map_err(LifecycleError::Other)?
            {
                return Err(LifecycleError::AlreadyRunning);
            }
            // Container alive, worker dead: kill before recreating.
            self.persist(&state_file, spec, SessionState::Zombie, None)?;
            self.controller
                .kill_session(&spec.id)
                .map_err(LifecycleError::Other)?;
            replaced_zombie = true;
        }

        std::fs::create_dir_all(&spec.dir)
            .map_err(|e| LifecycleError::Other(anyhow::Error::new(e)))?;

        self.persist(&state_file, spec, SessionState::Starting, None)?;
        self.controller
            .create_session(&spec.id, &spec.dir, &spec.command)
            .map_err(LifecycleError::Other)?;

        let mut aux = Vec::new();
        for (key, value) in &spec.env {
            self.aux(&mut aux, &format!("set-env {key}"), || {
                self.controller.set_env(&spec.id, key, value)
            });
        }
        // Cosmetic session config; the session works without it.
        self.aux(&mut aux, "set-title", || {
            self.controller
                .set_env(&spec.id, "GT_SESSION_TITLE", &spec.role)
        });

        let ready = self
            .controller
            .wait_until_ready(&spec.id, self.config.ready_timeout)
            .map_err(LifecycleError::Other)?;
        if !ready {
            // Fatal: tear down and report.
            let _ = self.controller.kill_session(&spec.id);
            self.persist(&state_file, spec, SessionState::Stopped, None)?;
            return Err(LifecycleError::ReadyTimeout(self.config.ready_timeout));
        }

        let started_at = Utc::now();
        let session = self.persist(&state_file, spec, SessionState::Running, Some(started_at))?;

        // Startup notification and activation signal, with settling delays
        // so we do not race the worker's own startup sequence.
        self.aux(&mut aux, "startup-notice", || {
            self.controller.send_keys(
                &spec.id,
                &format!("gt session ready: {} ({})", spec.id, spec.role),
            )
        });
        std::thread::sleep(self.config.settle_delay);
        self.aux(&mut aux, "activation-signal", || {
            self.controller
                .send_keys(&spec.id, &format!("gt nudge {}", spec.role))
        });

        Ok(StartReport {
            session,
            replaced_zombie,
            aux,
        })
    }

    /// Stop a session: graceful interrupt, short grace period, then forced
    /// kill regardless of whether the interrupt was acknowledged.
    pub fn stop(&self, id: &str) -> Result<(), LifecycleError> {
        if !self.controller.has_session(id).map_err(LifecycleError::Other)? {
            return Err(LifecycleError::NotRunning);
        }

        if let Err(e) = self.controller.interrupt(id) {
            log::warn!("graceful interrupt for {id} failed: {e}");
        }
        let _ = poll::poll_until(self.config.stop_grace, Duration::from_millis(100), || {
            Ok(!self.controller.worker_alive(id)?)
        });

        self.controller.kill_session(id).map_err(LifecycleError::Other)?;

        let state_file = self.store.session(id);
        let mut session = state_file.load().map_err(LifecycleError::Other)?;
        session.id = id.to_string();
        session.state = SessionState::Stopped;
        state_file.save(&session).map_err(LifecycleError::Other)?;
        Ok(())
    }

    /// Stop (errors logged, not fatal) followed by Start.
    pub fn restart(&self, spec: &SessionSpec) -> Result<StartReport, LifecycleError> {
        match self.stop(&spec.id) {
            Ok(()) | Err(LifecycleError::NotRunning) => {}
            Err(e) => log::warn!("stop during restart of {}: {e}", spec.id),
        }
        self.start(spec)
    }

    /// Read-only status: persisted record reconciled with live container
    /// attachment. Detects and persists the zombie transition.
    pub fn status(&self, id: &str) -> Result<SessionStatus> {
        let state_file = self.store.session(id);
        let mut session = state_file.load()?;
        if session.id.is_empty() {
            session.id = id.to_string();
        }

        let container_present = self.controller.has_session(id)?;
        let worker_alive = container_present && self.controller.worker_alive(id)?;

        if session.state == SessionState::Running {
            if !container_present {
                session.state = SessionState::Stopped;
                state_file.save(&session)?;
            } else if !worker_alive {
                session.state = SessionState::Zombie;
                state_file.save(&session)?;
            }
        }

        Ok(SessionStatus {
            session,
            container_present,
            worker_alive,
        })
    }

    /// Whether the session's worker is alive right now.
    pub fn is_running(&self, id: &str) -> Result<bool> {
        self.controller.worker_alive(id)
    }

    fn persist(
        &self,
        state_file: &crate::state::StateFile<AgentSession>,
        spec: &SessionSpec,
        state: SessionState,
        started_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<AgentSession, LifecycleError> {
        let mut session = state_file.load().map_err(LifecycleError::Other)?;
        session.id = spec.id.clone();
        session.role = spec.role.clone();
        session.state = state;
        if started_at.is_some() {
            session.started_at = started_at;
        }
        state_file.save(&session).map_err(LifecycleError::Other)?;
        Ok(session)
    }

    fn aux(&self, outcomes: &mut Vec<AuxOutcome>, label: &str, f: impl FnOnce() -> Result<()>) {
        match f() {
            Ok(()) => outcomes.push(AuxOutcome {
                label: label.to_string(),
                ok: true,
                detail: None,
            }),
            Err(e) => {
                log::warn!("best-effort step {label} failed: {e}");
                outcomes.push(AuxOutcome {
                    label: label.to_string(),
                    ok: false,
                    detail: Some(e.to_string()),
                });
            }
        }
    }
}
