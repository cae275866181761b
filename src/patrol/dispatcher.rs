use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::task::Task;
use crate::state::StateStore;
use crate::types::RunResult;

/// Executes one open task. Implementations deliver the task's instructions
/// to the responsible agent; the dispatcher only cares about the outcome.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: &Task) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task_id: String,
    pub result: RunResult,
    pub error: Option<String>,
}

/// Aggregate result of one dispatch batch. A batch never fails wholesale;
/// individual failures are counted, not propagated.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<TaskOutcome>,
    /// Tasks whose gate stayed closed, with the reason.
    pub skipped: Vec<(String, String)>,
}

/// Executes open tasks: the parallel group concurrently under a bounded
/// fan-out, the sequential group one at a time in id order. Every attempted
/// task's run-state is persisted independently.
pub struct Dispatcher {
    store: Arc<StateStore>,
    runner: Arc<dyn TaskRunner>,
    parallel_limit: usize,
}

impl Dispatcher {
    pub fn new(store: Arc<StateStore>, runner: Arc<dyn TaskRunner>, parallel_limit: usize) -> Self {
        Self {
            store,
            runner,
            parallel_limit: parallel_limit.max(1),
        }
    }

    pub async fn dispatch(&self, open: Vec<Task>) -> CycleReport {
        let (parallel, sequential): (Vec<Task>, Vec<Task>) =
            open.into_iter().partition(|t| t.parallel);

        let mut report = CycleReport::default();

        // Parallel group: launched together, joined before the cycle
        // proceeds. One member's failure never cancels the others.
        let semaphore = Arc::new(Semaphore::new(self.parallel_limit));
        let mut set = JoinSet::new();
        for task in parallel {
            let runner = self.runner.clone();
            let semaphore = semaphore.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = runner.run(&task).await;
                (task, result)
            });
        }
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((task, result)) => self.record(&mut report, &task, result),
                Err(e) => log::error!("parallel task panicked: {e}"),
            }
        }

        // Sequential group: stable id order, one at a time; a failure does
        // not abort the rest.
        let mut sequential = sequential;
        sequential.sort_by(|a, b| a.id.cmp(&b.id));
        for task in sequential {
            let result = self.runner.run(&task).await;
            self.record(&mut report, &task, result);
        }

        report
    }

    fn record(&self, report: &mut CycleReport, task: &Task, result: anyhow::Result<()>) {
        let now = Utc::now();
        let (run_result, error) = match result {
            Ok(()) => (RunResult::Success, None),
            Err(e) => {
                log::warn!("task {} failed: {e:#}", task.id);
                (RunResult::Failure, Some(format!("{e:#}")))
            }
        };

        let next_eligible = task.gate.cooldown_interval().map(|d| now + d);
        let state_file = self.store.run_state(&task.id);
        match state_file.load() {
            Ok(mut rs) => {
                rs.record_attempt(run_result, now, next_eligible);
                if let Err(e) = state_file.save(&rs) {
                    log::error!("persisting run-state for {}: {e:#}", task.id);
                }
            }
            Err(e) => log::error!("loading run-state for {}: {e:#}", task.id),
        }

        match run_result {
            RunResult::Success => report.succeeded += 1,
            RunResult::Failure => report.failed += 1,
        }
        report.outcomes.push(TaskOutcome {
            task_id: task.id.clone(),
            result: run_result,
            error,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Gate;
    use anyhow::bail;
    use chrono::Duration;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct ScriptedRunner {
        fail: HashSet<String>,
        ran: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        fn new(fail: &[&str]) -> Self {
            Self {
                fail: fail.iter().map(|s| s.to_string()).collect(),
                ran: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TaskRunner for ScriptedRunner {
        async fn run(&self, task: &Task) -> anyhow::Result<()> {
            self.ran.lock().unwrap().push(task.id.clone());
            if self.fail.contains(&task.id) {
                bail!("scripted failure");
            }
            Ok(())
        }
    }

    fn task(id: &str, parallel: bool) -> Task {
        Task {
            id: id.to_string(),
            gate: Gate::Cooldown {
                interval: Duration::hours(24),
            },
            parallel,
            agent: None,
            instructions: "go".to_string(),
        }
    }

    #[tokio::test]
    async fn test_sequential_failure_does_not_abort_batch() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(StateStore::new(dir.path()));
        let runner = Arc::new(ScriptedRunner::new(&["b-seq"]));
        let dispatcher = Dispatcher::new(store.clone(), runner.clone(), 4);

        let report = dispatcher
            .dispatch(vec![task("c-seq", false), task("b-seq", false), task("a-seq", false)])
            .await;

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        // Stable id order for the sequential group.
        assert_eq!(
            *runner.ran.lock().unwrap(),
            vec!["a-seq", "b-seq", "c-seq"]
        );
    }

    #[tokio::test]
    async fn test_parallel_isolation_from_sequential_failure() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(StateStore::new(dir.path()));
        let runner = Arc::new(ScriptedRunner::new(&["seq-task"]));
        let dispatcher = Dispatcher::new(store.clone(), runner, 4);

        let report = dispatcher
            .dispatch(vec![
                task("par-one", true),
                task("par-two", true),
                task("seq-task", false),
            ])
            .await;

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);

        // Both parallel tasks' run-states advanced despite the failure.
        for id in ["par-one", "par-two"] {
            let rs = store.run_state(id).load().unwrap();
            assert_eq!(rs.run_count, 1);
            assert_eq!(rs.last_result, Some(RunResult::Success));
            assert!(rs.last_run.is_some());
        }
        let failed = store.run_state("seq-task").load().unwrap();
        assert_eq!(failed.run_count, 1);
        assert_eq!(failed.last_result, Some(RunResult::Failure));
        assert!(failed.last_run.is_none());
    }

    #[tokio::test]
    async fn test_success_projects_next_eligible() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(StateStore::new(dir.path()));
        let dispatcher = Dispatcher::new(store.clone(), Arc::new(ScriptedRunner::new(&[])), 4);

        let before = Utc::now();
        dispatcher.dispatch(vec![task("nightly", false)]).await;

        let rs = store.run_state("nightly").load().unwrap();
        let next = rs.next_eligible.unwrap();
        assert!(next >= before + Duration::hours(24));
        assert!(next <= Utc::now() + Duration::hours(24));
    }

    #[tokio::test]
    async fn test_parallel_fan_out_is_bounded() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct GaugeRunner {
            current: AtomicUsize,
            peak: AtomicUsize,
        }

        #[async_trait]
        impl TaskRunner for GaugeRunner {
            async fn run(&self, _task: &Task) -> anyhow::Result<()> {
                let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                self.current.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let dir = TempDir::new().unwrap();
        let store = Arc::new(StateStore::new(dir.path()));
        let runner = Arc::new(GaugeRunner {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let dispatcher = Dispatcher::new(store, runner.clone(), 2);

        let tasks: Vec<Task> = (0..6).map(|i| task(&format!("t{i}"), true)).collect();
        let report = dispatcher.dispatch(tasks).await;

        assert_eq!(report.succeeded, 6);
        assert!(runner.peak.load(Ordering::SeqCst) <= 2);
    }
}
