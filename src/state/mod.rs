use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// An atomically updated JSON record on disk holding one entity's state.
///
/// Loading a missing file yields the default value, so first use is never an
/// error. Saves go through a temp file and rename, so a concurrent reader
/// never observes a partially written record. Each entity has exactly one
/// writer by convention; the store does no cross-entity coordination.
pub struct StateFile<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T> StateFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<T> {
        match fs::read(&self.path) {
            Ok(data) => serde_json::from_slice(&data)
                .with_context(|| format!("parsing state file {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => {
                Err(anyhow::Error::new(e)
                    .context(format!("reading state file {}", self.path.display())))
            }
        }
    }

    pub fn save(&self, value: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating state directory {}", parent.display()))?;
        }

        let data = serde_json::to_vec_pretty(value).context("serializing state")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)
            .with_context(|| format!("writing temp state file {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing state file {}", self.path.display()))?;
        Ok(())
    }
}

/// Root of the per-entity state tree under the town directory.
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Run-state record for a task, keyed by task id.
    pub fn run_state(&self, task_id: &str) -> StateFile<crate::types::RunState> {
        StateFile::new(self.root.join("runstate").join(format!("{task_id}.json")))
    }

    /// Persisted session record, keyed by session id. A missing file loads
    /// as a stopped session with no identity; the lifecycle manager fills in
    /// id and role before the first save.
    pub fn session(&self, session_id: &str) -> StateFile<crate::types::AgentSession> {
        StateFile::new(self.root.join("sessions").join(format!("{session_id}.json")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RunResult, RunState};
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_returns_default() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());

        let rs = store.run_state("nightly-sweep").load().unwrap();
        assert_eq!(rs.run_count, 0);
        assert!(rs.last_run.is_none());
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        let file = store.run_state("nightly-sweep");

        let mut rs = RunState::default();
        rs.record_attempt(RunResult::Success, Utc::now(), None);
        file.save(&rs).unwrap();

        let loaded = file.load().unwrap();
        assert_eq!(loaded.run_count, 1);
        assert_eq!(loaded.last_result, Some(RunResult::Success));
        assert_eq!(loaded.last_run, rs.last_run);
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let file: StateFile<RunState> = StateFile::new(dir.path().join("rs.json"));
        file.save(&RunState::default()).unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["rs.json".to_string()]);
    }
}
