use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::process::Command;

/// One record handed to the work ledger. The ledger has no native mail
/// schema, so mail metadata rides in `labels`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerRecord {
    pub record_type: String,
    pub title: String,
    pub assignee: String,
    pub description: String,
    /// Ledger-native numeric priority, 0 (urgent) through 3 (low).
    pub priority: u8,
    pub labels: Vec<String>,
    /// Identity the record is created as.
    pub created_by: String,
}

/// Create/query interface over the external work ledger.
pub trait WorkLedger: Send + Sync {
    fn create_record(&self, record: &LedgerRecord) -> Result<()>;
    /// Number of pending records assigned to the given address.
    fn pending_for(&self, assignee: &str) -> Result<usize>;
}

/// Ledger backed by the `bd` command-line tool.
pub struct BdLedger {
    work_dir: PathBuf,
}

impl BdLedger {
    /// `work_dir` must contain the ledger database.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    fn run(&self, args: &[&str], identity: &str) -> Result<String> {
        let output = Command::new("bd")
            .args(args)
            .current_dir(&self.work_dir)
            .env("BD_AGENT_NAME", identity)
            .output()
            .context("running bd")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if stderr.is_empty() {
                bail!("bd {} failed", args.first().unwrap_or(&""));
            }
            bail!("{stderr}");
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl WorkLedger for BdLedger {
    fn create_record(&self, record: &LedgerRecord) -> Result<()> {
        let priority = record.priority.to_string();
        let mut args = vec![
            "create",
            "--type",
            &record.record_type,
            "--title",
            &record.title,
            "--assignee",
            &record.assignee,
            "--priority",
            &priority,
        ];
        if !record.description.is_empty() {
            args.push("--description");
            args.push(&record.description);
        }
        let labels = record.labels.join(",");
        if !labels.is_empty() {
            args.push("--labels");
            args.push(&labels);
        }
        self.run(&args, &record.created_by)?;
        Ok(())
    }

    fn pending_for(&self, assignee: &str) -> Result<usize> {
        let out = self.run(
            &["list", "--status", "open", "--assignee", assignee, "--count"],
            assignee,
        )?;
        out.trim()
            .parse()
            .with_context(|| format!("parsing bd count output {:?}", out.trim()))
    }
}
