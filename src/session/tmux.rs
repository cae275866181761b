use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Command;

use super::controller::SessionController;

/// Shells beginning a pane before the worker launches, or left behind after
/// it dies. A pane showing one of these has no live worker.
const SHELLS: &[&str] = &["bash", "zsh", "sh", "fish"];

/// Thin tmux-backed implementation of the session control surface.
pub struct TmuxController;

impl TmuxController {
    pub fn new() -> Self {
        Self
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("tmux")
            .args(args)
            .output()
            .context("running tmux")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("tmux {}: {}", args.first().unwrap_or(&""), stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for TmuxController {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionController for TmuxController {
    fn has_session(&self, id: &str) -> Result<bool> {
        let status = Command::new("tmux")
            .args(["has-session", "-t", id])
            .output()
            .context("running tmux has-session")?;
        Ok(status.status.success())
    }

    fn create_session(&self, id: &str, dir: &Path, command: &str) -> Result<()> {
        // Launch with the command directly instead of racing send-keys
        // against session creation.
        let dir = dir.to_string_lossy();
        self.run(&["new-session", "-d", "-s", id, "-c", &dir, command])?;
        Ok(())
    }

    fn kill_session(&self, id: &str) -> Result<()> {
        self.run(&["kill-session", "-t", id])?;
        Ok(())
    }

    fn send_keys(&self, id: &str, text: &str) -> Result<()> {
        self.run(&["send-keys", "-t", id, text, "Enter"])?;
        Ok(())
    }

    fn interrupt(&self, id: &str) -> Result<()> {
        self.run(&["send-keys", "-t", id, "C-c"])?;
        Ok(())
    }

    fn set_env(&self, id: &str, key: &str, value: &str) -> Result<()> {
        self.run(&["set-environment", "-t", id, key, value])?;
        Ok(())
    }

    fn worker_alive(&self, id: &str) -> Result<bool> {
        if !self.has_session(id)? {
            return Ok(false);
        }
        let out = self.run(&["list-panes", "-t", id, "-F", "#{pane_current_command}"])?;
        Ok(out
            .lines()
            .map(str::trim)
            .any(|cmd| !cmd.is_empty() && !SHELLS.contains(&cmd)))
    }
}
