use anyhow::Result;
use std::path::Path;
use std::time::Duration;

use super::poll::poll_until;

/// Narrow control surface over the terminal-multiplexing driver.
///
/// The driver itself is an external collaborator; the lifecycle manager only
/// needs these operations. The supervised worker process is opaque beyond
/// its liveness.
pub trait SessionController: Send + Sync {
    fn has_session(&self, id: &str) -> Result<bool>;
    fn create_session(&self, id: &str, dir: &Path, command: &str) -> Result<()>;
    fn kill_session(&self, id: &str) -> Result<()>;
    fn send_keys(&self, id: &str, text: &str) -> Result<()>;
    /// Send a graceful interrupt without submitting a line.
    fn interrupt(&self, id: &str) -> Result<()>;
    fn set_env(&self, id: &str, key: &str, value: &str) -> Result<()>;
    /// Whether the worker process inside the session is alive and responding.
    fn worker_alive(&self, id: &str) -> Result<bool>;

    /// Poll until the worker reports ready, with backoff, bounded by
    /// `timeout`. Returns false on timeout.
    fn wait_until_ready(&self, id: &str, timeout: Duration) -> Result<bool> {
        poll_until(timeout, Duration::from_millis(200), || self.worker_alive(id))
    }
}
