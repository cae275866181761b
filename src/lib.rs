//! Greytown: a fleet supervisor for ephemeral agent sessions.
//!
//! The supervisor keeps a town of terminal-hosted agent workers alive and
//! productive: a patrol loop admits registered tasks through declarative
//! gates, a session manager drives worker lifecycle through a terminal
//! controller, a router delivers mail through the shared work ledger, and
//! an offset-tracked reader narrates the append-only activity stream.

pub mod config;
pub mod events;
pub mod gate;
pub mod mail;
pub mod patrol;
pub mod session;
pub mod state;
pub mod types;
pub mod watch;

pub use config::{TownConfig, SESSION_PREFIX};
pub use events::{Event, EventReader, NarrativeEvent, Significance};
pub use gate::{Gate, GateStatus};
pub use mail::{Message, Router};
pub use patrol::{Patrol, SessionTaskRunner, Task};
pub use session::{SessionManager, SessionSpec, SessionStatus};
pub use types::address::Address;
pub use types::{AgentSession, RunResult, RunState, SessionState};
