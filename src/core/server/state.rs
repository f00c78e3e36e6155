use serde::{Deserialize, Serialize};

/// Lifecycle state of a managed server process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServerState {
    /// Not running. Initial state, and the result of a requested clean exit.
    Stopped,
    /// Process spawned, waiting for a ready line.
    Starting,
    /// Ready line seen.
    Running,
    /// Stop requested, waiting for the process to exit.
    Stopping,
    /// Process exited without a clean, requested stop.
    Crashed,
}

impl ServerState {
    /// States in which an OS process is attached.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            ServerState::Starting | ServerState::Running | ServerState::Stopping
        )
    }

    /// States in which writing to the console is allowed.
    pub fn accepts_commands(self) -> bool {
        matches!(self, ServerState::Running | ServerState::Stopping)
    }

    /// Final state for an exited process.
    ///
    /// Only a zero exit code following an explicit stop request counts as a
    /// clean stop; everything else (unrequested exits, nonzero codes, signals)
    /// is a crash.
    pub fn after_exit(stop_requested: bool, exit_code: Option<i32>) -> Self {
        match (stop_requested, exit_code) {
            (true, Some(0)) => ServerState::Stopped,
            _ => ServerState::Crashed,
        }
    }
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerState::Stopped => write!(f, "STOPPED"),
            ServerState::Starting => write!(f, "STARTING"),
            ServerState::Running => write!(f, "RUNNING"),
            ServerState::Stopping => write!(f, "STOPPING"),
            ServerState::Crashed => write!(f, "CRASHED"),
        }
    }
}
