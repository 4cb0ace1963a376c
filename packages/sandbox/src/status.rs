// ABOUTME: Logical sandbox lifecycle status and its derivation from runtime state strings
// ABOUTME: Total mapping so any container state, known or not, yields exactly one status

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SandboxStatus {
    Starting,
    Running,
    Paused,
    Deleted,
    Error,
}

impl SandboxStatus {
    /// Translate a container-runtime state string into a sandbox status.
    ///
    /// Unknown states, including an empty string, map to `Error`.
    pub fn from_runtime_state(state: &str) -> Self {
        match state.trim().to_lowercase().as_str() {
            "created" | "restarting" => SandboxStatus::Starting,
            "running" => SandboxStatus::Running,
            "paused" => SandboxStatus::Paused,
            "exited" | "removing" => SandboxStatus::Deleted,
            _ => SandboxStatus::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxStatus::Starting => "STARTING",
            SandboxStatus::Running => "RUNNING",
            SandboxStatus::Paused => "PAUSED",
            SandboxStatus::Deleted => "DELETED",
            SandboxStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for SandboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
