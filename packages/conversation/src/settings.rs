// ABOUTME: Conversation coordinator settings loaded from the environment
// ABOUTME: Where conversation metadata and agent workspaces live on disk

use berth_config::{env_opt, BERTH_CONVERSATIONS_DIR, BERTH_WORKSPACE_DIR};
use berth_core::berth_dir;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorSettings {
    /// Root of per-conversation metadata directories
    pub conversations_dir: PathBuf,
    /// Root of per-conversation working directories handed to the engine
    pub workspace_dir: PathBuf,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        let base = berth_dir();
        Self {
            conversations_dir: base.join("conversations"),
            workspace_dir: base.join("workspace"),
        }
    }
}

impl CoordinatorSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            conversations_dir: env_opt(BERTH_CONVERSATIONS_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.conversations_dir),
            workspace_dir: env_opt(BERTH_WORKSPACE_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_dir),
        }
    }

    /// Settings rooted at a single directory, used by tests and embedded setups
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            conversations_dir: root.join("conversations"),
            workspace_dir: root.join("workspace"),
        }
    }

    pub fn working_dir_for(&self, id: Uuid) -> PathBuf {
        self.workspace_dir.join(id.simple().to_string())
    }

    /// Directory the engine persists its own state to, inside the metadata directory
    pub fn persistence_dir_for(&self, id: Uuid) -> PathBuf {
        self.conversations_dir
            .join(id.simple().to_string())
            .join("conversation")
    }
}
