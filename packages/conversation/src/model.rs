// ABOUTME: Conversation records, derived status and request types
// ABOUTME: Serializable shapes shared by the store, coordinator and callers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Externally visible conversation status, derived from the engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationStatus {
    /// Engine instance exists and is neither paused nor finished
    Running,
    Paused,
    /// Terminal for the current engine instance
    Finished,
    /// No engine instance is held
    Stopped,
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConversationStatus::Running => "RUNNING",
            ConversationStatus::Paused => "PAUSED",
            ConversationStatus::Finished => "FINISHED",
            ConversationStatus::Stopped => "STOPPED",
        };
        f.write_str(s)
    }
}

/// Persisted conversation metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: Uuid,
    pub title: Option<String>,
    /// Handed verbatim to the engine factory on every fresh start
    pub agent_config: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationRecord {
    pub fn new(request: StartConversationRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: request.title,
            agent_config: request.agent_config,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Conversation record together with its current status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationInfo {
    #[serde(flatten)]
    pub record: ConversationRecord,
    pub status: ConversationStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartConversationRequest {
    pub title: Option<String>,
    #[serde(default)]
    pub agent_config: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
