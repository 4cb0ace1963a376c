// ABOUTME: Event records produced while a conversation executes
// ABOUTME: One tagged shape delivered to every subscriber, plus the sink engines emit through

use crate::hub::EventHub;
use crate::model::{ConversationStatus, Message};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Message {
        message: Message,
    },
    /// The agent invoked a tool
    Action {
        tool: String,
        arguments: serde_json::Value,
    },
    /// Result of a tool invocation
    Observation {
        tool: String,
        content: String,
    },
    StatusChanged {
        status: ConversationStatus,
    },
    /// Background execution failed; never raised to the caller that started it
    Error {
        detail: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEvent {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl ConversationEvent {
    pub fn new(conversation_id: Uuid, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// Handle engines use to publish events for one conversation
#[derive(Clone)]
pub struct EventSink {
    conversation_id: Uuid,
    hub: Arc<EventHub>,
}

impl EventSink {
    pub fn new(conversation_id: Uuid, hub: Arc<EventHub>) -> Self {
        Self {
            conversation_id,
            hub,
        }
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// Publish synchronously to every current subscriber
    pub fn emit(&self, kind: EventKind) {
        self.hub
            .publish(&ConversationEvent::new(self.conversation_id, kind));
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("conversation_id", &self.conversation_id)
            .field("subscribers", &self.hub.subscriber_count())
            .finish()
    }
}
