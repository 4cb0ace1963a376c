// ABOUTME: Conversation lifecycle coordination for agent engines
// ABOUTME: Event hub, metadata store and the coordinator running one engine per conversation

pub mod coordinator;
pub mod engine;
pub mod events;
pub mod hub;
pub mod model;
pub mod settings;
pub mod store;

pub use coordinator::{ConversationCoordinator, ConversationError, LocalConversationCoordinator};
pub use engine::{AgentEngine, EngineContext, EngineError, EngineFactory, EngineState};
pub use events::{ConversationEvent, EventKind, EventSink};
pub use hub::{EventCallback, EventHub, SubscriptionId};
pub use model::{
    ConversationInfo, ConversationRecord, ConversationStatus, Message, Role,
    StartConversationRequest,
};
pub use settings::CoordinatorSettings;
pub use store::{ConversationStore, FileConversationStore, StoreError, META_FILE_NAME};
