// ABOUTME: Sandbox lifecycle orchestration over a container runtime
// ABOUTME: Identity codec, status translation, port allocation, spec registries and the orchestrator

pub mod identity;
pub mod orchestrator;
pub mod ports;
pub mod providers;
pub mod record;
pub mod session_key;
pub mod settings;
pub mod specs;
pub mod status;

pub use identity::SandboxNaming;
pub use orchestrator::{
    OrchestratorError, SandboxManager, SandboxOrchestrator, LABEL_MANAGED, LABEL_OWNER,
    LABEL_PORT_PREFIX, LABEL_SPEC,
};
pub use ports::{PortAllocator, PortError, PortReservation};
pub use providers::{DockerProvider, Provider, ProviderError};
pub use record::{ExposedUrl, SandboxRecord};
pub use session_key::SessionKey;
pub use settings::SandboxSettings;
pub use specs::{ImageSpecRegistry, SandboxSpec, SpecRegistry, StaticSpecRegistry};
pub use status::SandboxStatus;
