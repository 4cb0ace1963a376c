// ABOUTME: Provider trait for the container runtime backing sandboxes
// ABOUTME: Name-keyed container, volume and image operations consumed by the orchestrator

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

pub mod docker;

pub use docker::DockerProvider;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Container error: {0}")]
    ContainerError(String),

    #[error("Volume error: {0}")]
    VolumeError(String),

    #[error("Image error: {0}")]
    ImageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Container configuration for creating sandboxes
#[derive(Debug, Clone, Default)]
pub struct ContainerConfig {
    pub image: String,
    pub name: String,
    pub env_vars: HashMap<String, String>,
    pub volumes: Vec<VolumeMount>,
    pub ports: Vec<PortMapping>,
    pub command: Option<Vec<String>>,
    pub working_dir: Option<String>,
    pub labels: HashMap<String, String>,
}

/// Named volume mounted into a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub volume_name: String,
    pub container_path: String,
    pub readonly: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: String, // tcp or udp
}

/// Container runtime information as reported by the runtime itself
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    /// Runtime-native state string (e.g. "running", "exited")
    pub state: String,
    pub labels: HashMap<String, String>,
    pub env: HashMap<String, String>,
    pub ports: HashMap<u16, u16>, // container_port -> host_port
    pub created_at: DateTime<Utc>,
}

/// Image known to the container runtime
#[derive(Debug, Clone)]
pub struct ImageInfo {
    pub id: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Provider trait for sandbox container backends.
///
/// Every container operation is keyed by container name. Implementations map
/// "no such object" responses to [`ProviderError::NotFound`] so callers can
/// tell a miss apart from a transport failure.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Check if the provider is reachable
    async fn is_available(&self) -> Result<bool>;

    /// List every container (running or not) whose name starts with `name_prefix`
    async fn list_containers(&self, name_prefix: &str) -> Result<Vec<ContainerInfo>>;

    /// Get a single container by name
    async fn get_container(&self, name: &str) -> Result<ContainerInfo>;

    /// Make an image available locally, pulling it when absent
    async fn ensure_image(&self, image: &str) -> Result<()>;

    /// Create and start a new container, returning its runtime id
    async fn create_container(&self, config: &ContainerConfig) -> Result<String>;

    /// Start a created or exited container
    async fn start_container(&self, name: &str) -> Result<()>;

    /// Stop a running container, killing it after `timeout_secs`
    async fn stop_container(&self, name: &str, timeout_secs: u64) -> Result<()>;

    /// Freeze all processes in a running container
    async fn pause_container(&self, name: &str) -> Result<()>;

    /// Thaw a paused container
    async fn unpause_container(&self, name: &str) -> Result<()>;

    /// Remove a container
    async fn remove_container(&self, name: &str, force: bool) -> Result<()>;

    /// Remove a named volume
    async fn remove_volume(&self, name: &str) -> Result<()>;

    /// List images whose tags start with `repository`
    async fn list_images(&self, repository: &str) -> Result<Vec<ImageInfo>>;

    /// Inspect an image by reference
    async fn get_image(&self, reference: &str) -> Result<ImageInfo>;
}
