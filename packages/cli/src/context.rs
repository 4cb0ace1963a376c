// ABOUTME: Dependency wiring for CLI commands
// ABOUTME: Builds the container provider, spec registry and orchestrator once per invocation

use anyhow::{Context, Result};
use berth_sandbox::{
    DockerProvider, ImageSpecRegistry, Provider, SandboxManager, SandboxOrchestrator,
    SandboxSettings, SpecRegistry,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared services handed to every command handler
pub struct AppContext {
    pub settings: SandboxSettings,
    pub specs: Arc<dyn SpecRegistry>,
    pub sandboxes: Arc<dyn SandboxOrchestrator>,
    /// Whether the container runtime answered the startup probe
    pub runtime_available: bool,
}

impl AppContext {
    /// Build the context from environment settings against the local Docker daemon
    pub async fn from_env() -> Result<Self> {
        let settings = SandboxSettings::from_env().context("Invalid sandbox configuration")?;
        let provider = DockerProvider::new().context("Failed to create Docker client")?;
        Self::with_provider(settings, Arc::new(provider)).await
    }

    pub async fn with_provider(settings: SandboxSettings, provider: Arc<dyn Provider>) -> Result<Self> {
        let runtime_available = match provider.is_available().await {
            Ok(available) => available,
            Err(e) => {
                warn!("Container runtime probe failed: {}", e);
                false
            }
        };
        if runtime_available {
            debug!("Container runtime is reachable");
        }

        let specs: Arc<dyn SpecRegistry> = Arc::new(ImageSpecRegistry::new(
            Arc::clone(&provider),
            settings.clone(),
        ));
        let manager = SandboxManager::new(provider, Arc::clone(&specs), settings.clone())
            .context("Failed to configure sandbox orchestrator")?;

        Ok(Self {
            settings,
            specs,
            sandboxes: Arc::new(manager),
            runtime_available,
        })
    }
}
