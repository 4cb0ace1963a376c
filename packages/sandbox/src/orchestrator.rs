// ABOUTME: Sandbox lifecycle orchestrator driving the container runtime
// ABOUTME: Start, pause, resume and delete sandboxes and rebuild their records from runtime state alone

use crate::identity::SandboxNaming;
use crate::ports::{PortAllocator, PortError};
use crate::providers::{
    ContainerConfig, ContainerInfo, PortMapping, Provider, ProviderError, VolumeMount,
};
use crate::record::{ExposedUrl, SandboxRecord};
use crate::session_key::SessionKey;
use crate::settings::SandboxSettings;
use crate::specs::{SandboxSpec, SpecRegistry};
use crate::status::SandboxStatus;
use async_trait::async_trait;
use berth_config::{SANDBOX_ID, SESSION_API_KEY};
use berth_core::{paginate, ErrorKind, Page};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const LABEL_OWNER: &str = "berth.sandbox.owner";
pub const LABEL_SPEC: &str = "berth.sandbox.spec";
pub const LABEL_MANAGED: &str = "berth.sandbox.managed";
/// Followed by the exposed port name; the value is the container port
pub const LABEL_PORT_PREFIX: &str = "berth.sandbox.port.";

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Sandbox spec not found: {0}")]
    SpecNotFound(String),

    #[error("Port allocation failed: {0}")]
    PortAllocation(#[from] PortError),

    #[error("Container runtime error: {0}")]
    Runtime(#[from] ProviderError),
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::SpecNotFound(_) => ErrorKind::Configuration,
            OrchestratorError::PortAllocation(_) => ErrorKind::TransientRuntime,
            OrchestratorError::Runtime(e) if e.is_not_found() => ErrorKind::NotFound,
            OrchestratorError::Runtime(_) => ErrorKind::TransientRuntime,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Lifecycle operations over sandboxes.
///
/// Read paths never fail: runtime errors degrade to an empty page or an
/// absent record. Write paths report a missing sandbox as `Ok(false)` and
/// propagate every other runtime failure.
#[async_trait]
pub trait SandboxOrchestrator: Send + Sync {
    /// List sandboxes, newest first, optionally restricted to one owner
    async fn search(
        &self,
        owner_id: Option<&str>,
        page_id: Option<&str>,
        limit: usize,
    ) -> Page<SandboxRecord>;

    async fn get(&self, id: Uuid) -> Option<SandboxRecord>;

    /// Look up several sandboxes, one slot per id in input order
    async fn batch_get(&self, ids: &[Uuid]) -> Vec<Option<SandboxRecord>>;

    /// Create and start a sandbox from a spec, returning its id
    async fn start(&self, owner_id: &str, spec_id: &str) -> Result<Uuid>;

    async fn pause(&self, id: Uuid) -> Result<bool>;

    async fn resume(&self, id: Uuid) -> Result<bool>;

    /// Stop and remove a sandbox together with its workspace volume
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// Sandbox orchestrator backed by a container [`Provider`]
pub struct SandboxManager {
    provider: Arc<dyn Provider>,
    specs: Arc<dyn SpecRegistry>,
    settings: SandboxSettings,
    naming: SandboxNaming,
    ports: PortAllocator,
}

impl SandboxManager {
    pub fn new(
        provider: Arc<dyn Provider>,
        specs: Arc<dyn SpecRegistry>,
        settings: SandboxSettings,
    ) -> Result<Self> {
        let ports = PortAllocator::new(settings.port_range_start, settings.port_range_end)?;
        Ok(Self {
            provider,
            specs,
            naming: SandboxNaming::new(settings.name_prefix.clone()),
            settings,
            ports,
        })
    }

    pub fn naming(&self) -> &SandboxNaming {
        &self.naming
    }

    pub fn settings(&self) -> &SandboxSettings {
        &self.settings
    }

    /// Look up the container for a sandbox; `None` when the runtime has no such container
    async fn find_container(&self, id: Uuid) -> Result<Option<ContainerInfo>> {
        match self.provider.get_container(&self.naming.name_for(id)).await {
            Ok(info) => Ok(Some(info)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Rebuild a sandbox record from what the runtime reports.
    ///
    /// Returns `None` for containers that do not follow the naming scheme or
    /// are missing the owner/spec labels.
    fn to_record(&self, info: &ContainerInfo) -> Option<SandboxRecord> {
        let Some(id) = self.naming.id_for(&info.name) else {
            debug!("Skipping container {}: name outside sandbox scheme", info.name);
            return None;
        };
        let (Some(owner_id), Some(spec_id)) =
            (info.labels.get(LABEL_OWNER), info.labels.get(LABEL_SPEC))
        else {
            debug!("Skipping container {}: missing owner or spec label", info.name);
            return None;
        };

        let status = SandboxStatus::from_runtime_state(&info.state);
        let mut record = SandboxRecord {
            id,
            owner_id: owner_id.clone(),
            spec_id: spec_id.clone(),
            status,
            url: None,
            session_api_key: None,
            exposed_urls: Vec::new(),
            created_at: info.created_at,
        };

        if status == SandboxStatus::Running {
            let Some(key) = info.env.get(SESSION_API_KEY) else {
                debug!("Skipping container {}: running without a session key", info.name);
                return None;
            };
            record.session_api_key = Some(SessionKey::from(key.clone()));
            record.exposed_urls = self.exposed_urls(info);
            record.url = record.exposed_urls.first().map(|u| u.url.clone());
        }

        Some(record)
    }

    /// URLs for every labelled exposed port that has a host binding, by ascending container port
    fn exposed_urls(&self, info: &ContainerInfo) -> Vec<ExposedUrl> {
        let mut named: Vec<(u16, &str)> = info
            .labels
            .iter()
            .filter_map(|(key, value)| {
                let name = key.strip_prefix(LABEL_PORT_PREFIX)?;
                Some((value.parse::<u16>().ok()?, name))
            })
            .collect();
        named.sort();

        named
            .into_iter()
            .filter_map(|(container_port, name)| {
                let host_port = info.ports.get(&container_port)?;
                Some(ExposedUrl {
                    name: name.to_string(),
                    url: self.settings.url_for(*host_port),
                })
            })
            .collect()
    }

    fn container_config(
        &self,
        id: Uuid,
        owner_id: &str,
        spec: &SandboxSpec,
        host_ports: &[u16],
        session_key: &SessionKey,
    ) -> ContainerConfig {
        let mut env_vars: HashMap<String, String> = spec
            .initial_env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        env_vars.insert(
            SESSION_API_KEY.to_string(),
            session_key.expose_secret().to_string(),
        );
        env_vars.insert(SANDBOX_ID.to_string(), id.to_string());

        let mut labels = HashMap::new();
        labels.insert(LABEL_OWNER.to_string(), owner_id.to_string());
        labels.insert(LABEL_SPEC.to_string(), spec.id.clone());
        labels.insert(LABEL_MANAGED.to_string(), "true".to_string());

        let mut ports = Vec::with_capacity(host_ports.len());
        for ((container_port, name), host_port) in spec.exposed_ports.iter().zip(host_ports) {
            env_vars.insert(port_env_var(name), host_port.to_string());
            labels.insert(
                format!("{}{}", LABEL_PORT_PREFIX, name),
                container_port.to_string(),
            );
            ports.push(PortMapping {
                host_port: *host_port,
                container_port: *container_port,
                protocol: "tcp".to_string(),
            });
        }

        ContainerConfig {
            image: spec.image.clone(),
            name: self.naming.name_for(id),
            env_vars,
            volumes: vec![VolumeMount {
                volume_name: self.naming.volume_name_for(id),
                container_path: spec.working_dir.clone(),
                readonly: false,
            }],
            ports,
            command: (!spec.command.is_empty()).then(|| spec.command.clone()),
            working_dir: Some(spec.working_dir.clone()),
            labels,
        }
    }

    /// Best-effort removal of whatever a failed start left behind
    async fn cleanup_failed_start(&self, id: Uuid) {
        let name = self.naming.name_for(id);
        if let Err(e) = self.provider.remove_container(&name, true).await {
            if !e.is_not_found() {
                warn!("Failed to clean up container {} after failed start: {}", name, e);
            }
        }
        let volume = self.naming.volume_name_for(id);
        if let Err(e) = self.provider.remove_volume(&volume).await {
            if !e.is_not_found() {
                warn!("Failed to clean up volume {} after failed start: {}", volume, e);
            }
        }
    }
}

/// Environment variable carrying the host port of an exposed service, e.g. `AGENT_SERVER_PORT`
pub fn port_env_var(name: &str) -> String {
    let normalized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_PORT", normalized)
}

#[async_trait]
impl SandboxOrchestrator for SandboxManager {
    async fn search(
        &self,
        owner_id: Option<&str>,
        page_id: Option<&str>,
        limit: usize,
    ) -> Page<SandboxRecord> {
        let containers = match self.provider.list_containers(self.naming.prefix()).await {
            Ok(containers) => containers,
            Err(e) => {
                warn!("Failed to list sandbox containers: {}", e);
                return Page::empty();
            }
        };

        let mut records: Vec<SandboxRecord> = containers
            .iter()
            .filter_map(|info| self.to_record(info))
            .filter(|record| owner_id.map_or(true, |owner| record.owner_id == owner))
            .collect();
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        paginate(records, page_id, limit)
    }

    async fn get(&self, id: Uuid) -> Option<SandboxRecord> {
        match self.find_container(id).await {
            Ok(Some(info)) => self.to_record(&info),
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to look up sandbox {}: {}", id, e);
                None
            }
        }
    }

    async fn batch_get(&self, ids: &[Uuid]) -> Vec<Option<SandboxRecord>> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            records.push(self.get(*id).await);
        }
        records
    }

    async fn start(&self, owner_id: &str, spec_id: &str) -> Result<Uuid> {
        let spec = self
            .specs
            .get_spec(spec_id)
            .await
            .ok_or_else(|| OrchestratorError::SpecNotFound(spec_id.to_string()))?;

        // Pulling can take minutes, so it happens before any port is reserved
        self.provider.ensure_image(&spec.image).await.map_err(|e| {
            warn!("Failed to prepare image {} for spec {}: {}", spec.image, spec.id, e);
            OrchestratorError::from(e)
        })?;

        let id = Uuid::new_v4();
        let session_key = SessionKey::generate();

        // Held until the runtime has bound the ports
        let mut reservation = self.ports.allocate(spec.exposed_ports.len())?;
        self.ports.reverify(&mut reservation)?;

        let config = self.container_config(id, owner_id, &spec, reservation.ports(), &session_key);
        info!(
            "Starting sandbox {} for owner {} from spec {} on ports {:?}",
            id,
            owner_id,
            spec.id,
            reservation.ports()
        );

        if let Err(e) = self.provider.create_container(&config).await {
            warn!("Failed to start sandbox {}: {}", id, e);
            self.cleanup_failed_start(id).await;
            return Err(e.into());
        }
        drop(reservation);

        Ok(id)
    }

    async fn pause(&self, id: Uuid) -> Result<bool> {
        let Some(info) = self.find_container(id).await? else {
            return Ok(false);
        };

        if SandboxStatus::from_runtime_state(&info.state) != SandboxStatus::Running {
            debug!("Sandbox {} is {}, nothing to pause", id, info.state);
            return Ok(true);
        }

        match self.provider.pause_container(&info.name).await {
            Ok(()) => {
                info!("Paused sandbox {}", id);
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn resume(&self, id: Uuid) -> Result<bool> {
        let Some(info) = self.find_container(id).await? else {
            return Ok(false);
        };

        let result = match info.state.trim().to_lowercase().as_str() {
            "paused" => self.provider.unpause_container(&info.name).await,
            "created" | "exited" | "dead" => self.provider.start_container(&info.name).await,
            state => {
                debug!("Sandbox {} is {}, nothing to resume", id, state);
                return Ok(true);
            }
        };

        match result {
            Ok(()) => {
                info!("Resumed sandbox {}", id);
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let Some(info) = self.find_container(id).await? else {
            return Ok(false);
        };

        if matches!(
            SandboxStatus::from_runtime_state(&info.state),
            SandboxStatus::Running | SandboxStatus::Paused
        ) {
            // Forced removal below still succeeds if the graceful stop does not
            if let Err(e) = self
                .provider
                .stop_container(&info.name, self.settings.stop_timeout_secs)
                .await
            {
                warn!("Failed to stop sandbox {} gracefully: {}", id, e);
            }
        }

        match self.provider.remove_container(&info.name, true).await {
            Ok(()) => info!("Deleted sandbox {}", id),
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        let volume = self.naming.volume_name_for(id);
        match self.provider.remove_volume(&volume).await {
            Ok(()) => debug!("Removed volume {}", volume),
            Err(e) if e.is_not_found() => debug!("Volume {} already gone", volume),
            Err(e) => warn!("Sandbox {} deleted but volume {} was not: {}", id, volume, e),
        }

        Ok(true)
    }
}
