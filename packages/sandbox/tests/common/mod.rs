// ABOUTME: Common test utilities for sandbox integration tests
// ABOUTME: In-memory container runtime plus a manager wired to a static spec registry

#![allow(dead_code)]

use async_trait::async_trait;
use berth_sandbox::providers::{
    ContainerConfig, ContainerInfo, ImageInfo, Provider, ProviderError, Result,
};
use berth_sandbox::{SandboxManager, SandboxSettings, SandboxSpec, StaticSpecRegistry};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

pub const SPEC_ID: &str = "ghcr.io/berth-dev/runtime:test";

/// Container runtime that keeps everything in memory.
///
/// State transitions mirror Docker closely enough for lifecycle tests: pausing
/// a container that is not running fails, removal without force fails while
/// running, and missing objects are reported as `NotFound`.
#[derive(Default)]
pub struct InMemoryProvider {
    containers: Mutex<HashMap<String, ContainerInfo>>,
    volumes: Mutex<HashSet<String>>,
    clock: AtomicI64,
    pub fail_list: AtomicBool,
    pub fail_get: AtomicBool,
    pub fail_image: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_volume_removal: AtomicBool,
    pulled: Mutex<Vec<String>>,
}

impl InMemoryProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn next_created_at(&self) -> DateTime<Utc> {
        let tick = self.clock.fetch_add(1, Ordering::SeqCst);
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(tick)
    }

    /// Insert a container directly, bypassing `create_container`
    pub fn insert_raw(&self, name: &str, state: &str, labels: HashMap<String, String>) {
        let info = ContainerInfo {
            id: format!("raw-{}", name),
            name: name.to_string(),
            state: state.to_string(),
            labels,
            env: HashMap::new(),
            ports: HashMap::new(),
            created_at: self.next_created_at(),
        };
        self.containers
            .lock()
            .unwrap()
            .insert(name.to_string(), info);
    }

    pub fn set_state(&self, name: &str, state: &str) {
        if let Some(info) = self.containers.lock().unwrap().get_mut(name) {
            info.state = state.to_string();
        }
    }

    pub fn container(&self, name: &str) -> Option<ContainerInfo> {
        self.containers.lock().unwrap().get(name).cloned()
    }

    pub fn container_count(&self) -> usize {
        self.containers.lock().unwrap().len()
    }

    pub fn has_volume(&self, name: &str) -> bool {
        self.volumes.lock().unwrap().contains(name)
    }

    pub fn volume_count(&self) -> usize {
        self.volumes.lock().unwrap().len()
    }

    /// Images prepared through `ensure_image`, in call order
    pub fn pulled(&self) -> Vec<String> {
        self.pulled.lock().unwrap().clone()
    }

    pub fn host_ports(&self) -> Vec<u16> {
        self.containers
            .lock()
            .unwrap()
            .values()
            .flat_map(|c| c.ports.values().copied().collect::<Vec<_>>())
            .collect()
    }

    fn transition(&self, name: &str, from: &[&str], to: &str) -> Result<()> {
        let mut containers = self.containers.lock().unwrap();
        let info = containers
            .get_mut(name)
            .ok_or_else(|| ProviderError::NotFound(name.to_string()))?;
        if !from.contains(&info.state.as_str()) {
            return Err(ProviderError::ContainerError(format!(
                "container {} is {}",
                name, info.state
            )));
        }
        info.state = to.to_string();
        Ok(())
    }
}

#[async_trait]
impl Provider for InMemoryProvider {
    async fn is_available(&self) -> Result<bool> {
        Ok(!self.fail_list.load(Ordering::SeqCst))
    }

    async fn list_containers(&self, name_prefix: &str) -> Result<Vec<ContainerInfo>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(ProviderError::ConnectionError("daemon unreachable".to_string()));
        }
        Ok(self
            .containers
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.name.starts_with(name_prefix))
            .cloned()
            .collect())
    }

    async fn get_container(&self, name: &str) -> Result<ContainerInfo> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(ProviderError::ConnectionError("daemon unreachable".to_string()));
        }
        self.container(name)
            .ok_or_else(|| ProviderError::NotFound(name.to_string()))
    }

    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.fail_image.load(Ordering::SeqCst) {
            return Err(ProviderError::ImageError(format!("pull of {} timed out", image)));
        }
        self.pulled.lock().unwrap().push(image.to_string());
        Ok(())
    }

    async fn create_container(&self, config: &ContainerConfig) -> Result<String> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ProviderError::ContainerError("image pull failed".to_string()));
        }

        let mut containers = self.containers.lock().unwrap();
        if containers.contains_key(&config.name) {
            return Err(ProviderError::ContainerError(format!(
                "name {} already in use",
                config.name
            )));
        }

        let info = ContainerInfo {
            id: format!("container-{}", containers.len()),
            name: config.name.clone(),
            state: "running".to_string(),
            labels: config.labels.clone(),
            env: config.env_vars.clone(),
            ports: config
                .ports
                .iter()
                .map(|p| (p.container_port, p.host_port))
                .collect(),
            created_at: self.next_created_at(),
        };
        let id = info.id.clone();
        containers.insert(config.name.clone(), info);

        let mut volumes = self.volumes.lock().unwrap();
        for mount in &config.volumes {
            volumes.insert(mount.volume_name.clone());
        }
        Ok(id)
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        self.transition(name, &["created", "exited", "dead"], "running")
    }

    async fn stop_container(&self, name: &str, _timeout_secs: u64) -> Result<()> {
        self.transition(name, &["running", "paused", "restarting"], "exited")
    }

    async fn pause_container(&self, name: &str) -> Result<()> {
        self.transition(name, &["running"], "paused")
    }

    async fn unpause_container(&self, name: &str) -> Result<()> {
        self.transition(name, &["paused"], "running")
    }

    async fn remove_container(&self, name: &str, force: bool) -> Result<()> {
        let mut containers = self.containers.lock().unwrap();
        let info = containers
            .get(name)
            .ok_or_else(|| ProviderError::NotFound(name.to_string()))?;
        if !force && info.state == "running" {
            return Err(ProviderError::ContainerError(format!(
                "container {} is running",
                name
            )));
        }
        containers.remove(name);
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        if self.fail_volume_removal.load(Ordering::SeqCst) {
            return Err(ProviderError::VolumeError(format!("volume {} is in use", name)));
        }
        if self.volumes.lock().unwrap().remove(name) {
            Ok(())
        } else {
            Err(ProviderError::NotFound(name.to_string()))
        }
    }

    async fn list_images(&self, _repository: &str) -> Result<Vec<ImageInfo>> {
        Ok(vec![])
    }

    async fn get_image(&self, reference: &str) -> Result<ImageInfo> {
        Err(ProviderError::NotFound(reference.to_string()))
    }
}

pub fn test_spec() -> SandboxSpec {
    let mut exposed_ports = BTreeMap::new();
    exposed_ports.insert(8001, "vscode".to_string());
    exposed_ports.insert(8000, "agent_server".to_string());

    let mut initial_env = BTreeMap::new();
    initial_env.insert("LOG_LEVEL".to_string(), "debug".to_string());

    SandboxSpec {
        id: SPEC_ID.to_string(),
        image: SPEC_ID.to_string(),
        command: vec!["berth-agent-server".to_string()],
        initial_env,
        exposed_ports,
        working_dir: "/workspace".to_string(),
        created_at: Utc::now(),
    }
}

pub fn test_settings() -> SandboxSettings {
    SandboxSettings {
        name_prefix: "test-sandbox-".to_string(),
        url_template: "http://sandbox.test:{port}".to_string(),
        port_range_start: 20000,
        port_range_end: 60000,
        ..SandboxSettings::default()
    }
}

/// Manager over an in-memory runtime that knows a single spec, [`SPEC_ID`]
pub fn setup_manager() -> (SandboxManager, Arc<InMemoryProvider>) {
    setup_manager_with_specs(vec![test_spec()])
}

pub fn setup_manager_with_specs(specs: Vec<SandboxSpec>) -> (SandboxManager, Arc<InMemoryProvider>) {
    let provider = InMemoryProvider::new();
    let specs = Arc::new(StaticSpecRegistry::new(specs));
    let manager = SandboxManager::new(provider.clone(), specs, test_settings())
        .expect("valid port range");
    (manager, provider)
}
