// ABOUTME: Docker provider implementation for local container-based sandboxes
// ABOUTME: Uses bollard library to manage sandbox containers, their volumes and images

use super::{ContainerConfig, ContainerInfo, ImageInfo, Provider, ProviderError, Result};
use async_trait::async_trait;
use bollard::{
    container::{
        Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
        RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    },
    image::{CreateImageOptions, ListImagesOptions},
    volume::RemoveVolumeOptions,
    Docker,
};
use chrono::{DateTime, TimeZone, Utc};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct DockerProvider {
    client: Docker,
    /// Timeout for image pull operations (default: 10 minutes)
    pull_timeout: Duration,
}

impl DockerProvider {
    /// Create a new Docker provider with default timeout (10 minutes)
    pub fn new() -> Result<Self> {
        Self::with_pull_timeout(Duration::from_secs(600))
    }

    /// Create a new Docker provider with custom pull timeout
    pub fn with_pull_timeout(timeout: Duration) -> Result<Self> {
        let client = Docker::connect_with_defaults()
            .map_err(|e| ProviderError::ConnectionError(e.to_string()))?;

        Ok(Self::with_client_and_timeout(client, timeout))
    }

    /// Create with a specific Docker connection and custom timeout
    pub fn with_client_and_timeout(client: Docker, timeout: Duration) -> Self {
        Self {
            client,
            pull_timeout: timeout,
        }
    }

    /// Convert our config to bollard config
    fn to_bollard_config(config: &ContainerConfig) -> Config<String> {
        let mut exposed_ports = HashMap::new();
        let mut port_bindings = HashMap::new();

        for port in &config.ports {
            let container_port = format!("{}/{}", port.container_port, port.protocol);
            exposed_ports.insert(container_port.clone(), HashMap::new());

            let binding = vec![bollard::models::PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(port.host_port.to_string()),
            }];
            port_bindings.insert(container_port, Some(binding));
        }

        // Named volumes are created on demand by the daemon
        let binds: Vec<String> = config
            .volumes
            .iter()
            .map(|v| {
                format!(
                    "{}:{}:{}",
                    v.volume_name,
                    v.container_path,
                    if v.readonly { "ro" } else { "rw" }
                )
            })
            .collect();

        let env: Vec<String> = config
            .env_vars
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let host_config = bollard::models::HostConfig {
            binds: Some(binds),
            port_bindings: if port_bindings.is_empty() {
                None
            } else {
                Some(port_bindings)
            },
            ..Default::default()
        };

        Config {
            image: Some(config.image.clone()),
            cmd: config.command.clone(),
            env: Some(env),
            working_dir: config.working_dir.clone(),
            labels: Some(config.labels.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        }
    }

    /// Parse `KEY=VALUE` entries from a container's environment
    fn parse_env(entries: &[String]) -> HashMap<String, String> {
        entries
            .iter()
            .filter_map(|entry| {
                entry
                    .split_once('=')
                    .map(|(k, v)| (k.to_string(), v.to_string()))
            })
            .collect()
    }

    fn parse_timestamp(raw: Option<&str>) -> DateTime<Utc> {
        raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now)
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        info!(
            "Pulling image: {} (timeout: {:?})",
            image, self.pull_timeout
        );

        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let stream = self.client.create_image(Some(options), None, None);

        // Apply timeout to the entire pull operation
        let result = tokio::time::timeout(self.pull_timeout, async {
            let mut stream = stream;
            let mut last_status = String::new();

            while let Some(result) = stream.next().await {
                match result {
                    Ok(info) => {
                        if let Some(status) = &info.status {
                            if status != &last_status {
                                debug!("Pull status: {}", status);
                                last_status = status.clone();
                            }
                        }
                        if let Some(error) = info.error {
                            return Err(ProviderError::ImageError(format!(
                                "Failed to pull image {}: {}",
                                image, error
                            )));
                        }
                    }
                    Err(e) => {
                        return Err(ProviderError::ImageError(format!(
                            "Failed to pull image {}: {}",
                            image, e
                        )));
                    }
                }
            }

            Ok(())
        })
        .await;

        match result {
            Ok(Ok(())) => {
                info!("Successfully pulled image: {}", image);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ProviderError::ImageError(format!(
                "Timeout pulling image {} after {:?}",
                image, self.pull_timeout
            ))),
        }
    }
}

/// True when the daemon answered 404 for the requested object
fn is_not_found(error: &bollard::errors::Error) -> bool {
    matches!(
        error,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// Map a bollard error, turning 404s into `NotFound` and daemon-side
/// failures into the given variant; anything else is a transport problem.
fn map_error(
    error: bollard::errors::Error,
    name: &str,
    variant: fn(String) -> ProviderError,
) -> ProviderError {
    match error {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => ProviderError::NotFound(name.to_string()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => variant(format!("{} ({}): {}", name, status_code, message)),
        other => ProviderError::ConnectionError(other.to_string()),
    }
}

#[async_trait]
impl Provider for DockerProvider {
    async fn is_available(&self) -> Result<bool> {
        match self.client.ping().await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("Docker not available: {}", e);
                Ok(false)
            }
        }
    }

    async fn list_containers(&self, name_prefix: &str) -> Result<Vec<ContainerInfo>> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![name_prefix.to_string()]);

        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self
            .client
            .list_containers(Some(options))
            .await
            .map_err(|e| map_error(e, name_prefix, ProviderError::ContainerError))?;

        let mut container_infos = Vec::new();
        for container in containers {
            // The name filter is a substring match; keep exact prefix matches only
            let name = container
                .names
                .as_ref()
                .and_then(|names| names.first())
                .map(|n| n.trim_start_matches('/').to_string());

            let Some(name) = name.filter(|n| n.starts_with(name_prefix)) else {
                continue;
            };

            match self.get_container(&name).await {
                Ok(info) => container_infos.push(info),
                Err(e) => {
                    warn!("Failed to get info for container {}: {}", name, e);
                }
            }
        }

        Ok(container_infos)
    }

    async fn get_container(&self, name: &str) -> Result<ContainerInfo> {
        let inspect = self
            .client
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_error(e, name, ProviderError::ContainerError))?;

        let state = inspect
            .state
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .map(|s| s.as_ref().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let (labels, env) = match &inspect.config {
            Some(config) => (
                config.labels.clone().unwrap_or_default(),
                config
                    .env
                    .as_deref()
                    .map(Self::parse_env)
                    .unwrap_or_default(),
            ),
            None => (HashMap::new(), HashMap::new()),
        };

        let mut ports = HashMap::new();
        if let Some(port_map) = inspect
            .network_settings
            .as_ref()
            .and_then(|ns| ns.ports.as_ref())
        {
            for (container_port_str, bindings) in port_map {
                let host_port = bindings
                    .as_ref()
                    .and_then(|b| b.first())
                    .and_then(|b| b.host_port.as_ref())
                    .and_then(|p| p.parse::<u16>().ok());

                // Parse container port (format: "3000/tcp")
                let container_port = container_port_str
                    .split('/')
                    .next()
                    .and_then(|p| p.parse::<u16>().ok());

                if let (Some(container_port), Some(host_port)) = (container_port, host_port) {
                    ports.insert(container_port, host_port);
                }
            }
        }

        Ok(ContainerInfo {
            id: inspect.id.clone().unwrap_or_default(),
            name: inspect
                .name
                .clone()
                .unwrap_or_else(|| name.to_string())
                .trim_start_matches('/')
                .to_string(),
            state,
            labels,
            env,
            ports,
            created_at: Self::parse_timestamp(inspect.created.as_deref()),
        })
    }

    async fn ensure_image(&self, image: &str) -> Result<()> {
        match self.client.inspect_image(image).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => self.pull_image(image).await,
            Err(e) => Err(ProviderError::ImageError(e.to_string())),
        }
    }

    async fn create_container(&self, config: &ContainerConfig) -> Result<String> {
        info!("Creating container: {}", config.name);

        self.ensure_image(&config.image).await?;

        let bollard_config = Self::to_bollard_config(config);
        let options = CreateContainerOptions {
            name: config.name.clone(),
            platform: None,
        };

        let container = self
            .client
            .create_container(Some(options), bollard_config)
            .await
            .map_err(|e| map_error(e, &config.name, ProviderError::ContainerError))?;

        debug!("Created container: {} ({})", config.name, container.id);

        self.start_container(&config.name).await?;

        Ok(container.id)
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        info!("Starting container: {}", name);

        self.client
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| map_error(e, name, ProviderError::ContainerError))
    }

    async fn stop_container(&self, name: &str, timeout_secs: u64) -> Result<()> {
        info!("Stopping container: {} (timeout: {}s)", name, timeout_secs);

        let options = StopContainerOptions {
            t: i64::try_from(timeout_secs).unwrap_or(i64::MAX),
        };

        self.client
            .stop_container(name, Some(options))
            .await
            .map_err(|e| map_error(e, name, ProviderError::ContainerError))
    }

    async fn pause_container(&self, name: &str) -> Result<()> {
        info!("Pausing container: {}", name);

        self.client
            .pause_container(name)
            .await
            .map_err(|e| map_error(e, name, ProviderError::ContainerError))
    }

    async fn unpause_container(&self, name: &str) -> Result<()> {
        info!("Unpausing container: {}", name);

        self.client
            .unpause_container(name)
            .await
            .map_err(|e| map_error(e, name, ProviderError::ContainerError))
    }

    async fn remove_container(&self, name: &str, force: bool) -> Result<()> {
        info!("Removing container: {} (force: {})", name, force);

        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };

        self.client
            .remove_container(name, Some(options))
            .await
            .map_err(|e| map_error(e, name, ProviderError::ContainerError))
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        info!("Removing volume: {}", name);

        self.client
            .remove_volume(name, None::<RemoveVolumeOptions>)
            .await
            .map_err(|e| map_error(e, name, ProviderError::VolumeError))
    }

    async fn list_images(&self, repository: &str) -> Result<Vec<ImageInfo>> {
        let mut filters = HashMap::new();
        filters.insert("reference".to_string(), vec![format!("{}*", repository)]);

        let options = ListImagesOptions {
            all: false,
            filters,
            ..Default::default()
        };

        let images = self
            .client
            .list_images(Some(options))
            .await
            .map_err(|e| map_error(e, repository, ProviderError::ImageError))?;

        Ok(images
            .into_iter()
            .map(|image| ImageInfo {
                id: image.id,
                tags: image
                    .repo_tags
                    .into_iter()
                    .filter(|tag| tag.starts_with(repository))
                    .collect(),
                created_at: Utc
                    .timestamp_opt(image.created, 0)
                    .single()
                    .unwrap_or_else(Utc::now),
            })
            .filter(|image| !image.tags.is_empty())
            .collect())
    }

    async fn get_image(&self, reference: &str) -> Result<ImageInfo> {
        let inspect = self
            .client
            .inspect_image(reference)
            .await
            .map_err(|e| map_error(e, reference, ProviderError::ImageError))?;

        Ok(ImageInfo {
            id: inspect.id.unwrap_or_else(|| reference.to_string()),
            tags: inspect.repo_tags.unwrap_or_default(),
            created_at: Self::parse_timestamp(inspect.created.as_deref()),
        })
    }
}
