// ABOUTME: Sandbox spec templates and the registries that resolve them
// ABOUTME: Static in-memory registry plus one backed by images known to the container runtime

use crate::providers::{ImageInfo, Provider};
use crate::settings::SandboxSettings;
use async_trait::async_trait;
use berth_core::{paginate, Page};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Template describing how to instantiate a sandbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxSpec {
    pub id: String,
    /// Image reference the container is created from
    pub image: String,
    pub command: Vec<String>,
    pub initial_env: BTreeMap<String, String>,
    /// Container port -> name of the service listening on it
    pub exposed_ports: BTreeMap<u16, String>,
    pub working_dir: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait SpecRegistry: Send + Sync {
    async fn search_specs(&self, page_id: Option<&str>, limit: usize) -> Page<SandboxSpec>;

    async fn get_spec(&self, id: &str) -> Option<SandboxSpec>;

    async fn batch_get_specs(&self, ids: &[String]) -> Vec<Option<SandboxSpec>> {
        let mut specs = Vec::with_capacity(ids.len());
        for id in ids {
            specs.push(self.get_spec(id).await);
        }
        specs
    }
}

/// Fixed set of specs, ordered as given
#[derive(Debug, Clone, Default)]
pub struct StaticSpecRegistry {
    specs: Vec<SandboxSpec>,
}

impl StaticSpecRegistry {
    pub fn new(specs: Vec<SandboxSpec>) -> Self {
        Self { specs }
    }
}

#[async_trait]
impl SpecRegistry for StaticSpecRegistry {
    async fn search_specs(&self, page_id: Option<&str>, limit: usize) -> Page<SandboxSpec> {
        paginate(self.specs.clone(), page_id, limit)
    }

    async fn get_spec(&self, id: &str) -> Option<SandboxSpec> {
        self.specs.iter().find(|s| s.id == id).cloned()
    }
}

/// Every image tagged under the configured repository is a spec.
///
/// Command, environment, ports and working directory come from settings; the
/// spec id is the image's first matching `repository:tag`.
pub struct ImageSpecRegistry {
    provider: Arc<dyn Provider>,
    settings: SandboxSettings,
}

impl ImageSpecRegistry {
    pub fn new(provider: Arc<dyn Provider>, settings: SandboxSettings) -> Self {
        Self { provider, settings }
    }

    fn spec_from_image(&self, image: &ImageInfo) -> Option<SandboxSpec> {
        let id = image
            .tags
            .iter()
            .find(|t| t.starts_with(&self.settings.image_repository))?
            .clone();

        Some(SandboxSpec {
            image: id.clone(),
            id,
            command: self.settings.command.clone(),
            initial_env: self.settings.initial_env.clone(),
            exposed_ports: self.settings.exposed_ports.clone(),
            working_dir: self.settings.working_dir.clone(),
            created_at: image.created_at,
        })
    }
}

#[async_trait]
impl SpecRegistry for ImageSpecRegistry {
    async fn search_specs(&self, page_id: Option<&str>, limit: usize) -> Page<SandboxSpec> {
        let images = match self
            .provider
            .list_images(&self.settings.image_repository)
            .await
        {
            Ok(images) => images,
            Err(e) => {
                warn!("Failed to list sandbox images: {}", e);
                return Page::empty();
            }
        };

        let mut specs: Vec<SandboxSpec> = images
            .iter()
            .filter_map(|image| self.spec_from_image(image))
            .collect();
        specs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        paginate(specs, page_id, limit)
    }

    async fn get_spec(&self, id: &str) -> Option<SandboxSpec> {
        if !id.starts_with(&self.settings.image_repository) {
            debug!("Spec {} is outside repository {}", id, self.settings.image_repository);
            return None;
        }

        match self.provider.get_image(id).await {
            Ok(image) => {
                let mut spec = self.spec_from_image(&image)?;
                // The image may carry several tags; report the one asked for
                spec.id = id.to_string();
                spec.image = id.to_string();
                Some(spec)
            }
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                warn!("Failed to look up sandbox image {}: {}", id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ContainerConfig, ContainerInfo, ProviderError, Result};
    use chrono::TimeZone;

    struct ImageOnlyProvider {
        images: Vec<ImageInfo>,
        fail: bool,
    }

    #[async_trait]
    impl Provider for ImageOnlyProvider {
        async fn is_available(&self) -> Result<bool> {
            Ok(!self.fail)
        }
        async fn list_containers(&self, _name_prefix: &str) -> Result<Vec<ContainerInfo>> {
            Ok(vec![])
        }
        async fn get_container(&self, name: &str) -> Result<ContainerInfo> {
            Err(ProviderError::NotFound(name.to_string()))
        }
        async fn ensure_image(&self, _image: &str) -> Result<()> {
            Ok(())
        }
        async fn create_container(&self, _config: &ContainerConfig) -> Result<String> {
            Err(ProviderError::ContainerError("unsupported".to_string()))
        }
        async fn start_container(&self, _name: &str) -> Result<()> {
            Ok(())
        }
        async fn stop_container(&self, _name: &str, _timeout_secs: u64) -> Result<()> {
            Ok(())
        }
        async fn pause_container(&self, _name: &str) -> Result<()> {
            Ok(())
        }
        async fn unpause_container(&self, _name: &str) -> Result<()> {
            Ok(())
        }
        async fn remove_container(&self, _name: &str, _force: bool) -> Result<()> {
            Ok(())
        }
        async fn remove_volume(&self, _name: &str) -> Result<()> {
            Ok(())
        }
        async fn list_images(&self, repository: &str) -> Result<Vec<ImageInfo>> {
            if self.fail {
                return Err(ProviderError::ConnectionError("daemon down".to_string()));
            }
            Ok(self
                .images
                .iter()
                .filter(|i| i.tags.iter().any(|t| t.starts_with(repository)))
                .cloned()
                .collect())
        }
        async fn get_image(&self, reference: &str) -> Result<ImageInfo> {
            if self.fail {
                return Err(ProviderError::ConnectionError("daemon down".to_string()));
            }
            self.images
                .iter()
                .find(|i| i.tags.iter().any(|t| t == reference))
                .cloned()
                .ok_or_else(|| ProviderError::NotFound(reference.to_string()))
        }
    }

    fn image(tag: &str, day: u32) -> ImageInfo {
        ImageInfo {
            id: format!("sha256:{}", tag.len()),
            tags: vec![tag.to_string()],
            created_at: Utc.with_ymd_and_hms(2025, 1, day, 0, 0, 0).unwrap(),
        }
    }

    fn registry(images: Vec<ImageInfo>, fail: bool) -> ImageSpecRegistry {
        let settings = SandboxSettings {
            image_repository: "ghcr.io/acme/runtime".to_string(),
            ..SandboxSettings::default()
        };
        ImageSpecRegistry::new(Arc::new(ImageOnlyProvider { images, fail }), settings)
    }

    #[tokio::test]
    async fn test_image_registry_lists_newest_first() {
        let registry = registry(
            vec![
                image("ghcr.io/acme/runtime:1.0", 1),
                image("ghcr.io/acme/runtime:2.0", 5),
                image("docker.io/library/redis:7", 9),
            ],
            false,
        );

        let page = registry.search_specs(None, 10).await;
        let ids: Vec<&str> = page.items.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["ghcr.io/acme/runtime:2.0", "ghcr.io/acme/runtime:1.0"]);
        assert!(page.next_page_id.is_none());
        assert_eq!(page.items[0].working_dir, "/workspace");
    }

    #[tokio::test]
    async fn test_image_registry_get_and_batch_get() {
        let registry = registry(vec![image("ghcr.io/acme/runtime:1.0", 1)], false);

        let spec = registry.get_spec("ghcr.io/acme/runtime:1.0").await.unwrap();
        assert_eq!(spec.image, "ghcr.io/acme/runtime:1.0");

        assert!(registry.get_spec("ghcr.io/acme/runtime:9.9").await.is_none());
        assert!(registry.get_spec("docker.io/library/redis:7").await.is_none());

        let batch = registry
            .batch_get_specs(&[
                "ghcr.io/acme/runtime:9.9".to_string(),
                "ghcr.io/acme/runtime:1.0".to_string(),
            ])
            .await;
        assert!(batch[0].is_none());
        assert!(batch[1].is_some());
    }

    #[tokio::test]
    async fn test_image_registry_degrades_when_runtime_unreachable() {
        let registry = registry(vec![image("ghcr.io/acme/runtime:1.0", 1)], true);
        assert!(registry.search_specs(None, 10).await.items.is_empty());
        assert!(registry.get_spec("ghcr.io/acme/runtime:1.0").await.is_none());
    }

    #[tokio::test]
    async fn test_static_registry_paginates() {
        let specs = (0..3)
            .map(|i| SandboxSpec {
                id: format!("spec-{}", i),
                image: "busybox".to_string(),
                command: vec![],
                initial_env: BTreeMap::new(),
                exposed_ports: BTreeMap::new(),
                working_dir: "/".to_string(),
                created_at: Utc::now(),
            })
            .collect();
        let registry = StaticSpecRegistry::new(specs);

        let first = registry.search_specs(None, 2).await;
        assert_eq!(first.items.len(), 2);
        let second = registry
            .search_specs(first.next_page_id.as_deref(), 2)
            .await;
        assert_eq!(second.items[0].id, "spec-2");
        assert!(second.next_page_id.is_none());
        assert!(registry.get_spec("spec-1").await.is_some());
    }
}
