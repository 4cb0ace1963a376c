// ABOUTME: Externally visible sandbox record rebuilt from container runtime state
// ABOUTME: Carries access URLs and the session key only while the sandbox is running

use crate::session_key::SessionKey;
use crate::status::SandboxStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// URL to reach a named service inside the sandbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposedUrl {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxRecord {
    pub id: Uuid,
    pub owner_id: String,
    pub spec_id: String,
    pub status: SandboxStatus,
    /// Primary URL; absent unless `status` is `RUNNING`
    pub url: Option<String>,
    /// Sent as the `X-Session-API-Key` header; absent unless `status` is `RUNNING`
    pub session_api_key: Option<SessionKey>,
    #[serde(default)]
    pub exposed_urls: Vec<ExposedUrl>,
    pub created_at: DateTime<Utc>,
}

impl SandboxRecord {
    pub fn is_running(&self) -> bool {
        self.status == SandboxStatus::Running
    }
}
