// ABOUTME: Sandbox orchestrator settings loaded from the environment
// ABOUTME: Naming, URL template, stop grace period, host port range and image spec defaults

use crate::identity::DEFAULT_NAME_PREFIX;
use berth_config::{
    env_opt, env_or, env_parse_or, ConfigError, BERTH_SANDBOX_COMMAND,
    BERTH_SANDBOX_EXPOSED_PORTS, BERTH_SANDBOX_IMAGE_REPOSITORY, BERTH_SANDBOX_INITIAL_ENV,
    BERTH_SANDBOX_NAME_PREFIX, BERTH_SANDBOX_PORT_RANGE_END, BERTH_SANDBOX_PORT_RANGE_START,
    BERTH_SANDBOX_STOP_TIMEOUT_SECS, BERTH_SANDBOX_URL_TEMPLATE, BERTH_SANDBOX_WORKING_DIR,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_URL_TEMPLATE: &str = "http://localhost:{port}";
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PORT_RANGE_START: u16 = 30000;
pub const DEFAULT_PORT_RANGE_END: u16 = 39999;
pub const DEFAULT_IMAGE_REPOSITORY: &str = "ghcr.io/berth-dev/runtime";
pub const DEFAULT_COMMAND: &str = "berth-agent-server --port 8000";
pub const DEFAULT_WORKING_DIR: &str = "/workspace";
pub const DEFAULT_EXPOSED_PORTS: &str = "agent_server:8000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxSettings {
    /// Prefix of every container name this orchestrator owns
    pub name_prefix: String,
    /// Template for exposed URLs; `{port}` is replaced with the host port
    pub url_template: String,
    /// Grace period before a stopping container is killed
    pub stop_timeout_secs: u64,
    pub port_range_start: u16,
    pub port_range_end: u16,

    // Defaults for specs discovered from images
    pub image_repository: String,
    pub command: Vec<String>,
    pub working_dir: String,
    pub exposed_ports: BTreeMap<u16, String>,
    pub initial_env: BTreeMap<String, String>,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
            port_range_start: DEFAULT_PORT_RANGE_START,
            port_range_end: DEFAULT_PORT_RANGE_END,
            image_repository: DEFAULT_IMAGE_REPOSITORY.to_string(),
            command: split_command(DEFAULT_COMMAND),
            working_dir: DEFAULT_WORKING_DIR.to_string(),
            exposed_ports: parse_exposed_ports(BERTH_SANDBOX_EXPOSED_PORTS, DEFAULT_EXPOSED_PORTS)
                .unwrap_or_default(),
            initial_env: BTreeMap::new(),
        }
    }
}

impl SandboxSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port_range_start =
            env_parse_or(BERTH_SANDBOX_PORT_RANGE_START, DEFAULT_PORT_RANGE_START)?;
        let port_range_end = env_parse_or(BERTH_SANDBOX_PORT_RANGE_END, DEFAULT_PORT_RANGE_END)?;

        // Validate port range
        if port_range_start == 0 || port_range_start > port_range_end {
            return Err(ConfigError::Invalid {
                key: BERTH_SANDBOX_PORT_RANGE_START.to_string(),
                value: format!("{}-{}", port_range_start, port_range_end),
                reason: "range must be non-empty and start above 0".to_string(),
            });
        }

        let url_template = env_or(BERTH_SANDBOX_URL_TEMPLATE, DEFAULT_URL_TEMPLATE);
        if !url_template.contains("{port}") {
            return Err(ConfigError::Invalid {
                key: BERTH_SANDBOX_URL_TEMPLATE.to_string(),
                value: url_template,
                reason: "template must contain {port}".to_string(),
            });
        }

        let exposed_ports = parse_exposed_ports(
            BERTH_SANDBOX_EXPOSED_PORTS,
            &env_or(BERTH_SANDBOX_EXPOSED_PORTS, DEFAULT_EXPOSED_PORTS),
        )?;
        let initial_env = parse_initial_env(
            BERTH_SANDBOX_INITIAL_ENV,
            &env_opt(BERTH_SANDBOX_INITIAL_ENV).unwrap_or_default(),
        )?;

        Ok(Self {
            name_prefix: env_or(BERTH_SANDBOX_NAME_PREFIX, DEFAULT_NAME_PREFIX),
            url_template,
            stop_timeout_secs: env_parse_or(
                BERTH_SANDBOX_STOP_TIMEOUT_SECS,
                DEFAULT_STOP_TIMEOUT_SECS,
            )?,
            port_range_start,
            port_range_end,
            image_repository: env_or(BERTH_SANDBOX_IMAGE_REPOSITORY, DEFAULT_IMAGE_REPOSITORY),
            command: split_command(&env_or(BERTH_SANDBOX_COMMAND, DEFAULT_COMMAND)),
            working_dir: env_or(BERTH_SANDBOX_WORKING_DIR, DEFAULT_WORKING_DIR),
            exposed_ports,
            initial_env,
        })
    }

    /// Render the URL for a host port
    pub fn url_for(&self, host_port: u16) -> String {
        self.url_template.replace("{port}", &host_port.to_string())
    }
}

fn split_command(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Parse `name:port,name:port` into a container port -> name map
fn parse_exposed_ports(key: &str, raw: &str) -> Result<BTreeMap<u16, String>, ConfigError> {
    let mut ports = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let invalid = |reason: &str| ConfigError::Invalid {
            key: key.to_string(),
            value: entry.to_string(),
            reason: reason.to_string(),
        };
        let (name, port) = entry
            .split_once(':')
            .ok_or_else(|| invalid("expected name:port"))?;
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|_| invalid("port must be a number between 1 and 65535"))?;
        if port == 0 || name.trim().is_empty() {
            return Err(invalid("expected name:port"));
        }
        ports.insert(port, name.trim().to_string());
    }
    Ok(ports)
}

/// Parse `KEY=VALUE,KEY=VALUE`
fn parse_initial_env(key: &str, raw: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut env = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        match entry.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                env.insert(name.trim().to_string(), value.to_string());
            }
            _ => {
                return Err(ConfigError::Invalid {
                    key: key.to_string(),
                    value: entry.to_string(),
                    reason: "expected KEY=VALUE".to_string(),
                })
            }
        }
    }
    Ok(env)
}
