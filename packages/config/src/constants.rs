// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used across Berth

// Logging
pub const BERTH_LOG: &str = "BERTH_LOG";
pub const RUST_LOG: &str = "RUST_LOG";

// Sandbox Naming & Access
pub const BERTH_SANDBOX_NAME_PREFIX: &str = "BERTH_SANDBOX_NAME_PREFIX";
pub const BERTH_SANDBOX_URL_TEMPLATE: &str = "BERTH_SANDBOX_URL_TEMPLATE";

// Sandbox Lifecycle
pub const BERTH_SANDBOX_STOP_TIMEOUT_SECS: &str = "BERTH_SANDBOX_STOP_TIMEOUT_SECS";

// Host Port Allocation
pub const BERTH_SANDBOX_PORT_RANGE_START: &str = "BERTH_SANDBOX_PORT_RANGE_START";
pub const BERTH_SANDBOX_PORT_RANGE_END: &str = "BERTH_SANDBOX_PORT_RANGE_END";

// Sandbox Specs (image-backed registry defaults)
pub const BERTH_SANDBOX_IMAGE_REPOSITORY: &str = "BERTH_SANDBOX_IMAGE_REPOSITORY";
pub const BERTH_SANDBOX_COMMAND: &str = "BERTH_SANDBOX_COMMAND";
pub const BERTH_SANDBOX_WORKING_DIR: &str = "BERTH_SANDBOX_WORKING_DIR";
pub const BERTH_SANDBOX_EXPOSED_PORTS: &str = "BERTH_SANDBOX_EXPOSED_PORTS"; // name:port,name:port
pub const BERTH_SANDBOX_INITIAL_ENV: &str = "BERTH_SANDBOX_INITIAL_ENV"; // KEY=VALUE,KEY=VALUE

// Conversations
pub const BERTH_CONVERSATIONS_DIR: &str = "BERTH_CONVERSATIONS_DIR";
pub const BERTH_WORKSPACE_DIR: &str = "BERTH_WORKSPACE_DIR";

// Variables injected into every sandbox container
pub const SESSION_API_KEY: &str = "SESSION_API_KEY";
pub const SANDBOX_ID: &str = "SANDBOX_ID";

// System Environment Variables
pub const HOME: &str = "HOME";
