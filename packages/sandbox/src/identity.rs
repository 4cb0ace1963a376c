// ABOUTME: Bidirectional mapping between sandbox ids and container runtime names
// ABOUTME: Lets the orchestrator recover a sandbox id from nothing but the runtime's own naming

use uuid::Uuid;

/// Default prefix for every container created by Berth
pub const DEFAULT_NAME_PREFIX: &str = "berth-sandbox-";

/// Suffix appended to a container name to name its workspace volume
pub const VOLUME_SUFFIX: &str = "-workspace";

/// Naming scheme shared by the orchestrator and anything inspecting the runtime.
///
/// `name_for` and `id_for` are exact inverses: a name is accepted only if it is
/// byte-for-byte what `name_for` would produce for the parsed id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxNaming {
    prefix: String,
}

impl SandboxNaming {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Container name for a sandbox id: prefix followed by 32 lower-case hex digits
    pub fn name_for(&self, id: Uuid) -> String {
        format!("{}{}", self.prefix, id.simple())
    }

    /// Name of the persistent workspace volume owned by a sandbox
    pub fn volume_name_for(&self, id: Uuid) -> String {
        format!("{}{}", self.name_for(id), VOLUME_SUFFIX)
    }

    /// Recover the sandbox id from a container name.
    ///
    /// Docker reports names with a leading `/` from inspect; that is ignored.
    pub fn id_for(&self, name: &str) -> Option<Uuid> {
        let name = name.strip_prefix('/').unwrap_or(name);
        let hex = name.strip_prefix(self.prefix.as_str())?;

        // Only the canonical simple form round-trips; reject hyphenated,
        // braced or upper-case spellings that Uuid would otherwise accept.
        if hex.len() != 32 {
            return None;
        }
        let id = Uuid::try_parse(hex).ok()?;
        (id.simple().to_string() == hex).then_some(id)
    }
}

impl Default for SandboxNaming {
    fn default() -> Self {
        Self::new(DEFAULT_NAME_PREFIX)
    }
}
