// ABOUTME: Filesystem location constants for Berth
// ABOUTME: Resolves the per-user data directory used for conversation metadata and workspaces

use std::env;
use std::path::PathBuf;

/// Name of the per-user data directory
pub const BERTH_DIR_NAME: &str = ".berth";

/// Get the path to the Berth directory (~/.berth)
pub fn berth_dir() -> PathBuf {
    // First try HOME environment variable (useful for tests)
    if let Ok(home) = env::var("HOME") {
        return PathBuf::from(home).join(BERTH_DIR_NAME);
    }

    // Fall back to dirs crate, then to the working directory
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(BERTH_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_berth_dir_ends_with_dir_name() {
        let dir = berth_dir();
        assert!(dir.ends_with(BERTH_DIR_NAME));
    }
}
