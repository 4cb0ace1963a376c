// ABOUTME: Error classification shared by every Berth service boundary
// ABOUTME: Lets a transport layer map any library error to not-found, client or server responses

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse category of a failure, independent of which component raised it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The requested id does not exist
    NotFound,
    /// Bad agent or spec configuration; retrying without changes will fail again
    Configuration,
    /// Operation is invalid for the current state
    Conflict,
    /// Container runtime or storage failed for a non-semantic reason
    TransientRuntime,
}

impl ErrorKind {
    /// True when the caller, not the service, is at fault
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ErrorKind::NotFound | ErrorKind::Configuration | ErrorKind::Conflict
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Configuration => "CONFIGURATION_ERROR",
            ErrorKind::Conflict => "CONFLICT_ERROR",
            ErrorKind::TransientRuntime => "TRANSIENT_RUNTIME_ERROR",
        };
        f.write_str(s)
    }
}
