// ABOUTME: Secret credential handed to clients of a running sandbox
// ABOUTME: Random URL-safe token with a redacting Debug so it never lands in logs

use base64::Engine;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Session credential, sent by clients as the `X-Session-API-Key` header
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Generate a cryptographically secure random key.
    /// Returns a base64-encoded 32-byte token.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let random_bytes: [u8; 32] = rng.gen();
        Self(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes))
    }

    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(**********)")
    }
}
