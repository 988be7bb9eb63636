use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Header carrying the idempotency key on every backend call.
pub const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";

/// Per-call unique token the backend uses to deduplicate retried requests.
///
/// One key is minted per logical operation. A retry of the same operation
/// instance (the 401 path) clones the key instead of minting a new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Generate a fresh key (UUID v4)
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
