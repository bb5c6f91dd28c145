//! `ValidateAPIKey(string) -> bool` (spec.md §6). The handshake endpoint
//! consults this before accepting the WebSocket upgrade; a mismatch is a
//! plain 401 without ever reaching the realtime core.

use async_trait::async_trait;
use std::collections::HashSet;

#[async_trait]
pub trait ApiKeyValidator: Send + Sync {
    async fn validate(&self, api_key: &str) -> bool;
}

/// Reference implementation: a fixed set of accepted keys loaded from
/// config, matching the anon/service-role key pattern the wider product
/// uses at the handshake boundary.
pub struct StaticApiKeyValidator {
    keys: HashSet<String>,
}

impl StaticApiKeyValidator {
    pub fn new(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ApiKeyValidator for StaticApiKeyValidator {
    async fn validate(&self, api_key: &str) -> bool {
        self.keys.contains(api_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accepts_configured_key_and_rejects_others() {
        let validator = StaticApiKeyValidator::new(["anon-key".to_string()]);
        assert!(validator.validate("anon-key").await);
        assert!(!validator.validate("wrong-key").await);
    }
}
