//! Request-scoped secret store
//!
//! Secrets reach outgoing provider payloads but are never persisted in the
//! domain model and never logged. Values are opaque strings looked up by
//! key; this engine neither creates nor rotates them.

use std::collections::BTreeMap;

/// Lookup interface for the secrets available to one reconciliation.
pub trait SecretStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// In-memory store populated by the runner for a single invocation.
#[derive(Default)]
pub struct StaticSecrets {
    values: BTreeMap<String, String>,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl SecretStore for StaticSecrets {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

impl std::fmt::Debug for StaticSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // keys only, values stay out of logs
        f.debug_struct("StaticSecrets")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let store = StaticSecrets::new().with("db/password", "hunter2");
        assert_eq!(store.get("db/password").as_deref(), Some("hunter2"));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn test_debug_hides_values() {
        let store = StaticSecrets::new().with("db/password", "hunter2");
        let debug = format!("{store:?}");
        assert!(debug.contains("db/password"));
        assert!(!debug.contains("hunter2"));
    }
}
