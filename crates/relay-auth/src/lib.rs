// Flat shared-credential validation. The key set is built once at startup
// and immutable afterwards; rotation requires a restart.
use std::collections::HashSet;

/// Validates presented API keys against a fixed set.
#[derive(Debug)]
pub struct KeyValidator {
    keys: HashSet<String>,
    enabled: bool,
}

impl KeyValidator {
    /// Build a validator from configured keys. Keys are trimmed and empty
    /// entries are discarded, so a trailing comma in `API_KEYS` is harmless.
    pub fn new(keys: &[String], enabled: bool) -> Self {
        let keys: HashSet<String> = keys
            .iter()
            .map(|key| key.trim())
            .filter(|key| !key.is_empty())
            .map(str::to_owned)
            .collect();
        if enabled {
            tracing::info!(key_count = keys.len(), "api key authentication enabled");
        } else {
            tracing::info!("api key authentication disabled");
        }
        Self { keys, enabled }
    }

    /// Whether the presented key is acceptable. Always true when the
    /// validator is disabled.
    pub fn validate(&self, key: &str) -> bool {
        if !self.enabled {
            return true;
        }
        !key.is_empty() && self.keys.contains(key)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
