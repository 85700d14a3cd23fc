//! Runtime configuration for the module database.

use serde::{Deserialize, Serialize};

/// Configuration for a [`Database`](crate::database::Database)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// How many random draws an id allocation may take before giving up
    pub max_id_attempts: u32,
    /// Seed for the id generator. `None` seeds from OS entropy.
    pub id_seed: Option<u64>,
    /// Run `on_update` on disabled records too
    pub update_disabled: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_id_attempts: 64,
            id_seed: None,
            update_disabled: false,
        }
    }
}

impl DatabaseConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.id_seed = Some(seed);
        self
    }

    pub fn with_max_id_attempts(mut self, attempts: u32) -> Self {
        self.max_id_attempts = attempts.max(1);
        self
    }

    pub fn with_update_disabled(mut self, update_disabled: bool) -> Self {
        self.update_disabled = update_disabled;
        self
    }

    /// Parse a config from JSON. Missing fields take their default.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = DatabaseConfig::from_json_str(r#"{ "id_seed": 42 }"#).unwrap();
        assert_eq!(config.id_seed, Some(42));
        assert_eq!(config.max_id_attempts, 64);
        assert!(!config.update_disabled);
    }

    #[test]
    fn test_builder() {
        let config = DatabaseConfig::default()
            .with_seed(7)
            .with_max_id_attempts(0)
            .with_update_disabled(true);
        assert_eq!(config.id_seed, Some(7));
        assert_eq!(config.max_id_attempts, 1);
        assert!(config.update_disabled);
    }
}
