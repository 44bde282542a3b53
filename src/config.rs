//! Configuration
//!
//! The array manager reads an optional YAML file at start-up. Command-line
//! flags override the timeouts found there.
//!
//! ```yaml
//! registry:
//!   connect_timeout_ms: 30000
//!   call_timeout_ms: 60000
//! storages:
//!   - storage_id: abcd-1234
//!     name: array1
//!     vendor: fakevendor
//!     model: fakemodel
//!     access_info:
//!       host: 10.0.0.1
//!       username: admin
//!       password: secret
//! ```

use crate::domain::storage::StorageSystemDescriptor;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

// =============================================================================
// Registry Configuration
// =============================================================================

/// Driver registry tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Upper bound on opening a vendor session
    pub connect_timeout_ms: u64,
    /// Upper bound on any single vendor call
    pub call_timeout_ms: u64,
    /// Capacity of the lifecycle event channel
    pub event_buffer: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 30_000,
            call_timeout_ms: 60_000,
            event_buffer: 256,
        }
    }
}

impl RegistryConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_ms == 0 {
            return Err(Error::Configuration(
                "registry.connect_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.call_timeout_ms == 0 {
            return Err(Error::Configuration(
                "registry.call_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(Error::Configuration(
                "registry.event_buffer must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Hub Configuration
// =============================================================================

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub registry: RegistryConfig,
    /// Storage systems known at start-up
    pub storages: Vec<StorageSystemDescriptor>,
}

impl HubConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: HubConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        self.registry.validate()?;

        let mut seen = HashSet::new();
        for storage in &self.storages {
            if storage.storage_id.trim().is_empty() {
                return Err(Error::Configuration("storage_id must not be empty".into()));
            }
            if !seen.insert(storage.storage_id.as_str()) {
                return Err(Error::Configuration(format!(
                    "Duplicate storage_id {}",
                    storage.storage_id
                )));
            }
            if storage.vendor.trim().is_empty() || storage.model.trim().is_empty() {
                return Err(Error::Configuration(format!(
                    "Storage {} must name a vendor and a model",
                    storage.storage_id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    const SAMPLE: &str = r#"
registry:
  connect_timeout_ms: 5000
storages:
  - storage_id: abcd-1234
    name: array1
    vendor: fakevendor
    model: fakemodel
    access_info:
      host: 10.0.0.1
      username: admin
      password: secret
      extra_attributes:
        array_id: "00112233"
"#;

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.call_timeout(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = HubConfig::load(file.path()).unwrap();
        assert_eq!(config.registry.connect_timeout_ms, 5000);
        assert_eq!(config.registry.call_timeout_ms, 60_000);
        assert_eq!(config.storages.len(), 1);
        assert_eq!(config.storages[0].access_info.password, "secret");
        assert_eq!(config.storages[0].access_info.extra("array_id"), Some("00112233"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = HubConfig::load(dir.path().join("absent.yaml"));
        assert_matches!(result, Err(Error::Configuration(_)));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let result = HubConfig::from_yaml("registry:\n  call_timeout_ms: 0\n");
        assert_matches!(result, Err(Error::Configuration(ref msg)) if msg.contains("call_timeout_ms"));
    }

    #[test]
    fn test_rejects_duplicate_storage() {
        let doubled = format!("{}{}", SAMPLE, &SAMPLE[SAMPLE.find("  - storage_id").unwrap()..]);
        let result = HubConfig::from_yaml(&doubled);
        assert_matches!(result, Err(Error::Configuration(ref msg)) if msg.contains("Duplicate"));
    }

    #[test]
    fn test_invalid_yaml() {
        let result = HubConfig::from_yaml("registry: [unclosed");
        assert_matches!(result, Err(Error::YamlParse(_)));
    }
}
