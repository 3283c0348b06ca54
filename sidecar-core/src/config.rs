//! Configuration module for the persistence engine
//!
//! This module provides the settings that decide how the custom store file is
//! named, obfuscated, and what happens when it turns out to be corrupt.

use crate::codec::DEFAULT_OBFUSCATION_KEY;
use crate::paths::PathRules;
use serde::{Deserialize, Serialize};

/// What a load does with a store file that fails to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MalformedStorePolicy {
    /// Delete the corrupt file and continue as a fresh start
    #[default]
    Discard,
    /// Surface `SidecarError::MalformedStore` and leave the file in place
    Fail,
}

/// Configuration structure for the persistence engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Key for the XOR pass over the store file
    pub obfuscation_key: String,
    /// Load behavior for corrupt store files
    pub malformed_policy: MalformedStorePolicy,
    /// Base save path to custom store path mapping
    pub paths: PathRules,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            obfuscation_key: DEFAULT_OBFUSCATION_KEY.to_string(),
            malformed_policy: MalformedStorePolicy::default(),
            paths: PathRules::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON configuration document; missing fields take their defaults
    pub fn from_json_str(raw: &str) -> crate::Result<Self> {
        let config: EngineConfig = serde_json::from_str(raw)
            .map_err(|e| crate::SidecarError::validation(format!("Invalid engine config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.obfuscation_key.is_empty() {
            return Err(crate::SidecarError::validation(
                "obfuscation_key must not be empty",
            ));
        }
        if self.paths.base_extension.is_empty() || self.paths.custom_extension.is_empty() {
            return Err(crate::SidecarError::validation(
                "path rules need both a base and a custom extension",
            ));
        }
        if self.paths.base_extension == self.paths.custom_extension
            && self.paths.base_marker == self.paths.custom_marker
        {
            return Err(crate::SidecarError::validation(
                "path rules would map the base save onto itself",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.obfuscation_key, DEFAULT_OBFUSCATION_KEY);
        assert_eq!(config.malformed_policy, MalformedStorePolicy::Discard);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            EngineConfig::from_json_str(r#"{"malformed_policy": "fail", "obfuscation_key": "k"}"#)
                .unwrap();
        assert_eq!(config.malformed_policy, MalformedStorePolicy::Fail);
        assert_eq!(config.obfuscation_key, "k");
        assert_eq!(config.paths, PathRules::default());
    }

    #[test]
    fn test_from_json_invalid() {
        let result = EngineConfig::from_json_str(r#"{"malformed_policy": "shrug"}"#);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid engine config"));
    }

    #[test]
    fn test_validate_rejects_empty_key() {
        let mut config = EngineConfig::default();
        config.obfuscation_key.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_identity_paths() {
        let mut config = EngineConfig::default();
        config.paths.custom_marker = config.paths.base_marker.clone();
        config.paths.custom_extension = config.paths.base_extension.clone();
        assert!(config.validate().is_err());

        config.paths.custom_extension.clear();
        assert!(config.validate().is_err());
    }
}
