//! Bridge configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{BridgeError, Result};

/// Default advertised session port
pub const DEFAULT_SESSION_PORT: u16 = 900;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Session port every attachment binds and announces
    pub session_port: u16,
    /// Whether derived properties emit change signals
    pub emits_changed: bool,
    /// Device ids mirrored as real devices rather than virtual ones
    pub golden_units: Vec<String>,
    /// Default language of new announcement records
    pub default_language: Option<String>,
    /// Server instance id; generated at startup when absent
    pub instance_id: Option<String>,
    pub log_level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            session_port: DEFAULT_SESSION_PORT,
            emits_changed: true,
            golden_units: Vec::new(),
            default_language: None,
            instance_id: None,
            log_level: "info".to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| BridgeError::Config(e.to_string()))
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| BridgeError::Config(e.to_string()))
    }

    pub fn is_golden_unit(&self, device_id: &str) -> bool {
        self.golden_units.iter().any(|d| d == device_id)
    }

    /// Settings for the attachment of one device
    pub fn attachment(&self, device_id: &str, protocol_independent_id: Option<&str>) -> AttachmentConfig {
        AttachmentConfig {
            device_id: device_id.to_string(),
            protocol_independent_id: protocol_independent_id.map(str::to_string),
            golden_unit: self.is_golden_unit(device_id),
            session_port: self.session_port,
            emits_changed: self.emits_changed,
            default_language: self.default_language.clone().unwrap_or_default(),
        }
    }
}

/// Settings for one attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentConfig {
    pub device_id: String,
    pub protocol_independent_id: Option<String>,
    pub golden_unit: bool,
    pub session_port: u16,
    pub emits_changed: bool,
    pub default_language: String,
}

impl AttachmentConfig {
    pub fn new(device_id: &str) -> Self {
        BridgeConfig::default().attachment(device_id, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::from_toml_str("").unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.session_port, 900);
        assert!(config.emits_changed);
    }

    #[test]
    fn test_partial_toml() {
        let config = BridgeConfig::from_toml_str(
            r#"
            session_port = 1200
            golden_units = ["dev-1"]
            default_language = "en"
            "#,
        )
        .unwrap();
        assert_eq!(config.session_port, 1200);
        assert!(config.is_golden_unit("dev-1"));
        assert!(!config.is_golden_unit("dev-2"));
        let attachment = config.attachment("dev-1", Some("piid"));
        assert!(attachment.golden_unit);
        assert_eq!(attachment.default_language, "en");
        assert_eq!(attachment.protocol_independent_id.as_deref(), Some("piid"));
    }

    #[test]
    fn test_invalid_toml() {
        let err = BridgeConfig::from_toml_str("session_port = \"x\"").unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = BridgeConfig {
            instance_id: Some("abc".to_string()),
            ..Default::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(BridgeConfig::from_toml_str(&text).unwrap(), config);
    }
}
