//! Engine configuration.
//!
//! Parsed from TOML. Every field has a default, so an empty file is a valid
//! configuration.
use super::audit::TrailOrder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct EngineConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub ids: IdConfig,
    #[serde(default)]
    pub outcome: OutcomeConfig,
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.check()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Store in a throwaway location; used by tests.
    pub fn temporary() -> Self {
        let mut config = Self::default();
        config.store.temporary = true;
        config
    }

    fn check(&self) -> Result<(), ConfigError> {
        for (name, prefix) in [
            ("ids.decision_prefix", &self.ids.decision_prefix),
            ("ids.audit_prefix", &self.ids.audit_prefix),
            ("ids.rule_prefix", &self.ids.rule_prefix),
        ] {
            bech32::Hrp::parse(prefix)
                .map_err(|e| ConfigError::Validation(format!("{name} '{prefix}': {e}")))?;
        }
        if self.outcome.amount_field.trim().is_empty() {
            return Err(ConfigError::Validation(
                "outcome.amount_field is empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub temporary: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            temporary: false,
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("decisions.db")
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AuditConfig {
    /// Order of trails returned for display.
    #[serde(default)]
    pub order: TrailOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdConfig {
    #[serde(default = "default_decision_prefix")]
    pub decision_prefix: String,
    #[serde(default = "default_audit_prefix")]
    pub audit_prefix: String,
    #[serde(default = "default_rule_prefix")]
    pub rule_prefix: String,
}

impl Default for IdConfig {
    fn default() -> Self {
        Self {
            decision_prefix: default_decision_prefix(),
            audit_prefix: default_audit_prefix(),
            rule_prefix: default_rule_prefix(),
        }
    }
}

fn default_decision_prefix() -> String {
    "decision_".to_string()
}

fn default_audit_prefix() -> String {
    "audit_".to_string()
}

fn default_rule_prefix() -> String {
    "rule_".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutcomeConfig {
    /// Key of the monetary amount inside the outcome payload.
    #[serde(default = "default_amount_field")]
    pub amount_field: String,
}

impl Default for OutcomeConfig {
    fn default() -> Self {
        Self {
            amount_field: default_amount_field(),
        }
    }
}

fn default_amount_field() -> String {
    "amount".to_string()
}
