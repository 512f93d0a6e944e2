//! Mirror configuration.

use serde::{Deserialize, Serialize};

use crate::address::NAMESPACE;
use crate::error::MirrorError;

/// Configuration for a mirror instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Name of this mirror, used in log lines.
    pub id: String,
    /// Six-hex-character namespace prefix whose addresses are mirrored.
    pub namespace: String,
    /// Store location: a SQLite path/URL or a `postgresql://` URL.
    pub database_url: String,
    /// Connection pool size for relational stores.
    pub max_connections: u32,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            id: "default".into(),
            namespace: NAMESPACE.into(),
            database_url: "sqlite:./ledgermirror.db?mode=rwc".into(),
            max_connections: 5,
        }
    }
}

impl MirrorConfig {
    /// Parse a YAML document; missing fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, MirrorError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| MirrorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MirrorError> {
        // Addresses are lowercase hex, and prefix matching is case-sensitive.
        let lower_hex = |c: char| matches!(c, '0'..='9' | 'a'..='f');
        if self.namespace.len() != 6 || !self.namespace.chars().all(lower_hex) {
            return Err(MirrorError::Config(format!(
                "namespace must be 6 lowercase hex characters, got {:?}",
                self.namespace
            )));
        }
        if self.max_connections == 0 {
            return Err(MirrorError::Config("max_connections must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_family_namespace() {
        let cfg = MirrorConfig::default();
        assert_eq!(cfg.namespace, "bb3cb0");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn yaml_overrides_and_defaults() {
        let cfg = MirrorConfig::from_yaml_str("id: elections\ndatabase_url: 'sqlite::memory:'\n").unwrap();
        assert_eq!(cfg.id, "elections");
        assert_eq!(cfg.database_url, "sqlite::memory:");
        assert_eq!(cfg.namespace, NAMESPACE);
        assert_eq!(cfg.max_connections, 5);
    }

    #[test]
    fn rejects_uppercase_namespace() {
        let err = MirrorConfig::from_yaml_str("namespace: BB3CB0\n").unwrap_err();
        assert!(matches!(err, MirrorError::Config(_)));
        assert!(MirrorConfig::from_yaml_str("namespace: abcdef\n").is_ok());
    }

    #[test]
    fn rejects_bad_namespace() {
        let err = MirrorConfig::from_yaml_str("namespace: xyz\n").unwrap_err();
        assert!(matches!(err, MirrorError::Config(_)));
    }

    #[test]
    fn rejects_zero_connections() {
        assert!(MirrorConfig::from_yaml_str("max_connections: 0\n").is_err());
    }
}
