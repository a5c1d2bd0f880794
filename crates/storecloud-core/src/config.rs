//! Configuration module
//!
//! Selects the storage driver and its settings from the environment.

use std::env;

use crate::store_type::StoreType;

const DEFAULT_FILESYSTEM_ROOT: &str = "./storage";

#[derive(Clone, Debug, PartialEq)]
pub struct StoreConfig {
    pub store_type: StoreType,
    pub filesystem_root: String,
    pub environment: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            store_type: StoreType::Filesystem,
            filesystem_root: DEFAULT_FILESYSTEM_ROOT.to_string(),
            environment: "development".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn filesystem(root: impl Into<String>) -> Self {
        StoreConfig {
            store_type: StoreType::Filesystem,
            filesystem_root: root.into(),
            ..Default::default()
        }
    }

    pub fn memory() -> Self {
        StoreConfig {
            store_type: StoreType::Memory,
            ..Default::default()
        }
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store_type = match lookup("STORAGE_BACKEND") {
            Some(value) => value.parse::<StoreType>()?,
            None => StoreType::Filesystem,
        };

        let filesystem_root = lookup("FILESYSTEM_STORAGE_ROOT")
            .unwrap_or_else(|| DEFAULT_FILESYSTEM_ROOT.to_string());

        let environment = lookup("STORAGE_ENVIRONMENT")
            .or_else(|| lookup("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let config = StoreConfig {
            store_type,
            filesystem_root,
            environment,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.store_type == StoreType::Filesystem && self.filesystem_root.trim().is_empty() {
            anyhow::bail!("FILESYSTEM_STORAGE_ROOT must not be empty for the filesystem backend");
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_to_filesystem() {
        let config = StoreConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, StoreConfig::default());
        assert!(!config.is_production());
    }

    #[test]
    fn reads_backend_and_root() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            ("STORAGE_BACKEND", "memory"),
            ("FILESYSTEM_STORAGE_ROOT", "/var/lib/storecloud"),
            ("APP_ENV", "prod"),
        ]))
        .unwrap();
        assert_eq!(config.store_type, StoreType::Memory);
        assert_eq!(config.filesystem_root, "/var/lib/storecloud");
        assert!(config.is_production());
    }

    #[test]
    fn rejects_unknown_backend() {
        assert!(StoreConfig::from_lookup(lookup_from(&[("STORAGE_BACKEND", "floppy")])).is_err());
    }

    #[test]
    fn rejects_blank_filesystem_root() {
        let result = StoreConfig::from_lookup(lookup_from(&[("FILESYSTEM_STORAGE_ROOT", "  ")]));
        assert!(result.is_err());
    }
}
