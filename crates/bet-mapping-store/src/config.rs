//! TOML configuration for the file store.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use bet_mapping::{resolve_type, Catalog, MappingType};
use serde::Deserialize;
use thiserror::Error;

/// Default directory for index logs, relative to the config file.
pub const DEFAULT_DATA_DIR: &str = "mappings";

/// When appended records reach stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Durability {
    /// `sync_data` after every append (default, safest)
    #[default]
    Sync,
    /// Leave flushing to the OS
    Buffered,
}

/// Parsed store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig<C = MappingType> {
    /// Directory holding one log per mapping type
    pub data_dir: PathBuf,
    pub durability: Durability,
    /// Types whose empty index is created on open if missing
    pub provision: Vec<C>,
}

/// Raw TOML structure.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStoreConfig {
    /// Optional data directory (defaults to "mappings")
    data_dir: Option<PathBuf>,
    /// "sync" (default) or "buffered"
    durability: Option<String>,
    namespaces: Option<RawNamespaces>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawNamespaces {
    /// Canonical mapping type tokens
    #[serde(default)]
    provision: Vec<String>,
}

impl<C: Catalog> StoreConfig<C> {
    /// Default settings rooted at `data_dir`, provisioning nothing.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            durability: Durability::default(),
            provision: Vec::new(),
        }
    }

    /// Replace the durability setting.
    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    /// Provision every type of the catalog on open.
    pub fn provision_all(mut self) -> Self {
        self.provision = C::ALL.to_vec();
        self
    }

    /// Parse from a TOML file. A relative `data_dir` resolves against the
    /// file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = content.parse()?;
        if config.data_dir.is_relative()
            && let Some(parent) = path.parent()
        {
            config.data_dir = parent.join(&config.data_dir);
        }
        Ok(config)
    }

    fn from_raw(raw: RawStoreConfig) -> Result<Self, ConfigError> {
        let data_dir = raw
            .data_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        if data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation("data_dir must not be empty".into()));
        }

        let durability = match raw.durability.as_deref() {
            None | Some("sync") => Durability::Sync,
            Some("buffered") => Durability::Buffered,
            Some(other) => {
                return Err(ConfigError::Validation(format!(
                    "Invalid durability value '{}': expected 'sync' or 'buffered'",
                    other
                )));
            }
        };

        let tokens = raw.namespaces.map(|ns| ns.provision).unwrap_or_default();
        let mut seen = HashSet::new();
        let mut provision = Vec::with_capacity(tokens.len());
        for token in &tokens {
            let ty = resolve_type::<C>(token).map_err(|_| {
                ConfigError::Validation(format!(
                    "Invalid namespace '{}' in provision list",
                    token
                ))
            })?;
            if !seen.insert(ty) {
                return Err(ConfigError::Validation(format!(
                    "Namespace '{}' listed twice in provision list",
                    token
                )));
            }
            provision.push(ty);
        }

        Ok(Self {
            data_dir,
            durability,
            provision,
        })
    }
}

impl<C: Catalog> FromStr for StoreConfig<C> {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let raw: RawStoreConfig = toml::from_str(content)?;
        Self::from_raw(raw)
    }
}

/// Errors during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}
