use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use globid_store::StoreOptions;
use serde::{Deserialize, Serialize};

use crate::adapter::GLOBAL_ID_HOOK;
use crate::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Schema assumed for unqualified table names.
    #[serde(default)]
    pub default_schema: String,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Hooks to run on every statement, in order.
    #[serde(default = "default_hooks")]
    pub hooks: Vec<String>,
    #[serde(default)]
    pub global_ids: Vec<GlobalIdColumn>,
}

fn default_hooks() -> Vec<String> {
    vec![GLOBAL_ID_HOOK.to_string()]
}

impl ProxyConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let bytes = fs::read(path.as_ref())?;
        let config: Self = serde_json::from_slice(&bytes)?;
        log::info!(
            "loaded proxy config {} with {} global id columns",
            path.as_ref().display(),
            config.global_ids.len()
        );
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn global_id_config(&self) -> Result<GlobalIdConfig, ConfigError> {
        GlobalIdConfig::from_entries(self.global_ids.iter().cloned())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
    #[serde(default = "default_sync_writes")]
    pub sync_writes: bool,
    #[serde(default = "default_compact_after_bytes")]
    pub compact_after_bytes: u64,
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("/tmp/id.cache")
}

fn default_sync_writes() -> bool {
    true
}

fn default_compact_after_bytes() -> u64 {
    1024 * 1024
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            sync_writes: default_sync_writes(),
            compact_after_bytes: default_compact_after_bytes(),
        }
    }
}

impl CacheConfig {
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            create: true,
            sync_writes: self.sync_writes,
            compact_after_bytes: self.compact_after_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalIdColumn {
    pub schema: String,
    pub table: String,
    pub column: String,
}

/// Read-only mapping from (schema, table) to the column receiving global ids.
#[derive(Debug, Clone, Default)]
pub struct GlobalIdConfig {
    tables: HashMap<String, HashMap<String, String>>,
    len: usize,
}

impl GlobalIdConfig {
    pub fn from_entries(
        entries: impl IntoIterator<Item = GlobalIdColumn>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for entry in entries {
            if entry.schema.is_empty() || entry.table.is_empty() || entry.column.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "global id entry {entry:?} has an empty identifier"
                )));
            }
            let tables = config.tables.entry(entry.schema.clone()).or_default();
            if tables.contains_key(&entry.table) {
                return Err(ConfigError::Invalid(format!(
                    "table {}.{} has more than one global id column",
                    entry.schema, entry.table
                )));
            }
            tables.insert(entry.table, entry.column);
            config.len += 1;
        }
        Ok(config)
    }

    pub fn column(&self, schema: &str, table: &str) -> Option<&str> {
        self.tables
            .get(schema)
            .and_then(|tables| tables.get(table))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
