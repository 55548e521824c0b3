//! Runtime configuration.

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Text used to derive the alias of a foreign-key field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdSource {
    /// Alias from the column name.
    #[default]
    FieldName,
    /// Alias from the referenced table name.
    ReferencedTable,
}

/// Model and engine configuration.
///
/// # Example
///
/// ```ignore
/// let config = Config::from_json(r#"{ "dialect": "my_sql", "db_name": "school" }"#)?;
/// assert_eq!(config.id, "_Id");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the synthetic identity field.
    pub id: String,
    /// Separator between identity components.
    pub concat: String,
    /// Extra words never used as aliases.
    pub reserved_alias: Vec<String>,
    /// Tables excluded from the model.
    pub reserved_entities: Vec<String>,
    pub id_source: IdSource,
    /// Directory holding `entities.json` and `fields/<entity>.json`.
    pub config_path: Option<PathBuf>,
    /// Directory receiving schema snapshots.
    pub doc_path: Option<PathBuf>,
    pub dialect: Dialect,
    /// Database (catalog or schema) name used by schema readers.
    pub db_name: String,
    /// Result cache entry lifetime; `None` keeps entries until invalidated.
    pub cache_ttl_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id: "_Id".to_string(),
            concat: "~".to_string(),
            reserved_alias: Vec::new(),
            reserved_entities: Vec::new(),
            id_source: IdSource::default(),
            config_path: None,
            doc_path: None,
            dialect: Dialect::default(),
            db_name: String::new(),
            cache_ttl_secs: None,
        }
    }
}

impl Config {
    /// Parse a configuration from JSON text and validate it.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "Loading configuration");
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::config("identity field name must not be empty"));
        }
        if self.concat.is_empty() {
            return Err(Error::config("identity separator must not be empty"));
        }
        Ok(())
    }

    /// Builder-style dialect setter.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Builder-style separator setter.
    pub fn with_concat(mut self, concat: impl Into<String>) -> Self {
        self.concat = concat.into();
        self
    }

    /// Builder-style override directory setter.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_db_name(mut self, name: impl Into<String>) -> Self {
        self.db_name = name.into();
        self
    }

    pub fn is_reserved_entity(&self, name: &str) -> bool {
        self.reserved_entities.iter().any(|e| e == name)
    }
}
