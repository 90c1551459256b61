//! Reader configuration: database descriptor and SQL query templates.
//!
//! Query templates may contain `${name}` placeholders, replaced once at
//! startup from the static parameters, and `?` bind parameters filled on
//! every request.

use std::collections::{BTreeMap, HashSet};
use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ReaderError, Result};

/// Top-level reader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Database connection descriptor
    pub database: DatabaseConfig,

    /// Advertised to callers that may fan requests out over threads
    #[serde(default)]
    pub threaded: bool,

    /// Query templates and static parameters
    pub queries: QueriesConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    4
}

impl DatabaseConfig {
    /// Load the database descriptor from `METADATA_DATABASE_URL` and
    /// `METADATA_DATABASE_MAX_CONNECTIONS`.
    pub fn from_env() -> Result<Self> {
        let url = env::var("METADATA_DATABASE_URL").map_err(|_| {
            ReaderError::Configuration("METADATA_DATABASE_URL is not set".to_string())
        })?;
        let max_connections = env::var("METADATA_DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_max_connections);
        Ok(Self {
            url,
            max_connections,
        })
    }
}

/// The `queries` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueriesConfig {
    /// Parameterless query returning every record identifier
    #[serde(default)]
    pub main: Option<QueryTemplate>,

    /// Named parameterized queries
    #[serde(default)]
    pub queries: Vec<QueryTemplate>,

    /// Parameterless queries whose single-column result becomes a static parameter
    #[serde(default, rename = "static")]
    pub statics: Vec<QueryTemplate>,

    /// Static parameters given directly
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTemplate {
    pub name: String,
    pub sql: String,

    /// Result columns exposed by this query, in select order
    #[serde(default)]
    pub variables: Vec<String>,
}

impl ReaderConfig {
    /// Load from a `.yaml`/`.yml` or `.json` file. `METADATA_DATABASE_URL`
    /// overrides the configured URL when set.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReaderError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config: ReaderConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            _ => {
                return Err(ReaderError::Configuration(format!(
                    "unsupported configuration format: {}",
                    path.display()
                )))
            }
        };
        if let Ok(url) = env::var("METADATA_DATABASE_URL") {
            config.database.url = url;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: ReaderConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject empty templates and duplicate names.
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(ReaderError::Configuration("database url is empty".to_string()));
        }

        let mut names = HashSet::new();
        let templates = self
            .queries
            .main
            .iter()
            .chain(&self.queries.queries)
            .chain(&self.queries.statics);
        for template in templates {
            if template.name.trim().is_empty() {
                return Err(ReaderError::Configuration("query without a name".to_string()));
            }
            if template.sql.trim().is_empty() {
                return Err(ReaderError::Configuration(format!(
                    "query '{}' has no SQL",
                    template.name
                )));
            }
            if !names.insert(template.name.as_str()) {
                return Err(ReaderError::Configuration(format!(
                    "duplicate query name '{}'",
                    template.name
                )));
            }
        }
        Ok(())
    }
}
