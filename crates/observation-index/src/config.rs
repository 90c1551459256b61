//! Indexer configuration.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use sos_common::{SosError, SosResult};

/// Where observation files are read from and where the index is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Directory of observation JSON files (searched recursively)
    pub observation_dir: PathBuf,

    /// Directory of result template JSON files, if templates are served
    #[serde(default)]
    pub template_dir: Option<PathBuf>,

    /// Index output directory
    pub index_dir: PathBuf,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            observation_dir: PathBuf::from("./data/observations"),
            template_dir: None,
            index_dir: PathBuf::from("./data/index"),
        }
    }
}

impl IndexerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            observation_dir: env::var("SOS_OBSERVATION_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.observation_dir),
            template_dir: env::var("SOS_TEMPLATE_DIR").ok().map(PathBuf::from),
            index_dir: env::var("SOS_INDEX_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.index_dir),
        }
    }

    pub fn validate(&self) -> SosResult<()> {
        if !self.observation_dir.is_dir() {
            return Err(SosError::Configuration(format!(
                "observation directory does not exist: {}",
                self.observation_dir.display()
            )));
        }
        if let Some(dir) = &self.template_dir {
            if !dir.is_dir() {
                return Err(SosError::Configuration(format!(
                    "template directory does not exist: {}",
                    dir.display()
                )));
            }
        }
        if self.index_dir.is_file() {
            return Err(SosError::Configuration(format!(
                "index path is a file: {}",
                self.index_dir.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_missing_directory() {
        let config = IndexerConfig {
            observation_dir: PathBuf::from("/nonexistent/observations"),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SosError::Configuration(_))));
    }

    #[test]
    fn test_validate_existing_directories() {
        let tmp = TempDir::new().unwrap();
        let config = IndexerConfig {
            observation_dir: tmp.path().to_path_buf(),
            template_dir: Some(tmp.path().to_path_buf()),
            index_dir: tmp.path().join("index"),
        };
        assert!(config.validate().is_ok());
    }
}
