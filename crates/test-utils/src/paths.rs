//! Temporary directory layouts for indexer tests.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A scratch data directory with `observations/`, `templates/` and `index/`.
///
/// Everything is removed when the value is dropped.
pub struct DataDir {
    root: TempDir,
}

impl DataDir {
    pub fn new() -> Self {
        let root = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir_all(root.path().join("observations")).expect("Failed to create observations dir");
        fs::create_dir_all(root.path().join("templates")).expect("Failed to create templates dir");
        Self { root }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn observation_dir(&self) -> PathBuf {
        self.root.path().join("observations")
    }

    pub fn template_dir(&self) -> PathBuf {
        self.root.path().join("templates")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.root.path().join("index")
    }

    /// Write `value` as `observations/<name>.json`.
    pub fn add_observation(&self, name: &str, value: &serde_json::Value) -> PathBuf {
        write_json(&self.observation_dir(), name, value)
    }

    /// Write `value` as `templates/<name>.json`.
    pub fn add_template(&self, name: &str, value: &serde_json::Value) -> PathBuf {
        write_json(&self.template_dir(), name, value)
    }

    /// Write raw text, for malformed-file cases.
    pub fn add_raw_observation(&self, file_name: &str, content: &str) -> PathBuf {
        let path = self.observation_dir().join(file_name);
        fs::write(&path, content).expect("Failed to write observation file");
        path
    }
}

impl Default for DataDir {
    fn default() -> Self {
        Self::new()
    }
}

fn write_json(dir: &Path, name: &str, value: &serde_json::Value) -> PathBuf {
    let path = dir.join(format!("{}.json", name));
    let content = serde_json::to_string_pretty(value).expect("Failed to serialize fixture");
    fs::write(&path, content).expect("Failed to write fixture");
    path
}
