//! Configuration for Formflow
//!
//! Read from `<home>/config.toml`; every key is optional. Relative paths in
//! the file are resolved against the home directory.

use crate::error::{FormflowError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DATABASE_FILE_NAME: &str = "formflow.sqlite3";

/// Main configuration for Formflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormflowConfig {
    /// Path to the SQLite database
    pub database_path: PathBuf,

    /// Root directory for uploaded files
    pub upload_dir: PathBuf,

    /// Upper bound for a single file storage call
    #[serde(default = "default_storage_timeout_ms")]
    pub storage_timeout_ms: u64,

    /// Pending notifications buffered before new ones are dropped
    #[serde(default = "default_dispatch_queue_capacity")]
    pub dispatch_queue_capacity: usize,

    /// Re-validation attempts when a form's schema changes mid-submission
    #[serde(default = "default_max_schema_retries")]
    pub max_schema_retries: u32,

    /// How long a writer waits for the database write lock
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_storage_timeout_ms() -> u64 {
    10_000
}

fn default_dispatch_queue_capacity() -> usize {
    256
}

fn default_max_schema_retries() -> u32 {
    3
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_max_connections() -> u32 {
    5
}

/// On-disk shape: all keys optional, merged over the home defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    upload_dir: Option<PathBuf>,
    storage_timeout_ms: Option<u64>,
    dispatch_queue_capacity: Option<usize>,
    max_schema_retries: Option<u32>,
    busy_timeout_ms: Option<u64>,
    max_connections: Option<u32>,
}

impl Default for FormflowConfig {
    fn default() -> Self {
        Self::with_home(&formflow_logging::formflow_home())
    }
}

impl FormflowConfig {
    /// Defaults rooted at `home`.
    pub fn with_home(home: &Path) -> Self {
        Self {
            database_path: home.join(DATABASE_FILE_NAME),
            upload_dir: home.join("uploads"),
            storage_timeout_ms: default_storage_timeout_ms(),
            dispatch_queue_capacity: default_dispatch_queue_capacity(),
            max_schema_retries: default_max_schema_retries(),
            busy_timeout_ms: default_busy_timeout_ms(),
            max_connections: default_max_connections(),
        }
    }

    /// Load `<home>/config.toml`, falling back to defaults if it is absent.
    pub fn load(home: &Path) -> Result<Self> {
        let path = home.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(Self::with_home(home));
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| FormflowError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(home, &content)
            .map_err(|e| FormflowError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse TOML content, resolving relative paths against `home`.
    pub fn from_toml(home: &Path, content: &str) -> std::result::Result<Self, toml::de::Error> {
        let file: ConfigFile = toml::from_str(content)?;
        let defaults = Self::with_home(home);
        let resolve = |p: PathBuf| if p.is_relative() { home.join(p) } else { p };

        Ok(Self {
            database_path: file.database_path.map(resolve).unwrap_or(defaults.database_path),
            upload_dir: file.upload_dir.map(resolve).unwrap_or(defaults.upload_dir),
            storage_timeout_ms: file.storage_timeout_ms.unwrap_or(defaults.storage_timeout_ms),
            dispatch_queue_capacity: file
                .dispatch_queue_capacity
                .unwrap_or(defaults.dispatch_queue_capacity),
            max_schema_retries: file.max_schema_retries.unwrap_or(defaults.max_schema_retries),
            busy_timeout_ms: file.busy_timeout_ms.unwrap_or(defaults.busy_timeout_ms),
            max_connections: file.max_connections.unwrap_or(defaults.max_connections),
        })
    }

    /// Save configuration to `<home>/config.toml`
    pub fn save(&self, home: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(home)
            .map_err(|e| FormflowError::Config(format!("{}: {}", home.display(), e)))?;
        let content = toml::to_string_pretty(self).map_err(|e| FormflowError::Config(e.to_string()))?;
        let path = home.join(CONFIG_FILE_NAME);
        std::fs::write(&path, content)
            .map_err(|e| FormflowError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(path)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    pub fn db_options(&self) -> formflow_db::DbOptions {
        formflow_db::DbOptions {
            max_connections: self.max_connections.max(1),
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }
}
