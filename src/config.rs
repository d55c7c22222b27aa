//! Configuration types for the orchestration core.
//!
//! The daemon reads one TOML file. Every section and key is optional; missing
//! values take the defaults below. [`DaemonConfig::load_lenient`] additionally
//! survives malformed values by falling back to the default for that one key.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DaemonError, Result};
use seekd_query::StopWords;

/// Environment variable that forces backends to start without the indexing delay.
pub const START_IMMEDIATELY_ENV: &str = "SEEKD_START_IMMEDIATELY";

/// Default delay before backends start indexing.
pub const DEFAULT_START_DELAY_SECS: u64 = 60;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Which backends run and where static indexes live.
    pub backends: BackendConfig,
    /// When backends begin indexing.
    pub indexing: IndexingConfig,
    /// Query preparation settings.
    pub query: QueryConfig,
}

/// Backend selection and static index locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Load the user-configured static indexes in `static_index_paths`.
    ///
    /// When false the pseudo backend name `static` is denied.
    pub allow_static_backend: bool,
    /// Backend names that never run (case-insensitive).
    pub denied_backends: Vec<String>,
    /// Directories holding pre-built user indexes. `~` is expanded.
    pub static_index_paths: Vec<PathBuf>,
    /// Directory whose subdirectories are system-wide pre-built indexes.
    pub system_indexes_dir: PathBuf,
    /// Extra directory scanned for backend plugins.
    pub backend_dir: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            allow_static_backend: false,
            denied_backends: Vec::new(),
            static_index_paths: Vec::new(),
            system_indexes_dir: default_system_indexes_dir(),
            backend_dir: None,
        }
    }
}

/// Indexing start-up behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Seconds to wait after discovery before starting backends.
    ///
    /// Staggering start-up keeps a freshly booted desktop responsive. Zero
    /// starts backends immediately.
    pub start_delay_secs: u64,
    /// Ignore `start_delay_secs` and start backends as soon as they load.
    pub start_immediately: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            start_delay_secs: DEFAULT_START_DELAY_SECS,
            start_immediately: false,
        }
    }
}

impl IndexingConfig {
    /// The delay to apply before starting backends, or `None` to start now.
    ///
    /// Setting [`START_IMMEDIATELY_ENV`] in the environment also starts now.
    pub fn start_delay(&self) -> Option<Duration> {
        if self.start_immediately
            || self.start_delay_secs == 0
            || std::env::var_os(START_IMMEDIATELY_ENV).is_some()
        {
            return None;
        }
        Some(Duration::from_secs(self.start_delay_secs))
    }
}

/// Query preparation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Stop words removed from search-term summaries. `None` uses the
    /// built-in English list.
    pub stop_words: Option<Vec<String>>,
    /// Hits each backend is asked to return per query.
    pub max_hits: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stop_words: None,
            max_hits: seekd_query::DEFAULT_MAX_HITS,
        }
    }
}

impl QueryConfig {
    /// The configured stop-word list.
    pub fn stop_words(&self) -> StopWords {
        match &self.stop_words {
            Some(words) => StopWords::new(words),
            None => StopWords::default(),
        }
    }
}

#[cfg(unix)]
fn default_system_indexes_dir() -> PathBuf {
    PathBuf::from("/usr/share/seekd/indexes")
}

#[cfg(not(unix))]
fn default_system_indexes_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("seekd")
        .join("indexes")
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

impl DaemonConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| DaemonError::Config(e.to_string()))
    }

    /// Load configuration, never failing.
    ///
    /// A missing file yields the defaults. A malformed value is logged and
    /// replaced by its default without discarding the rest of the file.
    pub fn load_lenient(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_lenient(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable config file, using defaults");
                Self::default()
            }
        }
    }

    /// Parse TOML text key by key, keeping defaults for malformed values.
    pub fn from_toml_lenient(content: &str) -> Self {
        let mut config = Self::default();
        let table: toml::Table = match content.parse() {
            Ok(table) => table,
            Err(e) => {
                let err = DaemonError::Config(e.to_string());
                tracing::warn!(error = %err, "config is not valid TOML, using defaults");
                return config;
            }
        };

        if let Some(section) = section(&table, "backends") {
            let b = &mut config.backends;
            apply(section, "backends", "allow_static_backend", &mut b.allow_static_backend);
            apply(section, "backends", "denied_backends", &mut b.denied_backends);
            apply(section, "backends", "static_index_paths", &mut b.static_index_paths);
            apply(section, "backends", "system_indexes_dir", &mut b.system_indexes_dir);
            apply(section, "backends", "backend_dir", &mut b.backend_dir);
        }
        if let Some(section) = section(&table, "indexing") {
            let i = &mut config.indexing;
            apply(section, "indexing", "start_delay_secs", &mut i.start_delay_secs);
            apply(section, "indexing", "start_immediately", &mut i.start_immediately);
        }
        if let Some(section) = section(&table, "query") {
            let q = &mut config.query;
            apply(section, "query", "stop_words", &mut q.stop_words);
            apply(section, "query", "max_hits", &mut q.max_hits);
        }

        config
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| DaemonError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/seekd/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| std::env::temp_dir().join("seekd-config"))
            .join("seekd")
            .join("config.toml")
    }
}

fn section<'a>(table: &'a toml::Table, name: &str) -> Option<&'a toml::Table> {
    match table.get(name) {
        Some(toml::Value::Table(section)) => Some(section),
        Some(_) => {
            let err = DaemonError::Config(format!("[{name}] must be a table"));
            tracing::warn!(error = %err, "ignoring config section");
            None
        }
        None => None,
    }
}

fn apply<T: DeserializeOwned>(section: &toml::Table, name: &str, key: &str, slot: &mut T) {
    let Some(value) = section.get(key) else {
        return;
    };
    match value.clone().try_into::<T>() {
        Ok(parsed) => *slot = parsed,
        Err(e) => {
            let err = DaemonError::Config(format!("{name}.{key}: {e}"));
            tracing::warn!(error = %err, "malformed config value, keeping default");
        }
    }
}
