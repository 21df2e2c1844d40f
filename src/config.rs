//! Configuration module for the filesystem index.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `FSINDEX_` and use double
//! underscores to separate nested levels:
//! - `FSINDEX_WATCH__DEBOUNCE_MS=500` sets `watch.debounce_ms`
//! - `FSINDEX_SEARCH__LIMIT=50` sets `search.limit`
//! - `FSINDEX_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::storage::DEFAULT_WRITER_HEAP_BYTES;

/// Name of the per-workspace configuration directory.
pub const CONFIG_DIR: &str = ".fsindex";
const CONFIG_FILE: &str = "settings.toml";
const ENV_PREFIX: &str = "FSINDEX_";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory holding the index files
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    /// Explicit roots to crawl and watch. Empty means "discover fixed volumes".
    #[serde(default)]
    pub roots: Vec<PathBuf>,

    /// Gitignore-style patterns for entries to leave out of the index
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Heap budget for the index writer, in bytes
    #[serde(default = "default_writer_heap_bytes")]
    pub writer_heap_bytes: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// Debounce window per (root, event class), in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Capacity of each bounded event channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    /// Maximum edit distance for fuzzy term matching (0..=2)
    #[serde(default = "default_fuzzy_distance")]
    pub fuzzy_distance: u8,

    /// Maximum number of results returned per query
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for all modules
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module level overrides, e.g. `fsindex::watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_version() -> u32 {
    1
}
fn default_index_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("fsindex").join("index"))
        .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("index"))
}
fn default_writer_heap_bytes() -> usize {
    DEFAULT_WRITER_HEAP_BYTES
}
fn default_debounce_ms() -> u64 {
    2000
}
fn default_channel_capacity() -> usize {
    1024
}
fn default_fuzzy_distance() -> u8 {
    2
}
fn default_search_limit() -> usize {
    1000
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            indexing: IndexingConfig::default(),
            watch: WatchConfig::default(),
            search: SearchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            ignore_patterns: Vec::new(),
            writer_heap_bytes: default_writer_heap_bytes(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            fuzzy_distance: default_fuzzy_distance(),
            limit: default_search_limit(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels, single underscores
            // stay inside field names
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find the settings file by looking for a `.fsindex` directory from
    /// the current directory up to the filesystem root
    pub fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join(CONFIG_FILE));
            }
        }

        None
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file in the current directory
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join(CONFIG_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }

    /// Fuzzy distance clamped to what the term automaton supports.
    pub fn fuzzy_distance(&self) -> u8 {
        self.search.fuzzy_distance.min(2)
    }
}
