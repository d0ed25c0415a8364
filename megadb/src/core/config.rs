use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::utils::file::expand_path;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_BUSY_TIMEOUT_SECS, DEFAULT_DATABASE_URL,
    DEFAULT_SCHEMA_CACHE_MAX_ENTRIES, DEFAULT_SCHEMA_CACHE_TTL_SECS,
    DEFAULT_STATEMENT_TIMEOUT_SECS,
};

// =============================================================================
// File Config Sections
// =============================================================================

/// Column type cache section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SchemaCacheFileConfig {
    pub enabled: Option<bool>,
    pub max_entries: Option<u64>,
    pub ttl_secs: Option<u64>,
}

/// Database section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DatabaseFileConfig {
    pub url: Option<String>,
    pub statement_timeout_secs: Option<u64>,
    pub busy_timeout_secs: Option<u64>,
    pub schema_cache: Option<SchemaCacheFileConfig>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub database: Option<DatabaseFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        let Some(database) = other.database else {
            return;
        };
        let current = self.database.get_or_insert_with(DatabaseFileConfig::default);
        if database.url.is_some() {
            tracing::trace!(url = ?database.url, "Merging database.url");
            current.url = database.url;
        }
        if database.statement_timeout_secs.is_some() {
            current.statement_timeout_secs = database.statement_timeout_secs;
        }
        if database.busy_timeout_secs.is_some() {
            current.busy_timeout_secs = database.busy_timeout_secs;
        }
        if let Some(cache) = database.schema_cache {
            let current_cache = current
                .schema_cache
                .get_or_insert_with(SchemaCacheFileConfig::default);
            if cache.enabled.is_some() {
                tracing::trace!(enabled = ?cache.enabled, "Merging database.schema_cache.enabled");
                current_cache.enabled = cache.enabled;
            }
            if cache.max_entries.is_some() {
                current_cache.max_entries = cache.max_entries;
            }
            if cache.ttl_secs.is_some() {
                current_cache.ttl_secs = cache.ttl_secs;
            }
        }
    }
}

// =============================================================================
// Runtime Config
// =============================================================================

/// Column type cache configuration (final/runtime)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaCacheConfig {
    /// Cache resolved column types per table
    pub enabled: bool,
    /// Maximum number of cached tables
    pub max_entries: u64,
    /// Entry time-to-live in seconds (0 = until invalidated)
    pub ttl_secs: u64,
}

impl Default for SchemaCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries: DEFAULT_SCHEMA_CACHE_MAX_ENTRIES,
            ttl_secs: DEFAULT_SCHEMA_CACHE_TTL_SECS,
        }
    }
}

/// Database configuration (final/runtime)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// `sqlite:` URL, plain file path, or `:memory:`
    pub url: String,
    /// Upper bound for one prepare + execute sequence
    pub statement_timeout_secs: u64,
    /// SQLite busy timeout
    pub busy_timeout_secs: u64,
    pub schema_cache: SchemaCacheConfig,
}

impl DatabaseConfig {
    /// Configuration for the given URL with default timeouts and no type cache
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            statement_timeout_secs: DEFAULT_STATEMENT_TIMEOUT_SECS,
            busy_timeout_secs: DEFAULT_BUSY_TIMEOUT_SECS,
            schema_cache: SchemaCacheConfig::default(),
        }
    }

    /// In-memory database (mostly for tests)
    pub fn in_memory() -> Self {
        Self::new(":memory:")
    }

    pub fn with_schema_cache(mut self, enabled: bool) -> Self {
        self.schema_cache.enabled = enabled;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DATABASE_URL)
    }
}

/// Final merged application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.megadb/megadb.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        Self::from_sources(cli, file_config)
    }

    /// Layer defaults, file config and CLI/env overrides
    fn from_sources(cli: &CliConfig, file_config: FileConfig) -> Result<Self> {
        let file_database = file_config.database.unwrap_or_default();
        let file_cache = file_database.schema_cache.unwrap_or_default();
        let defaults = SchemaCacheConfig::default();

        let url = cli
            .database_url
            .clone()
            .or(file_database.url)
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let statement_timeout_secs = cli
            .statement_timeout_secs
            .or(file_database.statement_timeout_secs)
            .unwrap_or(DEFAULT_STATEMENT_TIMEOUT_SECS);
        if statement_timeout_secs == 0 {
            anyhow::bail!("statement_timeout_secs must be at least 1");
        }

        let schema_cache = SchemaCacheConfig {
            enabled: cli
                .schema_cache
                .or(file_cache.enabled)
                .unwrap_or(defaults.enabled),
            max_entries: file_cache.max_entries.unwrap_or(defaults.max_entries),
            ttl_secs: file_cache.ttl_secs.unwrap_or(defaults.ttl_secs),
        };

        Ok(Self {
            database: DatabaseConfig {
                url,
                statement_timeout_secs,
                busy_timeout_secs: file_database
                    .busy_timeout_secs
                    .unwrap_or(DEFAULT_BUSY_TIMEOUT_SECS),
                schema_cache,
            },
        })
    }
}

/// Get profile config path (~/.megadb/megadb.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}
