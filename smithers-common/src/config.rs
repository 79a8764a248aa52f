//! Bootstrap configuration loading and database path resolution
//!
//! The TOML file is read once at startup. Every key has a built-in default,
//! so a missing default config file is not an error.

use crate::float::DEFAULT_CHAPTER_PRECISION;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "SMITHERS_CONFIG";

/// Environment variable naming the SQLite database file
pub const DATABASE_ENV_VAR: &str = "SMITHERS_DATABASE";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub crawl: CrawlConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Crawl behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// Ask adapters for the most recent chapter only
    #[serde(default = "default_only_latest")]
    pub only_latest: bool,

    /// Decimal places used when matching chapter numbers
    #[serde(default = "default_chapter_precision")]
    pub chapter_precision: u32,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            only_latest: default_only_latest(),
            chapter_precision: default_chapter_precision(),
        }
    }
}

/// Execution queue caps
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Concurrent storage writes across all sources
    #[serde(default = "default_write_concurrency")]
    pub write_concurrency: usize,

    /// Concurrent fetches per adapter kind
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            write_concurrency: default_write_concurrency(),
            fetch_concurrency: default_fetch_concurrency(),
        }
    }
}

impl TomlConfig {
    /// Reject values the scheduler or comparator cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.write_concurrency == 0 {
            return Err(Error::Config(
                "scheduler.write_concurrency must be at least 1".to_string(),
            ));
        }
        if self.scheduler.fetch_concurrency == 0 {
            return Err(Error::Config(
                "scheduler.fetch_concurrency must be at least 1".to_string(),
            ));
        }
        if self.crawl.chapter_precision > 6 {
            return Err(Error::Config(format!(
                "crawl.chapter_precision {} is out of range (0-6)",
                self.crawl.chapter_precision
            )));
        }
        Ok(())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_only_latest() -> bool {
    true
}

fn default_chapter_precision() -> u32 {
    DEFAULT_CHAPTER_PRECISION
}

fn default_write_concurrency() -> usize {
    50
}

fn default_fetch_concurrency() -> usize {
    1
}

/// Config file resolution:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. Platform config directory, if the file exists
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    dirs::config_dir()
        .map(|d| d.join("smithers").join("crawl.toml"))
        .filter(|p| p.exists())
}

/// Load bootstrap configuration
///
/// `None` yields built-in defaults. An explicitly named file that cannot be
/// read or parsed is a configuration error.
pub fn load_toml_config(path: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = path else {
        info!("No config file found, using built-in defaults");
        return Ok(TomlConfig::default());
    };

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    let config: TomlConfig = toml::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })?;

    config.validate()?;
    info!("Loaded config from {}", path.display());

    Ok(config)
}

/// Database path resolution:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent default (fallback)
pub fn resolve_database_path(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
        return PathBuf::from(path);
    }

    if let Some(path) = &config.database_path {
        return path.clone();
    }

    default_database_path()
}

/// Get OS-dependent default database path
fn default_database_path() -> PathBuf {
    match dirs::data_local_dir() {
        Some(dir) => dir.join("smithers").join("smithers.db"),
        None => {
            warn!("Could not determine local data directory, using working directory");
            PathBuf::from("./smithers_data/smithers.db")
        }
    }
}
