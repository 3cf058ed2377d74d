//! Configuration loading and file resolution
//!
//! Config file resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config locations (`~/.config/pawmap/config.toml`, `/etc/pawmap/config.toml`)
//! 4. Compiled defaults (no file)
//!
//! A missing config file is not fatal: a warning is logged and defaults are used.
//! A config file that exists but cannot be parsed is a setup error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PAWMAP_CONFIG";

/// Environment variable carrying the research provider API key
pub const PROVIDER_API_KEY_ENV_VAR: &str = "PAWMAP_PROVIDER_API_KEY";

/// Bootstrap configuration read from TOML
///
/// Every section is optional; omitted sections take compiled defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Path to the SQLite database file (defaults to the platform data dir)
    pub database_path: Option<PathBuf>,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// HTTP server for the validation queue boundary
    pub server: ServerConfig,

    /// External research provider
    pub provider: ProviderConfig,

    /// Discovery scan tuning
    pub discovery: DiscoveryConfig,

    /// Import pipeline tuning
    pub import: ImportConfig,

    /// Extra category aliases merged into the built-in table
    pub categories: CategoriesConfig,

    /// Reference cities seeded into the store at startup
    pub cities: Vec<CityConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5780,
        }
    }
}

/// Research provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key (lowest priority source, see `resolve_provider_api_key`)
    pub api_key: Option<String>,
    /// Messages endpoint URL
    pub base_url: String,
    /// API version header value
    pub api_version: String,
    /// Model identifier sent with each request
    pub model: String,
    /// Maximum tokens requested per completion
    pub max_tokens: u32,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Client-side request rate cap
    pub requests_per_minute: u32,
    /// Retries after the first attempt for transient failures
    pub max_retries: u32,
    /// First retry delay; doubles per attempt
    pub initial_backoff_ms: u64,
    /// Upper bound for a single retry delay
    pub max_backoff_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.anthropic.com/v1/messages".to_string(),
            api_version: "2023-06-01".to_string(),
            model: "claude-3-5-sonnet-latest".to_string(),
            max_tokens: 4096,
            timeout_secs: 120,
            requests_per_minute: 20,
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
        }
    }
}

/// Discovery scan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Fixed delay between sequential category requests
    pub inter_request_delay_ms: u64,
    /// Candidates requested per category
    pub max_results: u32,
    /// Categories scanned when none are given on the command line
    pub default_categories: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            inter_request_delay_ms: 2000,
            max_results: 10,
            default_categories: ["restaurants", "cafes", "hotels", "parks", "beaches", "shops"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Import pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Rows per upsert batch (clamped by the pipeline)
    pub batch_size: usize,
    /// Timeout for a single batch write
    pub write_timeout_secs: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            write_timeout_secs: 30,
        }
    }
}

/// Category alias extensions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoriesConfig {
    /// Raw label → canonical category slug
    pub aliases: BTreeMap<String, String>,
}

/// Reference city entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityConfig {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub dog_regulations: String,
}

fn default_language() -> String {
    "en".to_string()
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load configuration from a file that must exist
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Load configuration, falling back to defaults when no file is available
    ///
    /// Runs before logging is set up (the log level comes from this file), so
    /// callers report which source was used once tracing is initialized.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Effective database path (configured or platform default)
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(default_database_path)
    }
}

/// Resolve which config file to read
///
/// Returns `None` when no candidate exists and compiled defaults apply.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config locations
    let user_config = dirs::config_dir().map(|d| d.join("pawmap").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/pawmap/config.toml");
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }

    None
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("pawmap"))
        .unwrap_or_else(|| PathBuf::from("./pawmap_data"))
        .join("pawmap.db")
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
