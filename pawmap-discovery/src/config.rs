//! Provider API key resolution
//!
//! Priority: database `settings` table → `PAWMAP_PROVIDER_API_KEY` → TOML
//! `[provider] api_key`. Blank values count as absent.

use pawmap_common::config::{is_valid_key, TomlConfig, PROVIDER_API_KEY_ENV_VAR};
use pawmap_common::db::{get_setting, PROVIDER_API_KEY_SETTING};
use pawmap_common::{Error, Result};
use sqlx::SqlitePool;
use std::fmt;
use tracing::{info, warn};

/// Where the provider key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Database,
    Environment,
    Toml,
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database => f.write_str("database"),
            Self::Environment => f.write_str("environment"),
            Self::Toml => f.write_str("TOML"),
        }
    }
}

/// Resolve the provider API key from all three tiers
pub async fn resolve_provider_api_key(db: &SqlitePool, toml_config: &TomlConfig) -> Result<String> {
    let db_key = get_setting(db, PROVIDER_API_KEY_SETTING).await?;
    let env_key = std::env::var(PROVIDER_API_KEY_ENV_VAR).ok();
    let toml_key = toml_config.provider.api_key.clone();

    match select_key(db_key, env_key, toml_key) {
        Some((key, source)) => {
            info!(source = %source, "Provider API key loaded");
            Ok(key)
        }
        None => Err(Error::Config(format!(
            "Provider API key not configured. Set one of:\n\
             1. Database setting '{}'\n\
             2. Environment: {}=your-key\n\
             3. TOML config: [provider] api_key = \"your-key\"",
            PROVIDER_API_KEY_SETTING, PROVIDER_API_KEY_ENV_VAR
        ))),
    }
}

/// Highest-priority valid key; warns when several tiers are set
pub fn select_key(
    db_key: Option<String>,
    env_key: Option<String>,
    toml_key: Option<String>,
) -> Option<(String, KeySource)> {
    let candidates: Vec<(String, KeySource)> = [
        (db_key, KeySource::Database),
        (env_key, KeySource::Environment),
        (toml_key, KeySource::Toml),
    ]
    .into_iter()
    .filter_map(|(key, source)| key.filter(|k| is_valid_key(k)).map(|k| (k, source)))
    .collect();

    if candidates.len() > 1 {
        let sources: Vec<String> = candidates.iter().map(|(_, s)| s.to_string()).collect();
        warn!(
            "Provider API key found in multiple sources: {}. Using {}.",
            sources.join(", "),
            candidates[0].1
        );
    }

    candidates.into_iter().next()
}
