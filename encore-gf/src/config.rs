//! Configuration resolution for encore-gf
//!
//! Provides multi-tier configuration resolution with Database → ENV → TOML
//! priority.

use encore_common::config::TomlConfig;
use encore_common::{Error, Result};
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};

/// Environment variable holding the Ticketmaster API key
pub const ENV_TICKETMASTER_API_KEY: &str = "ENCORE_TICKETMASTER_API_KEY";

/// Resolve the Ticketmaster API key from 3-tier configuration
///
/// **Priority:** Database → ENV → TOML
pub async fn resolve_ticketmaster_api_key(db: &Pool<Sqlite>, toml_config: &TomlConfig) -> Result<String> {
    let db_key = crate::db::settings::get_ticketmaster_api_key(db)
        .await?
        .filter(|key| is_valid_key(key));
    let env_key = std::env::var(ENV_TICKETMASTER_API_KEY)
        .ok()
        .filter(|key| is_valid_key(key));
    let toml_key = toml_config
        .ticketmaster
        .api_key
        .clone()
        .filter(|key| is_valid_key(key));

    let sources: Vec<&str> = [
        db_key.as_ref().map(|_| "database"),
        env_key.as_ref().map(|_| "environment"),
        toml_key.as_ref().map(|_| "TOML"),
    ]
    .into_iter()
    .flatten()
    .collect();

    // Warn if multiple sources (potential misconfiguration)
    if sources.len() > 1 {
        warn!(
            "Ticketmaster API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    if let Some(key) = db_key {
        info!("Ticketmaster API key loaded from database");
        return Ok(key);
    }

    if let Some(key) = env_key {
        info!("Ticketmaster API key loaded from environment variable");
        return Ok(key);
    }

    if let Some(key) = toml_key {
        info!("Ticketmaster API key loaded from TOML config");
        return Ok(key);
    }

    Err(Error::Config(format!(
        "Ticketmaster API key not configured. Please configure using one of:\n\
         1. Database: settings key '{}'\n\
         2. Environment: {}=your-key-here\n\
         3. TOML config: [ticketmaster] api_key = \"your-key\"\n\
         \n\
         Obtain a key at: https://developer.ticketmaster.com/",
        crate::db::settings::TICKETMASTER_API_KEY,
        ENV_TICKETMASTER_API_KEY
    )))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
