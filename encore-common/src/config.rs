//! Configuration loading
//!
//! Bootstrap configuration comes from a TOML file, then environment variables
//! override individual keys. Command-line flags (handled by each binary) sit
//! on top of both. Priority order:
//! 1. Command-line arguments (highest priority)
//! 2. Environment variables (`ENCORE_*`)
//! 3. TOML config file
//! 4. Compiled defaults (fallback)
//!
//! A missing TOML file is not an error: the binary logs a warning and starts
//! with defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const ENV_CONFIG: &str = "ENCORE_CONFIG";
pub const ENV_DATABASE_PATH: &str = "ENCORE_DATABASE_PATH";
pub const ENV_RADIUS_MILES: &str = "ENCORE_RADIUS_MILES";
pub const ENV_ARTIST_DELAY_MS: &str = "ENCORE_ARTIST_DELAY_MS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "ENCORE_REQUEST_TIMEOUT_SECS";

const CONFIG_FILE_NAME: &str = "encore-gf.toml";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Path to the SQLite database file
    ///
    /// If not specified, falls back to the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Group formation tuning
    #[serde(default)]
    pub formation: FormationConfig,

    /// Ticketmaster Discovery API access
    #[serde(default)]
    pub ticketmaster: TicketmasterConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins if set
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

/// Group formation parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormationConfig {
    /// Maximum user-to-venue distance (great-circle miles)
    #[serde(default = "default_radius_miles")]
    pub radius_miles: f64,

    /// Pause between artists to respect upstream rate limits
    #[serde(default = "default_artist_delay_ms")]
    pub artist_delay_ms: u64,

    /// Upper bound for any single external call
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for FormationConfig {
    fn default() -> Self {
        Self {
            radius_miles: default_radius_miles(),
            artist_delay_ms: default_artist_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl FormationConfig {
    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.radius_miles.is_finite() || self.radius_miles <= 0.0 {
            return Err(Error::Config(format!(
                "formation.radius_miles must be a positive number, got {}",
                self.radius_miles
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "formation.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Ticketmaster Discovery API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketmasterConfig {
    /// Consumer key; the settings table and environment take precedence
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_ticketmaster_base_url")]
    pub base_url: String,

    /// Client-side request budget (Ticketmaster caps keys at 5/s)
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Events requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for TicketmasterConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_ticketmaster_base_url(),
            requests_per_second: default_requests_per_second(),
            page_size: default_page_size(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_radius_miles() -> f64 {
    50.0
}

fn default_artist_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_ticketmaster_base_url() -> String {
    "https://app.ticketmaster.com/discovery/v2".to_string()
}

fn default_requests_per_second() -> u32 {
    4
}

fn default_page_size() -> u32 {
    200
}

impl TomlConfig {
    /// Load configuration from the resolved TOML file, then apply environment
    /// overrides and validate.
    ///
    /// `explicit` is the `--config` flag value, if any.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(explicit)? {
            Some(path) => {
                let config = load_toml_config(&path)?;
                info!("Loaded configuration from {}", path.display());
                config
            }
            None => {
                warn!("No configuration file found, using compiled defaults");
                TomlConfig::default()
            }
        };

        config.apply_env_overrides()?;
        config.formation.validate()?;
        Ok(config)
    }

    /// Override individual keys from `ENCORE_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var(ENV_DATABASE_PATH) {
            if !path.trim().is_empty() {
                self.database_path = Some(PathBuf::from(path));
            }
        }
        if let Some(radius) = parse_env::<f64>(ENV_RADIUS_MILES)? {
            self.formation.radius_miles = radius;
        }
        if let Some(delay) = parse_env::<u64>(ENV_ARTIST_DELAY_MS)? {
            self.formation.artist_delay_ms = delay;
        }
        if let Some(timeout) = parse_env::<u64>(ENV_REQUEST_TIMEOUT_SECS)? {
            self.formation.request_timeout_secs = timeout;
        }
        Ok(())
    }

    /// Database file location (configured, or the platform default)
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(default_database_path)
    }
}

fn parse_env<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{} has invalid value '{}': {}", name, raw, e))),
        Err(_) => Ok(None),
    }
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Locate the config file
///
/// An explicitly requested file (flag or `ENCORE_CONFIG`) must exist. The
/// per-user and system-wide locations are only used when present.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        return require_existing(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(ENV_CONFIG) {
        if !path.trim().is_empty() {
            return require_existing(PathBuf::from(path));
        }
    }

    let candidates = [
        dirs::config_dir().map(|d| d.join("encore").join(CONFIG_FILE_NAME)),
        Some(PathBuf::from("/etc/encore").join(CONFIG_FILE_NAME)),
    ];

    Ok(candidates.into_iter().flatten().find(|p| p.exists()))
}

fn require_existing(path: PathBuf) -> Result<Option<PathBuf>> {
    if path.exists() {
        Ok(Some(path))
    } else {
        Err(Error::Config(format!("Config file not found: {}", path.display())))
    }
}

/// Get OS-dependent default database path
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("encore"))
        .unwrap_or_else(|| PathBuf::from("./encore_data"))
        .join("encore.db")
}
