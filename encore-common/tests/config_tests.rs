//! Tests for configuration loading and precedence
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate ENCORE_* variables are marked with #[serial]
//! to ensure they run sequentially, not in parallel.

use encore_common::config::{
    load_toml_config, resolve_config_path, TomlConfig, ENV_ARTIST_DELAY_MS, ENV_CONFIG,
    ENV_DATABASE_PATH, ENV_RADIUS_MILES, ENV_REQUEST_TIMEOUT_SECS,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

fn clear_env() {
    for name in [
        ENV_CONFIG,
        ENV_DATABASE_PATH,
        ENV_RADIUS_MILES,
        ENV_ARTIST_DELAY_MS,
        ENV_REQUEST_TIMEOUT_SECS,
    ] {
        env::remove_var(name);
    }
}

fn write_config(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("encore-gf.toml");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_load_full_toml() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(
        &temp_dir,
        r#"
        database_path = "/data/encore.db"

        [logging]
        level = "debug"

        [formation]
        radius_miles = 30.5
        artist_delay_ms = 250
        request_timeout_secs = 5

        [ticketmaster]
        api_key = "tm-key"
        requests_per_second = 2
        "#,
    );

    let config = load_toml_config(&path).unwrap();

    assert_eq!(config.database_path, Some(PathBuf::from("/data/encore.db")));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.formation.radius_miles, 30.5);
    assert_eq!(config.formation.artist_delay_ms, 250);
    assert_eq!(config.formation.request_timeout_secs, 5);
    assert_eq!(config.ticketmaster.api_key.as_deref(), Some("tm-key"));
    assert_eq!(config.ticketmaster.requests_per_second, 2);
    assert_eq!(config.ticketmaster.page_size, 200);
}

#[test]
fn test_malformed_toml_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(&temp_dir, "[formation\nradius_miles = ");

    let result = load_toml_config(&path);
    assert!(matches!(result, Err(encore_common::Error::Config(_))));
}

#[test]
#[serial]
fn test_explicit_missing_file_is_error() {
    clear_env();
    let result = resolve_config_path(Some(PathBuf::from("/nonexistent/encore.toml").as_path()));
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_env_config_path_used() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(&temp_dir, "[formation]\nartist_delay_ms = 42\n");
    env::set_var(ENV_CONFIG, &path);

    let config = TomlConfig::load(None).unwrap();
    assert_eq!(config.formation.artist_delay_ms, 42);

    clear_env();
}

#[test]
#[serial]
fn test_env_overrides_toml() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(
        &temp_dir,
        r#"
        database_path = "/from/toml.db"
        [formation]
        radius_miles = 10.0
        artist_delay_ms = 100
        "#,
    );

    env::set_var(ENV_DATABASE_PATH, "/from/env.db");
    env::set_var(ENV_RADIUS_MILES, "75");

    let config = TomlConfig::load(Some(&path)).unwrap();

    assert_eq!(config.database_path(), PathBuf::from("/from/env.db"));
    assert_eq!(config.formation.radius_miles, 75.0);
    // Not overridden: TOML value survives
    assert_eq!(config.formation.artist_delay_ms, 100);

    clear_env();
}

#[test]
#[serial]
fn test_invalid_env_value_rejected() {
    clear_env();
    env::set_var(ENV_ARTIST_DELAY_MS, "soon");

    let mut config = TomlConfig::default();
    let result = config.apply_env_overrides();
    assert!(matches!(result, Err(encore_common::Error::Config(_))));

    clear_env();
}

#[test]
#[serial]
fn test_env_radius_validated_on_load() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(&temp_dir, "");
    env::set_var(ENV_RADIUS_MILES, "0");

    let result = TomlConfig::load(Some(&path));
    assert!(result.is_err(), "zero radius must be rejected");

    clear_env();
}
