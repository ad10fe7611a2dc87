//! Configuration tests
//!
//! The template written by `to_toml()` must parse back into the same config,
//! so a new field that is missing from the template fails here.

use super::*;
use std::collections::HashMap;

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

fn no_env(_: &str) -> Option<String> {
    None
}

fn parse(toml_str: &str) -> FileConfig {
    toml::from_str(toml_str).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Round-trip tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_roundtrip_default() {
    let config = Config::default();
    let toml_str = config.to_toml();

    let parsed: Result<FileConfig, _> = toml::from_str(&toml_str);
    assert!(
        parsed.is_ok(),
        "Default config should round-trip.\nTOML:\n{}\nError: {:?}",
        toml_str,
        parsed.err()
    );

    let reloaded = Config::from_sources(parsed.unwrap(), no_env);
    assert_eq!(reloaded.log_file, None);
    assert_eq!(reloaded.project_file, None);
    assert_eq!(reloaded.max_cache_size, DEFAULT_MAX_CACHE_SIZE);
    assert_eq!(reloaded.max_log_lines, DEFAULT_MAX_LOG_LINES);
    assert_eq!(reloaded.reload_interval, DEFAULT_RELOAD_INTERVAL);
    assert_eq!(reloaded.idle_timeout, DEFAULT_IDLE_TIMEOUT);
    assert_eq!(reloaded.logging, LoggingConfig::default());
}

#[test]
fn test_config_roundtrip_custom_values() {
    let mut config = Config::default();
    config.log_file = Some(PathBuf::from("/var/log/knx/bus.log"));
    config.project_file = Some(PathBuf::from("house \"main\".json"));
    config.max_cache_size = 1234;
    config.reload_interval = 0.5;
    config.idle_timeout = 0;
    config.time_start = Some("22:00".to_string());
    config.time_end = Some("02:00".to_string());
    config.logging.file_enabled = true;
    config.logging.file_rotation = LogRotation::Hourly;

    let reloaded = Config::from_sources(parse(&config.to_toml()), no_env);
    assert_eq!(reloaded.log_file, config.log_file);
    assert_eq!(reloaded.project_file, config.project_file);
    assert_eq!(reloaded.max_cache_size, 1234);
    assert_eq!(reloaded.reload_interval, 0.5);
    assert_eq!(reloaded.idle_timeout(), None);
    assert_eq!(reloaded.time_start.as_deref(), Some("22:00"));
    assert_eq!(reloaded.time_end.as_deref(), Some("02:00"));
    assert!(reloaded.logging.file_enabled);
    assert_eq!(reloaded.logging.file_rotation, LogRotation::Hourly);
}

// ─────────────────────────────────────────────────────────────────────────────
// Layering
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_empty_file_uses_defaults() {
    let config = Config::from_sources(parse(""), no_env);
    assert_eq!(config.resolved_log_file(), PathBuf::from("./knx_bus.log"));
    assert_eq!(config.named_filters, PathBuf::from(DEFAULT_NAMED_FILTERS));
    assert_eq!(config.idle_timeout(), Some(Duration::from_secs(3600)));
    assert_eq!(config.reload_interval(), Duration::from_secs(5));
    assert!(!config.time_range().is_active());
}

#[test]
fn test_env_overrides_file() {
    let file = parse(
        r#"
log_path = "/srv/knx"
max_cache_size = 100
max_log_lines = 50
"#,
    );
    let env = env_of(&[("KNX_LENS_MAX_CACHE", "200"), ("LOG_FILE", "/tmp/other.log")]);
    let config = Config::from_sources(file, env);

    assert_eq!(config.max_cache_size, 200);
    assert_eq!(config.max_log_lines, 50);
    assert_eq!(config.resolved_log_file(), PathBuf::from("/tmp/other.log"));
}

#[test]
fn test_log_path_derives_log_file() {
    let env = env_of(&[("LOG_PATH", "/srv/knx")]);
    let config = Config::from_sources(FileConfig::default(), env);
    assert_eq!(
        config.resolved_log_file(),
        PathBuf::from("/srv/knx").join(DEFAULT_LOG_FILE_NAME)
    );
}

#[test]
fn test_bad_env_values_fall_through() {
    let file = parse("max_log_lines = 77\nreload_interval = 2.5\n");
    let env = env_of(&[
        ("MAX_LOG_LINES", "lots"),
        ("RELOAD_INTERVAL", "soon"),
        ("KNX_LENS_IDLE_TIMEOUT", ""),
    ]);
    let config = Config::from_sources(file, env);
    assert_eq!(config.max_log_lines, 77);
    assert_eq!(config.reload_interval, 2.5);
    assert_eq!(config.idle_timeout, DEFAULT_IDLE_TIMEOUT);
}

#[test]
fn test_zero_sizes_rejected() {
    let env = env_of(&[("KNX_LENS_MAX_CACHE", "0")]);
    let config = Config::from_sources(parse("max_log_lines = 0"), env);
    assert_eq!(config.max_cache_size, DEFAULT_MAX_CACHE_SIZE);
    assert_eq!(config.max_log_lines, DEFAULT_MAX_LOG_LINES);
}

#[test]
fn test_reload_interval_has_floor() {
    let env = env_of(&[("RELOAD_INTERVAL", "0")]);
    let config = Config::from_sources(FileConfig::default(), env);
    assert!(config.reload_interval() >= Duration::from_millis(100));
}

#[test]
fn test_engine_settings() {
    let file = parse(
        r#"
log_file = "bus.log"
idle_timeout = 0
time_start = "08:00"
"#,
    );
    let settings = Config::from_sources(file, no_env).engine_settings();
    assert_eq!(settings.log_file, PathBuf::from("bus.log"));
    assert_eq!(settings.idle_timeout, None);
    assert!(settings.time_range.is_active());
    assert!(settings.auto_reload);
}

#[test]
fn test_partial_logging_section_keeps_defaults() {
    let file = parse("[logging]\nfile_rotation = \"never\"\nlevel = \"debug\"\n");
    let logging = Config::from_sources(file, no_env).logging;
    assert_eq!(logging.file_rotation, LogRotation::Never);
    assert_eq!(logging.level, "debug");
    assert!(!logging.file_enabled);
    assert_eq!(logging.file_prefix, LoggingConfig::default().file_prefix);
}

#[test]
fn test_unknown_rotation_is_rejected() {
    let parsed = toml::from_str::<FileConfig>("[logging]\nfile_rotation = \"weekly\"\n");
    assert!(parsed.is_err());
    let parsed = toml::from_str::<FileConfig>("[logging]\nfile_rotation = \"Hourly\"\n");
    assert!(parsed.is_err(), "rotation names are lowercase");
}

#[test]
fn test_write_template() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    Config::write_template(&path).unwrap();
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.starts_with("# knx-lens configuration"));
    assert!(toml::from_str::<FileConfig>(&contents).is_ok());
}
