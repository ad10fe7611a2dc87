//! Config serialization to TOML
//!
//! Single source of truth for config file format.

use super::Config;
use std::path::Path;

/// Quote a path as a TOML basic string
fn toml_path(path: &Path) -> String {
    toml_string(&path.display().to_string())
}

fn toml_string(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

/// An optional key, commented out with an example when unset
fn optional_line(key: &str, value: Option<String>, example: &str) -> String {
    match value {
        Some(value) => format!("{key} = {value}\n"),
        None => format!("# {key} = {example}\n"),
    }
}

impl Config {
    pub fn to_toml(&self) -> String {
        let log_file = optional_line(
            "log_file",
            self.log_file.as_deref().map(toml_path),
            "\"/var/log/knx/knx_bus.log\"",
        );
        let project_file = optional_line(
            "project_file",
            self.project_file.as_deref().map(toml_path),
            "\"project.json\"",
        );
        let time_start = optional_line(
            "time_start",
            self.time_start.as_deref().map(toml_string),
            "\"06:00\"",
        );
        let time_end = optional_line(
            "time_end",
            self.time_end.as_deref().map(toml_string),
            "\"22:30:00\"",
        );

        format!(
            r#"# knx-lens configuration
#
# Environment variables override these values:
#   LOG_FILE, LOG_PATH, KNX_PROJECT_PATH, KNX_LENS_FILTERS,
#   KNX_LENS_MAX_CACHE, MAX_LOG_LINES, RELOAD_INTERVAL, KNX_LENS_IDLE_TIMEOUT

# Bus log to follow. When unset, knx_bus.log inside log_path is used.
{log_file}log_path = {log_path}

# JSON project export with device and group address names
{project_file}
# Named filter document (YAML)
named_filters = {named_filters}

# Records kept in memory, and records shown after filtering
max_cache_size = {max_cache_size}
max_log_lines = {max_log_lines}

# Seconds between checks for new log lines
reload_interval = {reload_interval:?}

# Stop following the log after this many idle seconds (0 = never)
idle_timeout = {idle_timeout}

# Only show telegrams inside this time-of-day window (HH:MM or HH:MM:SS)
{time_start}{time_end}
# Logging configuration (RUST_LOG env var overrides)
[logging]
level = {log_level}
# JSON file logging in addition to stderr
file_enabled = {log_file_enabled}
file_dir = {log_file_dir}
file_rotation = "{log_file_rotation}"  # hourly, daily, never
file_prefix = {log_file_prefix}
"#,
            log_file = log_file,
            log_path = toml_path(&self.log_path),
            project_file = project_file,
            named_filters = toml_path(&self.named_filters),
            max_cache_size = self.max_cache_size,
            max_log_lines = self.max_log_lines,
            reload_interval = self.reload_interval,
            idle_timeout = self.idle_timeout,
            time_start = time_start,
            time_end = time_end,
            log_level = toml_string(&self.logging.level),
            log_file_enabled = self.logging.file_enabled,
            log_file_dir = toml_path(&self.logging.file_dir),
            log_file_rotation = self.logging.file_rotation.as_str(),
            log_file_prefix = toml_string(&self.logging.file_prefix),
        )
    }
}
