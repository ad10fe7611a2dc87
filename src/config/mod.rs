//! Configuration for knx-lens
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/knx-lens/config.toml)
//! 3. Built-in defaults (lowest priority)

use crate::engine::EngineSettings;
use crate::parser::TimeRange;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Submodules
// ─────────────────────────────────────────────────────────────────────────────

mod logging;
mod serialization;

#[cfg(test)]
mod tests;

pub use logging::{LogRotation, LoggingConfig};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Records kept in memory
pub const DEFAULT_MAX_CACHE_SIZE: usize = 50_000;

/// Records shown in the filtered view
pub const DEFAULT_MAX_LOG_LINES: usize = 10_000;

/// Seconds between tail polls
pub const DEFAULT_RELOAD_INTERVAL: f64 = 5.0;

/// Seconds without activity before tailing stops (0 = never)
pub const DEFAULT_IDLE_TIMEOUT: u64 = 3600;

/// Log file name used when only a directory is configured
pub const DEFAULT_LOG_FILE_NAME: &str = "knx_bus.log";

pub const DEFAULT_NAMED_FILTERS: &str = "named_filters.yaml";

/// Shortest poll interval accepted from config
const MIN_RELOAD_INTERVAL: f64 = 0.1;

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Explicit log file; wins over `log_path`
    pub log_file: Option<PathBuf>,

    /// Directory holding `knx_bus.log`
    pub log_path: PathBuf,

    /// JSON project export with device and group address names
    pub project_file: Option<PathBuf>,

    /// YAML document with the named filters
    pub named_filters: PathBuf,

    /// Maximum records kept in memory
    pub max_cache_size: usize,

    /// Maximum records in the filtered view
    pub max_log_lines: usize,

    /// Seconds between tail polls
    pub reload_interval: f64,

    /// Seconds without activity before tailing stops (0 = never)
    pub idle_timeout: u64,

    /// Inclusive time-of-day window ("HH:MM" or "HH:MM:SS")
    pub time_start: Option<String>,
    pub time_end: Option<String>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_file: None,
            log_path: PathBuf::from("."),
            project_file: None,
            named_filters: PathBuf::from(DEFAULT_NAMED_FILTERS),
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            max_log_lines: DEFAULT_MAX_LOG_LINES,
            reload_interval: DEFAULT_RELOAD_INTERVAL,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            time_start: None,
            time_end: None,
            logging: LoggingConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File Configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

/// Config file structure
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    pub log_file: Option<String>,
    pub log_path: Option<String>,
    pub project_file: Option<String>,
    pub named_filters: Option<String>,
    pub max_cache_size: Option<usize>,
    pub max_log_lines: Option<usize>,
    pub reload_interval: Option<f64>,
    pub idle_timeout: Option<u64>,
    pub time_start: Option<String>,
    pub time_end: Option<String>,

    /// [logging] section, taken as a whole
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Get the config file path: ~/.config/knx-lens/config.toml
    /// Uses Unix-style ~/.config on all platforms for consistency
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("knx-lens").join("config.toml"))
    }

    /// Write the default template to `path`, creating parent directories
    pub fn write_template(path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, Self::default().to_toml())
    }

    /// Load file config if it exists
    ///
    /// Exits the process if the file exists but cannot be read or parsed.
    /// A broken config should fail loudly, not fall back to defaults.
    fn load_file_config() -> FileConfig {
        let Some(path) = Self::config_path() else {
            return FileConfig::default();
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("\n╔══════════════════════════════════════════════════════════════╗");
                    eprintln!("║  CONFIG ERROR - Failed to parse configuration file          ║");
                    eprintln!("╚══════════════════════════════════════════════════════════════╝\n");
                    eprintln!("  File: {}\n", path.display());
                    eprintln!("  Error: {}\n", e);
                    eprintln!("  Tip: Check for:\n");
                    eprintln!("    - Missing quotes around paths");
                    eprintln!("    - Numbers written as strings (max_cache_size = 50000)");
                    eprintln!("    - Typos in section names\n");
                    eprintln!("  To reset, run `knx-lens config --reset`.\n");
                    std::process::exit(1);
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileConfig::default(),
            Err(e) => {
                eprintln!("\n╔══════════════════════════════════════════════════════════════╗");
                eprintln!("║  CONFIG ERROR - Cannot read configuration file              ║");
                eprintln!("╚══════════════════════════════════════════════════════════════╝\n");
                eprintln!("  File: {}\n", path.display());
                eprintln!("  Error: {}\n", e);
                std::process::exit(1);
            }
        }
    }

    /// Load configuration: env vars -> file -> defaults
    pub fn from_env() -> Self {
        let file = Self::load_file_config();
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Merge a parsed config file with an environment lookup
    pub(crate) fn from_sources<E>(file: FileConfig, env: E) -> Self
    where
        E: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        // Log file: env > file > derived from log_path
        let log_file = env("LOG_FILE").or(file.log_file).map(PathBuf::from);

        let log_path = env("LOG_PATH")
            .or(file.log_path)
            .map(PathBuf::from)
            .unwrap_or(defaults.log_path);

        let project_file = env("KNX_PROJECT_PATH")
            .or(file.project_file)
            .map(PathBuf::from);

        let named_filters = env("KNX_LENS_FILTERS")
            .or(file.named_filters)
            .map(PathBuf::from)
            .unwrap_or(defaults.named_filters);

        // Numeric values: unparsable env values fall through to the file
        let max_cache_size = env("KNX_LENS_MAX_CACHE")
            .and_then(|v| v.trim().parse().ok())
            .or(file.max_cache_size)
            .filter(|&n| n > 0)
            .unwrap_or(defaults.max_cache_size);

        let max_log_lines = env("MAX_LOG_LINES")
            .and_then(|v| v.trim().parse().ok())
            .or(file.max_log_lines)
            .filter(|&n| n > 0)
            .unwrap_or(defaults.max_log_lines);

        let reload_interval = env("RELOAD_INTERVAL")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .or(file.reload_interval)
            .filter(|v| v.is_finite())
            .map(|v| v.max(MIN_RELOAD_INTERVAL))
            .unwrap_or(defaults.reload_interval);

        let idle_timeout = env("KNX_LENS_IDLE_TIMEOUT")
            .and_then(|v| v.trim().parse().ok())
            .or(file.idle_timeout)
            .unwrap_or(defaults.idle_timeout);

        // Time window: file only (the CLI overrides it per run)
        let time_start = file.time_start.filter(|s| !s.trim().is_empty());
        let time_end = file.time_end.filter(|s| !s.trim().is_empty());

        Self {
            log_file,
            log_path,
            project_file,
            named_filters,
            max_cache_size,
            max_log_lines,
            reload_interval,
            idle_timeout,
            time_start,
            time_end,
            logging: file.logging,
        }
    }

    /// The log to read: `log_file` if set, else `knx_bus.log` inside `log_path`
    pub fn resolved_log_file(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.log_path.join(DEFAULT_LOG_FILE_NAME))
    }

    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs_f64(self.reload_interval.max(MIN_RELOAD_INTERVAL))
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout > 0).then(|| Duration::from_secs(self.idle_timeout))
    }

    pub fn time_range(&self) -> TimeRange {
        TimeRange::from_input(self.time_start.as_deref(), self.time_end.as_deref())
    }

    /// Settings for a headless engine over the configured log
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            log_file: self.resolved_log_file(),
            max_cache_size: self.max_cache_size,
            max_log_lines: self.max_log_lines,
            idle_timeout: self.idle_timeout(),
            time_range: self.time_range(),
            auto_reload: true,
        }
    }
}
