// Logging setup - tracing subscriber for the headless client
//
// Human-readable logs go to stderr so stdout carries only telegram lines and
// statistics. File logging optionally adds a JSON layer with rotation.
//
// Precedence: RUST_LOG env var > config file > default "info"

use crate::config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive used when RUST_LOG is not set
pub fn default_directive(level: &str) -> String {
    format!("knx_lens={}", level.trim())
}

fn file_appender(logging: &LoggingConfig) -> Result<RollingFileAppender, InitError> {
    RollingFileAppender::builder()
        .rotation(logging.file_rotation.into())
        .filename_prefix(&logging.file_prefix)
        .build(&logging.file_dir)
}

/// Install the global subscriber
///
/// The returned guard flushes the file writer on drop, so keep it alive
/// until the program exits.
pub fn init(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directive(&logging.level).into());
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if !logging.file_enabled {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
        return None;
    }

    // The builder creates the directory
    let appender = match file_appender(logging) {
        Ok(appender) => appender,
        Err(e) => {
            eprintln!(
                "Warning: Could not open trace log in {:?}: {}",
                logging.file_dir, e
            );
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            return None;
        }
    };

    // Writes happen on a background thread
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();

    Some(guard)
}
