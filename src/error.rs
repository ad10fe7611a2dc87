//! Error taxonomy for the log engine
//!
//! Library modules return these typed errors; the binary wraps them in
//! `anyhow` with context. Decode failures and malformed lines never show up
//! here: the first is recovered by the Latin-1 fallback, the second is a
//! debug trace and a skipped line.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or tailing a log source
#[derive(Debug, Error)]
pub enum IngestError {
    /// Log file is absent. Non-fatal: the view is empty and the next tail retries.
    #[error("log file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// Extension is neither a text log nor a known snapshot format
    #[error("unsupported log source {}: expected .log, .txt, .gz, .xz or .zip", .0.display())]
    UnsupportedSource(PathBuf),

    /// Archive opened fine but holds no log member
    #[error("no .log file inside archive {}", .0.display())]
    ArchiveMissingMember(PathBuf),

    /// Archive is corrupt or not what its extension claims
    #[error("cannot read archive {}: {reason}", .path.display())]
    Archive { path: PathBuf, reason: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IngestError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return Self::SourceNotFound(path.into());
        }
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the failure is transient and the source should be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SourceNotFound(_))
    }
}

/// Errors raised by selection and named filter management
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid regex '{pattern}': {source}")]
    RegexCompile {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("named filter '{0}' does not exist")]
    UnknownFilter(String),

    #[error("named filter '{0}' already exists")]
    DuplicateFilter(String),

    #[error("rule '{rule}' not found in filter '{filter}'")]
    UnknownRule { filter: String, rule: String },

    #[error("'{0}' is not a group address")]
    NotAnAddress(String),

    #[error("nothing selected")]
    EmptySelection,

    #[error("cannot access named filter file {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("named filter file {} is not valid YAML: {source}", .path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
