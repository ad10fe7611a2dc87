// Parser module - turns bus logger lines into LogRecords
//
// The bus logger writes one telegram per line:
//
//   timestamp | source | source name | destination | destination name | payload
//
// Fields are left-justified to fixed widths, but we only rely on the pipe
// separators. Banner lines (====, "Logger gestartet am ...") have no pipes
// and are skipped. A malformed line is dropped on its own; it never stops
// the rest of the batch from parsing.

pub mod models;

pub use models::{parse_time_input, LogRecord, TimeRange, COLUMN_WIDTHS};

use crate::project::AddressBook;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Number of pipe-separated fields in a telegram line
const FIELD_COUNT: usize = 6;

/// Why a line did not produce a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Blank line, banner or separator
    NotARecord,
    /// Looked like a telegram but a required field was missing
    Malformed,
    /// Outside the configured time-of-day window, or no usable timestamp
    /// while a window is active
    OutOfRange,
}

/// Result of parsing one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Record(LogRecord),
    Skipped(SkipReason),
}

/// Records parsed from a batch of lines plus the number of lines dropped
#[derive(Debug, Default)]
pub struct ParsedBatch {
    pub records: Vec<LogRecord>,
    pub skipped: usize,
}

/// A timestamp as found in the log: with or without a date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTimestamp {
    DateTime(NaiveDateTime),
    TimeOnly(NaiveTime),
}

impl LogTimestamp {
    pub fn time(&self) -> NaiveTime {
        match self {
            Self::DateTime(dt) => dt.time(),
            Self::TimeOnly(t) => *t,
        }
    }

    /// Seconds since the Unix epoch
    ///
    /// Time-only stamps are placed on 1970-01-01 so that deltas between
    /// them stay meaningful.
    pub fn epoch_seconds(&self) -> f64 {
        let dt = match self {
            Self::DateTime(dt) => *dt,
            Self::TimeOnly(t) => NaiveDate::default().and_time(*t),
        };
        let utc = dt.and_utc();
        utc.timestamp() as f64 + f64::from(utc.nanosecond()) / 1e9
    }
}

/// Parse a log timestamp, tolerant of a missing date and of 'T' separators
pub fn parse_timestamp(raw: &str) -> Option<LogTimestamp> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(LogTimestamp::DateTime(dt));
        }
    }

    NaiveTime::parse_from_str(raw, "%H:%M:%S%.f")
        .ok()
        .map(LogTimestamp::TimeOnly)
}

/// Epoch seconds for a log timestamp string, if it parses
pub fn timestamp_epoch(raw: &str) -> Option<f64> {
    parse_timestamp(raw).map(|ts| ts.epoch_seconds())
}

/// Parses log lines, resolving names and applying the time window
#[derive(Debug, Clone, Default)]
pub struct LineParser {
    time_range: TimeRange,
}

impl LineParser {
    pub fn new(time_range: TimeRange) -> Self {
        Self { time_range }
    }

    pub fn time_range(&self) -> TimeRange {
        self.time_range
    }

    /// Parse a single line
    pub fn parse_line(&self, line: &str, book: &AddressBook) -> ParsedLine {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() || !line.contains('|') {
            return ParsedLine::Skipped(SkipReason::NotARecord);
        }

        let fields: Vec<&str> = line.split('|').collect();
        if fields.len() < FIELD_COUNT {
            tracing::debug!("Skipping line with {} fields: {:?}", fields.len(), line);
            return ParsedLine::Skipped(SkipReason::Malformed);
        }

        let raw_timestamp = fields[0].trim();
        let source_id = fields[1].trim();
        let logged_source_name = fields[2].trim();
        let dest_id = fields[3].trim();
        let logged_dest_name = fields[4].trim();
        // Payloads may contain pipes themselves
        let payload = fields[FIELD_COUNT - 1..].join("|");
        let payload = payload.trim();

        if dest_id.is_empty() {
            tracing::debug!("Skipping line without destination: {:?}", line);
            return ParsedLine::Skipped(SkipReason::Malformed);
        }

        let timestamp = match parse_timestamp(raw_timestamp) {
            Some(ts) => {
                if self.time_range.is_active() && !self.time_range.contains(ts.time()) {
                    return ParsedLine::Skipped(SkipReason::OutOfRange);
                }
                raw_timestamp
            }
            None if self.time_range.is_active() => {
                tracing::debug!("Unparseable timestamp {:?} with time filter active", raw_timestamp);
                return ParsedLine::Skipped(SkipReason::OutOfRange);
            }
            None => {
                tracing::debug!("Unparseable timestamp {:?}, keeping line", raw_timestamp);
                ""
            }
        };

        // The logger cuts names to its column width; the project has the full ones
        let source_name = book.device_name(source_id).unwrap_or(logged_source_name);
        let dest_name = book.group_name(dest_id).unwrap_or(logged_dest_name);

        ParsedLine::Record(LogRecord::new(
            timestamp,
            source_id,
            source_name,
            dest_id,
            dest_name,
            payload,
        ))
    }

    /// Parse a batch of lines, counting the ones that were dropped
    pub fn parse_lines<'a, I>(&self, lines: I, book: &AddressBook) -> ParsedBatch
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut batch = ParsedBatch::default();
        for line in lines {
            match self.parse_line(line, book) {
                ParsedLine::Record(record) => batch.records.push(record),
                ParsedLine::Skipped(SkipReason::NotARecord) => {}
                ParsedLine::Skipped(_) => batch.skipped += 1,
            }
        }
        batch
    }
}
