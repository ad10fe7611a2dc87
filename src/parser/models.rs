// Data models for parsed bus log lines
//
// A LogRecord is one telegram as the bus logger wrote it, with names
// resolved against the project lookup. Records never change after parsing;
// the search text used by regex filters is built once here so filtering
// never has to join fields again.

use crate::util::fit_column;
use chrono::{NaiveTime, Timelike};
use serde::Serialize;

/// Column widths used by the bus logger, in field order:
/// timestamp, source, source name, destination, destination name, payload
pub const COLUMN_WIDTHS: [usize; 6] = [22, 9, 25, 8, 30, 50];

/// One parsed telegram line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogRecord {
    pub timestamp: String,
    /// Individual address of the sending device (e.g. "1.1.5")
    pub source_id: String,
    pub source_name: String,
    /// Group address the telegram was sent to (e.g. "1/2/3")
    pub dest_id: String,
    pub dest_name: String,
    pub payload: String,
    /// All visible fields joined by a space, matched by regex filters
    #[serde(skip)]
    pub search_text: String,
}

impl LogRecord {
    pub fn new(
        timestamp: impl Into<String>,
        source_id: impl Into<String>,
        source_name: impl Into<String>,
        dest_id: impl Into<String>,
        dest_name: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        let timestamp = timestamp.into();
        let source_id = source_id.into();
        let source_name = source_name.into();
        let dest_id = dest_id.into();
        let dest_name = dest_name.into();
        let payload = payload.into();

        let search_text = [
            timestamp.as_str(),
            &source_id,
            &source_name,
            &dest_id,
            &dest_name,
            &payload,
        ]
        .join(" ");

        Self {
            timestamp,
            source_id,
            source_name,
            dest_id,
            dest_name,
            payload,
            search_text,
        }
    }

    /// Render the record in the bus logger's fixed-width layout
    ///
    /// The timestamp is padded but never cut; a millisecond timestamp is one
    /// character wider than its column.
    pub fn to_line(&self) -> String {
        let [ts_width, rest @ ..] = COLUMN_WIDTHS;
        let fields = [
            &self.source_id,
            &self.source_name,
            &self.dest_id,
            &self.dest_name,
            &self.payload,
        ];
        std::iter::once(format!("{:<ts_width$}", self.timestamp))
            .chain(
                fields
                    .iter()
                    .zip(rest)
                    .map(|(field, width)| fit_column(field, width)),
            )
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// Inclusive time-of-day window applied while parsing
///
/// Both bounds are optional wall-clock times without a date. When `start`
/// is later than `end` the window wraps midnight (22:00..02:00).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
}

impl TimeRange {
    pub fn new(start: Option<NaiveTime>, end: Option<NaiveTime>) -> Self {
        Self { start, end }
    }

    /// Build a range from user input ("HH:MM:SS" or "HH:MM"; anything else is no bound)
    pub fn from_input(start: Option<&str>, end: Option<&str>) -> Self {
        Self {
            start: start.and_then(parse_time_input),
            end: end.and_then(parse_time_input),
        }
    }

    pub fn is_active(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    /// Whether a time of day falls inside the window (second granularity)
    pub fn contains(&self, time: NaiveTime) -> bool {
        let time = time.with_nanosecond(0).unwrap_or(time);
        match (self.start, self.end) {
            (None, None) => true,
            (Some(start), None) => time >= start,
            (None, Some(end)) => time <= end,
            (Some(start), Some(end)) if start <= end => time >= start && time <= end,
            (Some(start), Some(end)) => time >= start || time <= end,
        }
    }
}

/// Parse a time bound typed by the user
pub fn parse_time_input(input: &str) -> Option<NaiveTime> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    NaiveTime::parse_from_str(input, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M:%S").unwrap()
    }

    #[test]
    fn test_search_text_joins_all_fields() {
        let record = LogRecord::new(
            "2024-05-01 10:00:00.123",
            "1.1.5",
            "Switch",
            "1/2/3",
            "Kitchen light",
            "On",
        );
        assert_eq!(
            record.search_text,
            "2024-05-01 10:00:00.123 1.1.5 Switch 1/2/3 Kitchen light On"
        );
    }

    #[test]
    fn test_to_line_uses_logger_widths() {
        let record = LogRecord::new("10:00:00", "1.1.5", "Switch", "1/2/3", "Light", "On");
        let line = record.to_line();
        let parts: Vec<&str> = line.split(" | ").collect();
        assert_eq!(parts.len(), 6);
        assert_eq!(parts[0].len(), 22);
        assert_eq!(parts[3], "1/2/3   ");
    }

    #[test]
    fn test_to_line_keeps_millisecond_timestamp_whole() {
        let record = LogRecord::new(
            "2024-05-01 10:00:00.123",
            "1.1.5",
            "Switch",
            "1/2/3",
            "Light",
            "On",
        );
        let line = record.to_line();
        assert!(line.starts_with("2024-05-01 10:00:00.123 | 1.1.5     | "));
        assert_eq!(line.split(" | ").next(), Some("2024-05-01 10:00:00.123"));
    }

    #[test]
    fn test_parse_time_input_formats() {
        assert_eq!(parse_time_input("08:15:30"), Some(t("08:15:30")));
        assert_eq!(parse_time_input("08:15"), Some(t("08:15:00")));
        assert_eq!(parse_time_input("8 o'clock"), None);
        assert_eq!(parse_time_input(""), None);
    }

    #[test]
    fn test_range_is_inclusive_at_second_granularity() {
        let range = TimeRange::new(Some(t("10:00:00")), Some(t("11:00:00")));
        assert!(range.contains(t("10:00:00")));
        assert!(range.contains(NaiveTime::from_hms_milli_opt(11, 0, 0, 500).unwrap()));
        assert!(!range.contains(t("11:00:01")));
        assert!(!range.contains(t("09:59:59")));
    }

    #[test]
    fn test_range_wraps_midnight() {
        let range = TimeRange::from_input(Some("22:00"), Some("02:00"));
        assert!(range.contains(t("23:30:00")));
        assert!(range.contains(t("01:00:00")));
        assert!(!range.contains(t("12:00:00")));
    }

    #[test]
    fn test_open_ended_ranges() {
        let from = TimeRange::from_input(Some("12:00"), None);
        assert!(from.contains(t("18:00:00")));
        assert!(!from.contains(t("11:59:59")));
        assert!(!TimeRange::default().is_active());
    }
}
