//! Recent payload values per group address
//!
//! Only the last few values are kept; they decorate tree labels and are never
//! used for filtering. Trimming the record store does not touch this.

use crate::parser::LogRecord;
use std::collections::{HashMap, VecDeque};

/// Payloads remembered per address
pub const HISTORY_DEPTH: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEntry {
    pub timestamp: String,
    pub payload: String,
}

#[derive(Debug, Clone, Default)]
pub struct PayloadHistory {
    entries: HashMap<String, VecDeque<PayloadEntry>>,
}

impl PayloadHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a record's payload under its destination address
    pub fn record(&mut self, record: &LogRecord) {
        let ring = self.entries.entry(record.dest_id.clone()).or_default();
        if ring.len() == HISTORY_DEPTH {
            ring.pop_front();
        }
        ring.push_back(PayloadEntry {
            timestamp: record.timestamp.clone(),
            payload: record.payload.clone(),
        });
    }

    pub fn record_all<'a>(&mut self, records: impl IntoIterator<Item = &'a LogRecord>) {
        for record in records {
            self.record(record);
        }
    }

    /// Entries for one address, oldest first
    pub fn get(&self, address: &str) -> Option<&VecDeque<PayloadEntry>> {
        self.entries.get(address)
    }

    pub fn latest(&self, address: &str) -> Option<&str> {
        self.entries
            .get(address)
            .and_then(|ring| ring.back())
            .map(|entry| entry.payload.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Combined display for a set of addresses: `current (previous, older)`
    ///
    /// Histories of all addresses are merged and ordered by timestamp; the
    /// newest three values are shown. `None` when nothing was seen yet.
    pub fn display<'a>(&self, addresses: impl IntoIterator<Item = &'a str>) -> Option<String> {
        let mut merged: Vec<&PayloadEntry> = addresses
            .into_iter()
            .filter_map(|address| self.entries.get(address))
            .flatten()
            .collect();
        if merged.is_empty() {
            return None;
        }

        // Stable: equal timestamps keep per-address arrival order
        merged.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let mut newest = merged
            .iter()
            .rev()
            .take(HISTORY_DEPTH)
            .map(|entry| entry.payload.as_str());

        let current = newest.next()?;
        let previous: Vec<&str> = newest.collect();
        if previous.is_empty() {
            Some(current.to_string())
        } else {
            Some(format!("{} ({})", current, previous.join(", ")))
        }
    }
}
