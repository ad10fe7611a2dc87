//! Bounded in-memory cache of parsed records
//!
//! Records are kept in file order in a ring. Each record has a sequence number
//! that never changes while it lives in the store: the first record ever
//! stored is 0, and trimming only advances `first_seq`. Views hold sequence
//! numbers rather than positions so a trim never invalidates them silently.

pub mod history;

pub use history::{PayloadEntry, PayloadHistory, HISTORY_DEPTH};

use crate::parser::LogRecord;
use std::collections::VecDeque;

/// Sequence number of a record in its store
pub type Seq = u64;

#[derive(Debug, Clone)]
pub struct LogRecordStore {
    records: VecDeque<LogRecord>,
    /// Sequence number of `records[0]`
    first_seq: Seq,
    max_size: usize,
}

impl LogRecordStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            records: VecDeque::new(),
            first_seq: 0,
            max_size,
        }
    }

    /// Bulk load, keeping only the newest `max_size` records
    pub fn from_records(records: Vec<LogRecord>, max_size: usize) -> Self {
        let mut store = Self {
            records: VecDeque::from(records),
            first_seq: 0,
            max_size,
        };
        store.trim();
        store
    }

    /// Append records in order, then trim. Returns how many old records were dropped.
    pub fn append(&mut self, records: impl IntoIterator<Item = LogRecord>) -> usize {
        self.records.extend(records);
        self.trim()
    }

    /// Drop the oldest records beyond `max_size`
    pub fn trim(&mut self) -> usize {
        let excess = self.records.len().saturating_sub(self.max_size);
        if excess > 0 {
            self.records.drain(..excess);
            self.first_seq += excess as Seq;
            tracing::trace!("Trimmed {} records, first_seq now {}", excess, self.first_seq);
        }
        excess
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn first_seq(&self) -> Seq {
        self.first_seq
    }

    /// Sequence number the next appended record will get
    pub fn next_seq(&self) -> Seq {
        self.first_seq + self.records.len() as Seq
    }

    pub fn get(&self, seq: Seq) -> Option<&LogRecord> {
        let offset = seq.checked_sub(self.first_seq)?;
        self.records.get(usize::try_from(offset).ok()?)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &LogRecord> + ExactSizeIterator {
        self.records.iter()
    }

    /// Records with their sequence numbers, starting at `from` (clamped to the store)
    pub fn iter_from(&self, from: Seq) -> impl Iterator<Item = (Seq, &LogRecord)> {
        let start = from.max(self.first_seq);
        let skip = usize::try_from(start - self.first_seq).unwrap_or(usize::MAX);
        let first_seq = self.first_seq;
        self.records
            .iter()
            .enumerate()
            .skip(skip)
            .map(move |(i, record)| (first_seq + i as Seq, record))
    }
}

impl Default for LogRecordStore {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_CACHE_SIZE)
    }
}

/// Record store plus payload history, replaced together on every full load
#[derive(Debug, Clone, Default)]
pub struct LogCache {
    pub records: LogRecordStore,
    pub history: PayloadHistory,
}

impl LogCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            records: LogRecordStore::new(max_size),
            history: PayloadHistory::new(),
        }
    }

    /// Fresh cache from a full parse; history sees every record, even trimmed ones
    pub fn from_records(records: Vec<LogRecord>, max_size: usize) -> Self {
        let mut history = PayloadHistory::new();
        history.record_all(&records);
        Self {
            records: LogRecordStore::from_records(records, max_size),
            history,
        }
    }

    /// Append tailed records. Returns how many old records were trimmed.
    pub fn append(&mut self, records: Vec<LogRecord>) -> usize {
        self.history.record_all(&records);
        self.records.append(records)
    }

    /// Drop everything, keeping the size limit
    pub fn reset(&mut self) {
        *self = Self::new(self.records.max_size());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(range: std::ops::Range<usize>) -> Vec<LogRecord> {
        range
            .map(|i| LogRecord::new("", "1.1.1", "", "1/1/1", "", i.to_string()))
            .collect()
    }

    fn payloads(store: &LogRecordStore) -> Vec<String> {
        store.iter().map(|r| r.payload.clone()).collect()
    }

    #[test]
    fn test_bulk_load_keeps_newest() {
        let store = LogRecordStore::from_records(records(0..10), 4);
        assert_eq!(payloads(&store), vec!["6", "7", "8", "9"]);
        assert_eq!(store.first_seq(), 6);
        assert_eq!(store.next_seq(), 10);
    }

    #[test]
    fn test_append_trims_oldest_first() {
        let mut store = LogRecordStore::new(5);
        assert_eq!(store.append(records(0..3)), 0);
        assert_eq!(store.append(records(3..8)), 3);
        assert_eq!(store.len(), 5);
        assert_eq!(payloads(&store), vec!["3", "4", "5", "6", "7"]);
    }

    #[test]
    fn test_cache_history_survives_trim() {
        let mut cache = LogCache::from_records(records(0..3), 2);
        assert_eq!(cache.records.len(), 2);
        assert_eq!(cache.history.latest("1/1/1"), Some("2"));
        cache.append(records(3..4));
        assert_eq!(cache.records.first_seq(), 2);
        assert_eq!(cache.history.latest("1/1/1"), Some("3"));
        cache.reset();
        assert!(cache.records.is_empty());
        assert!(cache.history.is_empty());
        assert_eq!(cache.records.max_size(), 2);
    }

    #[test]
    fn test_get_by_sequence() {
        let mut store = LogRecordStore::new(3);
        store.append(records(0..5));
        assert!(store.get(1).is_none());
        assert_eq!(store.get(2).unwrap().payload, "2");
        assert_eq!(store.get(4).unwrap().payload, "4");
        assert!(store.get(5).is_none());
    }

    #[test]
    fn test_iter_from_clamps() {
        let mut store = LogRecordStore::new(3);
        store.append(records(0..5));
        let seqs: Vec<Seq> = store.iter_from(0).map(|(s, _)| s).collect();
        assert_eq!(seqs, vec![2, 3, 4]);
        let seqs: Vec<Seq> = store.iter_from(4).map(|(s, _)| s).collect();
        assert_eq!(seqs, vec![4]);
        assert_eq!(store.iter_from(9).count(), 0);
    }
}
