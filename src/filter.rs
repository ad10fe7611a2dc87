//! Record visibility and the filtered view over the record store
//!
//! A record is visible when it passes the OR part (selected destination
//! address, or any active filter regex; everything passes when neither is
//! set) and the AND part (the global regex, when set).

use crate::parser::LogRecord;
use crate::selection::SelectionModel;
use crate::store::{LogRecordStore, Seq};
use crate::util::ellipsize;
use regex::Regex;
use std::collections::VecDeque;
use std::sync::OnceLock;

/// Longest payload shown in the table before it is cut
pub const PAYLOAD_DISPLAY_WIDTH: usize = 23;

pub fn is_visible(record: &LogRecord, selection: &SelectionModel) -> bool {
    let passes_or = !selection.has_or_filter()
        || selection.is_selected(&record.dest_id)
        || selection
            .active_regexes()
            .iter()
            .any(|re| re.is_match(&record.search_text));

    let passes_and = selection
        .global_regex()
        .map_or(true, |re| re.is_match(&record.search_text));

    passes_or && passes_and
}

/// Sequence numbers of the visible records, newest last, capped for display
#[derive(Debug, Clone)]
pub struct FilterView {
    seqs: VecDeque<Seq>,
    max_display: usize,
}

impl FilterView {
    pub fn new(max_display: usize) -> Self {
        Self {
            seqs: VecDeque::new(),
            max_display,
        }
    }

    pub fn len(&self) -> usize {
        self.seqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }

    pub fn max_display(&self) -> usize {
        self.max_display
    }

    pub fn seqs(&self) -> impl Iterator<Item = Seq> + '_ {
        self.seqs.iter().copied()
    }

    /// Recompute from scratch over the whole store
    pub fn refilter(&mut self, store: &LogRecordStore, selection: &SelectionModel) -> usize {
        self.seqs.clear();
        self.push_matching(store, store.first_seq(), selection)
    }

    /// Add records appended at or after `from`. Returns how many matched.
    pub fn extend(&mut self, store: &LogRecordStore, from: Seq, selection: &SelectionModel) -> usize {
        self.rebase(store);
        self.push_matching(store, from, selection)
    }

    /// Forget records the store has trimmed away
    pub fn rebase(&mut self, store: &LogRecordStore) {
        let first = store.first_seq();
        while self.seqs.front().is_some_and(|&seq| seq < first) {
            self.seqs.pop_front();
        }
    }

    /// Visible records in order
    pub fn records<'a>(&'a self, store: &'a LogRecordStore) -> impl Iterator<Item = &'a LogRecord> + 'a {
        self.seqs.iter().filter_map(move |&seq| store.get(seq))
    }

    fn push_matching(&mut self, store: &LogRecordStore, from: Seq, selection: &SelectionModel) -> usize {
        let mut matched = 0;
        for (seq, record) in store.iter_from(from) {
            if is_visible(record, selection) {
                self.seqs.push_back(seq);
                matched += 1;
            }
        }
        while self.seqs.len() > self.max_display {
            self.seqs.pop_front();
        }
        matched
    }
}

impl Default for FilterView {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_LOG_LINES)
    }
}

fn enum_repr() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    // `<Step.INCREASE: True>` -> `INCREASE`
    RE.get_or_init(|| Regex::new(r"<\w+\.(\w+):\s*[^>]+>").ok())
        .as_ref()
}

/// Shorten a payload for the table
///
/// Dimming control payloads are unwrapped to their fields, then anything
/// longer than [`PAYLOAD_DISPLAY_WIDTH`] is cut with "...".
pub fn shorten_payload(payload: &str) -> String {
    let inner = payload
        .strip_prefix("ControlDimming(")
        .and_then(|rest| rest.strip_suffix(')'));
    let Some(inner) = inner else {
        return ellipsize(payload, PAYLOAD_DISPLAY_WIDTH);
    };

    let unwrapped = match enum_repr() {
        Some(re) => re.replace_all(inner, "$1").into_owned(),
        None => inner.to_string(),
    };
    let unwrapped = unwrapped
        .replace("control=", "")
        .replace("step_code=", "step=")
        .replace("STEPCODE_", "");
    ellipsize(&unwrapped, PAYLOAD_DISPLAY_WIDTH)
}
