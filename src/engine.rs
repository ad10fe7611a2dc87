//! Engine facade: one owner for the cache, selection, view and ingestion
//!
//! Clients never poke at the parts directly. Every user action is a
//! [`Command`] executed at a given instant and answered with an [`Outcome`];
//! the periodic timer calls [`Engine::tick`]. Nothing here blocks on a clock,
//! so the idle policy is driven entirely by the instants passed in.

use crate::error::{FilterError, IngestError};
use crate::filter::FilterView;
use crate::ingest::{IngestState, LoadReport, LogIngestion, TailResult};
use crate::parser::{LineParser, LogRecord, TimeRange};
use crate::project::{AddressBook, AddressTree, NodeId};
use crate::selection::{NamedFilters, SelectionModel, ToggleReport};
use crate::stats::Statistics;
use crate::store::{LogCache, Seq};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("unknown tree node {0}")]
    UnknownNode(NodeId),
}

/// Settings the engine needs from the configuration
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub log_file: PathBuf,
    pub max_cache_size: usize,
    pub max_log_lines: usize,
    /// No activity for this long disarms tailing; `None` never does
    pub idle_timeout: Option<Duration>,
    pub time_range: TimeRange,
    /// Whether tailing should run at all
    pub auto_reload: bool,
}

/// A user action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ToggleNode(NodeId),
    SelectAddresses(Vec<String>),
    ActivateFilter(String),
    DeactivateFilter(String),
    ToggleFilter(String),
    SetGlobalRegex(Option<String>),
    SetTimeRange(TimeRange),
    ClearSelection,
    SaveSelectionAs(String),
    CreateFilter(String),
    DeleteFilter(String),
    AddRule { filter: String, rule: String },
    EditRule { filter: String, old: String, new: String },
    DeleteRule { filter: String, rule: String },
    SetSource(PathBuf),
    SetAutoReload(bool),
    Tail,
    Reload,
}

/// What a command or tick changed
#[derive(Debug)]
pub enum Outcome {
    Unchanged,
    /// Selection or regex changed and the view was rebuilt
    Refiltered {
        toggled: Option<ToggleReport>,
        visible: usize,
    },
    /// Full load (explicit, or triggered by truncation)
    Loaded(LoadReport),
    /// New lines were appended by a tail
    Tailed {
        first_seq: Seq,
        appended: usize,
        skipped: usize,
        visible: usize,
    },
    /// Named filters changed and were saved
    FiltersChanged,
    AutoReload { armed: bool },
}

/// Whether tailing runs, and the idle policy that stops it
#[derive(Debug, Clone)]
pub struct AutoReload {
    enabled: bool,
    armed: bool,
    idle_timeout: Option<Duration>,
    last_activity: Instant,
}

impl AutoReload {
    pub fn new(enabled: bool, idle_timeout: Option<Duration>, now: Instant) -> Self {
        Self {
            enabled,
            armed: false,
            idle_timeout,
            last_activity: now,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record user activity; re-arms tailing if it is wanted and possible
    pub fn touch(&mut self, now: Instant, taillable: bool) {
        self.last_activity = now;
        if self.enabled && taillable && !self.armed {
            tracing::info!("Auto-reload re-armed");
            self.armed = true;
        }
    }

    pub fn set_enabled(&mut self, enabled: bool, taillable: bool) {
        self.enabled = enabled;
        self.armed = enabled && taillable;
    }

    /// Idempotent
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Disarm when idle for too long. Returns true if this call disarmed it.
    pub fn check_idle(&mut self, now: Instant) -> bool {
        let Some(timeout) = self.idle_timeout else {
            return false;
        };
        if self.armed && now.saturating_duration_since(self.last_activity) > timeout {
            tracing::info!("No activity for {:?}, auto-reload disabled", timeout);
            self.armed = false;
            return true;
        }
        false
    }
}

pub struct Engine {
    ingest: LogIngestion,
    parser: LineParser,
    book: AddressBook,
    tree: AddressTree,
    cache: LogCache,
    selection: SelectionModel,
    view: FilterView,
    auto: AutoReload,
}

impl Engine {
    pub fn new(settings: EngineSettings, book: AddressBook, filters: NamedFilters, now: Instant) -> Self {
        let tree = AddressTree::group_address_tree(&book);
        Self {
            ingest: LogIngestion::new(settings.log_file),
            parser: LineParser::new(settings.time_range),
            tree,
            book,
            cache: LogCache::new(settings.max_cache_size),
            selection: SelectionModel::new(filters),
            view: FilterView::new(settings.max_log_lines),
            auto: AutoReload::new(settings.auto_reload, settings.idle_timeout, now),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Snapshots for clients
    // ─────────────────────────────────────────────────────────────────────

    pub fn book(&self) -> &AddressBook {
        &self.book
    }

    pub fn tree(&self) -> &AddressTree {
        &self.tree
    }

    pub fn selection(&self) -> &SelectionModel {
        &self.selection
    }

    pub fn cache(&self) -> &LogCache {
        &self.cache
    }

    pub fn ingest_state(&self) -> IngestState {
        self.ingest.state()
    }

    pub fn auto_reload(&self) -> &AutoReload {
        &self.auto
    }

    pub fn time_range(&self) -> TimeRange {
        self.parser.time_range()
    }

    /// Visible records, capped to the display limit
    pub fn visible_records(&self) -> impl Iterator<Item = &LogRecord> {
        self.view.records(&self.cache.records)
    }

    /// Visible records appended at or after `from`
    pub fn visible_since(&self, from: Seq) -> impl Iterator<Item = &LogRecord> {
        let store = &self.cache.records;
        self.view
            .seqs()
            .filter(move |&seq| seq >= from)
            .filter_map(move |seq| store.get(seq))
    }

    pub fn visible_count(&self) -> usize {
        self.view.len()
    }

    /// Recent payloads of a tree node's addresses: `current (previous, older)`
    pub fn node_payloads(&self, id: NodeId) -> Option<String> {
        let addresses = self.tree.descendant_leaf_ids(id);
        self.cache.history.display(addresses.iter().map(String::as_str))
    }

    pub fn statistics(&self) -> Statistics {
        Statistics::compute(self.cache.records.iter(), &self.book)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Loading and the timer
    // ─────────────────────────────────────────────────────────────────────

    /// Full load of the configured source; arms tailing for plain sources
    pub fn load(&mut self) -> LoadReport {
        let report = self.ingest.load(&self.parser, &self.book, &mut self.cache);
        self.view.refilter(&self.cache.records, &self.selection);
        let taillable = self.ingest.is_taillable();
        match &report.error {
            Some(e) if !e.is_transient() => self.auto.disarm(),
            _ => self.auto.set_enabled(self.auto.is_enabled(), taillable),
        }
        if !taillable {
            tracing::info!("{} is a snapshot, auto-reload off", report.source.display());
        }
        report
    }

    /// One timer tick: apply the idle policy, then tail if armed
    pub fn tick(&mut self, now: Instant) -> Result<Outcome, EngineError> {
        if self.auto.check_idle(now) {
            return Ok(Outcome::AutoReload { armed: false });
        }
        if !self.auto.is_armed() {
            return Ok(Outcome::Unchanged);
        }
        self.tail()
    }

    fn tail(&mut self) -> Result<Outcome, EngineError> {
        let result = match self.ingest.tail(&self.parser, &self.book, &mut self.cache) {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Tail failed, auto-reload disabled: {}", e);
                self.auto.disarm();
                return Err(e.into());
            }
        };

        match result {
            TailResult::NotTaillable => {
                self.auto.disarm();
                Ok(Outcome::AutoReload { armed: false })
            }
            TailResult::Missing | TailResult::Unchanged => Ok(Outcome::Unchanged),
            TailResult::Reloaded(report) => {
                self.view.refilter(&self.cache.records, &self.selection);
                if report.error.as_ref().is_some_and(|e| !e.is_transient()) {
                    self.auto.disarm();
                }
                Ok(Outcome::Loaded(report))
            }
            TailResult::Appended {
                first_seq,
                records,
                skipped,
                ..
            } => {
                let visible = self
                    .view
                    .extend(&self.cache.records, first_seq, &self.selection);
                Ok(Outcome::Tailed {
                    first_seq,
                    appended: records,
                    skipped,
                    visible,
                })
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────

    /// Run a user command. Every command except `Tail` counts as activity.
    pub fn execute(&mut self, command: Command, now: Instant) -> Result<Outcome, EngineError> {
        if command != Command::Tail {
            self.auto.touch(now, self.ingest.is_taillable());
        }
        tracing::debug!("Executing {:?}", command);

        match command {
            Command::ToggleNode(id) => {
                if self.tree.node(id).is_none() {
                    return Err(EngineError::UnknownNode(id));
                }
                let report = self.selection.toggle(&self.tree, id);
                Ok(self.refiltered(Some(report)))
            }
            Command::SelectAddresses(addresses) => {
                self.selection.select_addresses(&self.tree, &addresses)?;
                Ok(self.refiltered(None))
            }
            Command::ActivateFilter(name) => {
                if self.selection.activate(&name)? {
                    Ok(self.refiltered(None))
                } else {
                    Ok(Outcome::Unchanged)
                }
            }
            Command::DeactivateFilter(name) => {
                if self.selection.deactivate(&name) {
                    Ok(self.refiltered(None))
                } else {
                    Ok(Outcome::Unchanged)
                }
            }
            Command::ToggleFilter(name) => {
                self.selection.toggle_filter(&name)?;
                Ok(self.refiltered(None))
            }
            Command::SetGlobalRegex(pattern) => {
                let result = self.selection.set_global_regex(pattern.as_deref());
                // An invalid pattern clears the regex; the view follows either way
                let outcome = self.refiltered(None);
                result?;
                Ok(outcome)
            }
            Command::SetTimeRange(range) => {
                self.parser = LineParser::new(range);
                Ok(Outcome::Loaded(self.load()))
            }
            Command::ClearSelection => {
                self.selection.clear_selection();
                Ok(self.refiltered(None))
            }
            Command::SaveSelectionAs(name) => {
                self.selection.save_selection_as(&name)?;
                self.save_filters()
            }
            Command::CreateFilter(name) => {
                self.selection.create_filter(&name)?;
                self.save_filters()
            }
            Command::DeleteFilter(name) => {
                self.selection.delete_filter(&name)?;
                self.save_filters()
            }
            Command::AddRule { filter, rule } => {
                self.selection.add_rule(&filter, &rule)?;
                self.save_filters()
            }
            Command::EditRule { filter, old, new } => {
                self.selection.edit_rule(&filter, &old, &new)?;
                self.save_filters()
            }
            Command::DeleteRule { filter, rule } => {
                self.selection.delete_rule(&filter, &rule)?;
                self.save_filters()
            }
            Command::SetSource(path) => {
                self.ingest.set_source(path);
                Ok(Outcome::Loaded(self.load()))
            }
            Command::SetAutoReload(enabled) => {
                self.auto.set_enabled(enabled, self.ingest.is_taillable());
                Ok(Outcome::AutoReload {
                    armed: self.auto.is_armed(),
                })
            }
            Command::Tail => self.tail(),
            Command::Reload => Ok(Outcome::Loaded(self.load())),
        }
    }

    fn refiltered(&mut self, toggled: Option<ToggleReport>) -> Outcome {
        let visible = self.view.refilter(&self.cache.records, &self.selection);
        Outcome::Refiltered { toggled, visible }
    }

    /// Persist named filters; rule changes may also change what is visible
    fn save_filters(&mut self) -> Result<Outcome, EngineError> {
        self.selection.filters().save(&self.book)?;
        self.view.refilter(&self.cache.records, &self.selection);
        Ok(Outcome::FiltersChanged)
    }
}
