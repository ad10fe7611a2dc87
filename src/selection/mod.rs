//! Selection model: which addresses and patterns make a record visible
//!
//! Every selected address remembers who selected it: the user directly, or
//! one or more active named filters. Deactivating a filter withdraws only
//! that filter's claim, so an address stays selected while anything else
//! still wants it. Activating and then deactivating a filter therefore leaves
//! the selection exactly as it was, whatever else is active.

pub mod named;

pub use named::{compile_pattern, is_group_address, validate_rule, NamedFilter, NamedFilters};

use crate::error::FilterError;
use crate::project::{AddressTree, NodeId, SelectionState};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

/// Who put an address into the selection
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Owner {
    Manual,
    Filter(String),
}

/// Recomputed states after a toggle: the node, its descendants, its ancestors
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToggleReport {
    pub states: Vec<(NodeId, SelectionState)>,
}

impl ToggleReport {
    pub fn state_of(&self, id: NodeId) -> Option<SelectionState> {
        self.states
            .iter()
            .find(|(node, _)| *node == id)
            .map(|(_, state)| *state)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SelectionModel {
    selected: BTreeMap<String, BTreeSet<Owner>>,
    filters: NamedFilters,
    active: BTreeSet<String>,
    /// Regex rules of all active filters, in filter name order
    compiled: Vec<Regex>,
    global: Option<Regex>,
}

impl SelectionModel {
    pub fn new(filters: NamedFilters) -> Self {
        Self {
            filters,
            ..Self::default()
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    pub fn is_selected(&self, address: &str) -> bool {
        self.selected.contains_key(address)
    }

    pub fn selected_ids(&self) -> impl Iterator<Item = &str> {
        self.selected.keys().map(String::as_str)
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    pub fn active_filters(&self) -> impl Iterator<Item = &str> {
        self.active.iter().map(String::as_str)
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active.contains(name)
    }

    pub fn active_regexes(&self) -> &[Regex] {
        &self.compiled
    }

    pub fn global_regex(&self) -> Option<&Regex> {
        self.global.as_ref()
    }

    /// True when addresses or filter regexes restrict the view
    pub fn has_or_filter(&self) -> bool {
        !self.selected.is_empty() || !self.compiled.is_empty()
    }

    pub fn filters(&self) -> &NamedFilters {
        &self.filters
    }

    /// Selection state of one tree node
    pub fn state_of(&self, tree: &AddressTree, id: NodeId) -> SelectionState {
        tree.state_of(id, |address| self.is_selected(address))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Manual selection
    // ─────────────────────────────────────────────────────────────────────

    /// Flip a node: deselect its leaves if all are selected, else select them all
    ///
    /// A node without leaves is left alone and reports no states.
    pub fn toggle(&mut self, tree: &AddressTree, id: NodeId) -> ToggleReport {
        let leaves = tree.descendant_leaf_ids(id);
        if leaves.is_empty() {
            tracing::debug!("Node {} has no addresses, nothing to toggle", id);
            return ToggleReport::default();
        }

        if leaves.iter().all(|address| self.is_selected(address)) {
            self.deselect(leaves.iter().map(String::as_str));
        } else {
            self.select(leaves.iter().map(String::as_str));
        }

        let sets = tree.leaf_sets();
        let affected = std::iter::once(id)
            .chain(tree.descendants(id))
            .chain(tree.ancestors(id));
        let states = affected
            .map(|node| {
                let state = SelectionState::of(&sets[node], |address| self.is_selected(address));
                (node, state)
            })
            .collect();
        ToggleReport { states }
    }

    pub fn select<'a>(&mut self, addresses: impl IntoIterator<Item = &'a str>) {
        for address in addresses {
            self.selected
                .entry(address.to_string())
                .or_default()
                .insert(Owner::Manual);
        }
    }

    /// Select addresses typed by the user
    ///
    /// Only leaf identifiers may enter the selection: each address must be a
    /// three-part group address or a leaf of `tree`. Nothing is selected if
    /// any address is refused.
    pub fn select_addresses(&mut self, tree: &AddressTree, addresses: &[String]) -> Result<(), FilterError> {
        let leaves = tree.descendant_leaf_ids(tree.root());
        if let Some(bad) = addresses
            .iter()
            .find(|address| !is_group_address(address) && !leaves.contains(address.as_str()))
        {
            return Err(FilterError::NotAnAddress(bad.clone()));
        }
        self.select(addresses.iter().map(String::as_str));
        Ok(())
    }

    /// Remove addresses outright, whoever selected them
    pub fn deselect<'a>(&mut self, addresses: impl IntoIterator<Item = &'a str>) {
        for address in addresses {
            self.selected.remove(address);
        }
    }

    /// Empty the selection and deactivate every named filter
    pub fn clear_selection(&mut self) {
        self.selected.clear();
        self.active.clear();
        self.rebuild_regexes();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Named filters
    // ─────────────────────────────────────────────────────────────────────

    /// Returns false if the filter was already active
    pub fn activate(&mut self, name: &str) -> Result<bool, FilterError> {
        let filter = self
            .filters
            .get(name)
            .ok_or_else(|| FilterError::UnknownFilter(name.to_string()))?;
        if self.active.contains(name) {
            return Ok(false);
        }

        let owner = Owner::Filter(name.to_string());
        for address in filter.addresses() {
            self.selected
                .entry(address.clone())
                .or_default()
                .insert(owner.clone());
        }
        self.active.insert(name.to_string());
        self.rebuild_regexes();
        tracing::debug!("Activated named filter '{}'", name);
        Ok(true)
    }

    /// Returns false if the filter was not active
    pub fn deactivate(&mut self, name: &str) -> bool {
        if !self.active.remove(name) {
            return false;
        }
        self.withdraw(name);
        self.rebuild_regexes();
        tracing::debug!("Deactivated named filter '{}'", name);
        true
    }

    /// Activate an inactive filter or deactivate an active one; returns the new state
    pub fn toggle_filter(&mut self, name: &str) -> Result<bool, FilterError> {
        if self.deactivate(name) {
            return Ok(false);
        }
        self.activate(name)
    }

    /// Store the current selection as a named filter of sorted addresses
    pub fn save_selection_as(&mut self, name: &str) -> Result<(), FilterError> {
        if self.selected.is_empty() {
            return Err(FilterError::EmptySelection);
        }
        let rules: Vec<String> = self.selected.keys().cloned().collect();
        self.filters.insert(name, rules);
        self.resync(name);
        Ok(())
    }

    pub fn create_filter(&mut self, name: &str) -> Result<(), FilterError> {
        self.filters.create(name)
    }

    pub fn delete_filter(&mut self, name: &str) -> Result<(), FilterError> {
        self.deactivate(name);
        self.filters.delete(name).map(|_| ())
    }

    pub fn add_rule(&mut self, name: &str, rule: &str) -> Result<(), FilterError> {
        self.filters.add_rule(name, rule)?;
        self.resync(name);
        Ok(())
    }

    pub fn edit_rule(&mut self, name: &str, old: &str, new: &str) -> Result<(), FilterError> {
        self.filters.edit_rule(name, old, new)?;
        self.resync(name);
        Ok(())
    }

    pub fn delete_rule(&mut self, name: &str, rule: &str) -> Result<(), FilterError> {
        self.filters.delete_rule(name, rule)?;
        self.resync(name);
        Ok(())
    }

    /// Swap in a freshly loaded filter set, keeping still-existing filters active
    pub fn replace_filters(&mut self, filters: NamedFilters) {
        self.filters = filters;
        let active: Vec<String> = self.active.iter().cloned().collect();
        for name in active {
            if self.filters.contains(&name) {
                self.resync(&name);
            } else {
                self.deactivate(&name);
            }
        }
        self.rebuild_regexes();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Global regex
    // ─────────────────────────────────────────────────────────────────────

    /// Set the ANDed global regex; empty input clears it
    ///
    /// An invalid pattern also clears it, and the compile error is returned.
    pub fn set_global_regex(&mut self, pattern: Option<&str>) -> Result<(), FilterError> {
        let pattern = pattern.map(str::trim).filter(|p| !p.is_empty());
        self.global = None;
        if let Some(pattern) = pattern {
            self.global = Some(compile_pattern(pattern)?);
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    /// Drop a filter's claim on every address; unclaimed addresses leave the selection
    fn withdraw(&mut self, name: &str) {
        let owner = Owner::Filter(name.to_string());
        self.selected.retain(|_, owners| {
            owners.remove(&owner);
            !owners.is_empty()
        });
    }

    /// Re-apply an active filter after its rules changed
    fn resync(&mut self, name: &str) {
        if !self.active.contains(name) {
            return;
        }
        self.withdraw(name);
        let owner = Owner::Filter(name.to_string());
        if let Some(filter) = self.filters.get(name) {
            for address in filter.addresses() {
                self.selected
                    .entry(address.clone())
                    .or_default()
                    .insert(owner.clone());
            }
        }
        self.rebuild_regexes();
    }

    fn rebuild_regexes(&mut self) {
        self.compiled = self
            .active
            .iter()
            .filter_map(|name| self.filters.get(name))
            .flat_map(|filter| filter.patterns().iter().cloned())
            .collect();
    }
}
