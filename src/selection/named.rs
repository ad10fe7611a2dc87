//! Named filters and their YAML document
//!
//! The document is a mapping of filter name to a list of rules:
//!
//! ```yaml
//! # KNX-Lens Named Selection Groups
//!
//! Lights:
//!   - 1/2/3 # Kitchen light
//!   - 'licht|light'
//!
//! Empty: []
//! ```
//!
//! A rule shaped like a three-part group address is an exact address; any
//! other rule is a case-insensitive regex over the record's search text.

use crate::error::FilterError;
use crate::project::AddressBook;
use regex::{Regex, RegexBuilder};
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const DOCUMENT_HEADER: &str = "# KNX-Lens Named Selection Groups";

/// Whether a rule is a literal group address (`main/middle/sub`, digits only)
pub fn is_group_address(rule: &str) -> bool {
    let parts: Vec<&str> = rule.split('/').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
}

/// Compile a regex rule the way every filter regex is compiled
pub fn compile_pattern(pattern: &str) -> Result<Regex, FilterError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| FilterError::RegexCompile {
            pattern: pattern.to_string(),
            source,
        })
}

/// Check a rule typed by the user. Address rules always pass.
pub fn validate_rule(rule: &str) -> Result<(), FilterError> {
    if is_group_address(rule) {
        return Ok(());
    }
    compile_pattern(rule).map(|_| ())
}

/// One named filter: its rules as written plus what they expand to
#[derive(Debug, Clone, Default)]
pub struct NamedFilter {
    rules: Vec<String>,
    addresses: BTreeSet<String>,
    patterns: Vec<Regex>,
}

impl NamedFilter {
    /// Build from rule text. Invalid regexes are kept as text but not compiled.
    pub fn from_rules(rules: Vec<String>) -> Self {
        let mut addresses = BTreeSet::new();
        let mut patterns = Vec::new();
        for rule in &rules {
            if is_group_address(rule) {
                addresses.insert(rule.clone());
                continue;
            }
            match compile_pattern(rule) {
                Ok(re) => patterns.push(re),
                Err(e) => tracing::debug!("Ignoring rule: {}", e),
            }
        }
        Self {
            rules,
            addresses,
            patterns,
        }
    }

    pub fn rules(&self) -> &[String] {
        &self.rules
    }

    /// Exact group addresses among the rules
    pub fn addresses(&self) -> &BTreeSet<String> {
        &self.addresses
    }

    /// Compiled regex rules
    pub fn patterns(&self) -> &[Regex] {
        &self.patterns
    }

    fn rebuild(&mut self) {
        *self = Self::from_rules(std::mem::take(&mut self.rules));
    }
}

/// All named filters, ordered by name, optionally backed by a file
#[derive(Debug, Clone, Default)]
pub struct NamedFilters {
    path: Option<PathBuf>,
    filters: BTreeMap<String, NamedFilter>,
}

impl NamedFilters {
    /// In-memory set, never persisted
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the document at `path`, creating an empty one if it is missing
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, FilterError> {
        let path = path.into();
        if !path.exists() {
            tracing::info!("Creating empty named filter file {}", path.display());
            let filters = Self {
                path: Some(path),
                filters: BTreeMap::new(),
            };
            filters.save(&AddressBook::default())?;
            return Ok(filters);
        }

        let contents = std::fs::read_to_string(&path).map_err(|source| FilterError::Persistence {
            path: path.clone(),
            source,
        })?;
        let filters = parse_document(&contents).map_err(|source| FilterError::Format {
            path: path.clone(),
            source,
        })?;
        tracing::info!("Loaded {} named filters from {}", filters.len(), path.display());

        Ok(Self {
            path: Some(path),
            filters,
        })
    }

    /// Parse a document without a backing file
    pub fn from_yaml_str(contents: &str) -> Result<Self, serde_yaml::Error> {
        Ok(Self {
            path: None,
            filters: parse_document(contents)?,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the document back to its file (no-op for in-memory sets)
    pub fn save(&self, book: &AddressBook) -> Result<(), FilterError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        std::fs::write(path, self.to_yaml(book)).map_err(|source| FilterError::Persistence {
            path: path.clone(),
            source,
        })?;
        tracing::debug!("Saved {} named filters to {}", self.filters.len(), path.display());
        Ok(())
    }

    /// Render the document; address rules get their name as a comment
    pub fn to_yaml(&self, book: &AddressBook) -> String {
        let mut out = format!("{}\n\n", DOCUMENT_HEADER);
        for (name, filter) in &self.filters {
            if filter.rules.is_empty() {
                let _ = writeln!(out, "{}: []\n", yaml_scalar(name));
                continue;
            }
            let _ = writeln!(out, "{}:", yaml_scalar(name));
            for rule in &filter.rules {
                if is_group_address(rule) {
                    let label = book.group_name(rule).unwrap_or("N/A");
                    let _ = writeln!(out, "  - {} # {}", rule, label);
                } else {
                    let _ = writeln!(out, "  - {}", yaml_scalar(rule));
                }
            }
            out.push('\n');
        }
        out
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&NamedFilter> {
        self.filters.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.filters.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NamedFilter)> {
        self.filters.iter().map(|(name, filter)| (name.as_str(), filter))
    }

    /// New empty filter
    pub fn create(&mut self, name: &str) -> Result<(), FilterError> {
        if self.filters.contains_key(name) {
            return Err(FilterError::DuplicateFilter(name.to_string()));
        }
        self.filters.insert(name.to_string(), NamedFilter::default());
        Ok(())
    }

    /// Store rules under `name`, replacing an existing filter of that name
    pub fn insert(&mut self, name: &str, rules: Vec<String>) {
        self.filters
            .insert(name.to_string(), NamedFilter::from_rules(rules));
    }

    pub fn delete(&mut self, name: &str) -> Result<NamedFilter, FilterError> {
        self.filters
            .remove(name)
            .ok_or_else(|| FilterError::UnknownFilter(name.to_string()))
    }

    pub fn add_rule(&mut self, name: &str, rule: &str) -> Result<(), FilterError> {
        let rule = rule.trim();
        validate_rule(rule)?;
        let filter = self.get_mut(name)?;
        filter.rules.push(rule.to_string());
        filter.rebuild();
        Ok(())
    }

    pub fn edit_rule(&mut self, name: &str, old: &str, new: &str) -> Result<(), FilterError> {
        let new = new.trim();
        validate_rule(new)?;
        let filter = self.get_mut(name)?;
        let index = filter
            .rules
            .iter()
            .position(|r| r == old)
            .ok_or_else(|| FilterError::UnknownRule {
                filter: name.to_string(),
                rule: old.to_string(),
            })?;
        filter.rules[index] = new.to_string();
        filter.rebuild();
        Ok(())
    }

    pub fn delete_rule(&mut self, name: &str, rule: &str) -> Result<(), FilterError> {
        let filter = self.get_mut(name)?;
        let index = filter
            .rules
            .iter()
            .position(|r| r == rule)
            .ok_or_else(|| FilterError::UnknownRule {
                filter: name.to_string(),
                rule: rule.to_string(),
            })?;
        filter.rules.remove(index);
        filter.rebuild();
        Ok(())
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut NamedFilter, FilterError> {
        self.filters
            .get_mut(name)
            .ok_or_else(|| FilterError::UnknownFilter(name.to_string()))
    }
}

/// Quote a string only as much as YAML needs
fn yaml_scalar(s: &str) -> String {
    match serde_yaml::to_string(s) {
        Ok(rendered) => rendered.trim_end().to_string(),
        Err(_) => format!("'{}'", s.replace('\'', "''")),
    }
}

fn parse_document(contents: &str) -> Result<BTreeMap<String, NamedFilter>, serde_yaml::Error> {
    let mut filters = BTreeMap::new();
    let only_comments = contents.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#')
    });
    if only_comments {
        return Ok(filters);
    }

    let document: Value = serde_yaml::from_str(contents)?;
    let Value::Mapping(mapping) = document else {
        tracing::debug!("Named filter document is not a mapping, ignoring it");
        return Ok(filters);
    };

    for (key, value) in mapping {
        let Some(name) = scalar_text(&key) else {
            continue;
        };
        let rules = match value {
            Value::Sequence(items) => items.iter().filter_map(scalar_text).collect(),
            Value::Null => Vec::new(),
            _ => {
                tracing::debug!("Named filter '{}' is not a list, skipping", name);
                continue;
            }
        };
        filters.insert(name, NamedFilter::from_rules(rules));
    }
    Ok(filters)
}

/// Text of a scalar rule or name; numbers and booleans are taken as written
fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_group_address() {
        assert!(is_group_address("1/2/3"));
        assert!(is_group_address("31/7/255"));
        assert!(!is_group_address("1/2"));
        assert!(!is_group_address("1/2/x"));
        assert!(!is_group_address("1//3"));
        assert!(!is_group_address("1.1.5"));
    }

    #[test]
    fn test_rules_split_into_addresses_and_patterns() {
        let filter = NamedFilter::from_rules(vec![
            "1/2/3".into(),
            "licht".into(),
            "([unclosed".into(),
        ]);
        assert_eq!(filter.rules().len(), 3);
        assert_eq!(filter.addresses().len(), 1);
        assert_eq!(filter.patterns().len(), 1);
        assert!(filter.patterns()[0].is_match("Kitchen LICHT"));
    }

    #[test]
    fn test_parse_document_ignores_comments_and_bad_entries() {
        let yaml = r#"
# header
Lights:
  - 1/2/3 # Kitchen light
  - 'licht|light'
  - "[bad"
Empty: []
Nulled:
NotAList: 42
"#;
        let filters = NamedFilters::from_yaml_str(yaml).unwrap();
        assert_eq!(filters.names().collect::<Vec<_>>(), vec!["Empty", "Lights", "Nulled"]);
        let lights = filters.get("Lights").unwrap();
        assert_eq!(lights.rules(), &["1/2/3", "licht|light", "[bad"]);
        assert_eq!(lights.patterns().len(), 1);
        assert!(filters.get("Nulled").unwrap().rules().is_empty());
    }

    #[test]
    fn test_yaml_round_trip_with_comments() {
        let book = AddressBook::new().with_group_address("1/2/3", "Kitchen light", None);
        let mut filters = NamedFilters::new();
        filters.insert("Lights", vec!["1/2/3".into(), "error: *".into(), "9/9/9".into()]);
        filters.create("Empty").unwrap();

        let yaml = filters.to_yaml(&book);
        assert!(yaml.starts_with(DOCUMENT_HEADER));
        assert!(yaml.contains("  - 1/2/3 # Kitchen light\n"));
        assert!(yaml.contains("  - 9/9/9 # N/A\n"));
        assert!(yaml.contains("Empty: []\n"));

        let back = NamedFilters::from_yaml_str(&yaml).unwrap();
        assert_eq!(
            back.get("Lights").unwrap().rules(),
            filters.get("Lights").unwrap().rules()
        );
        assert!(back.get("Empty").unwrap().rules().is_empty());
    }

    #[test]
    fn test_missing_file_is_created_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("named_filters.yaml");
        let filters = NamedFilters::load(&path).unwrap();
        assert!(filters.is_empty());
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with(DOCUMENT_HEADER));
        assert!(NamedFilters::load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_rule_management() {
        let mut filters = NamedFilters::new();
        filters.create("F").unwrap();
        assert!(matches!(filters.create("F"), Err(FilterError::DuplicateFilter(_))));

        filters.add_rule("F", "1/1/1").unwrap();
        filters.add_rule("F", "temp").unwrap();
        assert!(matches!(
            filters.add_rule("F", "(oops"),
            Err(FilterError::RegexCompile { .. })
        ));
        assert!(matches!(
            filters.add_rule("G", "x"),
            Err(FilterError::UnknownFilter(_))
        ));

        filters.edit_rule("F", "temp", "1/1/2").unwrap();
        let f = filters.get("F").unwrap();
        assert_eq!(f.addresses().len(), 2);
        assert!(f.patterns().is_empty());

        assert!(matches!(
            filters.delete_rule("F", "nope"),
            Err(FilterError::UnknownRule { .. })
        ));
        filters.delete_rule("F", "1/1/1").unwrap();
        assert_eq!(filters.get("F").unwrap().rules(), &["1/1/2"]);

        filters.delete("F").unwrap();
        assert!(filters.is_empty());
    }

    #[test]
    fn test_save_and_reload_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filters.yaml");
        let mut filters = NamedFilters::load(&path).unwrap();
        filters.insert("Heating", vec!["3/0/1".into(), "heiz".into()]);
        filters.save(&AddressBook::default()).unwrap();

        let reloaded = NamedFilters::load(&path).unwrap();
        assert_eq!(reloaded.get("Heating").unwrap().rules(), &["3/0/1", "heiz"]);
    }
}
