//! Traffic statistics over the record cache
//!
//! One pass over the records feeds three groupings:
//!
//! - source device, then the group addresses it sent to
//! - group address, then the devices that sent to it
//! - group address hierarchy: main group, middle group, address
//!
//! Bytes are estimated per telegram from the destination's datapoint type.
//! Percentages are computed afterwards against each grouping's own total.

pub mod cycle;

pub use cycle::estimate_cycle;

use crate::parser::{timestamp_epoch, LogRecord};
use crate::project::AddressBook;
use serde::Serialize;
use std::collections::HashMap;

/// Which grouping to look at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    BySource,
    ByDestination,
    Hierarchy,
}

impl Grouping {
    pub fn title(&self) -> &'static str {
        match self {
            Self::BySource => "Source → destination",
            Self::ByDestination => "Destination → source",
            Self::Hierarchy => "Group address hierarchy",
        }
    }
}

/// One line of a statistics tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatEntry {
    pub key: String,
    pub label: String,
    pub count: u64,
    pub bytes: u64,
    pub percent: f64,
    /// Estimated send interval, leaf entries only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StatEntry>,
}

impl StatEntry {
    fn group(key: String, label: String) -> Self {
        Self {
            key,
            label,
            count: 0,
            bytes: 0,
            percent: 0.0,
            cycle_seconds: None,
            children: Vec::new(),
        }
    }

    /// Indented text lines for this entry and its children
    pub fn render(&self, depth: usize, out: &mut Vec<String>) {
        let mut line = format!(
            "{}{}  Share: {:.2}%  ({} telegrams, {} bytes)",
            "  ".repeat(depth),
            self.label,
            self.percent,
            self.count,
            self.bytes
        );
        if let Some(cycle) = self.cycle_seconds {
            line.push_str(&format!("  Cycle: ~{}s", cycle.round() as i64));
        }
        out.push(line);
        for child in &self.children {
            child.render(depth + 1, out);
        }
    }
}

/// All three groupings, computed together
#[derive(Debug, Clone, Default, Serialize)]
pub struct Statistics {
    pub total_count: u64,
    pub total_bytes: u64,
    pub by_source: Vec<StatEntry>,
    pub by_destination: Vec<StatEntry>,
    pub hierarchy: Vec<StatEntry>,
}

#[derive(Debug, Default)]
struct Tally {
    count: u64,
    bytes: u64,
    times: Vec<f64>,
}

impl Tally {
    fn add(&mut self, bytes: u64, time: Option<f64>) {
        self.count += 1;
        self.bytes += bytes;
        if let Some(time) = time {
            self.times.push(time);
        }
    }
}

/// `id — name`, or just the id when the name adds nothing
pub fn format_label(id: &str, name: &str) -> String {
    let name = name.trim();
    if name.is_empty() || name == id || name == "N/A" {
        id.to_string()
    } else {
        format!("{} — {}", id, name)
    }
}

impl Statistics {
    pub fn compute<'a>(records: impl IntoIterator<Item = &'a LogRecord>, book: &AddressBook) -> Self {
        let mut pairs: HashMap<(&str, &str), Tally> = HashMap::new();
        let mut per_destination: HashMap<&str, Tally> = HashMap::new();
        let mut source_names: HashMap<&str, &str> = HashMap::new();
        let mut dest_names: HashMap<&str, &str> = HashMap::new();
        let mut total_count = 0;
        let mut total_bytes = 0;

        for record in records {
            let bytes = u64::from(book.frame_size(&record.dest_id));
            let time = timestamp_epoch(&record.timestamp);

            pairs
                .entry((record.source_id.as_str(), record.dest_id.as_str()))
                .or_default()
                .add(bytes, time);
            per_destination
                .entry(record.dest_id.as_str())
                .or_default()
                .add(bytes, time);
            source_names.insert(&record.source_id, &record.source_name);
            dest_names.insert(&record.dest_id, &record.dest_name);

            total_count += 1;
            total_bytes += bytes;
        }

        let source_label = |id: &str| format_label(id, source_names.get(id).copied().unwrap_or(""));
        let dest_label = |id: &str| format_label(id, dest_names.get(id).copied().unwrap_or(""));

        let by_source = two_level(&pairs, false, &source_label, &dest_label);
        let by_destination = two_level(&pairs, true, &dest_label, &source_label);
        let hierarchy = address_hierarchy(&per_destination, &dest_label);

        let stats = Self {
            total_count,
            total_bytes,
            by_source,
            by_destination,
            hierarchy,
        };
        tracing::debug!(
            "Statistics over {} telegrams ({} bytes): {} sources, {} destinations",
            stats.total_count,
            stats.total_bytes,
            stats.by_source.len(),
            stats.by_destination.len()
        );
        stats
    }

    pub fn grouping(&self, grouping: Grouping) -> &[StatEntry] {
        match grouping {
            Grouping::BySource => &self.by_source,
            Grouping::ByDestination => &self.by_destination,
            Grouping::Hierarchy => &self.hierarchy,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_count == 0
    }

    /// Text rendering of one grouping
    pub fn render(&self, grouping: Grouping) -> Vec<String> {
        let mut out = vec![grouping.title().to_string()];
        for entry in self.grouping(grouping) {
            entry.render(1, &mut out);
        }
        out
    }
}

/// Parent/child grouping over (source, destination) pairs
///
/// With `flip` the destination is the parent.
fn two_level(
    pairs: &HashMap<(&str, &str), Tally>,
    flip: bool,
    parent_label: &dyn Fn(&str) -> String,
    child_label: &dyn Fn(&str) -> String,
) -> Vec<StatEntry> {
    let mut parents: HashMap<&str, StatEntry> = HashMap::new();
    for (&(source, dest), tally) in pairs {
        let (parent, child) = if flip { (dest, source) } else { (source, dest) };
        let entry = parents
            .entry(parent)
            .or_insert_with(|| StatEntry::group(parent.to_string(), parent_label(parent)));
        entry.count += tally.count;
        entry.bytes += tally.bytes;
        entry.children.push(StatEntry {
            key: child.to_string(),
            label: child_label(child),
            count: tally.count,
            bytes: tally.bytes,
            percent: 0.0,
            cycle_seconds: estimate_cycle(&tally.times),
            children: Vec::new(),
        });
    }

    let mut entries: Vec<StatEntry> = parents.into_values().collect();
    let total: u64 = entries.iter().map(|e| e.bytes).sum();
    finish(&mut entries, total);
    entries
}

/// Main / middle / address rollup; addresses without three parts are left out
fn address_hierarchy(
    per_destination: &HashMap<&str, Tally>,
    label: &dyn Fn(&str) -> String,
) -> Vec<StatEntry> {
    let mut mains: HashMap<String, StatEntry> = HashMap::new();
    let mut middles: HashMap<String, StatEntry> = HashMap::new();

    for (&address, tally) in per_destination {
        let parts: Vec<&str> = address.split('/').collect();
        let [main, middle, _] = parts.as_slice() else {
            continue;
        };

        let main_entry = mains
            .entry(main.to_string())
            .or_insert_with(|| StatEntry::group(main.to_string(), format!("Main group {}", main)));
        main_entry.count += tally.count;
        main_entry.bytes += tally.bytes;

        let middle_key = format!("{}/{}", main, middle);
        let middle_entry = middles.entry(middle_key.clone()).or_insert_with(|| {
            StatEntry::group(middle_key.clone(), format!("Middle group {}", middle_key))
        });
        middle_entry.count += tally.count;
        middle_entry.bytes += tally.bytes;
        middle_entry.children.push(StatEntry {
            key: address.to_string(),
            label: label(address),
            count: tally.count,
            bytes: tally.bytes,
            percent: 0.0,
            cycle_seconds: estimate_cycle(&tally.times),
            children: Vec::new(),
        });
    }

    for (key, middle) in middles {
        let main = key.split('/').next().unwrap_or_default();
        if let Some(main_entry) = mains.get_mut(main) {
            main_entry.children.push(middle);
        }
    }

    let mut entries: Vec<StatEntry> = mains.into_values().collect();
    let total: u64 = entries.iter().map(|e| e.bytes).sum();
    finish(&mut entries, total);
    entries
}

/// Second pass: percentages against `total`, then sort by bytes (ties by key)
fn finish(entries: &mut [StatEntry], total: u64) {
    for entry in entries.iter_mut() {
        entry.percent = if total > 0 {
            entry.bytes as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        finish(&mut entry.children, total);
    }
    entries.sort_by(|a, b| b.bytes.cmp(&a.bytes).then_with(|| a.key.cmp(&b.key)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(ts: &str, src: &str, dest: &str) -> LogRecord {
        LogRecord::new(ts, src, "", dest, "", "1")
    }

    fn leaves(entries: &[StatEntry]) -> Vec<&StatEntry> {
        let mut out = Vec::new();
        for entry in entries {
            if entry.children.is_empty() {
                out.push(entry);
            } else {
                out.extend(leaves(&entry.children));
            }
        }
        out
    }

    fn book() -> AddressBook {
        AddressBook::new()
            .with_device("1.1.1", "Sensor")
            .with_group_address("1/1/1", "Temperature", Some("9.001"))
            .with_group_address("1/1/2", "Switch", Some("1.001"))
    }

    fn sample() -> Vec<LogRecord> {
        vec![
            LogRecord::new("10:00:00", "1.1.1", "Sensor", "1/1/1", "Temperature", "21"),
            LogRecord::new("10:00:01", "1.1.1", "Sensor", "1/1/2", "Switch", "On"),
            LogRecord::new("10:00:02", "1.1.2", "", "1/1/1", "Temperature", "22"),
            LogRecord::new("10:00:03", "1.1.2", "", "2/0/5", "", "x"),
            LogRecord::new("10:00:04", "1.1.2", "", "weird", "", "x"),
        ]
    }

    #[test]
    fn test_bytes_use_frame_sizes() {
        let stats = Statistics::compute(&sample(), &book());
        // 12 + 10 + 12 + 11 + 11
        assert_eq!(stats.total_bytes, 56);
        assert_eq!(stats.total_count, 5);

        let sensor = stats.by_source.iter().find(|e| e.key == "1.1.1").unwrap();
        assert_eq!(sensor.bytes, 22);
        assert_eq!(sensor.label, "1.1.1 — Sensor");
        assert_eq!(sensor.children[0].key, "1/1/1");
        assert_eq!(sensor.children[0].label, "1/1/1 — Temperature");
    }

    #[test]
    fn test_percentages_sum_to_100() {
        let stats = Statistics::compute(&sample(), &book());
        for grouping in [Grouping::BySource, Grouping::ByDestination, Grouping::Hierarchy] {
            let sum: f64 = leaves(stats.grouping(grouping)).iter().map(|e| e.percent).sum();
            assert!((sum - 100.0).abs() < 1e-6, "{:?} sums to {}", grouping, sum);
            let top: f64 = stats.grouping(grouping).iter().map(|e| e.percent).sum();
            assert!((top - 100.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_hierarchy_skips_non_three_part_addresses() {
        let stats = Statistics::compute(&sample(), &book());
        let keys: Vec<&str> = stats.hierarchy.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["1", "2"]);
        assert_eq!(stats.hierarchy[0].children[0].key, "1/1");
        assert_eq!(stats.hierarchy[0].children[0].children.len(), 2);
        assert!(!leaves(&stats.hierarchy).iter().any(|e| e.key == "weird"));
    }

    #[test]
    fn test_sorted_by_bytes_then_key() {
        let records = vec![
            rec("10:00:00", "1.1.9", "3/3/3"),
            rec("10:00:00", "1.1.1", "3/3/3"),
            rec("10:00:00", "1.1.5", "3/3/3"),
            rec("10:00:01", "1.1.5", "3/3/3"),
        ];
        let stats = Statistics::compute(&records, &AddressBook::default());
        let keys: Vec<&str> = stats.by_source.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["1.1.5", "1.1.1", "1.1.9"]);
    }

    #[test]
    fn test_cycle_on_regular_pair() {
        let records: Vec<LogRecord> = (0..30)
            .map(|i| rec(&format!("2024-05-01 10:00:{:02}", i), "1.1.1", "1/1/1"))
            .collect();
        let stats = Statistics::compute(&records, &book());
        assert_eq!(stats.by_source[0].children[0].cycle_seconds, Some(1.0));
        assert_eq!(stats.by_destination[0].children[0].cycle_seconds, Some(1.0));
        assert_eq!(stats.by_source[0].cycle_seconds, None);
    }

    #[test]
    fn test_empty_input() {
        let stats = Statistics::compute(&[], &AddressBook::default());
        assert!(stats.is_empty());
        assert!(stats.by_source.is_empty());
        assert_eq!(stats.render(Grouping::Hierarchy).len(), 1);
    }

    #[test]
    fn test_format_label() {
        assert_eq!(format_label("1/1/1", "Light"), "1/1/1 — Light");
        assert_eq!(format_label("1/1/1", "1/1/1"), "1/1/1");
        assert_eq!(format_label("1/1/1", "N/A"), "1/1/1");
        assert_eq!(format_label("1/1/1", ""), "1/1/1");
    }

    #[test]
    fn test_render_lines() {
        let stats = Statistics::compute(&sample(), &book());
        let lines = stats.render(Grouping::BySource);
        assert_eq!(lines[0], "Source → destination");
        assert!(lines[1].starts_with("  1.1.2"));
        assert!(lines[2].starts_with("    "));
    }
}
