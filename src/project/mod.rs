//! Project lookup: address names and telegram size classes
//!
//! The ETS project itself is parsed elsewhere. What reaches us is a JSON
//! export of it (the same shape the project cache uses, optionally wrapped
//! in a `"project"` key) from which we only keep what the log engine needs:
//! device names, group address names and each group address's datapoint
//! type, which decides the estimated telegram size.

pub mod tree;

pub use tree::{AddressTree, NodeId, NodeKind, SelectionState, TreeNode};

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Telegram size model
// ─────────────────────────────────────────────────────────────────────────────

/// Bytes every telegram carries regardless of payload
pub const FRAME_OVERHEAD: u32 = 10;

/// Payload size assumed when the datapoint type is unknown
pub const DEFAULT_PAYLOAD_SIZE: u32 = 1;

/// Frame size for group addresses without size information
pub const DEFAULT_FRAME_SIZE: u32 = FRAME_OVERHEAD + DEFAULT_PAYLOAD_SIZE;

/// Payload bytes by main datapoint type number
pub fn dpt_payload_size(dpt_main: u32) -> Option<u32> {
    let size = match dpt_main {
        1..=3 => 0,
        4..=6 => 1,
        7..=9 => 2,
        10 | 11 => 3,
        12..=15 => 4,
        16 => 14,
        17 | 18 | 20 => 1,
        19 => 8,
        232 => 3,
        _ => return None,
    };
    Some(size)
}

// ─────────────────────────────────────────────────────────────────────────────
// Address book
// ─────────────────────────────────────────────────────────────────────────────

/// What we know about one group address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupAddressInfo {
    pub name: String,
    /// Main datapoint type number (9 for "9.001")
    pub dpt_main: Option<u32>,
}

impl GroupAddressInfo {
    /// Estimated size of one telegram to this address
    pub fn frame_size(&self) -> u32 {
        let payload = self
            .dpt_main
            .and_then(dpt_payload_size)
            .unwrap_or(DEFAULT_PAYLOAD_SIZE);
        FRAME_OVERHEAD + payload
    }
}

/// Read-only name and size lookup consumed by the parser and statistics
#[derive(Debug, Clone, Default)]
pub struct AddressBook {
    devices: HashMap<String, String>,
    group_addresses: HashMap<String, GroupAddressInfo>,
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("cannot read project export {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("project export {} is not valid JSON: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, address: impl Into<String>, name: impl Into<String>) -> Self {
        self.devices.insert(address.into(), name.into());
        self
    }

    pub fn with_group_address(
        mut self,
        address: impl Into<String>,
        name: impl Into<String>,
        dpt: Option<&str>,
    ) -> Self {
        self.group_addresses.insert(
            address.into(),
            GroupAddressInfo {
                name: name.into(),
                dpt_main: dpt.and_then(parse_dpt_main),
            },
        );
        self
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty() && self.group_addresses.is_empty()
    }

    /// Name of a device by individual address (empty names count as unknown)
    pub fn device_name(&self, address: &str) -> Option<&str> {
        self.devices
            .get(address)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Name of a group address (empty names count as unknown)
    pub fn group_name(&self, address: &str) -> Option<&str> {
        self.group_addresses
            .get(address)
            .map(|info| info.name.as_str())
            .filter(|name| !name.is_empty())
    }

    pub fn group_address(&self, address: &str) -> Option<&GroupAddressInfo> {
        self.group_addresses.get(address)
    }

    /// All known group addresses, in no particular order
    pub fn group_addresses(&self) -> impl Iterator<Item = (&str, &GroupAddressInfo)> {
        self.group_addresses
            .iter()
            .map(|(address, info)| (address.as_str(), info))
    }

    /// Estimated telegram size for a group address
    pub fn frame_size(&self, address: &str) -> u32 {
        self.group_addresses
            .get(address)
            .map(GroupAddressInfo::frame_size)
            .unwrap_or(DEFAULT_FRAME_SIZE)
    }

    /// Build from a JSON project export
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let file: ProjectFile = serde_json::from_str(json)?;
        let export = match file {
            ProjectFile::Wrapped { project } => project,
            ProjectFile::Bare(export) => export,
        };

        let devices = export
            .devices
            .into_iter()
            .map(|(address, device)| {
                let name = device.best_name();
                (address, name)
            })
            .collect();

        let group_addresses = export
            .group_addresses
            .into_iter()
            .map(|(key, ga)| {
                let address = ga.address.clone().unwrap_or(key);
                let info = GroupAddressInfo {
                    name: ga.best_name(),
                    dpt_main: ga.dpt.as_ref().and_then(dpt_main_from_json),
                };
                (address, info)
            })
            .collect();

        Ok(Self {
            devices,
            group_addresses,
        })
    }

    /// Load a JSON project export from disk
    pub fn load(path: &Path) -> Result<Self, ProjectError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ProjectError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let book = Self::from_json_str(&contents).map_err(|source| ProjectError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(
            "Loaded project export {} ({} devices, {} group addresses)",
            path.display(),
            book.devices.len(),
            book.group_addresses.len()
        );
        Ok(book)
    }
}

/// Main number of a datapoint type string ("9.001" -> 9, "DPST-9-1" -> 9)
fn parse_dpt_main(dpt: &str) -> Option<u32> {
    let dpt = dpt.trim();
    let rest = dpt
        .strip_prefix("DPST-")
        .or_else(|| dpt.strip_prefix("DPT-"))
        .unwrap_or(dpt);
    rest.split(['.', '-']).next()?.trim().parse().ok()
}

fn dpt_main_from_json(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::Object(map) => map
            .get("main")
            .and_then(serde_json::Value::as_u64)
            .and_then(|main| u32::try_from(main).ok()),
        serde_json::Value::String(s) => parse_dpt_main(s),
        serde_json::Value::Number(n) => n.as_u64().and_then(|main| u32::try_from(main).ok()),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON export (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProjectFile {
    Wrapped { project: ProjectExport },
    Bare(ProjectExport),
}

#[derive(Debug, Deserialize, Default)]
struct ProjectExport {
    #[serde(default)]
    devices: HashMap<String, DeviceEntry>,
    #[serde(default)]
    group_addresses: HashMap<String, GroupAddressEntry>,
}

#[derive(Debug, Deserialize, Default)]
struct DeviceEntry {
    name: Option<String>,
    description: Option<String>,
}

impl DeviceEntry {
    fn best_name(&self) -> String {
        first_non_empty([&self.name, &self.description])
    }
}

#[derive(Debug, Deserialize, Default)]
struct GroupAddressEntry {
    name: Option<String>,
    address: Option<String>,
    description: Option<String>,
    dpt: Option<serde_json::Value>,
}

impl GroupAddressEntry {
    fn best_name(&self) -> String {
        first_non_empty([&self.name, &self.description])
    }
}

fn first_non_empty<const N: usize>(candidates: [&Option<String>; N]) -> String {
    candidates
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}
