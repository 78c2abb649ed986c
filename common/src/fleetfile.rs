//! Line-oriented fleet description written after bootstrap and read by the
//! benchmark registry.
//!
//! ```text
//! # node        member-id (cluster secret)   address
//! node_0        3f9c...e1                    /ip4/10.0.0.1/tcp/14004
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. Members of a node
//! keep file order; a member id appears at most once per node.

use crate::error::{FleetError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One member endpoint of a logical node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetEntry {
    pub node: String,
    pub id: String,
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetDescription {
    entries: Vec<FleetEntry>,
}

impl FleetDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: FleetEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[FleetEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Node names in order of first appearance
    pub fn node_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !names.contains(&entry.node.as_str()) {
                names.push(&entry.node);
            }
        }
        names
    }

    /// Parse a description; `origin` names the source in error messages
    pub fn parse(text: &str, origin: &str) -> Result<Self> {
        let mut description = Self::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();

        for (i, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            let [node, id, address] = fields[..] else {
                return Err(FleetError::Parse {
                    path: origin.to_string(),
                    line: i + 1,
                    message: format!("expected `<node> <id> <address>`, got {} fields", fields.len()),
                });
            };

            if !seen.insert((node.to_string(), id.to_string())) {
                return Err(FleetError::Parse {
                    path: origin.to_string(),
                    line: i + 1,
                    message: format!("member {} listed twice for node {}", id, node),
                });
            }

            description.push(FleetEntry {
                node: node.to_string(),
                id: id.to_string(),
                address: address.to_string(),
            });
        }

        Ok(description)
    }

    pub fn render(&self) -> String {
        let mut out = String::from("# node id address\n");
        for entry in &self.entries {
            out.push_str(&format!("{} {} {}\n", entry.node, entry.id, entry.address));
        }
        out
    }
}
