use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashMap};

/// Hint context used when no node-specific list applies.
pub const GLOBAL_HINTS: &str = "global";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub objective: String,
    #[serde(default)]
    pub codes: BTreeMap<String, String>,
    #[serde(default)]
    pub nodes: BTreeMap<String, Node>,
    #[serde(default)]
    pub hints: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub complete_message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub banner: String,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub visible: bool,
    /// Map reference for the node's site, e.g. "C-7".
    #[serde(default)]
    pub grid: Option<String>,
    #[serde(default)]
    pub files: BTreeMap<String, FileEntry>,
}

/// A file on a node: plain text in the descriptor, or `{"image": .., "caption": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FileEntry {
    Text(String),
    Image {
        #[serde(rename = "image")]
        src: String,
        #[serde(default)]
        caption: Option<String>,
    },
}

impl Scenario {
    /// Field address table. Nodes without an address (or with an empty one) are unreachable by IP.
    pub fn ip_routes(&self) -> HashMap<String, String> {
        self.nodes
            .iter()
            .filter_map(|(key, node)| {
                node.ip
                    .as_deref()
                    .map(str::trim)
                    .filter(|ip| !ip.is_empty())
                    .map(|ip| (ip.to_string(), key.clone()))
            })
            .collect()
    }

    /// Name shown to the player for a node or code key.
    ///
    /// Visible nodes use their name, hidden ones an ordinal ("Node 2"), and a
    /// code key with no node entry falls back to the upper-cased key.
    pub fn display_label(&self, key: &str) -> String {
        match self.nodes.get(key) {
            Some(node) if node.visible => {
                if node.name.is_empty() {
                    key.to_string()
                } else {
                    node.name.clone()
                }
            }
            Some(_) => {
                let ordinal = self.nodes.keys().position(|k| k == key).unwrap_or(0) + 1;
                format!("Node {}", ordinal)
            }
            None => key.to_uppercase(),
        }
    }

    /// `" @ <grid>"` for a node with a grid reference, otherwise empty.
    pub fn grid_suffix(&self, key: &str) -> String {
        self.nodes
            .get(key)
            .and_then(|n| n.grid.as_deref())
            .filter(|g| !g.is_empty())
            .map(|g| format!(" @ {}", g))
            .unwrap_or_default()
    }

    pub fn hints_for(&self, context: &str) -> &[String] {
        self.hints.get(context).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn file(&self, node: &str, path: &str) -> Option<&FileEntry> {
        self.nodes.get(node).and_then(|n| n.files.get(path))
    }

    pub fn heading(&self) -> &str {
        if self.title.is_empty() {
            &self.id
        } else {
            &self.title
        }
    }
}

// Text-format scenarios carry every value as a string, so accept "true"/"false" too.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Text(s) => s.trim().eq_ignore_ascii_case("true"),
    })
}
