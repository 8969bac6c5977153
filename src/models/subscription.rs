//! Subscription model definitions

use serde::{Deserialize, Serialize};

/// One entry of a subscription's ordered node selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionItem {
    Node {
        node_id: u64,
        #[serde(default)]
        sort: i32,
    },
    Group {
        group: String,
        #[serde(default)]
        sort: i32,
    },
}

impl SelectionItem {
    pub fn sort_key(&self) -> i32 {
        match self {
            SelectionItem::Node { sort, .. } | SelectionItem::Group { sort, .. } => *sort,
        }
    }
}

/// Filter configuration applied before deduplication and renaming.
///
/// List values are comma separated; blank entries are ignored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Maximum accepted latency in milliseconds, 0 disables the check
    pub max_delay: u32,
    /// Minimum accepted speed in MB/s, 0 disables the check
    pub min_speed: f64,
    pub country_whitelist: String,
    pub country_blacklist: String,
    pub tag_whitelist: String,
    pub tag_blacklist: String,
    /// Case-insensitive regular expressions matched against the original name
    pub node_name_whitelist: String,
    pub node_name_blacklist: String,
    pub protocol_whitelist: String,
    pub protocol_blacklist: String,
}

/// Output format flags and template selection
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Base template reference: a local path or an http(s) URL
    pub template: String,
    pub udp: Option<bool>,
    pub tfo: Option<bool>,
    pub skip_cert_verify: Option<bool>,
    /// Rules placed ahead of the template's own rules
    pub custom_rules: Vec<String>,
    /// Overrides the global setting for base64-wrapping plain lists
    pub list_base64: Option<bool>,
}

/// A named, user-configured view over the stored nodes
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Subscription {
    pub id: u64,
    pub name: String,
    pub selection: Vec<SelectionItem>,
    pub filter: FilterConfig,
    /// Rename template, e.g. `{{index}}-{{country}}-{{name}}`
    pub node_name_rule: String,
    /// JSON list of `{"match", "replace"}` rules applied before renaming
    pub node_name_preprocess: String,
    /// JSON key specification for deduplication
    pub deduplication_rule: String,
    pub config: OutputConfig,
}

impl Subscription {
    /// Selection items in ascending sort order, ties keeping their stored order
    pub fn ordered_selection(&self) -> Vec<&SelectionItem> {
        let mut items: Vec<&SelectionItem> = self.selection.iter().collect();
        items.sort_by_key(|item| item.sort_key());
        items
    }
}
