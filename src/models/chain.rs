//! Chain rule definitions
//!
//! A chain rule inserts intermediate hops in front of the nodes it claims,
//! so a client dials through the hop sequence before reaching the node's
//! own destination.

use serde::{Deserialize, Serialize};

use super::proxy_group_config::{ProxyGroupType, UrlTestOptions};
use super::tag_condition::TagConditions;

/// One hop of a chain. Each variant has its own resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChainHop {
    /// A proxy group that already exists in the base template
    TemplateGroup { group: String },
    /// A proxy group synthesized from the nodes matching `conditions`
    CustomGroup {
        name: String,
        #[serde(default)]
        group_type: ProxyGroupType,
        #[serde(default)]
        conditions: TagConditions,
        #[serde(default)]
        url_test: Option<UrlTestOptions>,
    },
    /// Whichever node currently satisfies `conditions`
    DynamicNode { conditions: TagConditions },
    /// A fixed node, referenced by id
    SpecifiedNode { node_id: u64 },
}

impl ChainHop {
    pub fn kind(&self) -> &'static str {
        match self {
            ChainHop::TemplateGroup { .. } => "template_group",
            ChainHop::CustomGroup { .. } => "custom_group",
            ChainHop::DynamicNode { .. } => "dynamic_node",
            ChainHop::SpecifiedNode { .. } => "specified_node",
        }
    }
}

/// Selects the nodes a chain rule claims
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetConfig {
    #[default]
    All,
    Conditions { conditions: TagConditions },
    SpecifiedNode { node_id: u64 },
}

/// A chain rule attached to one subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainRule {
    pub id: u64,
    pub subscription_id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sort: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub chain: Vec<ChainHop>,
    #[serde(default)]
    pub target: TargetConfig,
}

fn default_enabled() -> bool {
    true
}

impl ChainRule {
    /// Label used in logs and coverage reports
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            format!("#{}", self.id)
        } else {
            format!("{} (#{})", self.name, self.id)
        }
    }
}
