use std::sync::Arc;

use log::info;
use serde::Serialize;

use super::compiler::prepare_nodes;
use crate::error::CompileError;
use crate::generator::RenderedNode;
use crate::models::{Diagnostics, FilterConfig, SelectionItem, Subscription};
use crate::store::NodeStore;

/// Parameters of a dry-run over an unsaved subscription
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreviewRequest {
    pub selection: Vec<SelectionItem>,
    pub filter: FilterConfig,
    pub node_name_rule: String,
    pub node_name_preprocess: String,
    pub deduplication_rule: String,
}

impl PreviewRequest {
    /// The ephemeral subscription the preview runs against
    pub fn to_subscription(&self) -> Subscription {
        Subscription {
            name: "preview".to_string(),
            selection: self.selection.clone(),
            filter: self.filter.clone(),
            node_name_rule: self.node_name_rule.clone(),
            node_name_preprocess: self.node_name_preprocess.clone(),
            deduplication_rule: self.deduplication_rule.clone(),
            ..Default::default()
        }
    }
}

impl From<&Subscription> for PreviewRequest {
    fn from(sub: &Subscription) -> Self {
        PreviewRequest {
            selection: sub.selection.clone(),
            filter: sub.filter.clone(),
            node_name_rule: sub.node_name_rule.clone(),
            node_name_preprocess: sub.node_name_preprocess.clone(),
            deduplication_rule: sub.deduplication_rule.clone(),
        }
    }
}

/// Builder for PreviewRequest
#[derive(Debug, Clone, Default)]
pub struct PreviewRequestBuilder {
    request: PreviewRequest,
    next_sort: i32,
}

impl PreviewRequestBuilder {
    /// Create a new default builder
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, item: SelectionItem) -> Self {
        self.request.selection.push(item);
        self.next_sort += 1;
        self
    }

    /// Select one node; items keep the order they are added in
    pub fn add_node(self, node_id: u64) -> Self {
        let sort = self.next_sort;
        self.push(SelectionItem::Node { node_id, sort })
    }

    /// Select every node of a group
    pub fn add_group(self, group: &str) -> Self {
        let sort = self.next_sort;
        self.push(SelectionItem::Group {
            group: group.to_string(),
            sort,
        })
    }

    /// Replace the selection, keeping the given sort keys
    pub fn selection(mut self, selection: Vec<SelectionItem>) -> Self {
        self.request.selection = selection;
        self
    }

    pub fn filter(mut self, filter: FilterConfig) -> Self {
        self.request.filter = filter;
        self
    }

    pub fn max_delay(mut self, max_delay: u32) -> Self {
        self.request.filter.max_delay = max_delay;
        self
    }

    pub fn min_speed(mut self, min_speed: f64) -> Self {
        self.request.filter.min_speed = min_speed;
        self
    }

    pub fn node_name_rule(mut self, rule: &str) -> Self {
        self.request.node_name_rule = rule.to_string();
        self
    }

    pub fn node_name_preprocess(mut self, rules: &str) -> Self {
        self.request.node_name_preprocess = rules.to_string();
        self
    }

    pub fn deduplication_rule(mut self, rule: &str) -> Self {
        self.request.deduplication_rule = rule.to_string();
        self
    }

    /// Build the final request
    pub fn build(self) -> Result<PreviewRequest, String> {
        let request = self.request;

        // Basic validation
        if request.selection.is_empty() {
            return Err("No nodes or groups selected".to_string());
        }

        Ok(request)
    }
}

/// One row of a preview
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewEntry {
    pub node_id: u64,
    pub index: usize,
    pub name: String,
    pub protocol: String,
    /// The node's own dialer; chain rules are not applied in previews
    pub dialer_proxy: Option<String>,
}

/// Result of a preview run
#[derive(Debug, Clone)]
pub struct PreviewResult {
    pub nodes: Vec<RenderedNode>,
    pub diagnostics: Diagnostics,
}

impl PreviewResult {
    /// Flattened proxy entries in output order
    pub fn entries(&self) -> Vec<PreviewEntry> {
        self.nodes
            .iter()
            .flat_map(|rendered| {
                rendered.proxy_entries().map(move |entry| PreviewEntry {
                    node_id: rendered.node.id,
                    index: rendered.index,
                    name: entry.name.clone(),
                    protocol: entry.protocol.clone(),
                    dialer_proxy: rendered.node.own_dialer().map(String::from),
                })
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries().into_iter().map(|e| e.name).collect()
    }
}

/// Dry-run of the filter, deduplication and rename stages
pub struct PreviewService {
    nodes: Arc<dyn NodeStore>,
}

impl PreviewService {
    pub fn new(nodes: Arc<dyn NodeStore>) -> Self {
        PreviewService { nodes }
    }

    pub fn preview(&self, request: &PreviewRequest) -> Result<PreviewResult, CompileError> {
        let subscription = request.to_subscription();
        let mut diagnostics = Diagnostics::default();
        let nodes = prepare_nodes(&*self.nodes, &subscription, &mut diagnostics)?;
        info!(
            "Preview rendered {} node(s), {} warning(s)",
            nodes.len(),
            diagnostics.warnings.len()
        );
        Ok(PreviewResult { nodes, diagnostics })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Node;
    use crate::store::MemoryNodeStore;

    #[test]
    fn test_builder_requires_selection() {
        assert!(PreviewRequestBuilder::new().build().is_err());
        let request = PreviewRequestBuilder::new()
            .add_group("imported")
            .add_node(4)
            .max_delay(200)
            .build()
            .unwrap();
        assert_eq!(request.selection[1], SelectionItem::Node { node_id: 4, sort: 1 });
        assert_eq!(request.filter.max_delay, 200);
    }

    #[test]
    fn test_preview_renames() {
        let store = MemoryNodeStore::with_nodes(vec![Node {
            id: 1,
            name: "tokyo".to_string(),
            country: "JP".to_string(),
            link: "trojan://pw@jp.example.com:443".to_string(),
            dialer_proxy_name: Some("Relay".to_string()),
            ..Default::default()
        }]);
        let service = PreviewService::new(Arc::new(store));
        let request = PreviewRequestBuilder::new()
            .add_node(1)
            .node_name_rule("{{index}}-{{country}}-{{name}}")
            .build()
            .unwrap();
        let result = service.preview(&request).unwrap();
        let entries = result.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "1-JP-tokyo");
        assert_eq!(entries[0].protocol, "trojan");
        assert_eq!(entries[0].dialer_proxy.as_deref(), Some("Relay"));
    }
}
