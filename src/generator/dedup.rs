//! Node deduplication
//!
//! Selection order encodes user priority, so the first node seen for a key
//! is the one that survives and relative order is never changed.

use std::collections::HashSet;

use serde::Deserialize;

use crate::models::{Diagnostics, Node};

/// Node attribute that can take part in a deduplication key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupField {
    Host,
    Port,
    Protocol,
    Link,
    Name,
    Country,
    Group,
    Source,
}

impl DedupField {
    fn value_of(self, node: &Node) -> String {
        match self {
            DedupField::Host => node.host.trim().to_lowercase(),
            DedupField::Port => node.port.to_string(),
            DedupField::Protocol => node.effective_protocol(),
            DedupField::Link => node.link.trim().to_string(),
            DedupField::Name => node.original_name().to_string(),
            DedupField::Country => node.country.trim().to_lowercase(),
            DedupField::Group => node.group.clone(),
            DedupField::Source => node.source.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDedupRule {
    fields: Vec<DedupField>,
    mode: String,
}

/// Parsed deduplication key specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupRule {
    fields: Vec<DedupField>,
}

impl DedupRule {
    pub fn new(fields: Vec<DedupField>) -> Self {
        DedupRule { fields }
    }

    /// Parse the stored JSON rule.
    ///
    /// # Returns
    /// * `Ok(None)` - Blank rule, deduplication disabled
    /// * `Ok(Some(rule))` - A usable rule
    /// * `Err(reason)` - Malformed rule
    pub fn parse(raw: &str) -> Result<Option<DedupRule>, String> {
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let parsed: RawDedupRule = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        match parsed.mode.trim() {
            "link" => return Ok(Some(DedupRule::new(vec![DedupField::Link]))),
            "" | "fields" => {}
            other => return Err(format!("unknown mode '{}'", other)),
        }
        if parsed.fields.is_empty() {
            return Ok(None);
        }
        let mut fields: Vec<DedupField> = Vec::with_capacity(parsed.fields.len());
        for field in parsed.fields {
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        Ok(Some(DedupRule::new(fields)))
    }

    pub fn key_of(&self, node: &Node) -> String {
        self.fields
            .iter()
            .map(|f| f.value_of(node))
            .collect::<Vec<_>>()
            .join("\u{1f}")
    }
}

/// Deduplicate nodes with a stored JSON rule
///
/// Malformed rules disable deduplication and record a warning.
pub fn deduplicate(nodes: Vec<Node>, raw_rule: &str, diag: &mut Diagnostics) -> Vec<Node> {
    match DedupRule::parse(raw_rule) {
        Ok(Some(rule)) => deduplicate_by(nodes, &rule),
        Ok(None) => nodes,
        Err(e) => {
            diag.warn(format!("Ignoring deduplication rule: {}", e));
            nodes
        }
    }
}

/// Single pass, first-seen-wins deduplication
pub fn deduplicate_by(nodes: Vec<Node>, rule: &DedupRule) -> Vec<Node> {
    let mut seen: HashSet<String> = HashSet::with_capacity(nodes.len());
    nodes
        .into_iter()
        .filter(|node| seen.insert(rule.key_of(node)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u64, host: &str, port: u16, protocol: &str) -> Node {
        Node {
            id,
            host: host.to_string(),
            port,
            protocol: protocol.to_string(),
            link: format!("{}://{}@{}:{}", protocol, id, host, port),
            ..Default::default()
        }
    }

    #[test]
    fn test_host_port_protocol_keeps_first() {
        let nodes = vec![
            node(1, "a.com", 443, "vmess"),
            node(2, "b.com", 443, "vmess"),
            node(3, "A.com", 443, "vmess"),
            node(4, "a.com", 443, "trojan"),
        ];
        let mut diag = Diagnostics::default();
        let kept = deduplicate(
            nodes,
            r#"{"fields":["host","port","protocol"]}"#,
            &mut diag,
        );
        let ids: Vec<u64> = kept.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 2, 4]);
    }

    #[test]
    fn test_link_mode() {
        let mut twin = node(2, "a.com", 443, "vmess");
        twin.link = node(1, "a.com", 443, "vmess").link;
        let kept = deduplicate(
            vec![node(1, "a.com", 443, "vmess"), twin],
            r#"{"mode":"link"}"#,
            &mut Diagnostics::default(),
        );
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_malformed_rule_is_noop() {
        let nodes = vec![node(1, "a.com", 1, "ss"), node(2, "a.com", 1, "ss")];
        let mut diag = Diagnostics::default();
        assert_eq!(deduplicate(nodes.clone(), "{fields:", &mut diag).len(), 2);
        assert_eq!(
            deduplicate(nodes.clone(), r#"{"fields":["colour"]}"#, &mut diag).len(),
            2
        );
        assert_eq!(diag.warnings.len(), 2);
        assert_eq!(deduplicate(nodes, "  ", &mut diag).len(), 2);
        assert_eq!(diag.warnings.len(), 2);
    }
}
