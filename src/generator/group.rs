//! Proxy group membership
//!
//! Membership for groups synthesized from chain hops, and the rule deciding
//! whether a template group already selects its own members.

use serde_yaml::{Mapping, Value};

use super::remark::RenderedNode;
use crate::models::TagConditions;

/// Display names of every proxy entry whose node matches `conditions`
///
/// # Arguments
/// * `conditions` - Membership condition of the group
/// * `nodes` - Rendered nodes in output order
///
/// # Returns
/// Member names in output order, without duplicates
pub fn group_generate(conditions: &TagConditions, nodes: &[RenderedNode]) -> Vec<String> {
    let mut members: Vec<String> = Vec::new();
    for node in nodes.iter().filter(|n| conditions.matches(&n.node)) {
        for entry in node.proxy_entries() {
            if !members.contains(&entry.name) {
                members.push(entry.name.clone());
            }
        }
    }
    members
}

/// Whether a Clash template group selects members by itself
/// (`include-all*`, `filter` or `use` provider references)
pub fn clash_group_selects_members(group: &Mapping) -> bool {
    group.iter().any(|(key, value)| {
        let key = key.as_str().unwrap_or_default();
        match key {
            "filter" | "use" => !matches!(value, Value::Null),
            _ if key.starts_with("include-all") => value.as_bool().unwrap_or(false),
            _ => false,
        }
    })
}

/// Whether a Surge `[Proxy Group]` line selects members by itself
pub fn surge_group_selects_members(line: &str) -> bool {
    line.split(',').map(str::trim).any(|part| {
        let key = part.split('=').next().unwrap_or_default().trim();
        match key {
            "include-all-proxies" => part.ends_with("true") || part.ends_with('1'),
            "policy-regex-filter" | "policy-path" | "include-other-group" => true,
            _ => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::remark::RenderedEntry;
    use crate::models::{ConditionField, Node, Operator};

    fn rendered(id: u64, country: &str, names: &[&str]) -> RenderedNode {
        RenderedNode {
            node: Node {
                id,
                country: country.to_string(),
                ..Default::default()
            },
            index: id as usize,
            entries: names
                .iter()
                .map(|n| RenderedEntry {
                    link: String::new(),
                    name: n.to_string(),
                    protocol: String::new(),
                    embedded: false,
                })
                .collect(),
        }
    }

    #[test]
    fn test_group_generate_collects_entries() {
        let nodes = vec![
            rendered(1, "HK", &["HK 1", "HK 1 2"]),
            rendered(2, "JP", &["JP 1"]),
            rendered(3, "hk", &["HK 3"]),
        ];
        let cond = TagConditions::single(ConditionField::Country, Operator::Equals, "HK");
        assert_eq!(group_generate(&cond, &nodes), vec!["HK 1", "HK 1 2", "HK 3"]);
        assert!(group_generate(&TagConditions::default(), &nodes).is_empty());
    }

    #[test]
    fn test_clash_group_selects_members() {
        let auto: Mapping =
            serde_yaml::from_str("name: Auto\ntype: url-test\ninclude-all: true\n").unwrap();
        let filtered: Mapping =
            serde_yaml::from_str("name: HK\ntype: select\nfilter: '(?i)hk'\n").unwrap();
        let plain: Mapping =
            serde_yaml::from_str("name: Proxy\ntype: select\nproxies: [DIRECT]\n").unwrap();
        assert!(clash_group_selects_members(&auto));
        assert!(clash_group_selects_members(&filtered));
        assert!(!clash_group_selects_members(&plain));
    }

    #[test]
    fn test_surge_group_selects_members() {
        assert!(surge_group_selects_members(
            "Auto = url-test, include-all-proxies=true, interval=300"
        ));
        assert!(surge_group_selects_members("HK = select, policy-regex-filter=HK"));
        assert!(!surge_group_selects_members("Proxy = select, DIRECT"));
    }
}
