//! Chain proxy resolution
//!
//! Turns ordered chain rules into `dialer-proxy` wiring. Rules are evaluated
//! in ascending sort order and a node is claimed by the first enabled rule
//! whose target matches it. Later matching rules only show up in coverage.

use std::collections::HashMap;

use log::debug;

use super::group::group_generate;
use super::remark::RenderedNode;
use crate::models::{
    ChainHop, ChainRule, CustomProxyGroup, CustomProxyGroups, Diagnostics, RuleCoverage,
    TargetConfig,
};

/// Wiring computed for one compilation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainResolution {
    /// Last hop of the claiming rule, per claimed node
    pub final_dialer_by_node_id: HashMap<u64, String>,
    /// Assignments for intermediate hops: template groups, custom group
    /// members and nodes used as hops
    pub dialer_by_proxy_name: HashMap<String, String>,
    /// Groups synthesized from custom-group hops, first definition wins
    pub custom_groups: CustomProxyGroups,
    pub coverage: Vec<RuleCoverage>,
}

impl ChainResolution {
    /// Effective dialer of one output proxy.
    ///
    /// Intermediate-hop assignment, then target assignment, then the
    /// node's own configured dialer.
    pub fn dialer_for<'a>(
        &'a self,
        proxy_name: &str,
        node_id: u64,
        own: Option<&'a str>,
    ) -> Option<&'a str> {
        self.dialer_by_proxy_name
            .get(proxy_name)
            .or_else(|| self.final_dialer_by_node_id.get(&node_id))
            .map(String::as_str)
            .or(own)
    }

    fn assign(&mut self, proxy: &str, dialer: &str, rule: &ChainRule, diag: &mut Diagnostics) {
        if proxy == dialer {
            diag.warn(format!(
                "Chain rule {}: '{}' would dial itself, assignment dropped",
                rule.label(),
                proxy
            ));
            return;
        }
        match self.dialer_by_proxy_name.get(proxy) {
            Some(existing) if existing != dialer => diag.warn(format!(
                "Chain rule {}: '{}' already dials through '{}', dropping '{}'",
                rule.label(),
                proxy,
                existing,
                dialer
            )),
            Some(_) => {}
            None => {
                self.dialer_by_proxy_name
                    .insert(proxy.to_string(), dialer.to_string());
            }
        }
    }

    fn add_group(&mut self, group: CustomProxyGroup, diag: &mut Diagnostics) {
        match self.custom_groups.iter().find(|g| g.name == group.name) {
            Some(existing) if existing != &group => diag.warn(format!(
                "Custom group '{}' is defined more than once, keeping the first definition",
                group.name
            )),
            Some(_) => {}
            None => self.custom_groups.push(group),
        }
    }
}

/// A hop resolved to a concrete proxy name
#[derive(Debug, Clone, PartialEq)]
struct ResolvedHop {
    name: String,
    /// Proxies that receive the previous hop as their dialer
    dialers: Vec<String>,
    group: Option<CustomProxyGroup>,
}

fn resolve_hop(
    hop: &ChainHop,
    nodes: &[RenderedNode],
    rule: &ChainRule,
    diag: &mut Diagnostics,
) -> Option<ResolvedHop> {
    match hop {
        ChainHop::TemplateGroup { group } => {
            let name = group.trim();
            if name.is_empty() {
                diag.warn(format!(
                    "Chain rule {}: {} hop without a group name skipped",
                    rule.label(),
                    hop.kind()
                ));
                return None;
            }
            Some(ResolvedHop {
                name: name.to_string(),
                dialers: vec![name.to_string()],
                group: None,
            })
        }
        ChainHop::CustomGroup {
            name,
            group_type,
            conditions,
            url_test,
        } => {
            let name = name.trim();
            let members = group_generate(conditions, nodes);
            if name.is_empty() || members.is_empty() {
                diag.warn(format!(
                    "Chain rule {}: {} hop '{}' has no members, hop skipped",
                    rule.label(),
                    hop.kind(),
                    name
                ));
                return None;
            }
            let mut group = CustomProxyGroup::new(name.to_string(), *group_type);
            group.proxies = members.clone();
            group.url_test = url_test.clone();
            Some(ResolvedHop {
                name: name.to_string(),
                dialers: members,
                group: Some(group),
            })
        }
        ChainHop::DynamicNode { conditions } => {
            // First match in output order
            let found = nodes
                .iter()
                .filter(|n| conditions.matches(&n.node))
                .find_map(|n| n.primary_name());
            match found {
                Some(name) => Some(node_hop(name)),
                None => {
                    diag.warn(format!(
                        "Chain rule {}: no node matches the {} hop, hop skipped",
                        rule.label(),
                        hop.kind()
                    ));
                    None
                }
            }
        }
        ChainHop::SpecifiedNode { node_id } => {
            let found = nodes
                .iter()
                .find(|n| n.node.id == *node_id)
                .and_then(|n| n.primary_name());
            match found {
                Some(name) => Some(node_hop(name)),
                None => {
                    diag.warn(format!(
                        "Chain rule {}: {} hop node #{} is not part of the output, hop skipped",
                        rule.label(),
                        hop.kind(),
                        node_id
                    ));
                    None
                }
            }
        }
    }
}

fn node_hop(name: &str) -> ResolvedHop {
    ResolvedHop {
        name: name.to_string(),
        dialers: vec![name.to_string()],
        group: None,
    }
}

fn target_nodes<'a>(target: &TargetConfig, nodes: &'a [RenderedNode]) -> Vec<&'a RenderedNode> {
    // Nodes without a proxy entry cannot carry a dialer
    let candidates = nodes.iter().filter(|n| n.primary_name().is_some());
    match target {
        TargetConfig::All => candidates.collect(),
        TargetConfig::Conditions { conditions } => {
            candidates.filter(|n| conditions.matches(&n.node)).collect()
        }
        TargetConfig::SpecifiedNode { node_id } => {
            candidates.filter(|n| n.node.id == *node_id).collect()
        }
    }
}

/// Resolve chain rules against the rendered node list
///
/// # Arguments
/// * `rules` - Chain rules of the subscription, in any order
/// * `nodes` - Rendered nodes, in output order
/// * `diag` - Receives a warning for every gap or dropped assignment
///
/// # Returns
/// The dialer wiring, synthesized groups and per-rule coverage
pub fn resolve_chains(
    rules: &[ChainRule],
    nodes: &[RenderedNode],
    diag: &mut Diagnostics,
) -> ChainResolution {
    let mut resolution = ChainResolution::default();

    let mut enabled: Vec<&ChainRule> = rules.iter().filter(|r| r.enabled).collect();
    enabled.sort_by_key(|r| (r.sort, r.id));

    // node id -> claiming rule id
    let mut claims: HashMap<u64, u64> = HashMap::with_capacity(nodes.len());

    for rule in enabled {
        let targets = target_nodes(&rule.target, nodes);
        let mut claimed: Vec<&RenderedNode> = Vec::new();
        let mut covered = 0;
        for node in &targets {
            if claims.contains_key(&node.node.id) {
                covered += 1;
            } else {
                claims.insert(node.node.id, rule.id);
                claimed.push(*node);
            }
        }
        resolution.coverage.push(RuleCoverage {
            rule_id: rule.id,
            rule_name: rule.name.clone(),
            matched: targets.len(),
            covered,
            effective: claimed.len(),
        });
        debug!(
            "Chain rule {} matched {} node(s), {} already claimed",
            rule.label(),
            targets.len(),
            covered
        );
        if claimed.is_empty() {
            continue;
        }

        // Unresolved hops stay in place so their neighbours are never joined
        let hops: Vec<Option<ResolvedHop>> = rule
            .chain
            .iter()
            .map(|hop| resolve_hop(hop, nodes, rule, diag))
            .collect();

        for hop in hops.iter().flatten() {
            if let Some(group) = &hop.group {
                resolution.add_group(group.clone(), diag);
            }
        }
        for pair in hops.windows(2) {
            if let (Some(previous), Some(current)) = (&pair[0], &pair[1]) {
                for proxy in &current.dialers {
                    resolution.assign(proxy, &previous.name, rule, diag);
                }
            }
        }

        let final_dialer = match hops.last() {
            Some(Some(last)) => last.name.clone(),
            _ => {
                let reason = if hops.iter().any(Option::is_some) {
                    "its last hop is unresolved"
                } else {
                    "it resolved to an empty chain"
                };
                diag.warn(format!(
                    "Chain rule {}: {}, targets keep their own dialer",
                    rule.label(),
                    reason
                ));
                continue;
            }
        };

        for node in claimed {
            if node.proxy_entries().any(|e| e.name == final_dialer) {
                diag.warn(format!(
                    "Chain rule {}: node '{}' would dial itself, keeping its own dialer",
                    rule.label(),
                    final_dialer
                ));
                continue;
            }
            if let Some(name) = node
                .proxy_entries()
                .map(|e| e.name.as_str())
                .find(|name| resolution.dialer_by_proxy_name.contains_key(*name))
            {
                debug!(
                    "'{}' is an intermediate hop, its target assignment '{}' is shadowed",
                    name, final_dialer
                );
            }
            resolution
                .final_dialer_by_node_id
                .insert(node.node.id, final_dialer.clone());
        }
    }

    resolution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::remark::RenderedEntry;
    use crate::models::{ConditionField, Node, Operator, ProxyGroupType, TagConditions};

    fn rendered(id: u64, name: &str, tag: &str) -> RenderedNode {
        RenderedNode {
            node: Node {
                id,
                name: name.to_string(),
                tags: [tag.to_string()].into_iter().collect(),
                ..Default::default()
            },
            index: id as usize,
            entries: vec![RenderedEntry {
                link: format!("trojan://p@h{}:443", id),
                name: name.to_string(),
                protocol: "trojan".to_string(),
                embedded: false,
            }],
        }
    }

    fn rule(id: u64, sort: i32, target: TargetConfig, chain: Vec<ChainHop>) -> ChainRule {
        ChainRule {
            id,
            subscription_id: 1,
            name: format!("r{}", id),
            sort,
            enabled: true,
            chain,
            target,
        }
    }

    fn tagged(tag: &str) -> TagConditions {
        TagConditions::single(ConditionField::Tag, Operator::Equals, tag)
    }

    #[test]
    fn test_first_match_wins() {
        let nodes = vec![rendered(1, "A", "x"), rendered(2, "B", "x")];
        let rules = vec![
            rule(
                2,
                1,
                TargetConfig::All,
                vec![ChainHop::TemplateGroup {
                    group: "Other".to_string(),
                }],
            ),
            rule(
                1,
                0,
                TargetConfig::All,
                vec![ChainHop::TemplateGroup {
                    group: "Auto".to_string(),
                }],
            ),
        ];
        let mut diag = Diagnostics::default();
        let res = resolve_chains(&rules, &nodes, &mut diag);
        assert_eq!(res.final_dialer_by_node_id.get(&1).unwrap(), "Auto");
        assert_eq!(res.final_dialer_by_node_id.get(&2).unwrap(), "Auto");
        assert_eq!(res.coverage[0].effective, 2);
        assert_eq!(res.coverage[1].rule_id, 2);
        assert_eq!(res.coverage[1].covered, 2);
        assert_eq!(res.coverage[1].effective, 0);
        assert_eq!(res.coverage[1].covered_percent(), 100.0);
    }

    #[test]
    fn test_multi_hop_wiring() {
        let nodes = vec![
            rendered(1, "Entry", "relay"),
            rendered(2, "Exit HK", "exit"),
            rendered(3, "Exit JP", "exit"),
            rendered(4, "Target", "target"),
        ];
        let rules = vec![rule(
            1,
            0,
            TargetConfig::Conditions {
                conditions: tagged("target"),
            },
            vec![
                ChainHop::SpecifiedNode { node_id: 1 },
                ChainHop::CustomGroup {
                    name: "Exits".to_string(),
                    group_type: ProxyGroupType::URLTest,
                    conditions: tagged("exit"),
                    url_test: None,
                },
            ],
        )];
        let mut diag = Diagnostics::default();
        let res = resolve_chains(&rules, &nodes, &mut diag);

        assert_eq!(res.final_dialer_by_node_id.len(), 1);
        assert_eq!(res.final_dialer_by_node_id[&4], "Exits");
        assert_eq!(res.dialer_by_proxy_name["Exit HK"], "Entry");
        assert_eq!(res.dialer_by_proxy_name["Exit JP"], "Entry");
        assert!(!res.dialer_by_proxy_name.contains_key("Entry"));
        assert_eq!(res.custom_groups.len(), 1);
        assert_eq!(res.custom_groups[0].proxies, vec!["Exit HK", "Exit JP"]);
        assert!(diag.warnings.is_empty());
    }

    #[test]
    fn test_template_group_after_first_hop_gets_dialer() {
        let nodes = vec![rendered(1, "Relay", "relay"), rendered(2, "T", "target")];
        let rules = vec![rule(
            1,
            0,
            TargetConfig::SpecifiedNode { node_id: 2 },
            vec![
                ChainHop::DynamicNode {
                    conditions: tagged("relay"),
                },
                ChainHop::TemplateGroup {
                    group: "Landing".to_string(),
                },
            ],
        )];
        let res = resolve_chains(&rules, &nodes, &mut Diagnostics::default());
        assert_eq!(res.dialer_by_proxy_name["Landing"], "Relay");
        assert_eq!(res.final_dialer_by_node_id[&2], "Landing");
    }

    #[test]
    fn test_gaps_are_skipped_and_empty_chain_is_noop() {
        let nodes = vec![rendered(1, "A", "x")];
        let rules = vec![
            rule(
                1,
                0,
                TargetConfig::All,
                vec![
                    ChainHop::DynamicNode {
                        conditions: tagged("missing"),
                    },
                    ChainHop::SpecifiedNode { node_id: 99 },
                ],
            ),
            rule(
                2,
                1,
                TargetConfig::Conditions {
                    conditions: tagged("nothing"),
                },
                vec![ChainHop::TemplateGroup {
                    group: "G".to_string(),
                }],
            ),
        ];
        let mut diag = Diagnostics::default();
        let res = resolve_chains(&rules, &nodes, &mut diag);
        assert!(res.final_dialer_by_node_id.is_empty());
        assert!(res.dialer_by_proxy_name.is_empty());
        // Two gaps plus the empty chain
        assert_eq!(diag.warnings.len(), 3);
        assert_eq!(res.coverage[1].matched, 0);
    }

    #[test]
    fn test_gap_in_the_middle_is_not_bridged() {
        let nodes = vec![
            rendered(1, "A", "x"),
            rendered(3, "C", "x"),
            rendered(4, "Target", "target"),
        ];
        let rules = vec![rule(
            1,
            0,
            TargetConfig::SpecifiedNode { node_id: 4 },
            vec![
                ChainHop::SpecifiedNode { node_id: 1 },
                ChainHop::SpecifiedNode { node_id: 99 },
                ChainHop::SpecifiedNode { node_id: 3 },
            ],
        )];
        let mut diag = Diagnostics::default();
        let res = resolve_chains(&rules, &nodes, &mut diag);
        assert!(res.dialer_by_proxy_name.is_empty());
        assert_eq!(res.final_dialer_by_node_id[&4], "C");
        assert_eq!(diag.warnings.len(), 1);
        assert!(diag.warnings[0].contains("#99"));
    }

    #[test]
    fn test_unresolved_last_hop_keeps_own_dialer() {
        let nodes = vec![rendered(1, "A", "x"), rendered(2, "B", "x"), rendered(4, "T", "target")];
        let rules = vec![rule(
            1,
            0,
            TargetConfig::SpecifiedNode { node_id: 4 },
            vec![
                ChainHop::SpecifiedNode { node_id: 1 },
                ChainHop::SpecifiedNode { node_id: 2 },
                ChainHop::DynamicNode {
                    conditions: tagged("missing"),
                },
            ],
        )];
        let mut diag = Diagnostics::default();
        let res = resolve_chains(&rules, &nodes, &mut diag);
        assert_eq!(res.dialer_by_proxy_name["B"], "A");
        assert!(res.final_dialer_by_node_id.is_empty());
        assert_eq!(diag.warnings.len(), 2);
    }

    #[test]
    fn test_first_hop_assignment_wins() {
        let nodes = vec![
            rendered(1, "Entry 1", "entry"),
            rendered(2, "Entry 2", "entry"),
            rendered(3, "Exit", "exit"),
            rendered(4, "T1", "t1"),
            rendered(5, "T2", "t2"),
        ];
        let exits = |name: &str| ChainHop::CustomGroup {
            name: name.to_string(),
            group_type: ProxyGroupType::Select,
            conditions: tagged("exit"),
            url_test: None,
        };
        let rules = vec![
            rule(
                2,
                1,
                TargetConfig::Conditions {
                    conditions: tagged("t2"),
                },
                vec![ChainHop::SpecifiedNode { node_id: 2 }, exits("Exits B")],
            ),
            rule(
                1,
                0,
                TargetConfig::Conditions {
                    conditions: tagged("t1"),
                },
                vec![ChainHop::SpecifiedNode { node_id: 1 }, exits("Exits A")],
            ),
        ];
        let mut diag = Diagnostics::default();
        let res = resolve_chains(&rules, &nodes, &mut diag);

        assert_eq!(res.dialer_by_proxy_name["Exit"], "Entry 1");
        assert_eq!(res.dialer_by_proxy_name.len(), 1);
        assert_eq!(res.final_dialer_by_node_id[&4], "Exits A");
        assert_eq!(res.final_dialer_by_node_id[&5], "Exits B");
        assert_eq!(diag.warnings.len(), 1);
        assert!(diag.warnings[0].contains("'Exit' already dials through 'Entry 1'"));
    }

    #[test]
    fn test_self_dial_guard() {
        let nodes = vec![rendered(1, "Solo", "x")];
        let rules = vec![rule(
            1,
            0,
            TargetConfig::All,
            vec![ChainHop::SpecifiedNode { node_id: 1 }],
        )];
        let mut diag = Diagnostics::default();
        let res = resolve_chains(&rules, &nodes, &mut diag);
        assert!(res.final_dialer_by_node_id.is_empty());
        assert_eq!(diag.warnings.len(), 1);
    }

    #[test]
    fn test_disabled_rules_are_ignored() {
        let nodes = vec![rendered(1, "A", "x")];
        let mut disabled = rule(
            1,
            0,
            TargetConfig::All,
            vec![ChainHop::TemplateGroup {
                group: "G".to_string(),
            }],
        );
        disabled.enabled = false;
        let res = resolve_chains(&[disabled], &nodes, &mut Diagnostics::default());
        assert!(res.final_dialer_by_node_id.is_empty());
        assert!(res.coverage.is_empty());
    }

    #[test]
    fn test_dialer_precedence() {
        let mut res = ChainResolution::default();
        res.final_dialer_by_node_id.insert(1, "Target".to_string());
        res.dialer_by_proxy_name
            .insert("A".to_string(), "Hop".to_string());
        assert_eq!(res.dialer_for("A", 1, Some("Own")), Some("Hop"));
        assert_eq!(res.dialer_for("B", 1, Some("Own")), Some("Target"));
        assert_eq!(res.dialer_for("C", 2, Some("Own")), Some("Own"));
        assert_eq!(res.dialer_for("C", 2, None), None);
    }
}
