//! Node filtering
//!
//! Dimensions are applied in a fixed order: telemetry thresholds, country,
//! tag, node name and protocol. Each one is skipped when unset, and a
//! misconfigured dimension degrades to a no-op without affecting the others.

use regex::Regex;

use crate::models::{Diagnostics, FilterConfig, Node};
use crate::utils::matcher::compile_patterns;
use crate::utils::string::{split_list, split_list_lower};

/// Black/white list pair for one dimension. Blacklist always wins.
struct ListRule {
    whitelist: Vec<String>,
    blacklist: Vec<String>,
}

impl ListRule {
    fn new(whitelist: Vec<String>, blacklist: Vec<String>) -> Option<Self> {
        if whitelist.is_empty() && blacklist.is_empty() {
            None
        } else {
            Some(ListRule {
                whitelist,
                blacklist,
            })
        }
    }

    /// Keep decision for a node carrying `values` on this dimension
    fn keeps<'a>(&self, mut values: impl Iterator<Item = &'a str> + Clone) -> bool {
        if values.clone().any(|v| self.blacklist.iter().any(|b| b == v)) {
            return false;
        }
        self.whitelist.is_empty() || values.any(|v| self.whitelist.iter().any(|w| w == v))
    }
}

struct NamePatterns {
    whitelist: Option<Vec<Regex>>,
    blacklist: Option<Vec<Regex>>,
}

impl NamePatterns {
    fn keeps(&self, name: &str) -> bool {
        if let Some(black) = &self.blacklist {
            if black.iter().any(|re| re.is_match(name)) {
                return false;
            }
        }
        match &self.whitelist {
            Some(white) if !white.is_empty() => white.iter().any(|re| re.is_match(name)),
            _ => true,
        }
    }
}

fn compile_direction(raw: &str, direction: &str, diag: &mut Diagnostics) -> Option<Vec<Regex>> {
    let patterns = split_list(raw);
    if patterns.is_empty() {
        return None;
    }
    match compile_patterns(&patterns) {
        Ok(regexes) => Some(regexes),
        Err(e) => {
            diag.warn(format!(
                "Ignoring node name {}: invalid pattern {}",
                direction, e
            ));
            None
        }
    }
}

fn passes_delay(node: &Node, max_delay: u32) -> bool {
    max_delay == 0
        || (node.delay_status.is_success() && node.delay_time > 0 && node.delay_time <= max_delay)
}

fn passes_speed(node: &Node, min_speed: f64) -> bool {
    min_speed <= 0.0
        || (node.speed_status.is_success() && node.speed > 0.0 && node.speed >= min_speed)
}

/// Filter nodes according to a subscription's filter configuration
///
/// # Arguments
/// * `nodes` - Candidate nodes in selection order
/// * `cfg` - Filter configuration
/// * `diag` - Receives a warning for every dimension that had to be ignored
///
/// # Returns
/// The surviving nodes, in their original relative order
pub fn filter_nodes(nodes: Vec<Node>, cfg: &FilterConfig, diag: &mut Diagnostics) -> Vec<Node> {
    let max_delay = cfg.max_delay;
    let min_speed = if cfg.min_speed.is_finite() {
        cfg.min_speed
    } else {
        diag.warn(format!("Ignoring non-finite speed threshold {}", cfg.min_speed));
        0.0
    };

    let country = ListRule::new(
        split_list_lower(&cfg.country_whitelist),
        split_list_lower(&cfg.country_blacklist),
    );
    let tag = ListRule::new(split_list(&cfg.tag_whitelist), split_list(&cfg.tag_blacklist));
    let protocol = ListRule::new(
        split_list_lower(&cfg.protocol_whitelist),
        split_list_lower(&cfg.protocol_blacklist),
    );
    let names = NamePatterns {
        whitelist: compile_direction(&cfg.node_name_whitelist, "whitelist", diag),
        blacklist: compile_direction(&cfg.node_name_blacklist, "blacklist", diag),
    };

    let before = nodes.len();
    let kept: Vec<Node> = nodes
        .into_iter()
        .filter(|node| passes_delay(node, max_delay) && passes_speed(node, min_speed))
        .filter(|node| {
            country.as_ref().map_or(true, |rule| {
                let value = node.country.trim().to_lowercase();
                rule.keeps(std::iter::once(value.as_str()))
            })
        })
        .filter(|node| {
            tag.as_ref()
                .map_or(true, |rule| rule.keeps(node.tags.iter().map(String::as_str)))
        })
        .filter(|node| names.keeps(node.original_name()))
        .filter(|node| {
            protocol.as_ref().map_or(true, |rule| {
                let value = node.effective_protocol();
                rule.keeps(std::iter::once(value.as_str()))
            })
        })
        .collect();

    log::debug!("Filter kept {} of {} node(s)", kept.len(), before);
    kept
}
