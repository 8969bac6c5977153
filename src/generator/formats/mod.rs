//! Output assemblers
//!
//! Each assembler turns the rendered node list plus chain wiring into one
//! client document, delegating link handling to the [`Codec`].

pub mod clash;
pub mod single;
pub mod surge;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::chain::ChainResolution;
use super::embedded::EmbeddedSubscription;
use super::remark::RenderedNode;
use crate::codec::Codec;
use crate::error::CompileError;
use crate::models::{Diagnostics, OutputConfig};

pub use clash::proxy_to_clash;
pub use single::proxy_to_single;
pub use surge::proxy_to_surge;

/// Policies a client resolves without a proxy or group definition
const BUILTIN_POLICIES: &[&str] = &["DIRECT", "REJECT", "REJECT-DROP", "REJECT-TINYGIF", "PASS"];

/// Output document format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompileTarget {
    #[default]
    Clash,
    Surge,
    List,
}

impl CompileTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompileTarget::Clash => "clash",
            CompileTarget::Surge => "surge",
            CompileTarget::List => "list",
        }
    }
}

impl fmt::Display for CompileTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompileTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "clash" | "clashmeta" | "mihomo" => Ok(CompileTarget::Clash),
            "surge" => Ok(CompileTarget::Surge),
            "list" | "v2ray" | "base64" | "links" => Ok(CompileTarget::List),
            other => Err(format!("unknown target '{}'", other)),
        }
    }
}

/// Everything an assembler needs for one document
pub struct AssembleContext<'a> {
    pub nodes: &'a [RenderedNode],
    pub chains: &'a ChainResolution,
    pub embedded: &'a HashMap<String, EmbeddedSubscription>,
    /// Base template text; empty when no template is configured
    pub base: &'a str,
    pub output: &'a OutputConfig,
    /// Whether the plain list is base64 encoded as a whole
    pub list_base64: bool,
    pub codec: &'a dyn Codec,
}

/// Drop proxy entries that `target` cannot express.
///
/// Runs before chain resolution so no hop or dialer names a proxy that never
/// reaches the document. Embedded entries are kept; their content is only
/// known after fetching. Nodes left without entries are dropped.
///
/// # Arguments
/// * `target` - Output format the entries are checked against
/// * `nodes` - Rendered nodes, in output order
/// * `codec` - Link codec used by the assemblers
/// * `diag` - Receives one warning per dropped entry
pub fn retain_emittable(
    target: CompileTarget,
    nodes: Vec<RenderedNode>,
    codec: &dyn Codec,
    diag: &mut Diagnostics,
) -> Vec<RenderedNode> {
    nodes
        .into_iter()
        .filter_map(|mut rendered| {
            let id = rendered.node.id;
            rendered.entries.retain(|entry| {
                if entry.embedded {
                    return true;
                }
                let checked = match target {
                    CompileTarget::Clash => codec
                        .decode(&entry.link)
                        .map(|_| ())
                        .map_err(|e| e.to_string()),
                    CompileTarget::Surge => codec
                        .decode(&entry.link)
                        .map_err(|e| e.to_string())
                        .and_then(|fields| surge::fields_to_surge(&fields).map(|_| ())),
                    CompileTarget::List => codec
                        .rewrite(&entry.link, &entry.name)
                        .map(|_| ())
                        .map_err(|e| e.to_string()),
                };
                match checked {
                    Ok(()) => true,
                    Err(e) => {
                        diag.warn(format!("Skipping node #{} '{}': {}", id, entry.name, e));
                        false
                    }
                }
            });
            (!rendered.entries.is_empty()).then_some(rendered)
        })
        .collect()
}

/// Names a `dialer-proxy` or `underlying-proxy` may point at
pub(crate) struct DialTargets {
    names: HashSet<String>,
}

impl DialTargets {
    pub(crate) fn new<'a>(names: impl IntoIterator<Item = &'a String>) -> Self {
        let mut all: HashSet<String> = names.into_iter().cloned().collect();
        all.extend(BUILTIN_POLICIES.iter().map(|p| p.to_string()));
        DialTargets { names: all }
    }

    /// Whether `dialer` exists in the document; warns and returns false when
    /// it does not
    pub(crate) fn check(&self, owner: &str, dialer: &str, diag: &mut Diagnostics) -> bool {
        if self.names.contains(dialer) {
            return true;
        }
        diag.warn(format!(
            "Dropping dialer '{}' of '{}': no proxy or group of that name is emitted",
            dialer, owner
        ));
        false
    }
}

/// Assemble the document for `target`
pub fn assemble(
    target: CompileTarget,
    ctx: &AssembleContext<'_>,
    diag: &mut Diagnostics,
) -> Result<String, CompileError> {
    match target {
        CompileTarget::Clash => proxy_to_clash(ctx, diag),
        CompileTarget::Surge => proxy_to_surge(ctx, diag),
        CompileTarget::List => Ok(proxy_to_single(ctx, diag)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::LinkCodec;
    use crate::generator::remark::RenderedEntry;
    use crate::models::Node;

    fn rendered(id: u64, links: &[&str]) -> RenderedNode {
        RenderedNode {
            node: Node {
                id,
                ..Default::default()
            },
            index: id as usize,
            entries: links
                .iter()
                .enumerate()
                .map(|(i, link)| RenderedEntry {
                    link: link.to_string(),
                    name: format!("n{}-{}", id, i),
                    protocol: String::new(),
                    embedded: link.starts_with("https://"),
                })
                .collect(),
        }
    }

    #[test]
    fn test_retain_emittable_per_target() {
        let nodes = vec![
            rendered(1, &["trojan://pw@a.example.com:443"]),
            rendered(2, &["vless://u@v.example.com:443", "https://sub.example.com/x"]),
            rendered(3, &["ssr://not-decodable"]),
        ];

        let mut diag = Diagnostics::default();
        let clash = retain_emittable(CompileTarget::Clash, nodes.clone(), &LinkCodec, &mut diag);
        let ids: Vec<u64> = clash.iter().map(|n| n.node.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(clash[1].entries.len(), 2);
        assert_eq!(diag.warnings.len(), 1);

        let mut diag = Diagnostics::default();
        let surge = retain_emittable(CompileTarget::Surge, nodes, &LinkCodec, &mut diag);
        // vless is gone, the sub-subscription entry stays
        assert_eq!(surge[1].entries.len(), 1);
        assert!(surge[1].entries[0].embedded);
        assert!(surge[1].primary_name().is_none());
        assert_eq!(diag.warnings.len(), 2);
    }

    #[test]
    fn test_dial_targets() {
        let names = vec!["Relay".to_string()];
        let targets = DialTargets::new(&names);
        let mut diag = Diagnostics::default();
        assert!(targets.check("A", "Relay", &mut diag));
        assert!(targets.check("A", "DIRECT", &mut diag));
        assert!(!targets.check("A", "Missing", &mut diag));
        assert_eq!(diag.warnings.len(), 1);
    }

    #[test]
    fn test_target_from_str() {
        assert_eq!("Clash".parse::<CompileTarget>(), Ok(CompileTarget::Clash));
        assert_eq!("surge".parse::<CompileTarget>(), Ok(CompileTarget::Surge));
        assert_eq!("v2ray".parse::<CompileTarget>(), Ok(CompileTarget::List));
        assert!("quanx".parse::<CompileTarget>().is_err());
        assert_eq!(CompileTarget::List.to_string(), "list");
    }
}
