use super::AssembleContext;
use crate::models::Diagnostics;
use crate::utils::base64::base64_encode;

/// Convert the node list into a plain link list
///
/// Each proxy link carries its rendered display name. Sub-subscription links
/// are spliced in as fetched. Chain wiring cannot be expressed in a link and
/// is ignored.
///
/// # Arguments
/// * `ctx` - Nodes, embedded content and the base64 flag
/// * `diag` - Receives a warning for each link that cannot be rewritten
pub fn proxy_to_single(ctx: &AssembleContext<'_>, diag: &mut Diagnostics) -> String {
    let mut links: Vec<String> = Vec::new();

    for rendered in ctx.nodes {
        for entry in &rendered.entries {
            if entry.embedded {
                let Some(content) = ctx.embedded.get(&entry.link) else {
                    continue;
                };
                if !content.clash_proxies.is_empty() {
                    diag.warn(format!(
                        "Skipping {} Clash proxy(ies) from sub-subscription {}: not expressible as links",
                        content.clash_proxies.len(),
                        entry.link
                    ));
                }
                links.extend(content.links.iter().cloned());
                continue;
            }

            match ctx.codec.rewrite(&entry.link, &entry.name) {
                Ok(link) => links.push(link),
                Err(e) => diag.warn(format!(
                    "Skipping node #{} '{}': {}",
                    rendered.node.id, entry.name, e
                )),
            }
        }
    }

    let joined = links.join("\n");
    if ctx.list_base64 {
        base64_encode(&joined)
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::codec::LinkCodec;
    use crate::generator::chain::ChainResolution;
    use crate::generator::embedded::EmbeddedSubscription;
    use crate::generator::remark::{RenderedEntry, RenderedNode};
    use crate::models::{Node, OutputConfig};
    use crate::utils::base64::base64_decode;

    fn rendered(id: u64, link: &str, name: &str) -> RenderedNode {
        RenderedNode {
            node: Node {
                id,
                link: link.to_string(),
                ..Default::default()
            },
            index: id as usize,
            entries: vec![RenderedEntry {
                link: link.to_string(),
                name: name.to_string(),
                protocol: "trojan".to_string(),
                embedded: false,
            }],
        }
    }

    #[test]
    fn test_list_renames_and_skips_bad_links() {
        let nodes = vec![
            rendered(1, "trojan://pw@us.example.com:443#old", "US 01"),
            rendered(2, "not-a-link", "Broken"),
        ];
        let chains = ChainResolution::default();
        let embedded: HashMap<String, EmbeddedSubscription> = HashMap::new();
        let output = OutputConfig::default();
        let ctx = AssembleContext {
            nodes: &nodes,
            chains: &chains,
            embedded: &embedded,
            base: "",
            output: &output,
            list_base64: true,
            codec: &LinkCodec,
        };
        let mut diag = Diagnostics::default();
        let decoded = base64_decode(&proxy_to_single(&ctx, &mut diag));
        assert_eq!(decoded.lines().count(), 1);
        assert!(decoded.starts_with("trojan://pw@us.example.com:443"));
        assert!(decoded.ends_with("#US%2001"));
        assert_eq!(diag.warnings.len(), 1);
    }
}
