//! Embedded sub-subscriptions
//!
//! A node link starting with `http://` or `https://` is a subscription of its
//! own. It is fetched once per compilation and its proxies are spliced into
//! the output without renaming or chain wiring.

use std::collections::HashMap;

use log::info;
use serde_yaml::Value;

use super::remark::RenderedNode;
use super::subinfo::{parse_userinfo, SUBSCRIPTION_USERINFO};
use crate::models::Diagnostics;
use crate::store::AirportUsage;
use crate::utils::base64::base64_decode;
use crate::utils::http::{CancelFlag, FetchError, Fetcher};

/// Decoded content of one sub-subscription
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddedSubscription {
    /// Protocol links from a plain or base64 link list
    pub links: Vec<String>,
    /// Proxy mappings from a Clash document
    pub clash_proxies: Vec<Value>,
    /// Usage advertised in the response header
    pub usage: Option<AirportUsage>,
}

impl EmbeddedSubscription {
    pub fn is_empty(&self) -> bool {
        self.links.is_empty() && self.clash_proxies.is_empty()
    }
}

fn link_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| line.contains("://"))
        .map(String::from)
        .collect()
}

/// Decode a fetched body: Clash YAML, base64 link list or plain link list
pub fn parse_embedded_body(body: &str) -> EmbeddedSubscription {
    let body = body.trim().trim_start_matches('\u{feff}');

    if body.contains("proxies:") {
        if let Ok(Value::Mapping(doc)) = serde_yaml::from_str::<Value>(body) {
            if let Some(Value::Sequence(proxies)) = doc.get("proxies") {
                return EmbeddedSubscription {
                    clash_proxies: proxies
                        .iter()
                        .filter(|p| p.is_mapping())
                        .cloned()
                        .collect(),
                    ..Default::default()
                };
            }
        }
    }

    let plain = link_lines(body);
    if !plain.is_empty() {
        return EmbeddedSubscription {
            links: plain,
            ..Default::default()
        };
    }

    let compact: String = body.split_whitespace().collect();
    EmbeddedSubscription {
        links: link_lines(&base64_decode(&compact)),
        ..Default::default()
    }
}

/// Fetch every distinct embedded sub-subscription referenced by `nodes`
///
/// # Arguments
/// * `nodes` - Rendered nodes in output order
/// * `fetcher` - Outbound HTTP collaborator
/// * `cancel` - Cancellation flag of the compilation
/// * `diag` - Receives a warning for each failed or empty fetch
///
/// # Returns
/// Decoded content keyed by URL. Only cancellation is an error; any other
/// failure skips that sub-subscription.
pub fn fetch_embedded(
    nodes: &[RenderedNode],
    fetcher: &dyn Fetcher,
    cancel: &CancelFlag,
    diag: &mut Diagnostics,
) -> Result<HashMap<String, EmbeddedSubscription>, FetchError> {
    let mut fetched: HashMap<String, EmbeddedSubscription> = HashMap::new();
    let urls = nodes
        .iter()
        .flat_map(|n| n.entries.iter())
        .filter(|e| e.embedded)
        .map(|e| e.link.as_str());

    for url in urls {
        if fetched.contains_key(url) {
            continue;
        }
        match fetcher.fetch(url, cancel) {
            Ok(response) => {
                let mut content = parse_embedded_body(&response.body);
                content.usage = response
                    .headers
                    .get(SUBSCRIPTION_USERINFO)
                    .and_then(|h| parse_userinfo(h));
                if content.is_empty() {
                    diag.warn(format!("Sub-subscription {} contains no proxies", url));
                } else {
                    info!(
                        "Fetched sub-subscription {}: {} link(s), {} Clash proxy(ies)",
                        url,
                        content.links.len(),
                        content.clash_proxies.len()
                    );
                }
                fetched.insert(url.to_string(), content);
            }
            Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
            Err(e) => {
                diag.warn(format!("Skipping sub-subscription {}: {}", url, e));
                fetched.insert(url.to_string(), EmbeddedSubscription::default());
            }
        }
    }
    Ok(fetched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::base64::base64_encode;

    #[test]
    fn test_parse_plain_and_base64_lists() {
        let plain = "trojan://a@h:1#x\n\nss://YWVzLTI1Ni1nY206cA@h:2#y\n";
        assert_eq!(parse_embedded_body(plain).links.len(), 2);

        let encoded = base64_encode(plain);
        let parsed = parse_embedded_body(&encoded);
        assert_eq!(parsed.links, vec!["trojan://a@h:1#x", "ss://YWVzLTI1Ni1nY206cA@h:2#y"]);
    }

    #[test]
    fn test_parse_clash_document() {
        let body = "proxies:\n  - {name: a, type: ss, server: h, port: 1, cipher: aes-128-gcm, password: p}\n  - plain-string\n";
        let parsed = parse_embedded_body(body);
        assert_eq!(parsed.clash_proxies.len(), 1);
        assert!(parsed.links.is_empty());
    }

    #[test]
    fn test_garbage_is_empty() {
        assert!(parse_embedded_body("<html>nope</html>").is_empty());
    }
}
