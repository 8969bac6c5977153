//! Node model definitions
//!
//! A node is one stored proxy-server entry together with its last known
//! health telemetry. Nodes are owned by the node store and are read-only to
//! the compilation pipeline.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Source name used for nodes imported from an airport subscription.
pub const AIRPORT_SOURCE: &str = "airport";

/// Outcome of the last health-check or speed-test run for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    #[default]
    Untested,
    Success,
    Timeout,
    Error,
}

impl TestStatus {
    pub fn is_success(self) -> bool {
        matches!(self, TestStatus::Success)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Untested => "untested",
            TestStatus::Success => "success",
            TestStatus::Timeout => "timeout",
            TestStatus::Error => "error",
        }
    }
}

/// Represents a stored proxy node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    pub id: u64,
    /// Display name chosen by the user
    pub name: String,
    /// Raw protocol link, or several alternatives joined with commas
    pub link: String,
    /// Name embedded in the link itself
    pub link_name: String,
    pub host: String,
    pub port: u16,
    /// ISO 3166 alpha-2 country code
    pub country: String,
    pub protocol: String,
    pub group: String,
    pub source: String,
    pub source_id: u64,
    pub tags: BTreeSet<String>,
    /// Download speed in MB/s
    pub speed: f64,
    pub speed_status: TestStatus,
    /// Latency in milliseconds
    pub delay_time: u32,
    pub delay_status: TestStatus,
    /// Upstream proxy the node is configured to dial through on its own
    pub dialer_proxy_name: Option<String>,
}

impl Node {
    /// The pre-rename name used by filters and the rename engine.
    pub fn original_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.link_name
        } else {
            &self.name
        }
    }

    pub fn is_airport(&self) -> bool {
        self.source.eq_ignore_ascii_case(AIRPORT_SOURCE)
    }

    /// Split the stored link into its individual alternatives.
    pub fn links(&self) -> Vec<&str> {
        self.link
            .split(',')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect()
    }

    /// Stored protocol, or the scheme of the first link when none is stored.
    pub fn effective_protocol(&self) -> String {
        let stored = self.protocol.trim();
        if !stored.is_empty() {
            return stored.to_lowercase();
        }
        self.links()
            .first()
            .map(|link| protocol_of_link(link))
            .unwrap_or_default()
    }

    /// Own dialer-proxy, ignoring blank values.
    pub fn own_dialer(&self) -> Option<&str> {
        self.dialer_proxy_name
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }
}

/// Derive the protocol name from a link's scheme.
pub fn protocol_of_link(link: &str) -> String {
    match link.find("://") {
        Some(pos) => {
            let scheme = link[..pos].trim().to_ascii_lowercase();
            match scheme.as_str() {
                "hy2" => "hysteria2".to_string(),
                "socks" | "socks5h" => "socks5".to_string(),
                _ => scheme,
            }
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_links_split_and_trim() {
        let node = Node {
            link: "vmess://a, trojan://b ,,".to_string(),
            ..Default::default()
        };
        assert_eq!(node.links(), vec!["vmess://a", "trojan://b"]);
    }

    #[test]
    fn test_original_name_falls_back_to_link_name() {
        let node = Node {
            name: "  ".to_string(),
            link_name: "from-link".to_string(),
            ..Default::default()
        };
        assert_eq!(node.original_name(), "from-link");
    }

    #[test]
    fn test_protocol_of_link_aliases() {
        assert_eq!(protocol_of_link("hy2://x@h:1"), "hysteria2");
        assert_eq!(protocol_of_link("SOCKS://h:1"), "socks5");
        assert_eq!(protocol_of_link("vless://x@h:1"), "vless");
        assert_eq!(protocol_of_link("garbage"), "");
    }

    #[test]
    fn test_effective_protocol_falls_back_to_scheme() {
        let mut node = Node {
            link: "hy2://pw@h:443, trojan://pw@h:443".to_string(),
            ..Default::default()
        };
        assert_eq!(node.effective_protocol(), "hysteria2");
        node.protocol = " VMess ".to_string();
        assert_eq!(node.effective_protocol(), "vmess");
    }
}
