use serde::{Deserialize, Serialize};

/// Type of a synthesized proxy group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProxyGroupType {
    #[default]
    #[serde(rename = "select")]
    Select,
    #[serde(rename = "url-test")]
    URLTest,
}

impl ProxyGroupType {
    /// Get string representation of the proxy group type
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyGroupType::Select => "select",
            ProxyGroupType::URLTest => "url-test",
        }
    }
}

/// Optional tuning for url-test groups
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlTestOptions {
    /// URL for testing
    pub url: String,
    /// Interval in seconds between tests
    pub interval: u32,
    /// Tolerance in milliseconds
    pub tolerance: u32,
}

/// A proxy group synthesized from a custom-group chain hop.
///
/// These are derived on every resolution pass and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomProxyGroup {
    /// Name of the proxy group
    pub name: String,
    /// Type of the proxy group
    pub group_type: ProxyGroupType,
    /// Display names of the member proxies, in output order
    pub proxies: Vec<String>,
    /// url-test tuning, only meaningful for `URLTest`
    pub url_test: Option<UrlTestOptions>,
}

impl CustomProxyGroup {
    /// Create a new group with no members
    pub fn new(name: String, group_type: ProxyGroupType) -> Self {
        Self {
            name,
            group_type,
            proxies: Vec::new(),
            url_test: None,
        }
    }

    /// Get string representation of the group type
    pub fn type_str(&self) -> &'static str {
        self.group_type.as_str()
    }

    /// Effective url-test tuning with defaults filled in
    pub fn effective_url_test(&self) -> Option<UrlTestOptions> {
        if self.group_type != ProxyGroupType::URLTest {
            return None;
        }
        let mut opts = self.url_test.clone().unwrap_or_default();
        if opts.url.is_empty() {
            opts.url = DEFAULT_TEST_URL.to_string();
        }
        if opts.interval == 0 {
            opts.interval = DEFAULT_TEST_INTERVAL;
        }
        Some(opts)
    }
}

pub const DEFAULT_TEST_URL: &str = "http://www.gstatic.com/generate_204";
pub const DEFAULT_TEST_INTERVAL: u32 = 300;

/// A collection of synthesized proxy groups
pub type CustomProxyGroups = Vec<CustomProxyGroup>;
