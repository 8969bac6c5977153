use regex::Regex;
use serde::Deserialize;

/// One ordered name-normalization rule applied before renaming
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RegexMatchConfig {
    #[serde(rename = "match")]
    pub _match: String,
    #[serde(default)]
    pub replace: String,
}

impl RegexMatchConfig {
    pub fn compile(&self) -> Result<Regex, regex::Error> {
        Regex::new(&self._match)
    }
}

/// Collection of regex match configurations
pub type RegexMatchConfigs = Vec<RegexMatchConfig>;

/// Parse the stored JSON form of a preprocess rule list.
///
/// Blank input yields an empty list; malformed JSON yields `None`.
pub fn parse_regex_match_configs(raw: &str) -> Option<RegexMatchConfigs> {
    if raw.trim().is_empty() {
        return Some(Vec::new());
    }
    serde_json::from_str(raw).ok()
}
