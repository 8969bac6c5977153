//! Display-name computation
//!
//! Names are produced in three steps: ordered preprocess substitutions on
//! the original name, template rendering, then a uniqueness pass over the
//! whole output. Rendering is a pure function of the template and context.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::models::{parse_regex_match_configs, protocol_of_link, Diagnostics, Node};
use crate::utils::string::collapse_whitespace;
use crate::utils::url::is_link;

lazy_static! {
    static ref TOKEN_REGEX: Regex = Regex::new(r"\{\{\s*([a-z_]+)(?::(\d{1,2}))?\s*\}\}").unwrap();
}

/// Everything a name template may reference
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenameContext {
    /// Original name after preprocessing
    pub name: String,
    /// Original name as stored
    pub original: String,
    pub link_name: String,
    pub country: String,
    /// Speed in MB/s, `None` when untested
    pub speed: Option<f64>,
    /// Latency in ms, `None` when untested
    pub delay: Option<u32>,
    pub group: String,
    pub source: String,
    /// 1-based position in the filtered sequence
    pub index: usize,
    pub protocol: String,
    pub tags: Vec<String>,
}

impl RenameContext {
    pub fn from_node(node: &Node, preprocessed: &str, index: usize, protocol: &str) -> Self {
        RenameContext {
            name: preprocessed.to_string(),
            original: node.original_name().to_string(),
            link_name: node.link_name.clone(),
            country: node.country.trim().to_string(),
            speed: (node.speed_status.is_success() && node.speed > 0.0).then_some(node.speed),
            delay: (node.delay_status.is_success() && node.delay_time > 0)
                .then_some(node.delay_time),
            group: node.group.clone(),
            source: node.source.clone(),
            index,
            protocol: protocol.to_string(),
            tags: node.tags.iter().cloned().collect(),
        }
    }
}

/// Regional indicator flag for a two-letter country code
pub fn country_flag(code: &str) -> String {
    let code = code.trim().to_ascii_uppercase();
    let code = if code == "UK" { "GB".to_string() } else { code };
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_uppercase()) {
        return String::new();
    }
    code.chars()
        .filter_map(|c| char::from_u32(0x1F1E6 + (c as u32 - 'A' as u32)))
        .collect()
}

fn token_value(ctx: &RenameContext, token: &str, width: Option<usize>) -> Option<String> {
    let value = match token {
        "name" => ctx.name.clone(),
        "original" => ctx.original.clone(),
        "link_name" => ctx.link_name.clone(),
        "country" => ctx.country.clone(),
        "flag" => country_flag(&ctx.country),
        "speed" => ctx.speed.map(|s| format!("{:.2}MB/s", s)).unwrap_or_default(),
        "delay" => ctx.delay.map(|d| format!("{}ms", d)).unwrap_or_default(),
        "group" => ctx.group.clone(),
        "source" => ctx.source.clone(),
        "index" => match width {
            Some(width) => format!("{:0width$}", ctx.index, width = width),
            None => ctx.index.to_string(),
        },
        "protocol" => ctx.protocol.clone(),
        "tags" => ctx.tags.join("|"),
        _ => return None,
    };
    // Only `index` takes a width
    if width.is_some() && token != "index" {
        return None;
    }
    Some(value)
}

/// Render a name template against a context.
///
/// Unknown tokens are kept literally. Whitespace runs collapse to one space,
/// and an empty result falls back to the preprocessed name.
///
/// # Examples
/// ```
/// use subcompiler::generator::remark::{render, RenameContext};
///
/// let ctx = RenameContext {
///     index: 1,
///     country: "HK".to_string(),
///     name: "foo".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(render("{{index}}-{{country}}-{{name}}", &ctx), "1-HK-foo");
/// ```
pub fn render(template: &str, ctx: &RenameContext) -> String {
    if template.trim().is_empty() {
        return collapse_whitespace(&ctx.name);
    }
    let rendered = TOKEN_REGEX.replace_all(template, |caps: &Captures| {
        let width = caps.get(2).and_then(|m| m.as_str().parse::<usize>().ok());
        token_value(ctx, &caps[1], width).unwrap_or_else(|| caps[0].to_string())
    });
    let rendered = collapse_whitespace(&rendered);
    if rendered.is_empty() {
        collapse_whitespace(&ctx.name)
    } else {
        rendered
    }
}

/// Compiled preprocess rules
#[derive(Debug, Default)]
pub struct NamePreprocessor {
    rules: Vec<(Regex, String)>,
}

impl NamePreprocessor {
    /// Compile the stored JSON rule list. Malformed JSON disables
    /// preprocessing and an invalid pattern skips only that rule.
    pub fn parse(raw: &str, diag: &mut Diagnostics) -> Self {
        let configs = match parse_regex_match_configs(raw) {
            Some(configs) => configs,
            None => {
                diag.warn("Ignoring node name preprocess rules: malformed JSON");
                return NamePreprocessor::default();
            }
        };
        let mut rules = Vec::with_capacity(configs.len());
        for config in configs {
            match config.compile() {
                Ok(re) => rules.push((re, config.replace)),
                Err(e) => diag.warn(format!(
                    "Skipping node name preprocess rule '{}': {}",
                    config._match, e
                )),
            }
        }
        NamePreprocessor { rules }
    }

    pub fn apply(&self, name: &str) -> String {
        let mut name = name.to_string();
        for (re, replace) in &self.rules {
            if re.is_match(&name) {
                name = re.replace_all(&name, replace.as_str()).into_owned();
            }
        }
        name.trim().to_string()
    }
}

/// One output entry of a node: a single link alternative
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEntry {
    pub link: String,
    /// Display name; empty for embedded sub-subscriptions
    pub name: String,
    pub protocol: String,
    /// An http(s) sub-subscription spliced in verbatim
    pub embedded: bool,
}

/// A node with its rendered output entries
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedNode {
    pub node: Node,
    /// 1-based position in the filtered sequence
    pub index: usize,
    pub entries: Vec<RenderedEntry>,
}

impl RenderedNode {
    /// Name of the first proxy entry, the name chains refer to
    pub fn primary_name(&self) -> Option<&str> {
        self.proxy_entries().next().map(|e| e.name.as_str())
    }

    /// Entries that become proxies in the output
    pub fn proxy_entries(&self) -> impl Iterator<Item = &RenderedEntry> {
        self.entries.iter().filter(|e| !e.embedded)
    }
}

/// Render display names for every node.
///
/// # Arguments
/// * `nodes` - Filtered and deduplicated nodes, in output order
/// * `template` - Node name rule; blank keeps the preprocessed name
/// * `preprocess` - Stored JSON preprocess rules
/// * `diag` - Receives preprocess warnings
pub fn render_nodes(
    nodes: Vec<Node>,
    template: &str,
    preprocess: &str,
    diag: &mut Diagnostics,
) -> Vec<RenderedNode> {
    let preprocessor = NamePreprocessor::parse(preprocess, diag);
    let mut rendered: Vec<RenderedNode> = nodes
        .into_iter()
        .enumerate()
        .map(|(pos, node)| {
            let index = pos + 1;
            let preprocessed = preprocessor.apply(node.original_name());
            let fallback_protocol = node.effective_protocol();
            let entries = node
                .links()
                .into_iter()
                .map(|link| {
                    if is_link(link) {
                        return RenderedEntry {
                            link: link.to_string(),
                            name: String::new(),
                            protocol: String::new(),
                            embedded: true,
                        };
                    }
                    let mut protocol = protocol_of_link(link);
                    if protocol.is_empty() {
                        protocol = fallback_protocol.clone();
                    }
                    let ctx = RenameContext::from_node(&node, &preprocessed, index, &protocol);
                    RenderedEntry {
                        link: link.to_string(),
                        name: render(template, &ctx),
                        protocol,
                        embedded: false,
                    }
                })
                .collect();
            RenderedNode {
                node,
                index,
                entries,
            }
        })
        .collect();
    make_names_unique(&mut rendered);
    rendered
}

/// Suffix repeated names with ` 2`, ` 3`, ... in output order
pub fn make_names_unique(nodes: &mut [RenderedNode]) {
    let mut used: HashSet<String> = HashSet::new();
    for entry in nodes
        .iter_mut()
        .flat_map(|n| n.entries.iter_mut())
        .filter(|e| !e.embedded)
    {
        if used.insert(entry.name.clone()) {
            continue;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{} {}", entry.name, n);
            if used.insert(candidate.clone()) {
                entry.name = candidate;
                break;
            }
            n += 1;
        }
    }
}
