//! Traffic summary for the `subscription-userinfo` response header

use std::collections::HashSet;

use super::remark::RenderedNode;
use crate::models::Diagnostics;
use crate::store::{AirportUsage, UsageStore};

pub const SUBSCRIPTION_USERINFO: &str = "subscription-userinfo";

/// Parse a `subscription-userinfo` header value
///
/// # Arguments
/// * `header` - e.g. `upload=1; download=2; total=3; expire=4`
///
/// # Returns
/// `None` when no known key could be read
pub fn parse_userinfo(header: &str) -> Option<AirportUsage> {
    let mut usage = AirportUsage::default();
    let mut found = false;
    for item in header.split(';') {
        let Some((key, value)) = item.split_once('=') else {
            continue;
        };
        let value = value.trim();
        // Some providers send floats or exponent notation
        let number = value
            .parse::<u64>()
            .ok()
            .or_else(|| value.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v as u64));
        let Some(number) = number else {
            continue;
        };
        match key.trim() {
            "upload" => usage.upload = number,
            "download" => usage.download = number,
            "total" => usage.total = number,
            "expire" => usage.expire = number,
            _ => continue,
        }
        found = true;
    }
    found.then_some(usage)
}

/// Format usage as a header value. `expire` is omitted when unknown.
pub fn format_userinfo(usage: &AirportUsage) -> String {
    let mut info = format!(
        "upload={};download={};total={}",
        usage.upload, usage.download, usage.total
    );
    if usage.expire > 0 {
        info.push_str(&format!(";expire={}", usage.expire));
    }
    info
}

/// Add `other` into `acc`: counters are summed, the earliest known expiry kept
pub fn accumulate(acc: &mut AirportUsage, other: &AirportUsage) {
    acc.upload = acc.upload.saturating_add(other.upload);
    acc.download = acc.download.saturating_add(other.download);
    acc.total = acc.total.saturating_add(other.total);
    if other.expire > 0 && (acc.expire == 0 || other.expire < acc.expire) {
        acc.expire = other.expire;
    }
}

/// Usage summed over the distinct airports present in the output
///
/// # Returns
/// `None` when no airport node is present or no usage is known for them
pub fn aggregate_usage(
    nodes: &[RenderedNode],
    store: &dyn UsageStore,
    diag: &mut Diagnostics,
) -> Option<AirportUsage> {
    let mut seen: HashSet<u64> = HashSet::new();
    let mut total: Option<AirportUsage> = None;
    for node in nodes.iter().map(|r| &r.node).filter(|n| n.is_airport()) {
        if !seen.insert(node.source_id) {
            continue;
        }
        match store.usage(node.source_id) {
            Ok(Some(usage)) => accumulate(total.get_or_insert_with(AirportUsage::default), &usage),
            Ok(None) => {}
            Err(e) => diag.warn(format!(
                "Usage of airport #{} unavailable: {}",
                node.source_id, e
            )),
        }
    }
    total
}
