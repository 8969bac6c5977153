use log::warn;
use serde::Serialize;

/// Coverage report for one chain rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleCoverage {
    pub rule_id: u64,
    pub rule_name: String,
    /// Nodes the rule's target condition matched
    pub matched: usize,
    /// Matched nodes already claimed by a lower-sort rule
    pub covered: usize,
    /// Nodes this rule actually wired
    pub effective: usize,
}

impl RuleCoverage {
    /// Share of matched nodes claimed by earlier rules, in percent
    pub fn covered_percent(&self) -> f64 {
        if self.matched == 0 {
            return 0.0;
        }
        self.covered as f64 * 100.0 / self.matched as f64
    }
}

/// Aggregate, non-fatal findings of one compilation
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub warnings: Vec<String>,
    pub coverage: Vec<RuleCoverage>,
}

impl Diagnostics {
    /// Log a warning and keep it for the caller
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.warnings.push(message);
    }
}
