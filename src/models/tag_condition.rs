//! Boolean condition trees evaluated against a single node
//!
//! Conditions are used by chain rules to pick their target nodes, by
//! dynamic-node hops and by custom proxy groups to select members.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::Node;

/// How the children of a condition group are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Logic {
    #[default]
    And,
    Or,
}

/// Node attribute a leaf condition inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionField {
    Name,
    LinkName,
    Country,
    Protocol,
    Group,
    Source,
    Tag,
    Host,
    Port,
    Speed,
    Delay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "equals")]
    Equals,
    #[serde(rename = "not_equals")]
    NotEquals,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "not_contains")]
    NotContains,
    #[serde(rename = "regex")]
    Regex,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
}

impl Operator {
    fn is_negated(self) -> bool {
        matches!(self, Operator::NotEquals | Operator::NotContains)
    }
}

/// A single `field operator value` test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagCondition {
    pub field: ConditionField,
    pub operator: Operator,
    #[serde(default)]
    pub value: String,
    /// `value` compiled on first regex evaluation; `None` when invalid
    #[serde(skip)]
    pattern: OnceLock<Option<Regex>>,
}

impl PartialEq for TagCondition {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field && self.operator == other.operator && self.value == other.value
    }
}

/// Either a leaf test or a nested group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionNode {
    Leaf(TagCondition),
    Group(TagConditions),
}

/// A group of conditions joined by one logic operator
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TagConditions {
    #[serde(default)]
    pub logic: Logic,
    #[serde(default)]
    pub conditions: Vec<ConditionNode>,
}

impl TagConditions {
    pub fn new(logic: Logic, conditions: Vec<ConditionNode>) -> Self {
        Self { logic, conditions }
    }

    /// Convenience constructor for a single-leaf group
    pub fn single(field: ConditionField, operator: Operator, value: &str) -> Self {
        Self {
            logic: Logic::And,
            conditions: vec![ConditionNode::Leaf(TagCondition::new(field, operator, value))],
        }
    }

    /// Evaluate the tree against a node. An empty group matches nothing.
    pub fn matches(&self, node: &Node) -> bool {
        if self.conditions.is_empty() {
            return false;
        }
        match self.logic {
            Logic::And => self.conditions.iter().all(|c| c.matches(node)),
            Logic::Or => self.conditions.iter().any(|c| c.matches(node)),
        }
    }
}

impl ConditionNode {
    pub fn matches(&self, node: &Node) -> bool {
        match self {
            ConditionNode::Leaf(leaf) => leaf.matches(node),
            ConditionNode::Group(group) => group.matches(node),
        }
    }
}

impl TagCondition {
    pub fn new(field: ConditionField, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            field,
            operator,
            value: value.into(),
            pattern: OnceLock::new(),
        }
    }

    fn pattern(&self) -> Option<&Regex> {
        self.pattern
            .get_or_init(|| Regex::new(&self.value).ok())
            .as_ref()
    }

    pub fn matches(&self, node: &Node) -> bool {
        match self.field {
            ConditionField::Tag => {
                // Negated operators must hold for every tag, the rest for any
                if self.operator.is_negated() {
                    node.tags.iter().all(|t| self.compare(t))
                } else {
                    node.tags.iter().any(|t| self.compare(t))
                }
            }
            ConditionField::Name => self.compare(node.original_name()),
            ConditionField::LinkName => self.compare(&node.link_name),
            ConditionField::Country => self.compare(&node.country),
            ConditionField::Protocol => self.compare(&node.effective_protocol()),
            ConditionField::Group => self.compare(&node.group),
            ConditionField::Source => self.compare(&node.source),
            ConditionField::Host => self.compare(&node.host),
            ConditionField::Port => self.compare(&node.port.to_string()),
            ConditionField::Speed => self.compare(&node.speed.to_string()),
            ConditionField::Delay => self.compare(&node.delay_time.to_string()),
        }
    }

    fn compare(&self, actual: &str) -> bool {
        let expected = self.value.as_str();
        match self.operator {
            Operator::Equals => actual.eq_ignore_ascii_case(expected),
            Operator::NotEquals => !actual.eq_ignore_ascii_case(expected),
            Operator::Contains => actual.to_lowercase().contains(&expected.to_lowercase()),
            Operator::NotContains => !actual.to_lowercase().contains(&expected.to_lowercase()),
            Operator::Regex => self.pattern().is_some_and(|re| re.is_match(actual)),
            Operator::GreaterThan => compare_numeric(actual, expected, |a, b| a > b),
            Operator::LessThan => compare_numeric(actual, expected, |a, b| a < b),
            Operator::GreaterOrEqual => compare_numeric(actual, expected, |a, b| a >= b),
            Operator::LessOrEqual => compare_numeric(actual, expected, |a, b| a <= b),
        }
    }
}

fn compare_numeric(actual: &str, expected: &str, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.trim().parse::<f64>(), expected.trim().parse::<f64>()) {
        (Ok(a), Ok(b)) => cmp(a, b),
        _ => false,
    }
}
