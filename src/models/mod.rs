//! Core data models for the compilation pipeline
//!
//! This module contains the plain data structures the pipeline consumes and
//! produces, separated from the stages that operate on them.
//!
//! ```rust
//! use subcompiler::models::{Node, TestStatus};
//!
//! let node = Node {
//!     id: 1,
//!     name: "HK 01".to_string(),
//!     delay_time: 80,
//!     delay_status: TestStatus::Success,
//!     ..Default::default()
//! };
//! assert_eq!(node.original_name(), "HK 01");
//! ```

pub mod chain;
pub mod diagnostics;
pub mod node;
pub mod proxy_group_config;
pub mod regex_match_config;
pub mod subscription;
pub mod tag_condition;

pub use chain::{ChainHop, ChainRule, TargetConfig};
pub use diagnostics::{Diagnostics, RuleCoverage};
pub use node::{protocol_of_link, Node, TestStatus, AIRPORT_SOURCE};
pub use proxy_group_config::{CustomProxyGroup, CustomProxyGroups, ProxyGroupType, UrlTestOptions};
pub use regex_match_config::{parse_regex_match_configs, RegexMatchConfig, RegexMatchConfigs};
pub use subscription::{FilterConfig, OutputConfig, SelectionItem, Subscription};
pub use tag_condition::{ConditionField, ConditionNode, Logic, Operator, TagCondition, TagConditions};
