//! Collaborator stores consumed by the compiler
//!
//! The compiler never touches persistence directly. It reads nodes, chain
//! rules, base templates and airport usage through the traits below, each of
//! which hands out owned snapshots.

pub mod node_store;
pub mod subscription_store;
pub mod template_store;
pub mod usage_store;

use thiserror::Error;

use crate::utils::http::FetchError;

pub use node_store::{MemoryNodeStore, NodeStore, ReadThroughNodeStore};
pub use subscription_store::{MemorySubscriptionStore, SubscriptionStore};
pub use template_store::{FileTemplateStore, TemplateStore};
pub use usage_store::{AirportUsage, MemoryUsageStore, UsageStore};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store lock poisoned")]
    Poisoned,

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
}
