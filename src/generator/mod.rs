//! Compilation pipeline stages
//!
//! Filter, deduplicate, rename, resolve chains, then assemble. Each stage is
//! a plain function over owned or borrowed node lists.

pub mod chain;
pub mod dedup;
pub mod embedded;
pub mod filter;
pub mod formats;
pub mod group;
pub mod remark;
pub mod subinfo;
pub mod template;

pub use chain::{resolve_chains, ChainResolution};
pub use dedup::{deduplicate, DedupField, DedupRule};
pub use embedded::{fetch_embedded, EmbeddedSubscription};
pub use filter::filter_nodes;
pub use formats::{assemble, retain_emittable, AssembleContext, CompileTarget};
pub use group::group_generate;
pub use remark::{render, render_nodes, RenameContext, RenderedEntry, RenderedNode};
pub use subinfo::{aggregate_usage, format_userinfo, parse_userinfo, SUBSCRIPTION_USERINFO};
pub use template::{splice_sections, SectionStyle};
