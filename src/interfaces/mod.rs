pub mod compiler;
pub mod preview;

pub use compiler::{prepare_nodes, CompileResult, SubscriptionCompiler};
pub use preview::{PreviewEntry, PreviewRequest, PreviewRequestBuilder, PreviewResult, PreviewService};
