//! Compile curated proxy node collections into client-ready subscription
//! documents (Clash, Surge and plain link lists).

pub mod codec;
pub mod error;
pub mod generator;
pub mod interfaces;
pub mod models;
pub mod settings;
pub mod store;
pub mod utils;

pub use codec::{Codec, CodecError, LinkCodec, ProxyFields, ProxyType};
pub use error::{CompileError, ErrorPayload};
pub use generator::CompileTarget;
pub use interfaces::{
    CompileResult, PreviewRequest, PreviewRequestBuilder, PreviewResult, PreviewService,
    SubscriptionCompiler,
};
pub use models::{ChainRule, Diagnostics, Node, Subscription};
pub use settings::Settings;
