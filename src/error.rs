use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Failures that abort a whole compilation.
///
/// Everything else (bad links, chain gaps, unreachable sub-subscriptions)
/// degrades and is reported through diagnostics instead.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("base template '{reference}' is unavailable: {source}")]
    BaseTemplate {
        reference: String,
        #[source]
        source: StoreError,
    },

    #[error("base template is malformed: {0}")]
    TemplateMalformed(String),

    #[error("failed to serialize document: {0}")]
    Serialize(String),

    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("compilation cancelled")]
    Cancelled,
}

impl CompileError {
    pub fn code(&self) -> &'static str {
        match self {
            CompileError::BaseTemplate { .. } => "base_template_unavailable",
            CompileError::TemplateMalformed(_) => "template_malformed",
            CompileError::Serialize(_) => "serialization_failed",
            CompileError::SubscriptionNotFound(_) => "subscription_not_found",
            CompileError::Store(_) => "store_unavailable",
            CompileError::Cancelled => "cancelled",
        }
    }
}

/// User-visible error payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl From<&CompileError> for ErrorPayload {
    fn from(err: &CompileError) -> Self {
        ErrorPayload {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<CompileError> for ErrorPayload {
    fn from(err: CompileError) -> Self {
        ErrorPayload::from(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_from_error() {
        let err = CompileError::BaseTemplate {
            reference: "base/clash.yaml".to_string(),
            source: StoreError::NotFound("base/clash.yaml".to_string()),
        };
        let payload = ErrorPayload::from(&err);
        assert_eq!(payload.code, "base_template_unavailable");
        assert!(payload.message.contains("base/clash.yaml"));
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.starts_with(r#"{"code":"base_template_unavailable","message":"#));
    }
}
