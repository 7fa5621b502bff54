//! Error taxonomy for the decision engine and the dispatch pipeline.
//!
//! Two failure families with different recovery semantics:
//!
//! | Error            | Recovery                                            |
//! |------------------|-----------------------------------------------------|
//! | `ReasoningError` | fatal to that route's evaluation; next cycle retries |
//! | `DeliveryError`  | bounded in-process retry; exhaustion becomes a persisted `failed` record |
//!
//! A cache miss is not an error — it is the normal path into reasoning. Store
//! failures around the cache degrade to always-miss and never fail the route.

use riskcore::model::ContractViolation;
use thiserror::Error;

/// The reasoning collaborator produced no usable assessment.
#[derive(Debug, Error)]
pub enum ReasoningError {
    /// Network or backend failure reaching the model provider.
    #[error("reasoning provider failure: {0}")]
    Provider(String),

    /// The response arrived but could not be parsed into the contract.
    #[error("invalid model response: {0}")]
    InvalidResponse(String),

    /// The response parsed but violated a contract range.
    #[error("model response out of contract: {0}")]
    Contract(#[from] ContractViolation),
}

/// One delivery attempt failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Provider rejected the request with a non-2xx status.
    #[error("http_status_{0}")]
    Http(u16),

    /// Transport-level failure (timeout, connection refused).
    #[error("provider error: {0}")]
    Provider(String),

    /// No delivery provider is configured; sends cannot succeed.
    #[error("mailer_not_configured")]
    NotConfigured,
}

/// Failure of a whole route evaluation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Reasoning(#[from] ReasoningError),

    /// Storage failed in a way that cannot degrade (event persistence).
    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}
