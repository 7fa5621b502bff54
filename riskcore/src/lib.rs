//! Deterministic core of the laneguard route monitor.
//!
//! This crate holds everything that must be pure and reproducible:
//! - typed contracts shared across collaborators ([`model`])
//! - baseline scoring and the confidence-weighted blend ([`scoring`])
//! - cache and dedup fingerprints ([`fingerprint`])
//! - the reroute / cost-benefit policy ([`policy`])
//!
//! No I/O and no async live here; the service crate (`laneguard`) wires these
//! into the decision engine and the alert dispatcher.

pub mod fingerprint;
pub mod model;
pub mod policy;
pub mod scoring;

pub use fingerprint::{alert_key, build_cache_payload, cache_key, risk_bucket, CachePayload};
pub use model::{
    BaselineComponents, ContractViolation, CostBenefit, CostOption, DecisionResult,
    DispatchRecord, DispatchStatus, EventType, LlmAssessment, RiskBucket, RiskEvent,
};
pub use policy::{
    build_cost_benefit, should_trigger_reroute, CostAssumptions, COST_BENEFIT_THRESHOLD,
};
pub use scoring::{combine_baseline_and_llm, compute_baseline_risk, compute_components};
