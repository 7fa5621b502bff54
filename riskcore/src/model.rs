//! Shared decision contracts.
//!
//! Every payload that crosses a collaborator boundary (reasoning output,
//! decision records, dispatch-log rows) is a typed contract defined here.
//! Reasoning output is validated fail-closed: a response that parses but
//! violates a range is rejected, never coerced.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a normalized external event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Geopolitical,
    Weather,
    PortCongestion,
    Other,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Geopolitical => write!(f, "Geopolitical"),
            Self::Weather => write!(f, "Weather"),
            Self::PortCongestion => write!(f, "PortCongestion"),
            Self::Other => write!(f, "Other"),
        }
    }
}

/// A normalized external event consumed read-only by scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskEvent {
    pub event_type: EventType,
    pub geo_location: String,
    /// Severity on a 0–100 scale.
    pub severity: i32,
    /// Source confidence in [0, 1].
    pub confidence: f64,
    pub description: String,
    pub source: String,
    pub route: String,
    pub event_time: DateTime<Utc>,
}

/// Deterministic score components, each in [0, 100].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineComponents {
    pub geopolitical: f64,
    pub port_congestion: f64,
    pub weather: f64,
    pub historical_reliability: f64,
}

/// Violation raised when a reasoning payload fails range validation.
#[derive(Debug, Error)]
pub enum ContractViolation {
    #[error("risk_score {0} outside 0..=100")]
    RiskScore(u32),
    #[error("predicted_delay_days {0} is negative")]
    DelayDays(f64),
    #[error("confidence_score {0} outside 0..=1")]
    Confidence(f64),
}

/// Strictly validated reasoning output.
///
/// The `JsonSchema` derive feeds the output-constraint section of the
/// reasoning prompt; serde enforces field types, [`LlmAssessment::validate`]
/// enforces the ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LlmAssessment {
    /// Route disruption risk on a 0–100 integer scale.
    pub risk_score: u32,
    /// Expected delay in days, fractional allowed.
    pub predicted_delay_days: f64,
    /// Ordered reroute / logistics alternatives.
    pub alternatives: Vec<String>,
    /// Concise reasoning grounded in the supplied events.
    pub reasoning: String,
    /// Model self-confidence in [0, 1].
    pub confidence_score: f64,
}

impl LlmAssessment {
    /// Range validation over an already type-checked payload.
    pub fn validate(&self) -> Result<(), ContractViolation> {
        if self.risk_score > 100 {
            return Err(ContractViolation::RiskScore(self.risk_score));
        }
        if self.predicted_delay_days < 0.0 {
            return Err(ContractViolation::DelayDays(self.predicted_delay_days));
        }
        if !(0.0..=1.0).contains(&self.confidence_score) {
            return Err(ContractViolation::Confidence(self.confidence_score));
        }
        Ok(())
    }
}

/// One costed option inside a cost-benefit comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostOption {
    pub option: String,
    pub eta_days: f64,
    pub cost_per_container_usd: f64,
}

/// Wait-vs-reroute comparison attached to high-risk decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBenefit {
    pub assumptions: CostAssumptionsSnapshot,
    pub options: Vec<CostOption>,
    pub recommendation: String,
    pub rationale: String,
}

/// The ETA/cost assumptions a cost-benefit run was computed under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostAssumptionsSnapshot {
    pub primary_eta_days: f64,
    pub fallback_eta_days: f64,
    pub primary_cost_per_container_usd: f64,
    pub fallback_cost_per_container_usd: f64,
    pub wait_window_days: f64,
}

/// Immutable decision record: the unit of work handed to dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub route: String,
    pub baseline_risk: f64,
    pub llm_risk: u32,
    pub final_risk: f64,
    pub predicted_delay_days: f64,
    pub alternatives: Vec<String>,
    pub reason: String,
    pub confidence: f64,
    pub requires_escalation: bool,
    pub recommended_action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_benefit: Option<CostBenefit>,
}

/// Coarse severity class used for dedup and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBucket {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for RiskBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown risk bucket '{other}'")),
        }
    }
}

/// Terminal status of one dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Sent,
    Failed,
    DryRun,
}

impl std::fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sent => write!(f, "sent"),
            Self::Failed => write!(f, "failed"),
            Self::DryRun => write!(f, "dry_run"),
        }
    }
}

impl std::str::FromStr for DispatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            "dry_run" => Ok(Self::DryRun),
            other => Err(format!("unknown dispatch status '{other}'")),
        }
    }
}

/// One row of the append-only dispatch log.
///
/// Attempts never mutate prior rows; history is reconstructed by taking the
/// latest row per (alert_key, recipient), ordered by (created_at, id) so that
/// "latest" stays deterministic under clock skew.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRecord {
    /// Store-assigned monotonic id; 0 until persisted.
    #[serde(default)]
    pub id: i64,
    pub alert_key: String,
    pub route: String,
    pub risk_bucket: RiskBucket,
    pub recipient: String,
    pub status: DispatchStatus,
    pub attempt_number: i32,
    /// JSON snapshot of the [`DecisionResult`] for replay by the retry sweep.
    pub decision_payload: Option<String>,
    pub provider_message_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}
