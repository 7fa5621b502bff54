//! Reroute decision policy and the wait-vs-reroute cost-benefit comparison.

use serde::{Deserialize, Serialize};

use crate::model::{CostAssumptionsSnapshot, CostBenefit, CostOption};

/// Decision policy for proactive rerouting.
pub fn should_trigger_reroute(final_risk: f64, predicted_delay_days: f64) -> bool {
    final_risk > 70.0 && predicted_delay_days > 5.0
}

/// Final risk above which a cost-benefit comparison is attached.
pub const COST_BENEFIT_THRESHOLD: f64 = 75.0;

/// ETA/cost assumptions behind the cost-benefit comparison.
///
/// The defaults model a contested primary lane (Red Sea) against the Cape of
/// Good Hope fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostAssumptions {
    /// Transit days on the primary lane once it clears.
    pub primary_eta_days: f64,
    /// Transit days on the fallback lane.
    pub fallback_eta_days: f64,
    pub primary_cost_per_container_usd: f64,
    pub fallback_cost_per_container_usd: f64,
    /// Days to hold before committing to the primary lane.
    pub wait_window_days: f64,
}

impl Default for CostAssumptions {
    fn default() -> Self {
        Self {
            primary_eta_days: 15.0,
            fallback_eta_days: 28.0,
            primary_cost_per_container_usd: 2000.0,
            fallback_cost_per_container_usd: 3500.0,
            wait_window_days: 3.0,
        }
    }
}

/// Compare waiting out the disruption against rerouting immediately.
///
/// Recommends "wait" only when the wait ETA is strictly lower than the
/// fallback ETA; ties go to rerouting.
pub fn build_cost_benefit(assumptions: &CostAssumptions) -> CostBenefit {
    let wait_eta = assumptions.primary_eta_days + assumptions.wait_window_days;

    let wait_option = CostOption {
        option: "wait".into(),
        eta_days: (wait_eta * 100.0).round() / 100.0,
        cost_per_container_usd: assumptions.primary_cost_per_container_usd,
    };
    let reroute_option = CostOption {
        option: "reroute_now".into(),
        eta_days: (assumptions.fallback_eta_days * 100.0).round() / 100.0,
        cost_per_container_usd: assumptions.fallback_cost_per_container_usd,
    };

    let (recommendation, rationale) = if wait_eta < assumptions.fallback_eta_days {
        (
            "wait".to_string(),
            "Waiting is cheaper and still faster than the fallback lane.".to_string(),
        )
    } else {
        (
            "reroute_now".to_string(),
            "Rerouting is selected because waiting does not improve ETA.".to_string(),
        )
    };

    CostBenefit {
        assumptions: CostAssumptionsSnapshot {
            primary_eta_days: assumptions.primary_eta_days,
            fallback_eta_days: assumptions.fallback_eta_days,
            primary_cost_per_container_usd: assumptions.primary_cost_per_container_usd,
            fallback_cost_per_container_usd: assumptions.fallback_cost_per_container_usd,
            wait_window_days: assumptions.wait_window_days,
        },
        options: vec![wait_option, reroute_option],
        recommendation,
        rationale,
    }
}
