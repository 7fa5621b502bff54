//! Deterministic baseline scoring and the confidence-weighted blend.
//!
//! Pure functions, total over valid input. The dimension weights are product
//! design constants; changing them is a policy change, not a bug fix.

use crate::model::{BaselineComponents, EventType, RiskEvent};

/// Weight of the geopolitical dimension in the baseline formula.
const W_GEOPOLITICAL: f64 = 0.35;
/// Weight of the port-congestion dimension.
const W_PORT_CONGESTION: f64 = 0.30;
/// Weight of the weather dimension.
const W_WEATHER: f64 = 0.20;
/// Weight of the (inverted) historical-reliability dimension.
const W_RELIABILITY: f64 = 0.15;

/// Events at or above this severity count against historical reliability.
const DISRUPTION_SEVERITY: i32 = 70;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn category_mean(events: &[RiskEvent], kind: EventType) -> f64 {
    let values: Vec<f64> = events
        .iter()
        .filter(|e| e.event_type == kind)
        .map(|e| e.severity as f64 * e.confidence)
        .collect();
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    mean.min(100.0)
}

/// Aggregate events into normalized scoring dimensions.
///
/// No events yields the neutral prior: zeroed categories with
/// `historical_reliability = 80`.
pub fn compute_components(events: &[RiskEvent]) -> BaselineComponents {
    if events.is_empty() {
        return BaselineComponents {
            geopolitical: 0.0,
            port_congestion: 0.0,
            weather: 0.0,
            historical_reliability: 80.0,
        };
    }

    let disruption_count = events
        .iter()
        .filter(|e| e.severity >= DISRUPTION_SEVERITY)
        .count() as f64;

    BaselineComponents {
        geopolitical: category_mean(events, EventType::Geopolitical),
        port_congestion: category_mean(events, EventType::PortCongestion),
        weather: category_mean(events, EventType::Weather),
        historical_reliability: (90.0 - disruption_count * 5.0).max(20.0),
    }
}

/// Weighted baseline formula, rounded to 2 decimals.
pub fn compute_baseline_risk(components: &BaselineComponents) -> f64 {
    round2(
        W_GEOPOLITICAL * components.geopolitical
            + W_PORT_CONGESTION * components.port_congestion
            + W_WEATHER * components.weather
            + W_RELIABILITY * (100.0 - components.historical_reliability),
    )
}

/// Blend deterministic and LLM risk, capped to [0, 100].
///
/// `llm_weight = 0.2 + 0.4 * confidence`, so the model's share stays inside
/// [0.2, 0.6] and the baseline never loses all influence.
pub fn combine_baseline_and_llm(baseline_risk: f64, llm_risk: u32, llm_confidence: f64) -> f64 {
    let llm_weight = 0.2 + 0.4 * llm_confidence;
    let baseline_weight = 1.0 - llm_weight;
    let score = baseline_weight * baseline_risk + llm_weight * llm_risk as f64;
    round2(score.clamp(0.0, 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(kind: EventType, severity: i32, confidence: f64) -> RiskEvent {
        RiskEvent {
            event_type: kind,
            geo_location: "Bab el-Mandeb".into(),
            severity,
            confidence,
            description: "test event".into(),
            source: "unit".into(),
            route: "Red Sea -> India".into(),
            event_time: Utc::now(),
        }
    }

    #[test]
    fn empty_input_yields_neutral_prior() {
        let components = compute_components(&[]);
        assert_eq!(components.historical_reliability, 80.0);
        assert_eq!(components.geopolitical, 0.0);
        // 0.15 * (100 - 80) = 3.0
        assert_eq!(compute_baseline_risk(&components), 3.0);
    }

    #[test]
    fn baseline_formula_exact() {
        let components = BaselineComponents {
            geopolitical: 80.0,
            port_congestion: 60.0,
            weather: 40.0,
            historical_reliability: 70.0,
        };
        assert_eq!(compute_baseline_risk(&components), 58.5);
    }

    #[test]
    fn category_mean_is_per_type_average() {
        let events = vec![
            event(EventType::Geopolitical, 80, 0.5),
            event(EventType::Geopolitical, 60, 1.0),
            event(EventType::Weather, 90, 0.9),
        ];
        let components = compute_components(&events);
        assert_eq!(components.geopolitical, 50.0); // (40 + 60) / 2
        assert_eq!(components.weather, 81.0);
        assert_eq!(components.port_congestion, 0.0);
    }

    #[test]
    fn category_mean_capped_at_100() {
        // severity * confidence cannot exceed 100 per event, but the cap
        // still guards the aggregate.
        let events = vec![event(EventType::PortCongestion, 100, 1.0)];
        let components = compute_components(&events);
        assert_eq!(components.port_congestion, 100.0);
    }

    #[test]
    fn reliability_degrades_with_severe_events_and_floors_at_20() {
        let events: Vec<RiskEvent> = (0..20)
            .map(|_| event(EventType::Other, 75, 0.5))
            .collect();
        let components = compute_components(&events);
        assert_eq!(components.historical_reliability, 20.0);

        let mild = vec![event(EventType::Other, 50, 0.5)];
        assert_eq!(compute_components(&mild).historical_reliability, 90.0);
    }

    #[test]
    fn baseline_risk_stays_in_range() {
        let extremes = BaselineComponents {
            geopolitical: 100.0,
            port_congestion: 100.0,
            weather: 100.0,
            historical_reliability: 20.0,
        };
        let risk = compute_baseline_risk(&extremes);
        assert!((0.0..=100.0).contains(&risk));
        assert_eq!(risk, 97.0);
    }

    #[test]
    fn blend_lands_between_inputs_when_llm_higher() {
        let score = combine_baseline_and_llm(60.0, 80, 0.75);
        assert!(score > 60.0 && score <= 80.0);
        // weight = 0.2 + 0.4*0.75 = 0.5 exactly
        assert_eq!(score, 70.0);
    }

    #[test]
    fn blend_clamps_to_bounds() {
        assert_eq!(combine_baseline_and_llm(0.0, 0, 0.0), 0.0);
        assert_eq!(combine_baseline_and_llm(100.0, 100, 1.0), 100.0);
    }

    #[test]
    fn blend_weight_bounded_even_at_zero_confidence() {
        // At confidence 0 the model still carries its 0.2 floor weight.
        let score = combine_baseline_and_llm(50.0, 100, 0.0);
        assert_eq!(score, 60.0);
    }
}
