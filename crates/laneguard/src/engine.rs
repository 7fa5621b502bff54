//! Decision engine: baseline scoring, cache-then-call reasoning, blending.
//!
//! The cache lookup is an explicit two-state branch (hit/miss) so TTL expiry
//! and store outages are first-class paths: a failing cache read or write
//! degrades to always-miss behavior and never fails the route. A reasoning
//! failure, by contrast, is fatal to that route's evaluation — the engine
//! never fabricates an assessment.

use std::sync::Arc;

use tracing::{debug, info, warn};

use riskcore::fingerprint::{build_cache_payload, cache_key};
use riskcore::model::{DecisionResult, LlmAssessment, RiskEvent};
use riskcore::policy::{
    build_cost_benefit, should_trigger_reroute, CostAssumptions, COST_BENEFIT_THRESHOLD,
};
use riskcore::scoring::{combine_baseline_and_llm, compute_baseline_risk, compute_components};

use crate::errors::{EngineError, ReasoningError};
use crate::reasoning::Reasoner;
use crate::store::DecisionStore;

/// Confidence below which a decision always escalates, regardless of risk.
const ESCALATION_CONFIDENCE_FLOOR: f64 = 0.55;

/// Tunable engine thresholds.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Baseline risk below which the LLM is not consulted.
    pub llm_trigger_threshold: f64,
    /// Reasoning cache TTL in minutes.
    pub cache_ttl_minutes: i64,
    /// ETA/cost assumptions for the cost-benefit comparison.
    pub cost: CostAssumptions,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            llm_trigger_threshold: 45.0,
            cache_ttl_minutes: 60,
            cost: CostAssumptions::default(),
        }
    }
}

/// Coordinates scoring, reasoning, and caching into one immutable decision.
pub struct DecisionEngine {
    reasoner: Arc<dyn Reasoner>,
    store: Arc<dyn DecisionStore>,
    settings: EngineSettings,
}

impl DecisionEngine {
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        store: Arc<dyn DecisionStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            reasoner,
            store,
            settings,
        }
    }

    /// Deterministic stand-in used below the LLM trigger threshold.
    ///
    /// This is a cost/latency optimization, not a quality fallback: low
    /// baseline risk does not warrant a model call.
    fn synthesize_low_risk(baseline_risk: f64) -> LlmAssessment {
        let delay = ((baseline_risk / 20.0) * 100.0).round() / 100.0;
        LlmAssessment {
            risk_score: baseline_risk.round() as u32,
            predicted_delay_days: delay.max(0.5),
            alternatives: vec![
                "Continue normal route monitoring".into(),
                "Increase supplier lead-time buffer".into(),
            ],
            reasoning: "Baseline risk below LLM trigger threshold; deterministic policy applied."
                .into(),
            confidence_score: 0.60,
        }
    }

    /// Cache-then-call: consult the reasoning cache, invoke the model on a
    /// miss, and populate the cache on success.
    async fn assess_with_cache(
        &self,
        route: &str,
        events: &[RiskEvent],
        baseline_risk: f64,
    ) -> Result<LlmAssessment, ReasoningError> {
        let payload = build_cache_payload(route, events, baseline_risk);
        let key = cache_key(route, &payload);

        match self.store.get_cached(&key).await {
            Ok(Some(cached)) => {
                debug!(route, "reasoning cache hit");
                return Ok(cached);
            }
            Ok(None) => {}
            Err(e) => warn!(route, error = %e, "cache read failed, treating as miss"),
        }

        let assessment = self.reasoner.assess(route, events, baseline_risk).await?;
        assessment.validate()?;

        if let Err(e) = self
            .store
            .set_cached(&key, &assessment, self.settings.cache_ttl_minutes)
            .await
        {
            warn!(route, error = %e, "cache write failed, continuing uncached");
        }
        Ok(assessment)
    }

    /// Evaluate one route's events into an immutable decision record.
    pub async fn evaluate_route(
        &self,
        route: &str,
        events: &[RiskEvent],
    ) -> Result<DecisionResult, EngineError> {
        let components = compute_components(events);
        let baseline_risk = compute_baseline_risk(&components);

        let assessment = if baseline_risk < self.settings.llm_trigger_threshold {
            debug!(route, baseline_risk, "below LLM trigger threshold");
            Self::synthesize_low_risk(baseline_risk)
        } else {
            self.assess_with_cache(route, events, baseline_risk).await?
        };

        let final_risk = combine_baseline_and_llm(
            baseline_risk,
            assessment.risk_score,
            assessment.confidence_score,
        );

        let reroute = should_trigger_reroute(final_risk, assessment.predicted_delay_days);
        let requires_escalation =
            assessment.confidence_score < ESCALATION_CONFIDENCE_FLOOR || reroute;

        let cost_benefit =
            (final_risk > COST_BENEFIT_THRESHOLD).then(|| build_cost_benefit(&self.settings.cost));
        let recommended_action = if reroute {
            cost_benefit
                .as_ref()
                .map(|c| c.recommendation.clone())
                .unwrap_or_else(|| "reroute_now".into())
        } else {
            "monitor".into()
        };

        info!(
            route,
            baseline_risk,
            final_risk,
            requires_escalation,
            action = %recommended_action,
            "route evaluated"
        );

        Ok(DecisionResult {
            route: route.to_string(),
            baseline_risk,
            llm_risk: assessment.risk_score,
            final_risk,
            predicted_delay_days: assessment.predicted_delay_days,
            alternatives: assessment.alternatives,
            reason: assessment.reasoning,
            confidence: assessment.confidence_score,
            requires_escalation,
            recommended_action,
            cost_benefit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::Utc;

    use riskcore::model::{DispatchRecord, EventType};
    use crate::store::MemoryStore;

    /// Reasoner returning a fixed script, counting invocations.
    struct ScriptedReasoner {
        script: Mutex<Vec<Result<LlmAssessment, ReasoningError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedReasoner {
        fn new(script: Vec<Result<LlmAssessment, ReasoningError>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Reasoner for ScriptedReasoner {
        async fn assess(
            &self,
            _route: &str,
            _events: &[RiskEvent],
            _baseline_risk: f64,
        ) -> Result<LlmAssessment, ReasoningError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(ReasoningError::Provider("script exhausted".into())))
        }
    }

    /// Store whose cache always errors; everything else delegates to memory.
    struct BrokenCacheStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl DecisionStore for BrokenCacheStore {
        async fn get_cached(&self, _key: &str) -> Result<Option<LlmAssessment>> {
            Err(anyhow!("cache table unavailable"))
        }

        async fn set_cached(&self, _: &str, _: &LlmAssessment, _: i64) -> Result<()> {
            Err(anyhow!("cache table unavailable"))
        }

        async fn has_recent_alert(&self, key: &str, recipient: &str, hours: i64) -> Result<bool> {
            self.inner.has_recent_alert(key, recipient, hours).await
        }

        async fn log_dispatch(&self, record: DispatchRecord) -> Result<()> {
            self.inner.log_dispatch(record).await
        }

        async fn retry_candidates(&self, limit: usize, hours: i64) -> Result<Vec<DispatchRecord>> {
            self.inner.retry_candidates(limit, hours).await
        }

        async fn save_events(&self, events: &[RiskEvent]) -> Result<()> {
            self.inner.save_events(events).await
        }
    }

    fn event(kind: EventType, severity: i32, confidence: f64) -> RiskEvent {
        RiskEvent {
            event_type: kind,
            geo_location: "Bab el-Mandeb".into(),
            severity,
            confidence,
            description: "test".into(),
            source: "unit".into(),
            route: "Red Sea -> India".into(),
            event_time: Utc::now(),
        }
    }

    /// Events pushing baseline risk above the default 45 trigger.
    fn severe_events() -> Vec<RiskEvent> {
        vec![
            event(EventType::Geopolitical, 90, 0.9),
            event(EventType::Geopolitical, 95, 0.9),
            event(EventType::PortCongestion, 90, 0.9),
        ]
    }

    fn assessment(risk: u32, delay: f64, confidence: f64) -> LlmAssessment {
        LlmAssessment {
            risk_score: risk,
            predicted_delay_days: delay,
            alternatives: vec!["Cape of Good Hope".into()],
            reasoning: "strait contested".into(),
            confidence_score: confidence,
        }
    }

    fn engine_with(
        reasoner: Arc<dyn Reasoner>,
        store: Arc<dyn DecisionStore>,
    ) -> DecisionEngine {
        DecisionEngine::new(reasoner, store, EngineSettings::default())
    }

    #[tokio::test]
    async fn low_baseline_skips_the_reasoner() {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![]));
        let engine = engine_with(reasoner.clone(), Arc::new(MemoryStore::new()));

        let decision = engine.evaluate_route("quiet lane", &[]).await.unwrap();
        assert_eq!(reasoner.call_count(), 0);
        assert_eq!(decision.baseline_risk, 3.0);
        assert_eq!(decision.llm_risk, 3);
        assert_eq!(decision.predicted_delay_days, 0.5);
        assert_eq!(decision.confidence, 0.60);
        assert_eq!(decision.final_risk, 3.0);
        assert!(!decision.requires_escalation);
        assert_eq!(decision.recommended_action, "monitor");
        assert!(decision.cost_benefit.is_none());
    }

    #[tokio::test]
    async fn miss_invokes_reasoner_and_populates_cache() {
        let store = Arc::new(MemoryStore::new());
        let reasoner = Arc::new(ScriptedReasoner::new(vec![Ok(assessment(80, 7.0, 0.8))]));
        let engine = engine_with(reasoner.clone(), store.clone());

        let events = severe_events();
        let first = engine.evaluate_route("Red Sea -> India", &events).await.unwrap();
        assert_eq!(reasoner.call_count(), 1);
        assert_eq!(first.llm_risk, 80);

        // Second evaluation with identical inputs is served from cache.
        let second = engine.evaluate_route("Red Sea -> India", &events).await.unwrap();
        assert_eq!(reasoner.call_count(), 1);
        assert_eq!(second.llm_risk, 80);
    }

    #[tokio::test]
    async fn reasoning_failure_propagates() {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![Err(
            ReasoningError::InvalidResponse("not json".into()),
        )]));
        let engine = engine_with(reasoner, Arc::new(MemoryStore::new()));

        let err = engine
            .evaluate_route("Red Sea -> India", &severe_events())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Reasoning(_)));
    }

    #[tokio::test]
    async fn broken_cache_degrades_to_miss() {
        let store = Arc::new(BrokenCacheStore {
            inner: MemoryStore::new(),
        });
        let reasoner = Arc::new(ScriptedReasoner::new(vec![
            Ok(assessment(75, 4.0, 0.7)),
            Ok(assessment(75, 4.0, 0.7)),
        ]));
        let engine = engine_with(reasoner.clone(), store);

        let events = severe_events();
        // Both evaluations succeed; each re-runs reasoning since the cache
        // is effectively always-miss.
        engine.evaluate_route("r", &events).await.unwrap();
        engine.evaluate_route("r", &events).await.unwrap();
        assert_eq!(reasoner.call_count(), 2);
    }

    #[tokio::test]
    async fn low_confidence_escalates_even_at_low_risk() {
        // Open-question behavior preserved: no risk floor on the
        // confidence trigger.
        let reasoner = Arc::new(ScriptedReasoner::new(vec![Ok(assessment(50, 1.0, 0.3))]));
        let engine = engine_with(reasoner, Arc::new(MemoryStore::new()));

        let decision = engine
            .evaluate_route("r", &severe_events())
            .await
            .unwrap();
        assert!(decision.final_risk < 70.0);
        assert!(decision.requires_escalation);
        assert_eq!(decision.recommended_action, "monitor");
    }

    #[tokio::test]
    async fn reroute_picks_cost_benefit_recommendation() {
        let reasoner = Arc::new(ScriptedReasoner::new(vec![Ok(assessment(95, 8.0, 0.9))]));
        let engine = engine_with(reasoner, Arc::new(MemoryStore::new()));

        let decision = engine
            .evaluate_route("r", &severe_events())
            .await
            .unwrap();
        assert!(decision.final_risk > 75.0);
        assert!(decision.requires_escalation);
        let cba = decision.cost_benefit.as_ref().unwrap();
        // Default assumptions favor waiting, and reroute was triggered, so
        // the action follows the comparison.
        assert_eq!(decision.recommended_action, cba.recommendation);
        assert_eq!(decision.recommended_action, "wait");
    }

    #[tokio::test]
    async fn reroute_without_cost_benefit_defaults_to_reroute_now() {
        // Risk in (70, 75]: reroute triggers but no comparison is attached.
        let reasoner = Arc::new(ScriptedReasoner::new(vec![Ok(assessment(90, 8.0, 0.6))]));
        let engine = engine_with(reasoner, Arc::new(MemoryStore::new()));

        let decision = engine
            .evaluate_route("r", &severe_events())
            .await
            .unwrap();
        assert!(decision.final_risk > 70.0 && decision.final_risk <= 75.0);
        assert!(decision.cost_benefit.is_none());
        assert_eq!(decision.recommended_action, "reroute_now");
    }

    #[tokio::test]
    async fn invalid_cached_style_assessment_is_rejected_before_caching() {
        // Reasoner returns an out-of-contract payload; the engine validates
        // before caching and fails the route.
        let bad = LlmAssessment {
            confidence_score: 1.4,
            ..assessment(80, 4.0, 0.9)
        };
        let reasoner = Arc::new(ScriptedReasoner::new(vec![Ok(bad)]));
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(reasoner, store);

        let err = engine
            .evaluate_route("r", &severe_events())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Reasoning(ReasoningError::Contract(_))
        ));
    }
}
