//! LLM reasoning collaborator with strict output validation.
//!
//! [`Reasoner`] is a trait so the engine can be exercised with scripted stubs.
//! The production implementation talks to an Ollama-compatible chat endpoint
//! over JSON. Output handling is fail-closed: a payload that does not parse
//! into [`LlmAssessment`], or parses outside the contract ranges, raises
//! [`ReasoningError`] — the engine never fabricates a response on failure.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use riskcore::model::{LlmAssessment, RiskEvent};

use crate::errors::ReasoningError;

/// Reasoning collaborator contract.
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Produce a validated qualitative assessment for one route.
    async fn assess(
        &self,
        route: &str,
        events: &[RiskEvent],
        baseline_risk: f64,
    ) -> Result<LlmAssessment, ReasoningError>;
}

/// Build the analyst prompt for one route evaluation.
fn build_prompt(route: &str, events: &[RiskEvent], baseline_risk: f64) -> String {
    let bullets: Vec<String> = events
        .iter()
        .map(|e| {
            format!(
                "- [{}] {} | severity={} confidence={:.2} | {}",
                e.event_type, e.geo_location, e.severity, e.confidence, e.description
            )
        })
        .collect();

    format!(
        "Role: Senior Supply Chain Risk Analyst\n\
         Route: {route}\n\
         BaselineRisk: {baseline_risk}\n\
         \n\
         Recent Events:\n{}\n\
         \n\
         Task:\n\
         1) Assess route disruption risk (0-100)\n\
         2) Predict delay in days\n\
         3) Suggest 2 reroute/logistics alternatives\n\
         4) Give concise reasoning grounded in events only\n\
         5) Provide confidence score between 0 and 1\n\
         \n\
         Output constraints:\n\
         - Return JSON only\n\
         - No markdown, no extra keys\n\
         \n\
         Schema:\n\
         {{\n\
           \"risk_score\": int,\n\
           \"predicted_delay_days\": float,\n\
           \"alternatives\": [\"string\", \"string\"],\n\
           \"reasoning\": \"string\",\n\
           \"confidence_score\": float\n\
         }}",
        bullets.join("\n")
    )
}

/// Parse and range-validate a raw model payload.
pub fn parse_assessment(raw: &str) -> Result<LlmAssessment, ReasoningError> {
    let assessment: LlmAssessment = serde_json::from_str(raw)
        .map_err(|e| ReasoningError::InvalidResponse(e.to_string()))?;
    assessment.validate()?;
    Ok(assessment)
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

/// Reasoner backed by an Ollama-compatible `/api/chat` endpoint.
pub struct OllamaReasoner {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaReasoner {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl Reasoner for OllamaReasoner {
    async fn assess(
        &self,
        route: &str,
        events: &[RiskEvent],
        baseline_risk: f64,
    ) -> Result<LlmAssessment, ReasoningError> {
        let prompt = build_prompt(route, events, baseline_risk);
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "format": "json",
            "stream": false,
        });

        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ReasoningError::Provider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReasoningError::Provider(format!(
                "chat endpoint returned {status}"
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ReasoningError::InvalidResponse(e.to_string()))?;

        debug!(route, chars = chat.message.content.len(), "reasoning response received");
        parse_assessment(&chat.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use riskcore::model::EventType;

    #[test]
    fn well_formed_payload_parses() {
        let raw = r#"{
            "risk_score": 82,
            "predicted_delay_days": 6.5,
            "alternatives": ["Cape of Good Hope", "air freight for priority cargo"],
            "reasoning": "sustained attacks near the strait",
            "confidence_score": 0.78
        }"#;
        let assessment = parse_assessment(raw).unwrap();
        assert_eq!(assessment.risk_score, 82);
        assert_eq!(assessment.alternatives.len(), 2);
    }

    #[test]
    fn non_json_payload_is_invalid_response() {
        let err = parse_assessment("the risk is high, trust me").unwrap_err();
        assert!(matches!(err, ReasoningError::InvalidResponse(_)));
    }

    #[test]
    fn wrong_field_type_is_invalid_response() {
        // risk_score as string must not be coerced.
        let raw = r#"{
            "risk_score": "82",
            "predicted_delay_days": 6.5,
            "alternatives": [],
            "reasoning": "x",
            "confidence_score": 0.7
        }"#;
        assert!(matches!(
            parse_assessment(raw).unwrap_err(),
            ReasoningError::InvalidResponse(_)
        ));
    }

    #[test]
    fn out_of_range_payload_is_contract_error() {
        let raw = r#"{
            "risk_score": 140,
            "predicted_delay_days": 6.5,
            "alternatives": [],
            "reasoning": "x",
            "confidence_score": 0.7
        }"#;
        assert!(matches!(
            parse_assessment(raw).unwrap_err(),
            ReasoningError::Contract(_)
        ));
    }

    #[test]
    fn prompt_lists_events_and_baseline() {
        let events = vec![RiskEvent {
            event_type: EventType::Geopolitical,
            geo_location: "Bab el-Mandeb".into(),
            severity: 88,
            confidence: 0.72,
            description: "vessel attacked".into(),
            source: "unit".into(),
            route: "Red Sea -> India".into(),
            event_time: Utc::now(),
        }];
        let prompt = build_prompt("Red Sea -> India", &events, 61.5);
        assert!(prompt.contains("BaselineRisk: 61.5"));
        assert!(prompt.contains("[Geopolitical] Bab el-Mandeb | severity=88"));
        assert!(prompt.contains("Return JSON only"));
    }
}
