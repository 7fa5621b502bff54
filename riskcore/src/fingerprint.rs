//! Deterministic fingerprints: the reasoning cache key and the alert dedup key.
//!
//! Both keys must be stable across processes and restarts, so they hash a
//! canonical serialization rather than any in-memory ordering. serde_json's
//! default object map is BTreeMap-backed, which gives sorted-key output; event
//! order inside `event_fingerprints` is significant and preserved as-is.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::model::{RiskBucket, RiskEvent};

/// Canonical representation of one evaluation's reasoning inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachePayload {
    pub route: String,
    pub event_count: usize,
    pub baseline_risk: f64,
    /// `type:location:severity` per event, in input order.
    pub event_fingerprints: Vec<String>,
}

/// Build the deterministic cache payload for a route evaluation.
pub fn build_cache_payload(route: &str, events: &[RiskEvent], baseline_risk: f64) -> CachePayload {
    CachePayload {
        route: route.to_string(),
        event_count: events.len(),
        baseline_risk,
        event_fingerprints: events
            .iter()
            .map(|e| format!("{}:{}:{}", e.event_type, e.geo_location, e.severity))
            .collect(),
    }
}

/// Stable hash of `{route, payload}` over canonical sorted-key JSON.
pub fn cache_key(route: &str, payload: &CachePayload) -> String {
    let blob = json!({
        "route": route,
        "payload": {
            "route": payload.route,
            "event_count": payload.event_count,
            "baseline_risk": payload.baseline_risk,
            "event_fingerprints": payload.event_fingerprints,
        },
    });
    blake3::hash(blob.to_string().as_bytes()).to_hex().to_string()
}

/// Map a final risk score to its coarse severity class.
pub fn risk_bucket(score: f64) -> RiskBucket {
    if score >= 80.0 {
        RiskBucket::Critical
    } else if score >= 60.0 {
        RiskBucket::High
    } else if score >= 40.0 {
        RiskBucket::Medium
    } else {
        RiskBucket::Low
    }
}

/// Dedup fingerprint for one recipient on one UTC calendar day.
///
/// Pure over its inputs, so identical alerts hash identically across process
/// restarts within the same day.
pub fn alert_key(route: &str, utc_date: NaiveDate, bucket: RiskBucket, recipient: &str) -> String {
    let seed = format!("{route}:{}:{bucket}:{recipient}", utc_date.format("%Y-%m-%d"));
    blake3::hash(seed.as_bytes()).to_hex().to_string()
}
