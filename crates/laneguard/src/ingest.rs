//! Event ingestion collaborator.
//!
//! Ingestion is an external producer of normalized [`RiskEvent`]s; feed
//! scraping and parsing heuristics live outside this service. [`EventSource`]
//! is the seam, and [`JsonFeed`] reads pre-normalized events from a fixture
//! file for local runs and crisis simulations. An empty result is valid
//! scorer input.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use riskcore::model::RiskEvent;

/// Producer of normalized events for one route.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Best-effort ingestion; may return an empty list.
    async fn ingest(&self, route: &str) -> Result<Vec<RiskEvent>>;
}

/// Fixture-backed source: a JSON array of events, filtered by route.
pub struct JsonFeed {
    path: PathBuf,
}

impl JsonFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl EventSource for JsonFeed {
    async fn ingest(&self, route: &str) -> Result<Vec<RiskEvent>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read events file {}", self.path.display()))?;
        let all: Vec<RiskEvent> =
            serde_json::from_str(&raw).context("events file is not a JSON array of events")?;
        let events: Vec<RiskEvent> = all.into_iter().filter(|e| e.route == route).collect();
        debug!(route, count = events.len(), "events ingested from fixture");
        Ok(events)
    }
}

/// Source with no feeds configured; every route yields no events.
pub struct EmptySource;

#[async_trait]
impl EventSource for EmptySource {
    async fn ingest(&self, _route: &str) -> Result<Vec<RiskEvent>> {
        Ok(Vec::new())
    }
}
