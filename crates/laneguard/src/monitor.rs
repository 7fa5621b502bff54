//! Monitoring cycle: per-route fan-out, fan-in, then one retry sweep.
//!
//! One cycle's wall-clock time is bounded by the slowest route, not the sum:
//! each route runs as its own task and the cycle joins them before the sweep.
//! A route failure is logged and skipped for that cycle; the loop continues
//! with the remaining routes and retries everything next interval.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use tracing::{error, info, warn};

use riskcore::model::DecisionResult;

use crate::config::MonitorConfig;
use crate::dispatch::AlertDispatcher;
use crate::embed::{Embedder, NoopEmbedder, OllamaEmbedder};
use crate::engine::{DecisionEngine, EngineSettings};
use crate::ingest::{EmptySource, EventSource, JsonFeed};
use crate::mailer::{AlertSender, NullMailer, SendGridMailer};
use crate::reasoning::{OllamaReasoner, Reasoner};
use crate::store::{DecisionStore, MemoryStore, PgStore};

/// Backoff after a failed monitoring cycle.
const CYCLE_FAILURE_BACKOFF: Duration = Duration::from_secs(300);

/// Wired monitor: engine + dispatcher + collaborators for one deployment.
pub struct Monitor {
    config: MonitorConfig,
    engine: DecisionEngine,
    dispatcher: AlertDispatcher,
    store: Arc<dyn DecisionStore>,
    source: Arc<dyn EventSource>,
}

impl Monitor {
    /// Wire a monitor from explicit collaborators (tests, embedded use).
    pub fn new(
        config: MonitorConfig,
        store: Arc<dyn DecisionStore>,
        reasoner: Arc<dyn Reasoner>,
        sender: Arc<dyn AlertSender>,
        source: Arc<dyn EventSource>,
    ) -> Self {
        let settings = EngineSettings {
            llm_trigger_threshold: config.llm_trigger_threshold,
            cache_ttl_minutes: config.cache_ttl_minutes,
            ..EngineSettings::default()
        };
        let engine = DecisionEngine::new(reasoner, store.clone(), settings);
        let dispatcher = AlertDispatcher::new(
            store.clone(),
            sender,
            config.dedup_hours,
            config.max_retries,
        );
        Self {
            config,
            engine,
            dispatcher,
            store,
            source,
        }
    }

    /// Wire the production collaborators described by the config.
    pub async fn from_config(config: MonitorConfig) -> Result<Self> {
        config.validate()?;

        let store: Arc<dyn DecisionStore> = if config.database_url.is_empty() {
            warn!("no database configured, using in-memory store");
            Arc::new(MemoryStore::new())
        } else {
            let embedder: Box<dyn Embedder> = if config.enable_embeddings {
                Box::new(OllamaEmbedder::new(
                    config.ollama_base_url.clone(),
                    config.ollama_model.clone(),
                ))
            } else {
                Box::new(NoopEmbedder)
            };
            let store = PgStore::connect(&config.database_url, embedder).await?;
            store.ensure_schema().await?;
            Arc::new(store)
        };

        let reasoner: Arc<dyn Reasoner> = Arc::new(OllamaReasoner::new(
            config.ollama_base_url.clone(),
            config.ollama_model.clone(),
        ));

        let sender: Arc<dyn AlertSender> =
            if config.sendgrid_api_key.is_empty() || config.sender_email.is_empty() {
                warn!("delivery provider not configured, sends will be recorded as failed");
                Arc::new(NullMailer)
            } else {
                Arc::new(SendGridMailer::new(
                    config.sendgrid_api_key.clone(),
                    config.sender_email.clone(),
                ))
            };

        let source: Arc<dyn EventSource> = match &config.events_file {
            Some(path) => Arc::new(JsonFeed::new(path)),
            None => Arc::new(EmptySource),
        };

        Ok(Self::new(config, store, reasoner, sender, source))
    }

    /// Run ingestion, evaluation, and (if escalated) dispatch for one route.
    pub async fn process_route(&self, route: &str, dry_run: bool) -> Result<DecisionResult> {
        let events = self.source.ingest(route).await?;
        if !dry_run {
            self.store.save_events(&events).await?;
        }

        let decision = self.engine.evaluate_route(route, &events).await?;
        info!(
            route,
            risk = decision.final_risk,
            delay = decision.predicted_delay_days,
            action = %decision.recommended_action,
            "route processed"
        );

        if decision.requires_escalation {
            self.dispatcher
                .dispatch(&self.config.recipients, &decision, dry_run)
                .await?;
        }
        Ok(decision)
    }

    /// One monitoring cycle: all routes concurrently, then the retry sweep.
    ///
    /// Returns the number of routes that failed this cycle.
    pub async fn run_once(&self, dry_run: bool) -> Result<usize> {
        let route_runs = self
            .config
            .routes
            .iter()
            .map(|route| async move { (route.clone(), self.process_route(route, dry_run).await) });

        let mut failures = 0;
        for (route, outcome) in join_all(route_runs).await {
            if let Err(e) = outcome {
                failures += 1;
                error!(route = %route, error = %e, "route evaluation failed, skipping this cycle");
            }
        }

        let retried = self
            .dispatcher
            .retry_failed_dispatches(
                self.config.retry_batch_size,
                self.config.retry_lookback_hours,
                dry_run,
            )
            .await?;
        info!(retried, failures, "monitoring cycle complete");
        Ok(failures)
    }

    /// Continuous monitoring at the configured interval.
    pub async fn monitoring_loop(&self, dry_run: bool) -> Result<()> {
        info!(
            routes = self.config.routes.len(),
            interval_s = self.config.monitor_interval_secs,
            "monitoring active"
        );
        info!(config = %self.config.redacted_snapshot(), "effective configuration");

        loop {
            match self.run_once(dry_run).await {
                Ok(_) => {
                    tokio::time::sleep(Duration::from_secs(self.config.monitor_interval_secs))
                        .await;
                }
                Err(e) => {
                    error!(error = %e, "monitoring cycle failed");
                    tokio::time::sleep(CYCLE_FAILURE_BACKOFF).await;
                }
            }
        }
    }

    /// Run one retry sweep outside a full cycle (CLI `retry`).
    pub async fn retry_sweep(&self, dry_run: bool) -> Result<usize> {
        self.dispatcher
            .retry_failed_dispatches(
                self.config.retry_batch_size,
                self.config.retry_lookback_hours,
                dry_run,
            )
            .await
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.dispatcher
    }
}
