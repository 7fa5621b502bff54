//! Storage collaborator: reasoning cache, append-only dispatch log, events.
//!
//! The core never holds locks over shared state; it relies on the store's
//! per-row atomicity (cache upsert by key, append-only log inserts). Two
//! implementations:
//! - [`MemoryStore`] — in-process, used by tests and `--dry-run` paths.
//! - [`PgStore`] — tokio-postgres backend mirroring the same contract.
//!
//! "Latest record per (alert_key, recipient)" is always selected by the
//! explicit sort key (created_at, id) — never by storage insertion order.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio_postgres::NoTls;
use tracing::{debug, warn};

use riskcore::model::{DispatchRecord, DispatchStatus, LlmAssessment, RiskEvent};

use crate::embed::Embedder;

/// Storage contract shared by the engine and the dispatcher.
#[async_trait]
pub trait DecisionStore: Send + Sync {
    /// Fetch a cached assessment; expired entries are misses, never served.
    async fn get_cached(&self, key: &str) -> Result<Option<LlmAssessment>>;

    /// Upsert a cached assessment with a TTL in minutes.
    async fn set_cached(&self, key: &str, response: &LlmAssessment, ttl_minutes: i64)
        -> Result<()>;

    /// Whether a `sent` record exists for (alert_key, recipient) within the
    /// lookback window.
    async fn has_recent_alert(
        &self,
        alert_key: &str,
        recipient: &str,
        lookback_hours: i64,
    ) -> Result<bool>;

    /// Append one dispatch attempt to the log. The store assigns the id.
    async fn log_dispatch(&self, record: DispatchRecord) -> Result<()>;

    /// Latest-per-(alert_key, recipient) records within the lookback window
    /// whose latest status is `failed` and which carry a decision snapshot.
    async fn retry_candidates(
        &self,
        limit: usize,
        lookback_hours: i64,
    ) -> Result<Vec<DispatchRecord>>;

    /// Persist ingested events.
    async fn save_events(&self, events: &[RiskEvent]) -> Result<()>;
}

// ── MemoryStore ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryInner {
    cache: HashMap<String, (LlmAssessment, DateTime<Utc>)>,
    log: Vec<DispatchRecord>,
    events: Vec<RiskEvent>,
    next_id: i64,
}

/// In-memory store with the same latest-per-key semantics as [`PgStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All logged dispatch records, in append order (test inspection).
    pub fn dispatch_log(&self) -> Vec<DispatchRecord> {
        self.inner.lock().unwrap().log.clone()
    }

    /// Number of events persisted (test inspection).
    pub fn event_count(&self) -> usize {
        self.inner.lock().unwrap().events.len()
    }
}

/// Reduce an append-only log to the latest record per (alert_key, recipient),
/// ordered by the explicit (created_at, id) sort key.
fn latest_per_key(log: &[DispatchRecord]) -> Vec<DispatchRecord> {
    let mut latest: HashMap<(String, String), DispatchRecord> = HashMap::new();
    for record in log {
        let slot = (record.alert_key.clone(), record.recipient.clone());
        match latest.get(&slot) {
            Some(existing)
                if (existing.created_at, existing.id) >= (record.created_at, record.id) => {}
            _ => {
                latest.insert(slot, record.clone());
            }
        }
    }
    latest.into_values().collect()
}

#[async_trait]
impl DecisionStore for MemoryStore {
    async fn get_cached(&self, key: &str) -> Result<Option<LlmAssessment>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .cache
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Utc::now())
            .map(|(response, _)| response.clone()))
    }

    async fn set_cached(
        &self,
        key: &str,
        response: &LlmAssessment,
        ttl_minutes: i64,
    ) -> Result<()> {
        let expires_at = Utc::now() + Duration::minutes(ttl_minutes);
        self.inner
            .lock()
            .unwrap()
            .cache
            .insert(key.to_string(), (response.clone(), expires_at));
        Ok(())
    }

    async fn has_recent_alert(
        &self,
        alert_key: &str,
        recipient: &str,
        lookback_hours: i64,
    ) -> Result<bool> {
        let cutoff = Utc::now() - Duration::hours(lookback_hours);
        let inner = self.inner.lock().unwrap();
        Ok(inner.log.iter().any(|r| {
            r.alert_key == alert_key
                && r.recipient == recipient
                && r.status == DispatchStatus::Sent
                && r.created_at > cutoff
        }))
    }

    async fn log_dispatch(&self, mut record: DispatchRecord) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        record.id = inner.next_id;
        inner.log.push(record);
        Ok(())
    }

    async fn retry_candidates(
        &self,
        limit: usize,
        lookback_hours: i64,
    ) -> Result<Vec<DispatchRecord>> {
        let cutoff = Utc::now() - Duration::hours(lookback_hours);
        let inner = self.inner.lock().unwrap();
        let windowed: Vec<DispatchRecord> = inner
            .log
            .iter()
            .filter(|r| r.created_at > cutoff)
            .cloned()
            .collect();

        let mut failed: Vec<DispatchRecord> = latest_per_key(&windowed)
            .into_iter()
            .filter(|r| r.status == DispatchStatus::Failed && r.decision_payload.is_some())
            .collect();
        failed.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        failed.truncate(limit);
        Ok(failed)
    }

    async fn save_events(&self, events: &[RiskEvent]) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .events
            .extend(events.iter().cloned());
        Ok(())
    }
}

// ── PgStore ───────────────────────────────────────────────────────────────────

/// PostgreSQL-backed store.
pub struct PgStore {
    client: tokio_postgres::Client,
    embedder: Box<dyn Embedder>,
}

impl PgStore {
    /// Connect and spawn the connection driver task.
    pub async fn connect(database_url: &str, embedder: Box<dyn Embedder>) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .context("failed to connect to postgres")?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "postgres connection terminated");
            }
        });
        Ok(Self { client, embedder })
    }

    /// Create tables when they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.client
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS risk_events (
                    id BIGSERIAL PRIMARY KEY,
                    event_type TEXT NOT NULL,
                    geo_location TEXT NOT NULL,
                    severity INT NOT NULL,
                    confidence DOUBLE PRECISION NOT NULL,
                    description TEXT NOT NULL,
                    source TEXT NOT NULL,
                    route TEXT NOT NULL,
                    event_time TIMESTAMPTZ NOT NULL
                );
                CREATE TABLE IF NOT EXISTS event_embeddings (
                    event_id BIGINT PRIMARY KEY REFERENCES risk_events(id),
                    embedding DOUBLE PRECISION[] NOT NULL
                );
                CREATE TABLE IF NOT EXISTS reasoning_cache (
                    cache_key TEXT PRIMARY KEY,
                    response_json TEXT NOT NULL,
                    expires_at TIMESTAMPTZ NOT NULL
                );
                CREATE TABLE IF NOT EXISTS alert_dispatch_log (
                    id BIGSERIAL PRIMARY KEY,
                    alert_key TEXT NOT NULL,
                    route TEXT NOT NULL,
                    risk_bucket TEXT NOT NULL,
                    recipient TEXT NOT NULL,
                    status TEXT NOT NULL,
                    attempt_number INT NOT NULL,
                    decision_payload TEXT,
                    provider_message_id TEXT,
                    error_message TEXT,
                    created_at TIMESTAMPTZ NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_dispatch_latest
                    ON alert_dispatch_log (alert_key, recipient, created_at DESC, id DESC);",
            )
            .await
            .context("schema creation failed")?;
        Ok(())
    }

    fn row_to_record(row: &tokio_postgres::Row) -> Result<DispatchRecord> {
        let bucket: String = row.get("risk_bucket");
        let status: String = row.get("status");
        Ok(DispatchRecord {
            id: row.get("id"),
            alert_key: row.get("alert_key"),
            route: row.get("route"),
            risk_bucket: bucket.parse().map_err(anyhow::Error::msg)?,
            recipient: row.get("recipient"),
            status: status.parse().map_err(anyhow::Error::msg)?,
            attempt_number: row.get("attempt_number"),
            decision_payload: row.get("decision_payload"),
            provider_message_id: row.get("provider_message_id"),
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl DecisionStore for PgStore {
    async fn get_cached(&self, key: &str) -> Result<Option<LlmAssessment>> {
        let row = self
            .client
            .query_opt(
                "SELECT response_json FROM reasoning_cache
                 WHERE cache_key = $1 AND expires_at > NOW()",
                &[&key],
            )
            .await
            .context("cache read failed")?;

        match row {
            None => Ok(None),
            Some(row) => {
                let json: String = row.get(0);
                let response: LlmAssessment =
                    serde_json::from_str(&json).context("cached assessment failed to parse")?;
                Ok(Some(response))
            }
        }
    }

    async fn set_cached(
        &self,
        key: &str,
        response: &LlmAssessment,
        ttl_minutes: i64,
    ) -> Result<()> {
        let expires_at = Utc::now() + Duration::minutes(ttl_minutes);
        let json = serde_json::to_string(response)?;
        self.client
            .execute(
                "INSERT INTO reasoning_cache (cache_key, response_json, expires_at)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (cache_key)
                 DO UPDATE SET response_json = EXCLUDED.response_json,
                               expires_at = EXCLUDED.expires_at",
                &[&key, &json, &expires_at],
            )
            .await
            .context("cache write failed")?;
        Ok(())
    }

    async fn has_recent_alert(
        &self,
        alert_key: &str,
        recipient: &str,
        lookback_hours: i64,
    ) -> Result<bool> {
        let cutoff = Utc::now() - Duration::hours(lookback_hours);
        let row = self
            .client
            .query_opt(
                "SELECT 1 FROM alert_dispatch_log
                 WHERE alert_key = $1 AND recipient = $2
                   AND status = 'sent' AND created_at > $3
                 LIMIT 1",
                &[&alert_key, &recipient, &cutoff],
            )
            .await
            .context("dedup lookup failed")?;
        Ok(row.is_some())
    }

    async fn log_dispatch(&self, record: DispatchRecord) -> Result<()> {
        self.client
            .execute(
                "INSERT INTO alert_dispatch_log (
                    alert_key, route, risk_bucket, recipient, status,
                    attempt_number, decision_payload, provider_message_id,
                    error_message, created_at
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                &[
                    &record.alert_key,
                    &record.route,
                    &record.risk_bucket.to_string(),
                    &record.recipient,
                    &record.status.to_string(),
                    &record.attempt_number,
                    &record.decision_payload,
                    &record.provider_message_id,
                    &record.error_message,
                    &record.created_at,
                ],
            )
            .await
            .context("dispatch log insert failed")?;
        Ok(())
    }

    async fn retry_candidates(
        &self,
        limit: usize,
        lookback_hours: i64,
    ) -> Result<Vec<DispatchRecord>> {
        let cutoff = Utc::now() - Duration::hours(lookback_hours);
        let rows = self
            .client
            .query(
                "WITH latest_per_alert AS (
                    SELECT DISTINCT ON (alert_key, recipient)
                        id, alert_key, route, risk_bucket, recipient, status,
                        attempt_number, decision_payload, provider_message_id,
                        error_message, created_at
                    FROM alert_dispatch_log
                    WHERE created_at > $1
                    ORDER BY alert_key, recipient, created_at DESC, id DESC
                 )
                 SELECT * FROM latest_per_alert
                 WHERE status = 'failed' AND decision_payload IS NOT NULL
                 ORDER BY created_at DESC
                 LIMIT $2",
                &[&cutoff, &(limit as i64)],
            )
            .await
            .context("retry candidate query failed")?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn save_events(&self, events: &[RiskEvent]) -> Result<()> {
        for event in events {
            let event_id: i64 = self
                .client
                .query_one(
                    "INSERT INTO risk_events (
                        event_type, geo_location, severity, confidence,
                        description, source, route, event_time
                     ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                     RETURNING id",
                    &[
                        &event.event_type.to_string(),
                        &event.geo_location,
                        &event.severity,
                        &event.confidence,
                        &event.description,
                        &event.source,
                        &event.route,
                        &event.event_time,
                    ],
                )
                .await
                .context("event insert failed")?
                .get(0);

            // Embedding failures must not stop the ingestion pipeline.
            let text = format!(
                "{} {} {}",
                event.event_type, event.geo_location, event.description
            );
            match self.embedder.embed(&text).await {
                Ok(Some(embedding)) => {
                    if let Err(e) = self
                        .client
                        .execute(
                            "INSERT INTO event_embeddings (event_id, embedding)
                             VALUES ($1, $2)
                             ON CONFLICT (event_id)
                             DO UPDATE SET embedding = EXCLUDED.embedding",
                            &[&event_id, &embedding],
                        )
                        .await
                    {
                        warn!(event_id, error = %e, "embedding insert failed, continuing");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(event_id, error = %e, "embedding failed, continuing");
                }
            }
        }
        debug!(count = events.len(), "events persisted");
        Ok(())
    }
}
