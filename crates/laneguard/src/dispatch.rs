//! Alert dispatch: per-recipient dedup, bounded-backoff delivery, and the
//! retry sweep over previously failed sends.
//!
//! Every `dispatch()` call writes exactly one terminal record per recipient
//! (`sent`, `failed`, or `dry_run`) — except a dedup skip, which writes
//! nothing. Records are append-only; re-attempts add rows with an
//! incremented attempt_number instead of mutating history.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use riskcore::fingerprint::{alert_key, risk_bucket};
use riskcore::model::{DecisionResult, DispatchRecord, DispatchStatus, RiskBucket};

use crate::mailer::AlertSender;
use crate::report;
use crate::store::DecisionStore;

/// Final risk at or above which dedup is bypassed entirely.
const DEDUP_BYPASS_RISK: f64 = 90.0;

/// First backoff delay; doubles on each subsequent attempt.
const BASE_BACKOFF: Duration = Duration::from_secs(1);

/// Dispatches risk alerts with idempotency and a bounded retry policy.
pub struct AlertDispatcher {
    store: Arc<dyn DecisionStore>,
    sender: Arc<dyn AlertSender>,
    dedup_hours: i64,
    max_retries: u32,
}

impl AlertDispatcher {
    pub fn new(
        store: Arc<dyn DecisionStore>,
        sender: Arc<dyn AlertSender>,
        dedup_hours: i64,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            sender,
            dedup_hours,
            max_retries: max_retries.max(1),
        }
    }

    /// Attempt delivery with exponential backoff: 1s, 2s, 4s, ...
    ///
    /// The sleep suspends only the calling task. Returns the provider message
    /// id on success, or the last error string after exhaustion.
    async fn send_with_retries(
        &self,
        recipient: &str,
        decision: &DecisionResult,
    ) -> Result<String, String> {
        let subject = report::alert_subject(decision);
        let html = report::format_html_report(decision);

        let mut last_error = String::new();
        for attempt in 0..self.max_retries {
            match self.sender.send(recipient, &subject, &html).await {
                Ok(message_id) => return Ok(message_id),
                Err(e) => {
                    last_error = e.to_string();
                    debug!(recipient, attempt, error = %last_error, "delivery attempt failed");
                }
            }
            if attempt + 1 < self.max_retries {
                let backoff = BASE_BACKOFF * 2u32.pow(attempt);
                tokio::time::sleep(backoff).await;
            }
        }
        Err(last_error)
    }

    fn record(
        key: &str,
        decision_route: &str,
        bucket: RiskBucket,
        recipient: &str,
        status: DispatchStatus,
        attempt_number: i32,
        decision_payload: Option<String>,
        provider_message_id: Option<String>,
        error_message: Option<String>,
    ) -> DispatchRecord {
        DispatchRecord {
            id: 0,
            alert_key: key.to_string(),
            route: decision_route.to_string(),
            risk_bucket: bucket,
            recipient: recipient.to_string(),
            status,
            attempt_number,
            decision_payload,
            provider_message_id,
            error_message,
            created_at: Utc::now(),
        }
    }

    /// Deliver one decision to one recipient and log the terminal outcome.
    async fn deliver_and_log(
        &self,
        key: &str,
        bucket: RiskBucket,
        recipient: &str,
        decision: &DecisionResult,
        attempt_number: i32,
    ) -> Result<bool> {
        let payload = serde_json::to_string(decision)?;
        match self.send_with_retries(recipient, decision).await {
            Ok(message_id) => {
                info!(recipient, route = %decision.route, "alert sent");
                self.store
                    .log_dispatch(Self::record(
                        key,
                        &decision.route,
                        bucket,
                        recipient,
                        DispatchStatus::Sent,
                        attempt_number,
                        Some(payload),
                        Some(message_id),
                        None,
                    ))
                    .await?;
                Ok(true)
            }
            Err(error) => {
                warn!(recipient, route = %decision.route, error = %error, "alert delivery failed");
                self.store
                    .log_dispatch(Self::record(
                        key,
                        &decision.route,
                        bucket,
                        recipient,
                        DispatchStatus::Failed,
                        attempt_number,
                        Some(payload),
                        None,
                        Some(error),
                    ))
                    .await?;
                Ok(false)
            }
        }
    }

    /// Send deduplicated alerts to all recipients.
    pub async fn dispatch(
        &self,
        recipients: &[String],
        decision: &DecisionResult,
        dry_run: bool,
    ) -> Result<()> {
        if recipients.is_empty() {
            return Ok(());
        }

        let bucket = risk_bucket(decision.final_risk);
        let bypass_dedup = decision.final_risk >= DEDUP_BYPASS_RISK;
        let today = Utc::now().date_naive();

        for recipient in recipients {
            let key = alert_key(&decision.route, today, bucket, recipient);

            if !bypass_dedup {
                let already_sent = self
                    .store
                    .has_recent_alert(&key, recipient, self.dedup_hours)
                    .await?;
                if already_sent {
                    debug!(recipient, route = %decision.route, "recent alert exists, skipping");
                    continue;
                }
            }

            if dry_run {
                self.store
                    .log_dispatch(Self::record(
                        &key,
                        &decision.route,
                        bucket,
                        recipient,
                        DispatchStatus::DryRun,
                        1,
                        Some(serde_json::to_string(decision)?),
                        None,
                        None,
                    ))
                    .await?;
                continue;
            }

            self.deliver_and_log(&key, bucket, recipient, decision, 1)
                .await?;
        }
        Ok(())
    }

    /// Re-attempt previously failed sends from the dispatch log.
    ///
    /// A candidate whose stored decision snapshot no longer deserializes is
    /// logged `failed` with `invalid_decision_payload` and skipped; it will
    /// not surface as a candidate again because its latest record carries no
    /// payload. Returns the number of re-attempts that ended `sent` (or
    /// `dry_run`); a re-attempt that fails again is logged but not counted.
    pub async fn retry_failed_dispatches(
        &self,
        max_records: usize,
        lookback_hours: i64,
        dry_run: bool,
    ) -> Result<usize> {
        let candidates = self
            .store
            .retry_candidates(max_records, lookback_hours)
            .await?;
        if candidates.is_empty() {
            return Ok(0);
        }

        let mut retried = 0;
        for candidate in candidates {
            let attempt_number = candidate.attempt_number + 1;

            let decision: DecisionResult = match candidate
                .decision_payload
                .as_deref()
                .ok_or_else(|| "missing payload".to_string())
                .and_then(|p| serde_json::from_str(p).map_err(|e| e.to_string()))
            {
                Ok(decision) => decision,
                Err(e) => {
                    warn!(
                        alert_key = %candidate.alert_key,
                        recipient = %candidate.recipient,
                        error = %e,
                        "stored decision snapshot unusable"
                    );
                    self.store
                        .log_dispatch(Self::record(
                            &candidate.alert_key,
                            &candidate.route,
                            candidate.risk_bucket,
                            &candidate.recipient,
                            DispatchStatus::Failed,
                            attempt_number,
                            None,
                            None,
                            Some("invalid_decision_payload".into()),
                        ))
                        .await?;
                    continue;
                }
            };

            if dry_run {
                self.store
                    .log_dispatch(Self::record(
                        &candidate.alert_key,
                        &decision.route,
                        candidate.risk_bucket,
                        &candidate.recipient,
                        DispatchStatus::DryRun,
                        attempt_number,
                        Some(serde_json::to_string(&decision)?),
                        None,
                        None,
                    ))
                    .await?;
                retried += 1;
                continue;
            }

            if self
                .deliver_and_log(
                    &candidate.alert_key,
                    candidate.risk_bucket,
                    &candidate.recipient,
                    &decision,
                    attempt_number,
                )
                .await?
            {
                retried += 1;
            }
        }

        info!(retried, "retry sweep complete");
        Ok(retried)
    }
}
