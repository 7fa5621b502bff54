//! Runtime configuration from environment variables.
//!
//! Every knob has a default, but a variable that is set and unparseable fails
//! startup — a typo must never silently become the default. `validate()`
//! rejects nonsensical combinations at startup rather than mid-cycle.
//! `redacted_snapshot()` is the only sanctioned way to log the config —
//! secrets never reach the log stream in clear.

use anyhow::{anyhow, bail, Result};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_list(key: &str, default: &str) -> Vec<String> {
    env_or(key, default)
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_parsed<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key}={raw:?} is not valid: {e}")),
        Err(_) => Ok(default),
    }
}

/// Top-level monitor configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Routes evaluated each cycle.
    pub routes: Vec<String>,
    /// Alert recipients.
    pub recipients: Vec<String>,
    /// Postgres connection string; empty selects the in-memory store.
    pub database_url: String,
    /// Ollama-compatible chat endpoint.
    pub ollama_base_url: String,
    pub ollama_model: String,
    /// Baseline risk below which the LLM is not consulted (0–100).
    pub llm_trigger_threshold: f64,
    /// Reasoning cache TTL in minutes.
    pub cache_ttl_minutes: i64,
    /// SendGrid API key; empty selects the null mailer.
    pub sendgrid_api_key: String,
    pub sender_email: String,
    /// Dedup window in hours.
    pub dedup_hours: i64,
    /// Delivery attempts per dispatch.
    pub max_retries: u32,
    /// Seconds between monitoring cycles.
    pub monitor_interval_secs: u64,
    /// Retry sweep lookback in hours.
    pub retry_lookback_hours: i64,
    /// Retry sweep batch size.
    pub retry_batch_size: usize,
    /// Fixture file consumed by the JSON event source, when set.
    pub events_file: Option<String>,
    /// Whether event embeddings are computed on persistence.
    pub enable_embeddings: bool,
}

impl MonitorConfig {
    /// Read the config from the environment, failing on unparseable values.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            routes: env_list(
                "LANEGUARD_ROUTES",
                "Red Sea -> India,Singapore Strait -> India",
            ),
            recipients: env_list("LANEGUARD_RECIPIENTS", ""),
            database_url: env_or("LANEGUARD_DATABASE_URL", ""),
            ollama_base_url: env_or("LANEGUARD_OLLAMA_URL", "http://localhost:11434"),
            ollama_model: env_or("LANEGUARD_OLLAMA_MODEL", "llama3"),
            llm_trigger_threshold: env_parsed("LANEGUARD_LLM_THRESHOLD", 45.0)?,
            cache_ttl_minutes: env_parsed("LANEGUARD_CACHE_TTL_MINUTES", 60)?,
            sendgrid_api_key: env_or("LANEGUARD_SENDGRID_API_KEY", ""),
            sender_email: env_or("LANEGUARD_SENDER_EMAIL", ""),
            dedup_hours: env_parsed("LANEGUARD_DEDUP_HOURS", 6)?,
            max_retries: env_parsed("LANEGUARD_MAX_RETRIES", 3)?,
            monitor_interval_secs: env_parsed("LANEGUARD_INTERVAL_SECS", 3600)?,
            retry_lookback_hours: env_parsed("LANEGUARD_RETRY_LOOKBACK_HOURS", 24)?,
            retry_batch_size: env_parsed("LANEGUARD_RETRY_BATCH", 50)?,
            events_file: std::env::var("LANEGUARD_EVENTS_FILE").ok(),
            enable_embeddings: env_or("LANEGUARD_ENABLE_EMBEDDINGS", "false") == "true",
        })
    }
    /// Reject configurations that cannot run a sane monitoring cycle.
    pub fn validate(&self) -> Result<()> {
        if self.routes.is_empty() {
            bail!("LANEGUARD_ROUTES must name at least one route");
        }
        if !(0.0..=100.0).contains(&self.llm_trigger_threshold) {
            bail!("LANEGUARD_LLM_THRESHOLD must be between 0 and 100");
        }
        if self.cache_ttl_minutes < 1 {
            bail!("LANEGUARD_CACHE_TTL_MINUTES must be at least 1");
        }
        if self.dedup_hours < 1 {
            bail!("LANEGUARD_DEDUP_HOURS must be at least 1");
        }
        if self.max_retries < 1 {
            bail!("LANEGUARD_MAX_RETRIES must be at least 1");
        }
        if self.monitor_interval_secs < 60 {
            bail!("LANEGUARD_INTERVAL_SECS must be at least 60");
        }
        if self.retry_lookback_hours < 1 {
            bail!("LANEGUARD_RETRY_LOOKBACK_HOURS must be at least 1");
        }
        if self.retry_batch_size < 1 {
            bail!("LANEGUARD_RETRY_BATCH must be at least 1");
        }
        Ok(())
    }

    /// Safe-to-log snapshot with secrets masked.
    pub fn redacted_snapshot(&self) -> String {
        fn mask(value: &str) -> &str {
            if value.is_empty() {
                "<unset>"
            } else {
                "***"
            }
        }

        format!(
            "routes={:?} recipients={} database_url={} ollama={}({}) threshold={} \
             cache_ttl_m={} sendgrid_key={} sender={} dedup_h={} max_retries={} \
             interval_s={} retry_lookback_h={} retry_batch={} embeddings={}",
            self.routes,
            self.recipients.len(),
            mask(&self.database_url),
            self.ollama_base_url,
            self.ollama_model,
            self.llm_trigger_threshold,
            self.cache_ttl_minutes,
            mask(&self.sendgrid_api_key),
            mask(&self.sender_email),
            self.dedup_hours,
            self.max_retries,
            self.monitor_interval_secs,
            self.retry_lookback_hours,
            self.retry_batch_size,
            self.enable_embeddings,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> MonitorConfig {
        MonitorConfig {
            routes: vec!["Red Sea -> India".into()],
            recipients: vec!["ops@example.com".into()],
            database_url: String::new(),
            ollama_base_url: "http://localhost:11434".into(),
            ollama_model: "llama3".into(),
            llm_trigger_threshold: 45.0,
            cache_ttl_minutes: 60,
            sendgrid_api_key: "sg-key".into(),
            sender_email: "alerts@example.com".into(),
            dedup_hours: 6,
            max_retries: 3,
            monitor_interval_secs: 3600,
            retry_lookback_hours: 24,
            retry_batch_size: 50,
            events_file: None,
            enable_embeddings: false,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn rejects_empty_routes() {
        let mut cfg = base();
        cfg.routes.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut cfg = base();
        cfg.llm_trigger_threshold = 120.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_sub_minute_interval() {
        let mut cfg = base();
        cfg.monitor_interval_secs = 30;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unparseable_numeric_env_fails_startup() {
        // One test owns this variable to keep env mutation race-free.
        std::env::set_var("LANEGUARD_LLM_THRESHOLD", "4S");
        let result = MonitorConfig::from_env();
        std::env::remove_var("LANEGUARD_LLM_THRESHOLD");

        let err = result.unwrap_err();
        assert!(err.to_string().contains("LANEGUARD_LLM_THRESHOLD"));

        // Unset falls back to the default rather than erroring.
        let config = MonitorConfig::from_env().unwrap();
        assert_eq!(config.llm_trigger_threshold, 45.0);
    }

    #[test]
    fn snapshot_masks_secrets() {
        let snapshot = base().redacted_snapshot();
        assert!(!snapshot.contains("sg-key"));
        assert!(snapshot.contains("sendgrid_key=***"));
        assert!(snapshot.contains("database_url=<unset>"));
    }
}
