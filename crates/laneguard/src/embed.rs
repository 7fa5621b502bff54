//! Optional embedding capability for persisted events.
//!
//! Modeled as an injectable trait with an explicit no-op variant rather than
//! a nullable field: "embeddings disabled" is [`NoopEmbedder`], and callers
//! never branch on null. Failures here degrade — event persistence must not
//! be affected by a broken embedding backend.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

/// Embedding capability consumed during event persistence.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `text`, or return `None` when the capability is disabled.
    async fn embed(&self, text: &str) -> Result<Option<Vec<f64>>>;
}

/// Embedding capability disabled.
pub struct NoopEmbedder;

#[async_trait]
impl Embedder for NoopEmbedder {
    async fn embed(&self, _text: &str) -> Result<Option<Vec<f64>>> {
        Ok(None)
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f64>,
}

/// Embeddings from an Ollama-compatible `/api/embeddings` endpoint.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Option<Vec<f64>>> {
        let url = format!("{}/api/embeddings", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&json!({ "model": self.model, "prompt": text }))
            .send()
            .await
            .context("embedding request failed")?
            .error_for_status()
            .context("embedding endpoint returned an error status")?;

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .context("embedding response failed to parse")?;
        if parsed.embedding.is_empty() {
            return Ok(None);
        }
        Ok(Some(parsed.embedding))
    }
}
