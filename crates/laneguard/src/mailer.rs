//! Outbound delivery collaborator.
//!
//! [`AlertSender`] is an injectable capability: when no provider is
//! configured the dispatcher receives a [`NullMailer`] whose sends fail with
//! `mailer_not_configured`, so the outcome is still recorded in the dispatch
//! log instead of silently vanishing.

use async_trait::async_trait;
use serde_json::json;

use crate::errors::DeliveryError;

/// Delivery collaborator contract. Success returns the provider message id.
#[async_trait]
pub trait AlertSender: Send + Sync {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<String, DeliveryError>;
}

/// No provider configured; every send fails and is logged as such.
pub struct NullMailer;

#[async_trait]
impl AlertSender for NullMailer {
    async fn send(&self, _: &str, _: &str, _: &str) -> Result<String, DeliveryError> {
        Err(DeliveryError::NotConfigured)
    }
}

/// SendGrid v3 mail-send backend.
pub struct SendGridMailer {
    client: reqwest::Client,
    api_key: String,
    from_email: String,
    base_url: String,
}

impl SendGridMailer {
    pub fn new(api_key: impl Into<String>, from_email: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            from_email: from_email.into(),
            base_url: "https://api.sendgrid.com".into(),
        }
    }

    /// Override the API base URL (test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl AlertSender for SendGridMailer {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<String, DeliveryError> {
        let body = json!({
            "personalizations": [{ "to": [{ "email": recipient }] }],
            "from": { "email": self.from_email },
            "subject": subject,
            "content": [{ "type": "text/html", "value": html_body }],
        });

        let response = self
            .client
            .post(format!("{}/v3/mail/send", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Provider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Http(status.as_u16()));
        }

        let message_id = response
            .headers()
            .get("X-Message-Id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        Ok(message_id)
    }
}
