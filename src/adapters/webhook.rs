//! Webhook delivery sink.
//!
//! Endpoint: POST {webhook_url} with the JSON bundle as the body.
//! Only a 2xx response counts as delivered.

use std::time::Duration;

use async_trait::async_trait;

use super::DeliverySink;
use crate::core::retry::CallError;

/// Webhook client
pub struct WebhookSink {
    endpoint: Option<String>,
    client: reqwest::Client,
}

impl WebhookSink {
    /// Create a new sink. A missing endpoint makes every send fail fatally.
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { endpoint, client }
    }
}

#[async_trait]
impl DeliverySink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, payload: &[u8]) -> Result<u16, CallError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| CallError::Fatal("WEBHOOK_URL is not set".to_string()))?;

        let response = self
            .client
            .post(endpoint)
            .header("Content-Type", "application/json")
            .body(payload.to_vec())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            // Every non-2xx answer from the sink is worth another attempt
            let body = response.text().await.unwrap_or_default();
            Err(CallError::Upstream {
                status: status.as_u16(),
                body,
            })
        }
    }
}
