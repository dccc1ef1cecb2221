//! Outbound webhook callouts to the host site (e.g. delivering `/report`
//! submissions for human moderation).

use crate::config::Config;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook {0:?} is not configured")]
    NotConfigured(String),
    #[error("webhook {0:?} is configured but disabled")]
    Disabled(String),
    #[error("request to webhook {0:?} failed: {1}")]
    Request(String, #[source] reqwest::Error),
    #[error("webhook {0:?} returned status {1}")]
    BadStatus(String, reqwest::StatusCode),
}

pub struct WebhookClient {
    http: reqwest::Client,
}

impl Default for WebhookClient {
    fn default() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client builder should never fail with these options");
        WebhookClient { http }
    }
}

impl WebhookClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts `payload` as JSON to the webhook named `name` in `config`.
    pub async fn post<T: Serialize>(&self, config: &Config, name: &str, payload: &T) -> Result<Vec<u8>, WebhookError> {
        let webhook = config
            .get_webhook(name)
            .ok_or_else(|| WebhookError::NotConfigured(name.to_string()))?;
        if !webhook.enabled {
            return Err(WebhookError::Disabled(name.to_string()));
        }

        let response = self.http.post(&webhook.url).json(payload).send().await.map_err(|e| {
            crate::metrics::WEBHOOK_FAILURES.inc();
            WebhookError::Request(name.to_string(), e)
        })?;

        let status = response.status();
        let body = response.bytes().await.unwrap_or_default().to_vec();
        if !status.is_success() {
            crate::metrics::WEBHOOK_FAILURES.inc();
            return Err(WebhookError::BadStatus(name.to_string(), status));
        }
        Ok(body)
    }
}

#[derive(Debug, Serialize)]
pub struct ReportPayload<'a> {
    pub action: &'static str,
    pub api_key: &'a str,
    pub reporter: &'a str,
    pub reported: &'a str,
    pub reason: &'a str,
    pub comment: &'a str,
    pub context: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn not_configured_webhook_is_rejected_before_any_request() {
        let config = Config::default();
        let client = WebhookClient::new();
        let err = client.post(&config, "report", &serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, WebhookError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn disabled_webhook_is_rejected_before_any_request() {
        let mut config = Config::default();
        config.webhooks.push(crate::config::WebhookConfig {
            name: "report".into(),
            url: "https://example.invalid/report".into(),
            enabled: false,
        });
        let client = WebhookClient::new();
        let err = client.post(&config, "report", &serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, WebhookError::Disabled(_)));
    }
}
