use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use watch_core::{DeliveryAck, NotifyError, NotifyFailure, Target};
use watch_logging::watch_info;

/// Delivers a drafted message to its destination.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str, target: &Target) -> Result<DeliveryAck, NotifyError>;
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
    username: &'a str,
}

/// Posts messages to a Discord-compatible webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    username: String,
}

impl WebhookNotifier {
    pub const DEFAULT_USERNAME: &'static str = "page-watch";

    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| NotifyError::new(NotifyFailure::Network, err.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            username: Self::DEFAULT_USERNAME.to_string(),
        })
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, text: &str, _target: &Target) -> Result<DeliveryAck, NotifyError> {
        let body = serde_json::to_string(&WebhookPayload {
            content: text,
            username: &self.username,
        })
        .map_err(|err| NotifyError::new(NotifyFailure::Network, err.to_string()))?;

        let response = self
            .client
            .post(self.url.as_str())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::new(
                NotifyFailure::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        // 204 and non-JSON bodies are still deliveries, just without an id.
        let text = response.text().await.map_err(map_reqwest_error)?;
        Ok(DeliveryAck {
            message_id: message_id(&text),
        })
    }
}

fn message_id(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("id")? {
        serde_json::Value::String(id) => Some(id.clone()),
        serde_json::Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn map_reqwest_error(err: reqwest::Error) -> NotifyError {
    if err.is_timeout() {
        NotifyError::new(NotifyFailure::Timeout, err.to_string())
    } else {
        NotifyError::new(NotifyFailure::Network, err.to_string())
    }
}

/// Writes messages to the log; used when no webhook is configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str, target: &Target) -> Result<DeliveryAck, NotifyError> {
        watch_info!("notification for {}:\n{}", target.id, text);
        Ok(DeliveryAck::default())
    }
}
