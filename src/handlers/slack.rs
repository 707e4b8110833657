//! A client and handler for sending alerts to a Slack incoming webhook.

use crate::config::SlackConfig;
use crate::core::{AlertHandler, AlertState, DeliveryOutcome, DeliveryReport, HealthStatus};
use crate::retry::{Retryable, RetryPolicy, Sleeper};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument};

const SLACK_WEBHOOK_BASE: &str = "https://hooks.slack.com/services/";
const AUTHOR_NAME: &str = "alertcast";
const AUTHOR_SUBNAME: &str = "health alerts";
const AUTHOR_LINK: &str = "https://github.com/alertcast/alertcast";
const DEFAULT_ICON: &str = "https://platform.slack-edge.com/img/default_application_icon.png";
const FOOTER: &str = "alertcast";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WebhookError {
    #[error("HTTP request to Slack failed: {0}")]
    Http(String),

    #[error("Slack returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl Retryable for WebhookError {}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Attachment {
    pub color: String,
    pub fallback: String,
    pub author_name: String,
    pub author_subname: String,
    pub author_link: String,
    pub author_icon: String,
    pub text: String,
    pub footer: String,
    pub footer_icon: String,
    /// Unix timestamp in seconds.
    pub ts: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WebhookMessage {
    pub attachments: Vec<Attachment>,
}

/// Renders the attachment text of an alert.
pub fn format_text(alert: &AlertState) -> String {
    format!("\n*{}*\n{}\n", alert.message, alert.details)
}

fn color_for(status: HealthStatus) -> &'static str {
    match status {
        HealthStatus::Passing => "good",
        HealthStatus::Warning => "warning",
        HealthStatus::Critical | HealthStatus::Maintenance => "danger",
    }
}

impl WebhookMessage {
    /// A single-attachment message stamped with the current time.
    pub fn for_alert(alert: &AlertState, text: &str) -> Self {
        Self {
            attachments: vec![Attachment {
                color: color_for(alert.status).to_string(),
                fallback: String::new(),
                author_name: AUTHOR_NAME.to_string(),
                author_subname: AUTHOR_SUBNAME.to_string(),
                author_link: AUTHOR_LINK.to_string(),
                author_icon: DEFAULT_ICON.to_string(),
                text: text.to_string(),
                footer: FOOTER.to_string(),
                footer_icon: DEFAULT_ICON.to_string(),
                ts: Utc::now().timestamp(),
            }],
        }
    }
}

/// Turns the configured token into a webhook URL.
pub fn webhook_url(api_token: &str) -> String {
    if api_token.starts_with("https://") || api_token.starts_with("http://") {
        api_token.to_string()
    } else {
        format!("{}{}", SLACK_WEBHOOK_BASE, api_token.trim_start_matches('/'))
    }
}

/// A trait for clients that can post webhook messages.
#[async_trait]
pub trait SlackClientTrait: Send + Sync {
    /// Posts a single message.
    async fn post_message(&self, message: &WebhookMessage) -> Result<(), WebhookError>;
}

/// A client for sending messages to a Slack webhook.
pub struct SlackClient {
    http: reqwest::Client,
    webhook_url: String,
}

impl SlackClient {
    /// Creates a new `SlackClient`.
    pub fn new(http: reqwest::Client, webhook_url: String) -> Self {
        Self { http, webhook_url }
    }
}

#[async_trait]
impl SlackClientTrait for SlackClient {
    async fn post_message(&self, message: &WebhookMessage) -> Result<(), WebhookError> {
        let response = self
            .http
            .post(&self.webhook_url)
            .json(message)
            .send()
            .await
            .map_err(|e| WebhookError::Http(e.to_string()))?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(WebhookError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

pub struct SlackHandler {
    channel_name: String,
    retry: RetryPolicy,
    client: Arc<dyn SlackClientTrait>,
    sleeper: Arc<dyn Sleeper>,
}

impl SlackHandler {
    pub fn new(
        config: &SlackConfig,
        retry_delay: Duration,
        client: Arc<dyn SlackClientTrait>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            channel_name: config.channel_name.clone(),
            retry: RetryPolicy::fixed(config.max_retries, retry_delay),
            client,
            sleeper,
        }
    }
}

#[async_trait]
impl AlertHandler for SlackHandler {
    fn channel(&self) -> &'static str {
        "slack"
    }

    #[instrument(skip_all, fields(channel = "slack", slack_channel = %self.channel_name))]
    async fn deliver(&self, _datacenter: &str, alert: &AlertState) -> DeliveryReport {
        let text = format_text(alert);
        let client = &self.client;
        let text = text.as_str();

        let outcome = self
            .retry
            .run(self.sleeper.as_ref(), move |_attempt| {
                metrics::counter!("alert_delivery_attempts_total", "channel" => "slack").increment(1);
                let message = WebhookMessage::for_alert(alert, text);
                async move { client.post_message(&message).await }
            })
            .await;

        let outcome = match outcome.result {
            Ok(()) => {
                info!(attempts = outcome.attempts, "Alert sent to Slack");
                DeliveryOutcome::Delivered {
                    attempts: outcome.attempts,
                }
            }
            Err(e) => {
                error!(
                    attempts = outcome.attempts,
                    error = %e,
                    "Error sending alert to Slack (channel: {})",
                    self.channel_name
                );
                let mut errors: Vec<String> = outcome.errors.iter().map(|e| e.to_string()).collect();
                errors.push(e.to_string());
                DeliveryOutcome::Failed {
                    attempts: outcome.attempts,
                    errors,
                }
            }
        };
        DeliveryReport::single(self.channel(), self.channel_name.clone(), outcome)
    }
}
