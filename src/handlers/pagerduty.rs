//! PagerDuty channel: opens and resolves incidents through the Events API.

use crate::config::PagerDutyConfig;
use crate::core::{AlertHandler, AlertState, DeliveryOutcome, DeliveryReport};
use crate::retry::{Retryable, RetryPolicy, Sleeper};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

/// Value of the `client` field on every event.
const CLIENT_NAME: &str = "alertcast";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Trigger,
    Resolve,
}

/// Body of a create_event request.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IncidentEvent {
    pub service_key: String,
    pub event_type: EventType,
    pub incident_key: String,
    pub description: String,
    pub details: String,
    pub client: String,
}

impl IncidentEvent {
    /// Trigger for anything but a passing alert, resolve otherwise.
    pub fn for_alert(service_key: &str, datacenter: &str, alert: &AlertState) -> Self {
        let event_type = if alert.status.is_passing() {
            EventType::Resolve
        } else {
            EventType::Trigger
        };
        Self {
            service_key: service_key.to_string(),
            event_type,
            incident_key: alert.incident_key(datacenter),
            description: alert.message.clone(),
            details: alert.details.clone(),
            client: CLIENT_NAME.to_string(),
        }
    }
}

/// Response of the Events API, plus the attempts it took to get it.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
pub struct IncidentResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub incident_key: String,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(skip)]
    pub attempts: u32,
}

impl IncidentResponse {
    fn from_errors(attempts: u32, errors: Vec<String>) -> Self {
        Self {
            attempts,
            errors,
            ..Default::default()
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IncidentError {
    #[error("HTTP request to PagerDuty failed: {0}")]
    Http(String),

    #[error("PagerDuty returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("PagerDuty rejected the event ({status}): {message}")]
    Rejected {
        status: u16,
        message: String,
        errors: Vec<String>,
    },

    #[error("could not decode PagerDuty response: {0}")]
    Decode(String),
}

impl Retryable for IncidentError {
    fn is_retryable(&self) -> bool {
        matches!(self, IncidentError::Http(_) | IncidentError::Server { .. })
    }
}

impl IncidentError {
    /// The individual errors this failure reports.
    fn into_errors(self) -> Vec<String> {
        match self {
            IncidentError::Rejected {
                message, errors, ..
            } if errors.is_empty() => vec![message],
            IncidentError::Rejected { errors, .. } => errors,
            other => vec![other.to_string()],
        }
    }
}

/// Sends incident events. Never fails outright: problems are reported in
/// `IncidentResponse::errors`.
#[async_trait]
pub trait IncidentClient: Send + Sync {
    async fn send_event(&self, event: &IncidentEvent) -> IncidentResponse;
}

/// Events API client with bounded exponential retry.
pub struct PagerDutyClient {
    http: reqwest::Client,
    api_url: String,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl PagerDutyClient {
    pub fn new(
        http: reqwest::Client,
        api_url: String,
        max_retries: u32,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            http,
            api_url,
            retry: RetryPolicy::exponential(
                max_retries,
                Duration::from_secs(1),
                Duration::from_secs(30),
            ),
            sleeper,
        }
    }

    async fn post_once(&self, event: &IncidentEvent) -> Result<IncidentResponse, IncidentError> {
        metrics::counter!("alert_delivery_attempts_total", "channel" => "pagerduty").increment(1);
        let response = self
            .http
            .post(&self.api_url)
            .json(event)
            .send()
            .await
            .map_err(|e| IncidentError::Http(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| IncidentError::Decode(e.to_string()));
        }

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(IncidentError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: IncidentResponse = serde_json::from_str(&body).unwrap_or_default();
        let message = if parsed.message.is_empty() {
            body
        } else {
            parsed.message
        };
        Err(IncidentError::Rejected {
            status: status.as_u16(),
            message,
            errors: parsed.errors,
        })
    }
}

#[async_trait]
impl IncidentClient for PagerDutyClient {
    async fn send_event(&self, event: &IncidentEvent) -> IncidentResponse {
        let outcome = self
            .retry
            .run(self.sleeper.as_ref(), |_attempt| self.post_once(event))
            .await;

        match outcome.result {
            Ok(mut response) => {
                response.attempts = outcome.attempts;
                response
            }
            Err(e) => IncidentResponse::from_errors(outcome.attempts, e.into_errors()),
        }
    }
}

pub struct PagerDutyHandler {
    service_key: String,
    client: Arc<dyn IncidentClient>,
}

impl PagerDutyHandler {
    pub fn new(config: &PagerDutyConfig, client: Arc<dyn IncidentClient>) -> Self {
        Self {
            service_key: config.service_key.clone(),
            client,
        }
    }
}

#[async_trait]
impl AlertHandler for PagerDutyHandler {
    fn channel(&self) -> &'static str {
        "pagerduty"
    }

    #[instrument(skip_all, fields(channel = "pagerduty", incident_key = tracing::field::Empty))]
    async fn deliver(&self, datacenter: &str, alert: &AlertState) -> DeliveryReport {
        let event = IncidentEvent::for_alert(&self.service_key, datacenter, alert);
        tracing::Span::current().record("incident_key", event.incident_key.as_str());
        debug!(event_type = ?event.event_type, "Sending incident event");

        let response = self.client.send_event(&event).await;

        for err in &response.errors {
            error!(
                details = %alert.details,
                alert_message = %alert.message,
                "Error sending alert to PagerDuty: {}",
                err
            );
        }

        let outcome = if response.errors.is_empty() {
            info!(
                event_type = ?event.event_type,
                attempts = response.attempts,
                "PagerDuty event accepted"
            );
            DeliveryOutcome::Delivered {
                attempts: response.attempts,
            }
        } else {
            DeliveryOutcome::Failed {
                attempts: response.attempts,
                errors: response.errors,
            }
        };
        DeliveryReport::single(self.channel(), event.incident_key, outcome)
    }
}
