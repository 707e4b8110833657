//! Email channel: delivers alerts straight to each recipient's mail exchange.

use crate::config::EmailConfig;
use crate::core::{AlertHandler, AlertState, DeliveryOutcome, DeliveryReport};
use crate::dns::{preferred_exchange, DnsError, MxResolver};
use crate::retry::{Retryable, RetryPolicy, Sleeper};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument, Instrument};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("SMTP delivery via {relay} failed: {reason}")]
    Smtp { relay: String, reason: String },
}

// Any failed send is retried, whatever its cause.
impl Retryable for EmailError {}

/// A plain-text email ready to be handed to a mail exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Sends an email through a given mail exchange.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, relay: &str, email: &OutgoingEmail) -> Result<(), EmailError>;
}

/// Unauthenticated, plaintext SMTP delivery.
pub struct SmtpMailer {
    port: u16,
    timeout: Duration,
}

impl SmtpMailer {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            timeout: Duration::from_secs(30),
        }
    }

    fn build_message(email: &OutgoingEmail) -> Result<Message, EmailError> {
        let from: Mailbox = email
            .from
            .parse()
            .map_err(|_| EmailError::InvalidAddress(email.from.clone()))?;
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|_| EmailError::InvalidAddress(email.to.clone()))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| EmailError::Build(e.to_string()))
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, relay: &str, email: &OutgoingEmail) -> Result<(), EmailError> {
        let message = Self::build_message(email)?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(relay)
            .port(self.port)
            .timeout(Some(self.timeout))
            .build();

        transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| EmailError::Smtp {
                relay: relay.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Returns the domain part of an address, if there is a non-empty one.
fn recipient_domain(recipient: &str) -> Option<&str> {
    recipient
        .rsplit_once('@')
        .map(|(_, domain)| domain.trim_end_matches('>').trim())
        .filter(|domain| !domain.is_empty())
}

pub struct EmailHandler {
    config: EmailConfig,
    retry: RetryPolicy,
    resolver: Arc<dyn MxResolver>,
    transport: Arc<dyn MailTransport>,
    sleeper: Arc<dyn Sleeper>,
}

impl EmailHandler {
    pub fn new(
        config: EmailConfig,
        retry_delay: Duration,
        resolver: Arc<dyn MxResolver>,
        transport: Arc<dyn MailTransport>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            retry: RetryPolicy::fixed(config.max_retries, retry_delay),
            config,
            resolver,
            transport,
            sleeper,
        }
    }

    /// Finds the mail exchange to use for `recipient`.
    async fn resolve_relay(&self, recipient: &str) -> Result<String, DnsError> {
        let domain = recipient_domain(recipient)
            .ok_or_else(|| DnsError::Resolution(format!("'{}' has no domain part", recipient)))?;
        let records = self.resolver.lookup_mx(domain).await?;
        preferred_exchange(&records)
            .map(|r| r.exchange.clone())
            .ok_or_else(|| DnsError::NoRecords(domain.to_string()))
    }

    async fn deliver_to(&self, recipient: &str, alert: &AlertState) -> DeliveryOutcome {
        let relay = match self.resolve_relay(recipient).await {
            Ok(relay) => relay,
            Err(e) => {
                error!(error = %e, "Error looking up email server, skipping recipient");
                return DeliveryOutcome::Skipped {
                    reason: e.to_string(),
                };
            }
        };

        let email = OutgoingEmail {
            from: self.config.sender.clone(),
            to: recipient.to_string(),
            subject: alert.message.clone(),
            body: alert.details.clone(),
        };

        let transport = &self.transport;
        let relay = relay.as_str();
        let email = &email;
        let outcome = self
            .retry
            .run(self.sleeper.as_ref(), move |_attempt| {
                metrics::counter!("alert_delivery_attempts_total", "channel" => "email").increment(1);
                transport.send(relay, email)
            })
            .await;

        match outcome.result {
            Ok(()) => {
                info!(relay, attempts = outcome.attempts, "Alert email sent");
                DeliveryOutcome::Delivered {
                    attempts: outcome.attempts,
                }
            }
            Err(e) => {
                error!(relay, attempts = outcome.attempts, error = %e, "Giving up on alert email");
                let mut errors: Vec<String> = outcome.errors.iter().map(|e| e.to_string()).collect();
                errors.push(e.to_string());
                DeliveryOutcome::Failed {
                    attempts: outcome.attempts,
                    errors,
                }
            }
        }
    }
}

#[async_trait]
impl AlertHandler for EmailHandler {
    fn channel(&self) -> &'static str {
        "email"
    }

    #[instrument(skip_all, fields(channel = "email", service = %alert.service, node = %alert.node))]
    async fn deliver(&self, _datacenter: &str, alert: &AlertState) -> DeliveryReport {
        let mut report = DeliveryReport::new(self.channel());
        for recipient in &self.config.recipients {
            let span = tracing::info_span!("recipient", recipient = %recipient);
            let outcome = self.deliver_to(recipient, alert).instrument(span).await;
            report.push(recipient.clone(), outcome);
        }
        report
    }
}
