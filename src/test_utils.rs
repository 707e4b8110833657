//! Fakes for every transport a channel depends on.

use crate::{
    dns::{DnsError, MxRecord, MxResolver},
    handlers::{
        console::{ConsoleLevel, LogSink},
        email::{EmailError, MailTransport, OutgoingEmail},
        pagerduty::{IncidentClient, IncidentEvent, IncidentResponse},
        slack::{SlackClientTrait, WebhookError, WebhookMessage},
        ChannelContext,
    },
    retry::Sleeper,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Records requested delays instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// Captures console alert lines.
#[derive(Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<(ConsoleLevel, String)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(ConsoleLevel, String)> {
        self.lines.lock().unwrap().clone()
    }
}

impl LogSink for RecordingSink {
    fn emit(&self, level: ConsoleLevel, line: &str) {
        self.lines.lock().unwrap().push((level, line.to_string()));
    }
}

/// Fake MX resolver with canned answers per domain.
#[derive(Default)]
pub struct FakeMxResolver {
    responses: Mutex<HashMap<String, Result<Vec<MxRecord>, String>>>,
    call_count: Mutex<HashMap<String, u32>>,
}

impl FakeMxResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_records(&self, domain: &str, records: Vec<MxRecord>) {
        self.responses
            .lock()
            .unwrap()
            .insert(domain.to_string(), Ok(records));
    }

    pub fn add_error(&self, domain: &str, error: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(domain.to_string(), Err(error.to_string()));
    }

    pub fn get_call_count(&self, domain: &str) -> u32 {
        self.call_count
            .lock()
            .unwrap()
            .get(domain)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl MxResolver for FakeMxResolver {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, DnsError> {
        *self
            .call_count
            .lock()
            .unwrap()
            .entry(domain.to_string())
            .or_insert(0) += 1;

        match self.responses.lock().unwrap().get(domain) {
            Some(Ok(records)) if records.is_empty() => Err(DnsError::NoRecords(domain.to_string())),
            Some(Ok(records)) => Ok(records.clone()),
            Some(Err(e)) => Err(DnsError::Resolution(e.clone())),
            None => Err(DnsError::NoRecords(domain.to_string())),
        }
    }
}

/// Fake mail transport. Recipients succeed unless told to fail.
#[derive(Default)]
pub struct FakeMailTransport {
    failures_left: Mutex<HashMap<String, u32>>,
    attempts: Mutex<HashMap<String, u32>>,
    sent: Mutex<Vec<(String, OutgoingEmail)>>,
}

impl FakeMailTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first `n` sends to `recipient` fail.
    pub fn fail_times(&self, recipient: &str, n: u32) {
        self.failures_left
            .lock()
            .unwrap()
            .insert(recipient.to_string(), n);
    }

    pub fn fail_always(&self, recipient: &str) {
        self.fail_times(recipient, u32::MAX);
    }

    /// Send attempts across all recipients.
    pub fn attempts(&self) -> u32 {
        self.attempts.lock().unwrap().values().sum()
    }

    pub fn attempts_for(&self, recipient: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(recipient)
            .copied()
            .unwrap_or(0)
    }

    /// Successfully sent emails with the relay they went through.
    pub fn sent(&self) -> Vec<(String, OutgoingEmail)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for FakeMailTransport {
    async fn send(&self, relay: &str, email: &OutgoingEmail) -> Result<(), EmailError> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(email.to.clone())
            .or_insert(0) += 1;

        let mut failures = self.failures_left.lock().unwrap();
        if let Some(left) = failures.get_mut(&email.to) {
            if *left > 0 {
                *left = left.saturating_sub(1);
                return Err(EmailError::Smtp {
                    relay: relay.to_string(),
                    reason: "connection refused".to_string(),
                });
            }
        }

        self.sent
            .lock()
            .unwrap()
            .push((relay.to_string(), email.clone()));
        Ok(())
    }
}

/// Fake incident client returning a configurable response.
#[derive(Default)]
pub struct FakeIncidentClient {
    events: Mutex<Vec<IncidentEvent>>,
    errors: Mutex<Vec<String>>,
}

impl FakeIncidentClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_with_errors(&self, errors: Vec<String>) {
        *self.errors.lock().unwrap() = errors;
    }

    pub fn events(&self) -> Vec<IncidentEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl IncidentClient for FakeIncidentClient {
    async fn send_event(&self, event: &IncidentEvent) -> IncidentResponse {
        self.events.lock().unwrap().push(event.clone());
        let errors = self.errors.lock().unwrap().clone();
        IncidentResponse {
            status: if errors.is_empty() { "success" } else { "invalid event" }.to_string(),
            message: String::new(),
            incident_key: event.incident_key.clone(),
            errors,
            attempts: 1,
        }
    }
}

/// Fake webhook client that can fail its first posts.
#[derive(Default)]
pub struct FakeSlackClient {
    failures_left: Mutex<u32>,
    attempts: Mutex<u32>,
    sent: Mutex<Vec<WebhookMessage>>,
}

impl FakeSlackClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_times(&self, n: u32) {
        *self.failures_left.lock().unwrap() = n;
    }

    pub fn attempts(&self) -> u32 {
        *self.attempts.lock().unwrap()
    }

    pub fn sent(&self) -> Vec<WebhookMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SlackClientTrait for FakeSlackClient {
    async fn post_message(&self, message: &WebhookMessage) -> Result<(), WebhookError> {
        *self.attempts.lock().unwrap() += 1;
        let mut left = self.failures_left.lock().unwrap();
        if *left > 0 {
            *left -= 1;
            return Err(WebhookError::Status {
                status: 500,
                body: "internal_error".to_string(),
            });
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// The fakes behind a `ChannelContext` built by `fake_context`.
#[derive(Clone)]
pub struct Fakes {
    pub sink: Arc<RecordingSink>,
    pub resolver: Arc<FakeMxResolver>,
    pub mail: Arc<FakeMailTransport>,
    pub incidents: Arc<FakeIncidentClient>,
    pub slack: Arc<FakeSlackClient>,
    pub sleeper: Arc<RecordingSleeper>,
}

/// A `ChannelContext` whose transports are all fakes shared across handlers.
pub fn fake_context() -> (ChannelContext, Fakes) {
    let fakes = Fakes {
        sink: Arc::new(RecordingSink::new()),
        resolver: Arc::new(FakeMxResolver::new()),
        mail: Arc::new(FakeMailTransport::new()),
        incidents: Arc::new(FakeIncidentClient::new()),
        slack: Arc::new(FakeSlackClient::new()),
        sleeper: Arc::new(RecordingSleeper::new()),
    };

    let mail = fakes.mail.clone();
    let incidents = fakes.incidents.clone();
    let slack = fakes.slack.clone();
    let ctx = ChannelContext {
        log_sink: fakes.sink.clone(),
        mx_resolver: fakes.resolver.clone(),
        mail_transport: Arc::new(move |_port: u16| mail.clone() as Arc<dyn MailTransport>),
        incident_client: Arc::new(move |_config: &crate::config::PagerDutyConfig| {
            incidents.clone() as Arc<dyn IncidentClient>
        }),
        slack_client: Arc::new(move |_config: &crate::config::SlackConfig| {
            slack.clone() as Arc<dyn SlackClientTrait>
        }),
        sleeper: fakes.sleeper.clone(),
        retry_delay: Duration::from_secs(5),
    };
    (ctx, fakes)
}
