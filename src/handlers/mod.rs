//! Notification channels.
//!
//! Every channel implements `AlertHandler`. `Handler` is the closed set of
//! channels a deployment can configure, built from `HandlerConfig` values
//! against a `ChannelContext` that supplies the shared transports.

pub mod console;
pub mod email;
pub mod pagerduty;
pub mod slack;

pub use console::{ConsoleHandler, ConsoleLevel, LogSink, TracingSink};
pub use email::{EmailHandler, MailTransport, OutgoingEmail, SmtpMailer};
pub use pagerduty::{IncidentClient, IncidentEvent, PagerDutyClient, PagerDutyHandler};
pub use slack::{SlackClient, SlackClientTrait, SlackHandler, WebhookMessage};

use crate::config::{Config, HandlerConfig, PagerDutyConfig, SlackConfig};
use crate::core::{AlertHandler, AlertState, DeliveryReport};
use crate::dns::{HickoryMxResolver, MxResolver};
use crate::retry::{Sleeper, TokioSleeper};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Timeout of every HTTP call made by the PagerDuty and Slack channels.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the per-channel transports of a handler.
///
/// The email and console transports are shared by every handler; HTTP
/// channels get a client bound to their own endpoint.
pub struct ChannelContext {
    pub log_sink: Arc<dyn LogSink>,
    pub mx_resolver: Arc<dyn MxResolver>,
    /// Builds the mail transport for a given SMTP port.
    pub mail_transport: Arc<dyn Fn(u16) -> Arc<dyn MailTransport> + Send + Sync>,
    pub incident_client: Arc<dyn Fn(&PagerDutyConfig) -> Arc<dyn IncidentClient> + Send + Sync>,
    pub slack_client: Arc<dyn Fn(&SlackConfig) -> Arc<dyn SlackClientTrait> + Send + Sync>,
    pub sleeper: Arc<dyn Sleeper>,
    pub retry_delay: Duration,
}

impl ChannelContext {
    /// Real transports: tracing, system DNS, SMTP and HTTPS.
    pub fn system(config: &Config) -> Result<Self> {
        let (resolver, nameservers) = HickoryMxResolver::from_config(&config.dns)?;
        let ns: Vec<String> = nameservers.iter().map(|s| s.to_string()).collect();
        info!("MX resolver name servers: {}", ns.join(", "));

        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);

        let pd_http = http.clone();
        let pd_sleeper = sleeper.clone();
        let slack_http = http;

        Ok(Self {
            log_sink: Arc::new(TracingSink),
            mx_resolver: Arc::new(resolver),
            mail_transport: Arc::new(|port: u16| Arc::new(SmtpMailer::new(port)) as Arc<dyn MailTransport>),
            incident_client: Arc::new(move |c: &PagerDutyConfig| {
                Arc::new(PagerDutyClient::new(
                    pd_http.clone(),
                    c.api_url.clone(),
                    c.max_retries,
                    pd_sleeper.clone(),
                )) as Arc<dyn IncidentClient>
            }),
            slack_client: Arc::new(move |c: &SlackConfig| {
                Arc::new(SlackClient::new(slack_http.clone(), slack::webhook_url(&c.api_token)))
                    as Arc<dyn SlackClientTrait>
            }),
            sleeper,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        })
    }
}

/// A configured notification channel.
pub enum Handler {
    Console(ConsoleHandler),
    Email(EmailHandler),
    PagerDuty(PagerDutyHandler),
    Slack(SlackHandler),
}

impl Handler {
    pub fn from_config(config: &HandlerConfig, ctx: &ChannelContext) -> Self {
        match config {
            HandlerConfig::Console(c) => Handler::Console(ConsoleHandler::new(c, ctx.log_sink.clone())),
            HandlerConfig::Email(c) => Handler::Email(EmailHandler::new(
                c.clone(),
                ctx.retry_delay,
                ctx.mx_resolver.clone(),
                (ctx.mail_transport)(c.smtp_port),
                ctx.sleeper.clone(),
            )),
            HandlerConfig::PagerDuty(c) => {
                Handler::PagerDuty(PagerDutyHandler::new(c, (ctx.incident_client)(c)))
            }
            HandlerConfig::Slack(c) => Handler::Slack(SlackHandler::new(
                c,
                ctx.retry_delay,
                (ctx.slack_client)(c),
                ctx.sleeper.clone(),
            )),
        }
    }
}

#[async_trait]
impl AlertHandler for Handler {
    fn channel(&self) -> &'static str {
        match self {
            Handler::Console(h) => h.channel(),
            Handler::Email(h) => h.channel(),
            Handler::PagerDuty(h) => h.channel(),
            Handler::Slack(h) => h.channel(),
        }
    }

    async fn deliver(&self, datacenter: &str, alert: &AlertState) -> DeliveryReport {
        match self {
            Handler::Console(h) => h.deliver(datacenter, alert).await,
            Handler::Email(h) => h.deliver(datacenter, alert).await,
            Handler::PagerDuty(h) => h.deliver(datacenter, alert).await,
            Handler::Slack(h) => h.deliver(datacenter, alert).await,
        }
    }
}
