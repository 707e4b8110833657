//! Configuration management for alertcast
//!
//! This module defines the main `Config` struct and one config struct per
//! notification channel. It uses the `figment` crate to layer built-in
//! defaults, an `alertcast.toml` file, `ALERTCAST_` environment variables and
//! command-line overrides.

use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::cli::Cli;

/// Default config file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "alertcast.toml";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// Datacenter the monitored entities live in.
    pub datacenter: String,
    /// Whether handlers run one after another or concurrently.
    pub dispatch_mode: DispatchMode,
    /// Fixed delay between email and webhook delivery attempts, in seconds.
    pub retry_delay_secs: u64,
    /// Configuration for mail exchange lookups.
    pub dns: DnsConfig,
    /// Notification channels, in invocation order.
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    #[default]
    Sequential,
    Concurrent,
}

/// Configuration for DNS resolution.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DnsConfig {
    /// `ip:port` of a resolver to use instead of the system configuration.
    pub resolver: Option<String>,
    /// Per-query timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            resolver: None,
            timeout_ms: 5000,
        }
    }
}

/// One configured notification channel.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HandlerConfig {
    Console(ConsoleConfig),
    Email(EmailConfig),
    PagerDuty(PagerDutyConfig),
    Slack(SlackConfig),
}

impl HandlerConfig {
    pub fn channel(&self) -> &'static str {
        match self {
            Self::Console(_) => "console",
            Self::Email(_) => "email",
            Self::PagerDuty(_) => "pagerduty",
            Self::Slack(_) => "slack",
        }
    }
}

/// Configuration for the console channel.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ConsoleConfig {
    /// panic, fatal, error, warn/warning, info or debug.
    #[serde(default = "default_console_level")]
    pub log_level: String,
}

fn default_console_level() -> String {
    "info".to_string()
}

/// Configuration for email alerts.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EmailConfig {
    pub recipients: Vec<String>,
    #[serde(default)]
    pub max_retries: u32,
    /// `From:` mailbox of every alert email.
    #[serde(default = "default_sender")]
    pub sender: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
}

pub fn default_sender() -> String {
    "Health Alerting <health-alerting@noreply.localhost>".to_string()
}

fn default_smtp_port() -> u16 {
    25
}

/// Configuration for PagerDuty incidents.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PagerDutyConfig {
    pub service_key: String,
    #[serde(default)]
    pub max_retries: u32,
    /// Events API endpoint.
    #[serde(default = "default_pagerduty_url")]
    pub api_url: String,
}

pub fn default_pagerduty_url() -> String {
    "https://events.pagerduty.com/generic/2010-04-15/create_event.json".to_string()
}

/// Configuration for Slack alerts.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SlackConfig {
    /// Incoming webhook URL, or its token path under `hooks.slack.com/services/`.
    pub api_token: String,
    /// Only used in log messages.
    #[serde(default)]
    pub channel_name: String,
    #[serde(default)]
    pub max_retries: u32,
}

impl Config {
    /// Loads the configuration by layering defaults, the TOML file, the
    /// environment and the command line, then validates it.
    pub fn load(cli: &Cli) -> Result<Self> {
        // An explicit path must exist; the default file is optional.
        if let Some(path) = &cli.config {
            if !path.exists() {
                bail!("Config file not found at specified path: {}", path.display());
            }
        }
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            // e.g. ALERTCAST_DATACENTER=eu-west or ALERTCAST_DNS__TIMEOUT_MS=2000
            .merge(Env::prefixed("ALERTCAST_").split("__"))
            .merge(cli)
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects handler configurations that could never deliver anything.
    pub fn validate(&self) -> Result<()> {
        if self.datacenter.is_empty() {
            bail!("datacenter must not be empty");
        }
        for (i, handler) in self.handlers.iter().enumerate() {
            match handler {
                HandlerConfig::Console(_) => {}
                HandlerConfig::Email(c) => {
                    if c.recipients.is_empty() {
                        bail!("handlers[{}] (email): no recipients configured", i);
                    }
                }
                HandlerConfig::PagerDuty(c) => {
                    if c.service_key.is_empty() {
                        bail!("handlers[{}] (pagerduty): service_key is empty", i);
                    }
                }
                HandlerConfig::Slack(c) => {
                    if c.api_token.is_empty() {
                        bail!("handlers[{}] (slack): api_token is empty", i);
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            datacenter: "dc1".to_string(),
            dispatch_mode: DispatchMode::Sequential,
            retry_delay_secs: 5,
            dns: DnsConfig::default(),
            handlers: Vec::new(),
        }
    }
}
