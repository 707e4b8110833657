//! Console channel: writes alerts to the application log.

use crate::config::ConsoleConfig;
use crate::core::{AlertHandler, AlertState, DeliveryOutcome, DeliveryReport};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Severity an alert is written at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLevel {
    /// Logs, then aborts the process.
    Panic,
    /// Logs, then exits the process with status 1.
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
}

impl ConsoleLevel {
    /// Case-insensitive; "warning" is accepted for `Warn`.
    pub fn parse(level: &str) -> Option<Self> {
        match level.to_lowercase().as_str() {
            "panic" => Some(Self::Panic),
            "fatal" => Some(Self::Fatal),
            "error" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Panic => "panic",
            Self::Fatal => "fatal",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

/// Destination of console alert lines.
pub trait LogSink: Send + Sync {
    fn emit(&self, level: ConsoleLevel, line: &str);
}

/// Writes alert lines as `tracing` events under the `alertcast::alert` target.
///
/// `Panic` and `Fatal` terminate the process after the first line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, level: ConsoleLevel, line: &str) {
        match level {
            ConsoleLevel::Panic => {
                error!(target: "alertcast::alert", severity = "panic", "{}", line);
                std::process::abort();
            }
            ConsoleLevel::Fatal => {
                error!(target: "alertcast::alert", severity = "fatal", "{}", line);
                std::process::exit(1);
            }
            ConsoleLevel::Error => error!(target: "alertcast::alert", "{}", line),
            ConsoleLevel::Warn => warn!(target: "alertcast::alert", "{}", line),
            ConsoleLevel::Info => info!(target: "alertcast::alert", "{}", line),
            ConsoleLevel::Debug => debug!(target: "alertcast::alert", "{}", line),
        }
    }
}

pub struct ConsoleHandler {
    configured_level: String,
    level: Option<ConsoleLevel>,
    sink: Arc<dyn LogSink>,
}

impl ConsoleHandler {
    pub fn new(config: &ConsoleConfig, sink: Arc<dyn LogSink>) -> Self {
        let level = ConsoleLevel::parse(&config.log_level);
        if level.is_none() {
            warn!(
                log_level = %config.log_level,
                "Unknown console log level, console alerts will not be written"
            );
        }
        Self {
            configured_level: config.log_level.clone(),
            level,
            sink,
        }
    }
}

#[async_trait]
impl AlertHandler for ConsoleHandler {
    fn channel(&self) -> &'static str {
        "console"
    }

    async fn deliver(&self, _datacenter: &str, alert: &AlertState) -> DeliveryReport {
        let Some(level) = self.level else {
            return DeliveryReport::single(
                self.channel(),
                self.configured_level.clone(),
                DeliveryOutcome::Skipped {
                    reason: format!("unknown log level '{}'", self.configured_level),
                },
            );
        };

        for line in alert.lines() {
            self.sink.emit(level, line);
        }

        DeliveryReport::single(
            self.channel(),
            level.as_str(),
            DeliveryOutcome::Delivered { attempts: 1 },
        )
    }
}
