//! Core domain types and service traits for alertcast
//!
//! This module defines the alert record handed over by the health-monitoring
//! side, the delivery reports produced by every channel, and the single
//! contract all channel handlers implement.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Health state of a monitored entity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Passing,
    Warning,
    Critical,
    Maintenance,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Passing => "passing",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
            HealthStatus::Maintenance => "maintenance",
        }
    }

    pub fn is_passing(&self) -> bool {
        matches!(self, HealthStatus::Passing)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "passing" => Ok(HealthStatus::Passing),
            "warning" => Ok(HealthStatus::Warning),
            "critical" => Ok(HealthStatus::Critical),
            "maintenance" => Ok(HealthStatus::Maintenance),
            other => Err(format!("unknown health status '{}'", other)),
        }
    }
}

/// One health-state transition to be notified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AlertState {
    /// Name of the monitored service.
    pub service: String,
    /// Service tag (version, role, ...). May be empty.
    #[serde(default)]
    pub tag: String,
    /// Node the service instance runs on.
    pub node: String,
    /// The state the entity transitioned into.
    pub status: HealthStatus,
    /// Short human-readable summary.
    pub message: String,
    /// Free-form, possibly multi-line, detail text.
    #[serde(default)]
    pub details: String,
}

impl AlertState {
    /// Key correlating a trigger with its later resolve in an external
    /// incident tracker. Depends only on the datacenter and entity identity.
    pub fn incident_key(&self, datacenter: &str) -> String {
        format!(
            "{}-{}-{}-{}",
            datacenter, self.service, self.tag, self.node
        )
    }

    /// The message followed by every line of the details, if any.
    pub fn lines(&self) -> Vec<&str> {
        let mut lines = vec![self.message.as_str()];
        if !self.details.is_empty() {
            lines.extend(self.details.split('\n'));
        }
        lines
    }
}

/// Result of delivering to a single target of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Delivered after the given number of attempts.
    Delivered { attempts: u32 },
    /// Every attempt failed, or the remote end reported errors.
    Failed { attempts: u32, errors: Vec<String> },
    /// No attempt was made (unresolvable target, disabled channel).
    Skipped { reason: String },
    /// The handler panicked; recorded by the dispatcher.
    Aborted { reason: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    /// Number of delivery attempts made for this target.
    pub fn attempts(&self) -> u32 {
        match self {
            DeliveryOutcome::Delivered { attempts } | DeliveryOutcome::Failed { attempts, .. } => {
                *attempts
            }
            DeliveryOutcome::Skipped { .. } | DeliveryOutcome::Aborted { .. } => 0,
        }
    }

    /// Short label used for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered { .. } => "delivered",
            DeliveryOutcome::Failed { .. } => "failed",
            DeliveryOutcome::Skipped { .. } => "skipped",
            DeliveryOutcome::Aborted { .. } => "aborted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub target: String,
    pub outcome: DeliveryOutcome,
}

/// What one channel did with one alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub channel: &'static str,
    pub targets: Vec<TargetReport>,
}

impl DeliveryReport {
    pub fn new(channel: &'static str) -> Self {
        Self {
            channel,
            targets: Vec::new(),
        }
    }

    pub fn single(channel: &'static str, target: impl Into<String>, outcome: DeliveryOutcome) -> Self {
        let mut report = Self::new(channel);
        report.push(target, outcome);
        report
    }

    pub fn push(&mut self, target: impl Into<String>, outcome: DeliveryOutcome) {
        metrics::counter!(
            "alert_deliveries_total",
            "channel" => self.channel,
            "outcome" => outcome.label()
        )
        .increment(1);
        self.targets.push(TargetReport {
            target: target.into(),
            outcome,
        });
    }

    /// True if every target was delivered.
    pub fn all_delivered(&self) -> bool {
        self.targets.iter().all(|t| t.outcome.is_delivered())
    }

    pub fn outcome_for(&self, target: &str) -> Option<&DeliveryOutcome> {
        self.targets
            .iter()
            .find(|t| t.target == target)
            .map(|t| &t.outcome)
    }
}

// =============================================================================
// Service Traits
// =============================================================================

/// Delivers alerts through one notification medium.
#[async_trait]
pub trait AlertHandler: Send + Sync {
    /// Channel name used for logging and metrics (e.g. "email", "slack").
    fn channel(&self) -> &'static str;

    /// Delivers an alert for an entity in `datacenter`.
    ///
    /// Never fails: every error is handled and logged inside the handler and
    /// summarised in the returned report.
    async fn deliver(&self, datacenter: &str, alert: &AlertState) -> DeliveryReport;
}
