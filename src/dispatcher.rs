//! Fans every alert out to all configured notification channels.
//!
//! Each handler runs in its own failure domain: its errors are summarised in
//! its report, and a panic inside a handler is caught and recorded so the
//! remaining handlers still run.

use crate::config::{Config, DispatchMode};
use crate::core::{AlertHandler, AlertState, DeliveryOutcome, DeliveryReport};
use crate::handlers::{ChannelContext, Handler};
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

pub struct Dispatcher {
    handlers: Vec<Arc<dyn AlertHandler>>,
    mode: DispatchMode,
}

impl Dispatcher {
    pub fn new(handlers: Vec<Arc<dyn AlertHandler>>, mode: DispatchMode) -> Self {
        Self { handlers, mode }
    }

    /// Builds one handler per configured channel, in configuration order.
    pub fn from_config(config: &Config, ctx: &ChannelContext) -> Self {
        let handlers = config
            .handlers
            .iter()
            .map(|c| Arc::new(Handler::from_config(c, ctx)) as Arc<dyn AlertHandler>)
            .collect();
        Self::new(handlers, config.dispatch_mode)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Delivers `alert` through every handler.
    ///
    /// Never fails. Reports are returned in configuration order whatever the
    /// dispatch mode.
    #[instrument(skip_all, fields(datacenter = %datacenter, service = %alert.service, node = %alert.node, status = %alert.status))]
    pub async fn deliver(&self, datacenter: &str, alert: &AlertState) -> Vec<DeliveryReport> {
        if self.handlers.is_empty() {
            warn!("No notification handlers configured, alert dropped");
            return Vec::new();
        }

        match self.mode {
            DispatchMode::Sequential => {
                let mut reports = Vec::with_capacity(self.handlers.len());
                for handler in &self.handlers {
                    reports.push(deliver_isolated(handler.as_ref(), datacenter, alert).await);
                }
                reports
            }
            DispatchMode::Concurrent => {
                join_all(
                    self.handlers
                        .iter()
                        .map(|handler| deliver_isolated(handler.as_ref(), datacenter, alert)),
                )
                .await
            }
        }
    }
}

async fn deliver_isolated(
    handler: &dyn AlertHandler,
    datacenter: &str,
    alert: &AlertState,
) -> DeliveryReport {
    let channel = handler.channel();
    match AssertUnwindSafe(handler.deliver(datacenter, alert))
        .catch_unwind()
        .await
    {
        Ok(report) => {
            let delivered = report
                .targets
                .iter()
                .filter(|t| t.outcome.is_delivered())
                .count();
            info!(
                channel,
                delivered,
                targets = report.targets.len(),
                "Handler finished"
            );
            report
        }
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            error!(channel, reason = %reason, "Handler panicked, continuing with the next one");
            DeliveryReport::single(channel, channel, DeliveryOutcome::Aborted { reason })
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
