//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. Config-related arguments are merged on top of the
//! `alertcast.toml` file and environment variables; the remaining arguments
//! describe the alert to deliver.

use crate::core::{AlertState, HealthStatus};
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::io::Read;
use std::path::PathBuf;

/// Delivers a health-state alert through every configured notification channel.
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Datacenter the alerting entity lives in.
    #[arg(long, value_name = "NAME")]
    pub datacenter: Option<String>,

    /// Application log level (overrides the config file).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// IP address and port of the DNS resolver used for MX lookups.
    #[arg(long, value_name = "IP:PORT")]
    pub dns_resolver: Option<String>,

    /// Run all handlers concurrently instead of one after another.
    #[arg(long)]
    pub concurrent: bool,

    /// Read the alert as JSON from a file, or from stdin with "-".
    #[arg(long, value_name = "FILE", conflicts_with_all = ["service", "node", "message"])]
    pub alert_json: Option<String>,

    /// Service that changed state.
    #[arg(long)]
    pub service: Option<String>,

    /// Service tag.
    #[arg(long, default_value = "")]
    pub tag: String,

    /// Node the service instance runs on.
    #[arg(long)]
    pub node: Option<String>,

    /// New health status (passing, warning, critical, maintenance).
    #[arg(long, default_value = "critical")]
    pub status: HealthStatus,

    /// One-line summary of the alert.
    #[arg(long)]
    pub message: Option<String>,

    /// Multi-line details.
    #[arg(long, default_value = "")]
    pub details: String,
}

impl Cli {
    /// Builds the alert described by the command line.
    pub fn alert(&self) -> Result<AlertState> {
        if let Some(source) = &self.alert_json {
            let raw = if source == "-" {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("failed to read alert from stdin")?;
                buf
            } else {
                std::fs::read_to_string(source)
                    .with_context(|| format!("failed to read alert file {}", source))?
            };
            return serde_json::from_str(&raw).context("invalid alert JSON");
        }

        let required = |value: &Option<String>, flag: &str| {
            value
                .clone()
                .ok_or_else(|| anyhow!("--{} is required unless --alert-json is given", flag))
        };

        Ok(AlertState {
            service: required(&self.service, "service")?,
            tag: self.tag.clone(),
            node: required(&self.node, "node")?,
            status: self.status,
            message: required(&self.message, "message")?,
            details: self.details.clone(),
        })
    }
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(datacenter) = &self.datacenter {
            dict.insert("datacenter".into(), Value::from(datacenter.clone()));
        }

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        if let Some(resolver) = &self.dns_resolver {
            let mut dns = Dict::new();
            dns.insert("resolver".into(), Value::from(resolver.clone()));
            dict.insert("dns".into(), Value::from(dns));
        }

        // Only an explicit flag overrides the configured mode.
        if self.concurrent {
            dict.insert("dispatch_mode".into(), Value::from("concurrent"));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
