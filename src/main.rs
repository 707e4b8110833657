//! alertcast - deliver a health alert through every configured channel
//!
//! Reads the configuration, builds one handler per configured channel and
//! delivers a single alert described on the command line or as JSON.

use alertcast::{
    cli::Cli,
    config::{Config, HandlerConfig},
    dispatcher::Dispatcher,
    handlers::ChannelContext,
};
use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = Config::load(&cli).unwrap_or_else(|err| {
        init_tracing("info");
        error!("Failed to load configuration: {}", err);
        std::process::exit(1);
    });

    init_tracing(&config.log_level);

    let alert = cli.alert().unwrap_or_else(|err| {
        error!("Invalid alert: {:#}", err);
        std::process::exit(2);
    });

    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Datacenter: {}", config.datacenter);
    info!("Dispatch Mode: {:?}", config.dispatch_mode);
    info!("Retry Delay: {}s", config.retry_delay_secs);
    if let Some(resolver) = &config.dns.resolver {
        info!("DNS Resolver: {}", resolver);
    } else {
        info!("DNS Resolver: System Default");
    }
    for (i, handler) in config.handlers.iter().enumerate() {
        match handler {
            HandlerConfig::Console(c) => info!("Handler {}: console (level {})", i, c.log_level),
            HandlerConfig::Email(c) => info!(
                "Handler {}: email ({} recipients, {} retries)",
                i,
                c.recipients.len(),
                c.max_retries
            ),
            HandlerConfig::PagerDuty(c) => {
                info!("Handler {}: pagerduty ({} retries)", i, c.max_retries)
            }
            HandlerConfig::Slack(c) => info!(
                "Handler {}: slack (channel {}, {} retries)",
                i, c.channel_name, c.max_retries
            ),
        }
    }
    info!("-------------------------------------------------------");

    let ctx = ChannelContext::system(&config)?;
    let dispatcher = Dispatcher::from_config(&config, &ctx);

    let reports = dispatcher.deliver(&config.datacenter, &alert).await;

    for report in &reports {
        for target in &report.targets {
            info!(
                channel = report.channel,
                target = %target.target,
                outcome = target.outcome.label(),
                attempts = target.outcome.attempts(),
                "Delivery summary"
            );
        }
    }

    // Alerting is best-effort: failed deliveries never fail the process.
    Ok(())
}
