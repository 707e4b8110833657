//! End-to-end fan-out through every channel, with fake transports.

use alertcast::config::{
    default_pagerduty_url, default_sender, Config, ConsoleConfig, DispatchMode, EmailConfig,
    HandlerConfig, PagerDutyConfig, SlackConfig,
};
use alertcast::dispatcher::Dispatcher;
use alertcast::dns::MxRecord;
use alertcast::handlers::pagerduty::EventType;
use alertcast::handlers::ConsoleLevel;
use alertcast::test_utils::fake_context;
use alertcast::{AlertState, DeliveryOutcome, HealthStatus};
use std::time::Duration;

fn alert(status: HealthStatus) -> AlertState {
    AlertState {
        service: "web".to_string(),
        tag: "v2".to_string(),
        node: "node-1".to_string(),
        status,
        message: "web unhealthy".to_string(),
        details: "line1\nline2".to_string(),
    }
}

fn email(recipients: &[&str], max_retries: u32) -> HandlerConfig {
    HandlerConfig::Email(EmailConfig {
        recipients: recipients.iter().map(|r| r.to_string()).collect(),
        max_retries,
        sender: default_sender(),
        smtp_port: 25,
    })
}

fn console(level: &str) -> HandlerConfig {
    HandlerConfig::Console(ConsoleConfig {
        log_level: level.to_string(),
    })
}

fn pagerduty() -> HandlerConfig {
    HandlerConfig::PagerDuty(PagerDutyConfig {
        service_key: "0123456789abcdef0123456789abcdef".to_string(),
        max_retries: 2,
        api_url: default_pagerduty_url(),
    })
}

fn slack(max_retries: u32) -> HandlerConfig {
    HandlerConfig::Slack(SlackConfig {
        api_token: "T000/B000/XXXX".to_string(),
        channel_name: "#ops".to_string(),
        max_retries,
    })
}

fn config(mode: DispatchMode, handlers: Vec<HandlerConfig>) -> Config {
    Config {
        datacenter: "us-east".to_string(),
        dispatch_mode: mode,
        handlers,
        ..Config::default()
    }
}

#[tokio::test]
async fn test_critical_alert_reaches_every_channel() {
    let (ctx, fakes) = fake_context();
    fakes
        .resolver
        .add_records("example.com", vec![MxRecord::new(10, "mx.example.com")]);

    let config = config(
        DispatchMode::Sequential,
        vec![console("warn"), email(&["a@example.com"], 2), pagerduty(), slack(1)],
    );
    let dispatcher = Dispatcher::from_config(&config, &ctx);
    assert_eq!(dispatcher.len(), 4);

    let reports = dispatcher
        .deliver(&config.datacenter, &alert(HealthStatus::Critical))
        .await;

    let channels: Vec<&str> = reports.iter().map(|r| r.channel).collect();
    assert_eq!(channels, vec!["console", "email", "pagerduty", "slack"]);
    assert!(reports.iter().all(|r| r.all_delivered()));

    // Console: message plus each detail line at the configured level.
    let lines = fakes.sink.lines();
    assert_eq!(
        lines,
        vec![
            (ConsoleLevel::Warn, "web unhealthy".to_string()),
            (ConsoleLevel::Warn, "line1".to_string()),
            (ConsoleLevel::Warn, "line2".to_string()),
        ]
    );

    // Email went through the preferred exchange.
    let sent = fakes.mail.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "mx.example.com");
    assert_eq!(sent[0].1.subject, "web unhealthy");

    // PagerDuty triggered with the deterministic key.
    let events = fakes.incidents.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::Trigger);
    assert_eq!(events[0].incident_key, "us-east-web-v2-node-1");
    assert_eq!(
        reports[2].outcome_for("us-east-web-v2-node-1"),
        Some(&DeliveryOutcome::Delivered { attempts: 1 })
    );

    assert_eq!(fakes.slack.sent().len(), 1);
    assert_eq!(fakes.slack.sent()[0].attachments[0].color, "danger");
}

#[tokio::test]
async fn test_passing_alert_resolves_same_incident() {
    let (ctx, fakes) = fake_context();
    let config = config(DispatchMode::Sequential, vec![pagerduty()]);
    let dispatcher = Dispatcher::from_config(&config, &ctx);

    dispatcher
        .deliver(&config.datacenter, &alert(HealthStatus::Critical))
        .await;
    dispatcher
        .deliver(&config.datacenter, &alert(HealthStatus::Passing))
        .await;

    let events = fakes.incidents.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, EventType::Trigger);
    assert_eq!(events[1].event_type, EventType::Resolve);
    assert_eq!(events[0].incident_key, events[1].incident_key);
}

#[tokio::test]
async fn test_failing_channel_does_not_block_later_channels() {
    let (ctx, fakes) = fake_context();
    fakes
        .resolver
        .add_records("example.com", vec![MxRecord::new(10, "mx.example.com")]);
    fakes.mail.fail_always("a@example.com");
    fakes.slack.fail_times(u32::MAX);
    fakes
        .incidents
        .respond_with_errors(vec!["Service key is the wrong length".to_string()]);

    let config = config(
        DispatchMode::Sequential,
        vec![email(&["a@example.com"], 2), slack(0), pagerduty(), console("error")],
    );
    let reports = Dispatcher::from_config(&config, &ctx)
        .deliver(&config.datacenter, &alert(HealthStatus::Critical))
        .await;

    assert_eq!(reports.len(), 4);
    assert!(!reports[0].all_delivered());
    assert!(!reports[1].all_delivered());
    assert!(!reports[2].all_delivered());
    assert!(reports[3].all_delivered());
    assert_eq!(fakes.sink.lines().len(), 3);

    // Email retried with the configured fixed delay; Slack had no retries.
    assert_eq!(fakes.mail.attempts_for("a@example.com"), 3);
    assert_eq!(fakes.slack.attempts(), 1);
    assert_eq!(fakes.sleeper.sleeps(), vec![Duration::from_secs(5); 2]);
}

#[tokio::test]
async fn test_email_mx_failure_skips_without_sending() {
    let (ctx, fakes) = fake_context();
    fakes.resolver.add_error("example.com", "SERVFAIL");

    let config = config(DispatchMode::Sequential, vec![email(&["a@example.com"], 2)]);
    let reports = Dispatcher::from_config(&config, &ctx)
        .deliver(&config.datacenter, &alert(HealthStatus::Critical))
        .await;

    assert!(matches!(
        reports[0].outcome_for("a@example.com"),
        Some(DeliveryOutcome::Skipped { .. })
    ));
    assert_eq!(fakes.mail.attempts(), 0);
    assert!(fakes.sleeper.sleeps().is_empty());
}

#[tokio::test]
async fn test_one_recipient_failure_does_not_stop_others() {
    let (ctx, fakes) = fake_context();
    fakes
        .resolver
        .add_records("example.com", vec![MxRecord::new(10, "mx.example.com")]);
    fakes
        .resolver
        .add_records("example.org", vec![MxRecord::new(5, "mx.example.org")]);
    fakes.mail.fail_always("a@example.com");

    let config = config(
        DispatchMode::Sequential,
        vec![email(&["a@example.com", "missing@nowhere.invalid", "b@example.org"], 1)],
    );
    let reports = Dispatcher::from_config(&config, &ctx)
        .deliver(&config.datacenter, &alert(HealthStatus::Warning))
        .await;

    let report = &reports[0];
    assert_eq!(report.targets.len(), 3);
    assert!(matches!(
        report.outcome_for("a@example.com"),
        Some(DeliveryOutcome::Failed { attempts: 2, .. })
    ));
    assert!(matches!(
        report.outcome_for("missing@nowhere.invalid"),
        Some(DeliveryOutcome::Skipped { .. })
    ));
    assert_eq!(
        report.outcome_for("b@example.org"),
        Some(&DeliveryOutcome::Delivered { attempts: 1 })
    );
}

#[tokio::test]
async fn test_concurrent_mode_delivers_to_all_channels() {
    let (ctx, fakes) = fake_context();
    let config = config(
        DispatchMode::Concurrent,
        vec![console("info"), pagerduty(), slack(0)],
    );

    let reports = Dispatcher::from_config(&config, &ctx)
        .deliver(&config.datacenter, &alert(HealthStatus::Critical))
        .await;

    let channels: Vec<&str> = reports.iter().map(|r| r.channel).collect();
    assert_eq!(channels, vec!["console", "pagerduty", "slack"]);
    assert_eq!(fakes.incidents.events().len(), 1);
    assert_eq!(fakes.slack.sent().len(), 1);
}

#[tokio::test]
async fn test_unknown_console_level_emits_nothing() {
    let (ctx, fakes) = fake_context();
    let config = config(DispatchMode::Sequential, vec![console("verbose")]);

    let reports = Dispatcher::from_config(&config, &ctx)
        .deliver(&config.datacenter, &alert(HealthStatus::Critical))
        .await;

    assert!(fakes.sink.lines().is_empty());
    assert!(matches!(
        reports[0].targets[0].outcome,
        DeliveryOutcome::Skipped { .. }
    ));
}
