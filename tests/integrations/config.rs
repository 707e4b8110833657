use alertcast::cli::Cli;
use alertcast::config::{Config, DispatchMode, HandlerConfig};
use clap::Parser;
use serial_test::serial;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// A helper function to run a test with a temporary config file.
fn with_config_file<F>(toml_content: &str, test_fn: F)
where
    F: FnOnce(PathBuf),
{
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", toml_content).unwrap();
    let path = file.path().to_path_buf();
    test_fn(path);
}

fn cli(args: &[&str]) -> Cli {
    let mut argv = vec!["alertcast"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap()
}

#[test]
#[serial]
fn test_load_full_valid_config() {
    let toml_content = r##"
        log_level = "debug"
        datacenter = "eu-west"
        dispatch_mode = "concurrent"
        retry_delay_secs = 2

        [dns]
        resolver = "1.1.1.1:53"
        timeout_ms = 2000

        [[handlers]]
        type = "console"
        log_level = "warn"

        [[handlers]]
        type = "email"
        recipients = ["ops@example.com", "oncall@example.org"]
        max_retries = 3
        smtp_port = 2525

        [[handlers]]
        type = "pagerduty"
        service_key = "0123456789abcdef0123456789abcdef"
        max_retries = 4

        [[handlers]]
        type = "slack"
        api_token = "T000/B000/XXXX"
        channel_name = "#ops"
        max_retries = 1
    "##;

    with_config_file(toml_content, |path| {
        let config = Config::load(&cli(&["--config", path.to_str().unwrap()])).unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.datacenter, "eu-west");
        assert_eq!(config.dispatch_mode, DispatchMode::Concurrent);
        assert_eq!(config.retry_delay_secs, 2);
        assert_eq!(config.dns.resolver, Some("1.1.1.1:53".to_string()));
        assert_eq!(config.dns.timeout_ms, 2000);

        let channels: Vec<&str> = config.handlers.iter().map(|h| h.channel()).collect();
        assert_eq!(channels, vec!["console", "email", "pagerduty", "slack"]);

        match &config.handlers[1] {
            HandlerConfig::Email(email) => {
                assert_eq!(email.recipients.len(), 2);
                assert_eq!(email.max_retries, 3);
                assert_eq!(email.smtp_port, 2525);
                assert_eq!(email.sender, alertcast::config::default_sender());
            }
            other => panic!("expected email handler, got {:?}", other),
        }
    });
}

#[test]
#[serial]
fn test_load_partial_config_uses_defaults() {
    let toml_content = r##"
        [[handlers]]
        type = "console"
    "##;

    with_config_file(toml_content, |path| {
        let config = Config::load(&cli(&["--config", path.to_str().unwrap()])).unwrap();

        assert_eq!(config.log_level, "info");
        assert_eq!(config.datacenter, "dc1");
        assert_eq!(config.dispatch_mode, DispatchMode::Sequential);
        assert_eq!(config.retry_delay_secs, 5);
        assert_eq!(config.dns.resolver, None);
        assert_eq!(config.handlers.len(), 1);
    });
}

#[test]
#[serial]
fn test_environment_and_cli_override_file() {
    let toml_content = r##"
        datacenter = "from-file"
        log_level = "warn"

        [dns]
        timeout_ms = 1000
    "##;

    with_config_file(toml_content, |path| {
        std::env::set_var("ALERTCAST_DATACENTER", "from-env");
        std::env::set_var("ALERTCAST_DNS__TIMEOUT_MS", "3000");

        let config = Config::load(&cli(&[
            "--config",
            path.to_str().unwrap(),
            "--log-level",
            "debug",
        ]))
        .unwrap();
        assert_eq!(config.datacenter, "from-env");
        assert_eq!(config.dns.timeout_ms, 3000);
        assert_eq!(config.log_level, "debug");

        let config = Config::load(&cli(&[
            "--config",
            path.to_str().unwrap(),
            "--datacenter",
            "from-cli",
            "--concurrent",
        ]))
        .unwrap();
        assert_eq!(config.datacenter, "from-cli");
        assert_eq!(config.dispatch_mode, DispatchMode::Concurrent);

        std::env::remove_var("ALERTCAST_DATACENTER");
        std::env::remove_var("ALERTCAST_DNS__TIMEOUT_MS");
    });
}

#[test]
#[serial]
fn test_invalid_value_type() {
    let toml_content = r##"
        retry_delay_secs = "five"
    "##;

    with_config_file(toml_content, |path| {
        let result = Config::load(&cli(&["--config", path.to_str().unwrap()]));
        let error_string = result.unwrap_err().to_string();
        assert!(error_string.contains("retry_delay_secs"));
    });
}

#[test]
#[serial]
fn test_unknown_handler_type_is_rejected() {
    let toml_content = r##"
        [[handlers]]
        type = "carrier-pigeon"
    "##;

    with_config_file(toml_content, |path| {
        assert!(Config::load(&cli(&["--config", path.to_str().unwrap()])).is_err());
    });
}

#[test]
#[serial]
fn test_email_without_recipients_fails_validation() {
    let toml_content = r##"
        [[handlers]]
        type = "email"
        recipients = []
    "##;

    with_config_file(toml_content, |path| {
        let err = Config::load(&cli(&["--config", path.to_str().unwrap()])).unwrap_err();
        assert!(err.to_string().contains("no recipients"));
    });
}

#[test]
#[serial]
fn test_non_existent_config_file() {
    let result = Config::load(&cli(&["--config", "/path/to/non/existent/alertcast.toml"]));
    let error_string = result.unwrap_err().to_string();
    assert!(error_string.contains("Config file not found at specified path"));
}
