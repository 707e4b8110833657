use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn alertcast_bin() -> Result<Command> {
    let mut cmd = Command::cargo_bin("alertcast")?;
    cmd.env_remove("RUST_LOG");
    Ok(cmd)
}

fn console_config() -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    writeln!(
        file,
        r#"
        datacenter = "us-east"

        [[handlers]]
        type = "console"
        log_level = "warn"
        "#
    )?;
    Ok(file)
}

#[test]
fn test_console_alert_from_flags() -> Result<()> {
    let config = console_config()?;

    let mut cmd = alertcast_bin()?;
    cmd.arg("--config")
        .arg(config.path())
        .args(["--service", "web", "--tag", "v2", "--node", "node-1"])
        .args(["--message", "web unhealthy", "--details", "line1\nline2"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("web unhealthy"))
        .stdout(predicate::str::contains("line1"))
        .stdout(predicate::str::contains("line2"));

    Ok(())
}

#[test]
fn test_alert_json_from_file() -> Result<()> {
    let config = console_config()?;
    let mut alert = NamedTempFile::new()?;
    writeln!(
        alert,
        r#"{{"service":"db","node":"node-7","status":"warning","message":"replication lag"}}"#
    )?;

    let mut cmd = alertcast_bin()?;
    cmd.arg("--config")
        .arg(config.path())
        .arg("--alert-json")
        .arg(alert.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("replication lag"));

    Ok(())
}

#[test]
fn test_alert_json_from_stdin() -> Result<()> {
    let config = console_config()?;

    let mut cmd = alertcast_bin()?;
    cmd.arg("--config")
        .arg(config.path())
        .args(["--alert-json", "-"])
        .write_stdin(r#"{"service":"db","node":"node-7","status":"critical","message":"disk full"}"#);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("disk full"));

    Ok(())
}

#[test]
fn test_missing_service_fails() -> Result<()> {
    let config = console_config()?;

    let mut cmd = alertcast_bin()?;
    cmd.arg("--config")
        .arg(config.path())
        .args(["--node", "node-1", "--message", "down"]);

    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("--service is required"));

    Ok(())
}

#[test]
fn test_missing_config_file_fails() -> Result<()> {
    let mut cmd = alertcast_bin()?;
    cmd.args(["--config", "/tmp/this/file/does/not/exist.toml"])
        .args(["--service", "web", "--node", "node-1", "--message", "down"]);

    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("Config file not found"));

    Ok(())
}

#[test]
fn test_invalid_status_is_rejected_by_parser() -> Result<()> {
    let mut cmd = alertcast_bin()?;
    cmd.args(["--status", "exploding"]);
    cmd.assert().failure();
    Ok(())
}
