//! Daemon wiring against a file-sourced credential and ephemeral ports

use garm_api_server::{AthenzConfig, ServerError};
use garm_core::CONFIG_VERSION;
use garm_node::config::ServerSection;
use garm_node::{Config, Daemon};
use garm_token::TokenConfig;
use std::io::Write;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn config(ntoken_path: &str) -> Config {
    Config {
        version: CONFIG_VERSION.to_string(),
        server: ServerSection {
            port: 0,
            health_check_port: 0,
            shutdown_duration: "1s".to_string(),
            probe_wait_time: "10ms".to_string(),
            ..Default::default()
        },
        athenz: AthenzConfig {
            url: "https://policy.example.com/zts/v1".to_string(),
            ..Default::default()
        },
        token: TokenConfig {
            ntoken_path: ntoken_path.to_string(),
            refresh_duration: "1m".to_string(),
            expiration: "20m".to_string(),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[tokio::test]
async fn test_daemon_runs_until_cancelled() {
    let mut token = tempfile::NamedTempFile::new().unwrap();
    writeln!(token, "v=S1;d=garm;n=webhook;s=sig").unwrap();
    let path = token.path().display().to_string();

    let daemon = Daemon::new(&config(&path)).unwrap();
    let cancel = CancellationToken::new();
    let run = tokio::spawn(daemon.run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let errors = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], ServerError::Cancelled));
}

#[test]
fn test_daemon_rejects_bad_token_config() {
    let mut config = config("/tmp/garm-token");
    config.token.refresh_duration = "soon".to_string();

    let err = Daemon::new(&config).err().unwrap();
    assert!(format!("{:#}", err).contains("token service instantiate failed"));
}

#[test]
fn test_daemon_rejects_bad_policy_url() {
    let mut config = config("/tmp/garm-token");
    config.athenz.url = "not a url".to_string();

    assert!(Daemon::new(&config).is_err());
}
