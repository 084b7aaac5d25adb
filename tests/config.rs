// tests/config.rs

use peerlink::config::{Config, DialSettings, RetryPolicy};
use peerlink::constants::{DEFAULT_CHAIN_ID, DEFAULT_DIAL_TIMEOUT, DEFAULT_MAX_MESSAGE_BYTES};
use std::time::Duration;

#[test]
fn full_config_resolves_dial_settings() {
    let cfg = Config::from_toml(
        r#"
        port = 9090

        [node]
        public_key = "abc123"
        chain_id = 42

        [dial]
        timeout_ms = 1500
        max_send_message_bytes = 4096
        max_receive_message_bytes = 8192

        [dial.retry]
        max_retries = 4
        backoff_ms = 250

        [logging]
        json_path = "logs/test.jsonl"
        disable_console = true
        "#,
    )
    .unwrap();

    assert_eq!(cfg.port, 9090);
    let node = cfg.node.as_ref().unwrap();
    assert_eq!(node.public_key.as_deref(), Some("abc123"));
    assert_eq!(node.chain_id(), 42);

    let settings = DialSettings::from_config(&cfg);
    assert_eq!(settings.dial_timeout, Duration::from_millis(1500));
    assert_eq!(settings.handshake_timeout(), Duration::from_millis(3000));
    assert_eq!(settings.ping_timeout(), Duration::from_millis(1500));
    assert_eq!(settings.max_send_message_bytes, 4096);
    assert_eq!(settings.max_receive_message_bytes, 8192);
    assert_eq!(
        settings.retry,
        RetryPolicy {
            max_retries: 4,
            backoff: Duration::from_millis(250)
        }
    );
    assert_eq!(cfg.logging.unwrap().disable_console, Some(true));
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let cfg = Config::from_toml("port = 7000").unwrap();

    assert!(cfg.dial.is_none());
    let settings = DialSettings::from_config(&cfg);
    assert_eq!(settings, DialSettings::default());
    assert_eq!(settings.dial_timeout, DEFAULT_DIAL_TIMEOUT);
    assert_eq!(settings.max_receive_message_bytes, DEFAULT_MAX_MESSAGE_BYTES);
    assert_eq!(settings.retry.max_retries, 2);
    assert_eq!(settings.retry.backoff, Duration::from_millis(100));
}

#[test]
fn partial_dial_section_keeps_other_defaults() {
    let cfg = Config::from_toml(
        r#"
        port = 7000
        [node]
        [dial]
        timeout_ms = 800
        "#,
    )
    .unwrap();

    let settings = DialSettings::from_config(&cfg);
    assert_eq!(settings.dial_timeout, Duration::from_millis(800));
    assert_eq!(settings.retry, RetryPolicy::default());
    assert_eq!(cfg.node.unwrap().chain_id(), DEFAULT_CHAIN_ID);
}

#[test]
fn load_reads_file_and_reports_bad_toml() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.toml");
    std::fs::write(&good, "port = 6801\n[dial.retry]\nmax_retries = 0\n").unwrap();
    let cfg = Config::load(&good).unwrap();
    assert_eq!(DialSettings::from_config(&cfg).retry.max_retries, 0);

    let bad = dir.path().join("bad.toml");
    std::fs::write(&bad, "port = \"not a number\"").unwrap();
    let err = Config::load(&bad).unwrap_err();
    assert!(format!("{:#}", err).contains("bad.toml"));
}
