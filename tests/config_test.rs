//! Configuration parsing tests

use std::path::PathBuf;
use std::time::Duration;

use stakewatch::config::Config;

#[test]
fn empty_file_yields_defaults() {
    let config: Config = toml::from_str("").unwrap();

    assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/stakewatch"));
    assert!(config.monitor.enabled);
    assert_eq!(config.monitor.poll_interval_secs, 30);
    assert_eq!(config.monitor.inter_group_delay_ms, 1000);
    assert_eq!(config.monitor.bootstrap_window_hours, 24);
    assert_eq!(config.feed.base_url, "https://api.neynar.com/v2");
    assert_eq!(config.feed.api_key, "");
    assert_eq!(config.feed.page_limit, 25);
    assert_eq!(config.feed.request_timeout_secs, 10);
    assert_eq!(config.api.http_port, 8080);
}

#[test]
fn partial_section_keeps_remaining_defaults() {
    let config: Config = toml::from_str(
        r#"
        [monitor]
        poll_interval_secs = 120
        "#,
    )
    .unwrap();

    assert_eq!(config.monitor.poll_interval_secs, 120);
    assert!(config.monitor.enabled);
    assert_eq!(config.monitor.inter_group_delay_ms, 1000);
    assert_eq!(config.api.http_port, 8080);
}

#[test]
fn full_file_overrides_everything() {
    let config: Config = toml::from_str(
        r#"
        [storage]
        data_dir = "/tmp/stakewatch-test"

        [monitor]
        enabled = false
        poll_interval_secs = 5
        inter_group_delay_ms = 50
        bootstrap_window_hours = 1

        [feed]
        base_url = "http://127.0.0.1:9999/v2"
        api_key = "test-key"
        page_limit = 5
        request_timeout_secs = 2

        [api]
        http_port = 3000
        "#,
    )
    .unwrap();

    assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/stakewatch-test"));
    assert!(!config.monitor.enabled);
    assert_eq!(config.monitor.poll_interval_secs, 5);
    assert_eq!(config.monitor.bootstrap_window_hours, 1);
    assert_eq!(config.feed.base_url, "http://127.0.0.1:9999/v2");
    assert_eq!(config.feed.api_key, "test-key");
    assert_eq!(config.feed.page_limit, 5);
    assert_eq!(config.feed.request_timeout_secs, 2);
    assert_eq!(config.api.http_port, 3000);
}

#[test]
fn zero_poll_interval_is_clamped_to_one_second() {
    let config: Config = toml::from_str(
        r#"
        [monitor]
        poll_interval_secs = 0
        "#,
    )
    .unwrap();

    assert_eq!(config.monitor.poll_interval(), Duration::from_secs(1));

    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config.monitor.poll_interval(), Duration::from_secs(30));
}

#[test]
fn unknown_keys_are_tolerated() {
    // Forward compatibility: a newer config file must still load
    let config: Config = toml::from_str(
        r#"
        [monitor]
        poll_interval_secs = 15
        future_knob = "whatever"
        "#,
    )
    .unwrap();
    assert_eq!(config.monitor.poll_interval_secs, 15);
}
