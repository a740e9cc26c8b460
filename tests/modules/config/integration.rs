//! 配置模块集成测试
//!
//! 从配置文件构造限流器

use std::time::Duration;
use ticketbucket::{Context, Limiter, LimiterConfig, LimiterError};

#[tokio::test]
async fn test_limiter_from_yaml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("limiter.yml");
    std::fs::write(
        &path,
        r#"
rate: 5
burst_max: 20
interval: 250
tick: 10
initial_tickets: 2
"#,
    )
    .unwrap();

    let config = LimiterConfig::from_file(&path).unwrap();
    let limiter = Limiter::with_config(&Context::new(), config).unwrap();

    assert_eq!(limiter.rate(), 5.0);
    assert_eq!(limiter.burst_max(), 20.0);
    assert_eq!(limiter.interval(), Duration::from_millis(250));
    assert_eq!(limiter.max_accumulation_interval(), Duration::from_millis(250));
    assert_eq!(limiter.tick(), Duration::from_millis(10));
    assert_eq!(limiter.tickets(), 2.0);

    limiter.shutdown().await;
}

#[tokio::test]
async fn test_limiter_from_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("limiter.json");
    std::fs::write(&path, r#"{"rate": 3.5, "refund_on_cancel": true}"#).unwrap();

    let limiter =
        Limiter::with_config(&Context::new(), LimiterConfig::from_file(&path).unwrap()).unwrap();
    assert_eq!(limiter.rate(), 3.5);
    assert!(limiter.refund_on_cancel());
    assert_eq!(limiter.tickets(), 3.5);

    limiter.shutdown().await;
}

#[test]
fn test_invalid_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("limiter.toml");
    std::fs::write(&path, "rate = \"fast\"\n").unwrap();

    let err = LimiterConfig::from_file(&path).unwrap_err();
    assert!(matches!(err, LimiterError::TomlError(_)));
}

#[test]
fn test_config_round_trips_through_yaml() {
    let config = LimiterConfig::new(8.0)
        .with_burst_max(16.0)
        .with_max_accumulation_interval(Duration::from_secs(3))
        .with_refund_on_cancel(true);

    let yaml = serde_yaml::to_string(&config).unwrap();
    let parsed = LimiterConfig::from_yaml_str(&yaml).unwrap();
    assert_eq!(parsed, config);
}
