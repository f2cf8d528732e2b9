use futures_util::StreamExt;
use hotseq::seq::from_iter;
use hotseq::stream_configuration::DEFAULT_QUEUE_CAPACITY;
use hotseq::{HotStreamConfig, QueueConfig, RunState, SeqExt, StreamError};
use serde_json::json;
use std::time::Duration;

#[test]
fn test_default_config() {
    let config = HotStreamConfig::default();
    assert_eq!(config.name, "hot-stream");
    assert_eq!(
        config.queue,
        QueueConfig::Bounded {
            capacity: DEFAULT_QUEUE_CAPACITY
        }
    );
    assert!(config.validate().is_ok());
}

#[test]
fn test_builder() {
    let config = HotStreamConfig::new().name("sensors").unbounded();
    assert_eq!(config.name, "sensors");
    assert_eq!(config.queue, QueueConfig::Unbounded);

    let config = config.bounded(32);
    assert_eq!(config.queue, QueueConfig::Bounded { capacity: 32 });
}

#[test]
fn test_validation() {
    let err = HotStreamConfig::new().bounded(0).validate().unwrap_err();
    assert_eq!(
        err,
        StreamError::InvalidConfiguration("queue: capacity must be greater than 0".to_string())
    );

    assert!(HotStreamConfig::new().name("").validate().is_err());
    assert!(QueueConfig::Unbounded.validate().is_ok());
}

#[test]
fn test_config_json_round_trip() {
    let config = HotStreamConfig::new().name("ingest").bounded(64);
    let value = serde_json::to_value(&config).unwrap();
    assert_eq!(
        value,
        json!({ "name": "ingest", "queue": { "kind": "bounded", "capacity": 64 } })
    );

    let parsed: HotStreamConfig = serde_json::from_value(value).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_partial_config_uses_defaults() {
    let parsed: HotStreamConfig = serde_json::from_str(r#"{ "queue": { "kind": "unbounded" } }"#).unwrap();
    assert_eq!(parsed.name, "hot-stream");
    assert_eq!(parsed.queue, QueueConfig::Unbounded);

    let parsed: HotStreamConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(parsed, HotStreamConfig::default());
}

#[test]
fn test_run_state_serialization() {
    assert_eq!(serde_json::to_value(RunState::Paused).unwrap(), json!("paused"));
    let state: RunState = serde_json::from_str(r#""stopped""#).unwrap();
    assert_eq!(state, RunState::Stopped);
    assert_eq!(RunState::Running.to_string(), "running");
}

#[tokio::test]
async fn test_metrics_snapshot_serializes() {
    let hot = from_iter(0..5).hot_stream().unwrap();
    assert_eq!(hot.connect().count().await, 5);
    hot.join().await.unwrap();

    let metrics = hot.metrics();
    assert_eq!(metrics.items_pulled, 5);
    assert_eq!(metrics.items_enqueued, 5);
    assert_eq!(metrics.pauses, 0);
    assert_eq!(metrics.run_state, RunState::Stopped);
    assert!(metrics.throughput_items_per_sec() >= 0.0);

    assert_eq!(metrics.id, hot.id());

    let value = serde_json::to_value(&metrics).unwrap();
    assert_eq!(value["id"], json!(hot.id().to_string()));
    assert_eq!(value["items_enqueued"], json!(5));
    assert_eq!(value["run_state"], json!("stopped"));
    assert_eq!(value["queue"]["is_closed"], json!(true));
    assert_eq!(value["queue"]["length"], json!(0));
}

#[tokio::test(start_paused = true)]
async fn test_metrics_follow_the_runtime_clock() {
    let hot = from_iter(0..10).hot_stream().unwrap();
    hot.join().await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    let metrics = hot.metrics();
    assert!(metrics.elapsed >= Duration::from_secs(2));
    assert!(metrics.throughput_items_per_sec() <= 5.0);
}
