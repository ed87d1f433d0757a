//! Tests for configuration files feeding the fabric

use std::time::Duration;

use crate::config::{BusConfig, Directories};
use crate::routing::RoutingTable;
use crate::{Message, Sink, SinkMode};
use tempfile::TempDir;

#[test]
fn test_config_file_in_directories() {
    let temp_dir = TempDir::new().unwrap();
    let dirs = Directories::with_base(temp_dir.path().join("switchboard"));
    dirs.ensure_exists().unwrap();

    let mut config = BusConfig::default();
    config.queue.capacity = Some(4);
    config.function.timeout_ms = 250;
    config.save(&dirs.config_file).unwrap();

    let loaded = BusConfig::load(&dirs.config_file).unwrap();
    assert_eq!(loaded.queue.capacity, Some(4));
    assert_eq!(loaded.function.timeout(), Duration::from_millis(250));
}

#[test]
fn test_unknown_fields_still_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"routing": {"tableCapacity": 8, "legacy": true}, "extra": 1}"#,
    )
    .unwrap();

    let config = BusConfig::load(&path).unwrap();
    assert_eq!(config.routing.table_capacity, 8);
}

#[test]
fn test_config_builds_bounded_sink() {
    let config: BusConfig =
        serde_json::from_str(r#"{"queue": {"capacity": 2}, "routing": {"tableCapacity": 2}}"#)
            .unwrap();

    let sink = Sink::with_mode(
        |_: &Message| true,
        config.queued_mode(),
        config.routing.table_capacity,
    );
    assert_eq!(sink.mode(), SinkMode::Queued { capacity: Some(2) });

    for id in ["a", "b", "c"] {
        sink.add_route(id);
    }
    assert!(!sink.has_id("a"));
    assert!(sink.has_id("c"));
    assert_eq!(RoutingTable::new(config.routing.table_capacity).capacity(), 2);
}
