//! Integration tests for serviceradar-common.

use serviceradar_common::{chunked::decode_concatenated, CoreConfig, DeviceUpdate, DiscoverySource};
use std::collections::HashMap;

#[test]
fn config_roundtrip_from_json5() {
    let json5 = r#"
    {
        logging: { level: "warn" },
        liveness: { alert_threshold: 600, alert_cooldown: 120 },
        emitter: { flush_interval: 10 },
        known_pollers: ["poller-a", "poller-b"],
    }
    "#;

    let config = CoreConfig::parse(json5).expect("config should parse");
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.known_pollers.len(), 2);
    config.validate().expect("defaults plus overrides stay valid");
}

#[test]
fn device_update_invariants_hold_for_a_fresh_record() {
    let update = DeviceUpdate {
        device_id: DeviceUpdate::provisional_id("default", "192.168.1.1"),
        ip: "192.168.1.1".to_string(),
        mac: None,
        hostname: None,
        partition: "default".to_string(),
        source: DiscoverySource::Sweep,
        agent_id: String::new(),
        poller_id: "poller-a".to_string(),
        timestamp: 1_700_000_000_000,
        is_available: true,
        metadata: HashMap::new(),
        confidence: DiscoverySource::Sweep.confidence(),
    };

    // partition non-empty, device_id matches "<partition>:<ip>", timestamp non-zero.
    assert!(!update.partition.is_empty());
    assert!(update.device_id.contains(':'));
    assert_ne!(update.timestamp, 0);
    assert!(!update.is_service_component());
}

#[test]
fn decode_concatenated_handles_whitespace_between_chunks() {
    #[derive(Debug, serde::Deserialize)]
    struct Chunk {
        n: i32,
    }

    let bytes = b"{\"n\":1}  \n {\"n\":2}";
    let decoded: Vec<Chunk> = decode_concatenated(bytes);
    assert_eq!(decoded.iter().map(|c| c.n).collect::<Vec<_>>(), vec![1, 2]);
}
