//! The service-device registrar: maps pollers/agents/checkers
//! and core services onto `serviceradar:<kind>:<id>` device entries, and
//! registers the host device that runs a poller/agent.

use serviceradar_common::{
    service_device_id, CoreError, DeviceUpdate, DiscoverySource, PollerStatusRequest, Result,
    CORE_SERVICE_KINDS,
};
use serviceradar_decode::builder::{should_skip_ephemeral_collector, stamp_last_update, DeviceUpdateBuilder};
use serviceradar_decode::ServiceDeviceCandidate;

/// Register the host device that runs the reporting poller/agent.
/// `partition` and `source_ip` are required; an empty value fails loudly
///.
pub fn register_host_device(partition: &str, source_ip: &str, has_agent: bool, timestamp: i64) -> Result<DeviceUpdate> {
    if partition.is_empty() || source_ip.is_empty() {
        return Err(CoreError::Registry(
            "host device registration requires non-empty partition and source_ip".to_string(),
        ));
    }

    let service_types = if has_agent { "poller,agent" } else { "poller" };
    let mut update = DeviceUpdateBuilder::new(partition, source_ip, DiscoverySource::SelfReported)
        .timestamp(timestamp)
        .metadata("service_types", service_types)
        .metadata("primary_service", "poller")
        .build();
    stamp_last_update(&mut update);
    Ok(update)
}

/// Register one `serviceradar:<kind>:<service_id>` device per core-service
/// entry in the report (`datasvc|kv|sync|mapper|otel|zen|core`), even when
/// the source IP is in a Docker bridge range — core services legitimately
/// run in containers.
pub fn register_core_service_devices(report: &PollerStatusRequest) -> Vec<DeviceUpdate> {
    report
        .services
        .iter()
        .filter(|s| CORE_SERVICE_KINDS.contains(&s.service_type.as_str()))
        .map(|s| {
            let device_id = service_device_id(&s.service_type, &s.service_name);
            let mut update = DeviceUpdateBuilder::new(&report.partition, &report.source_ip, DiscoverySource::SelfReported)
                .timestamp(report.timestamp)
                .available(s.available)
                .metadata("service_types", &s.service_type)
                .metadata("primary_service", &s.service_name)
                .build();
            update.device_id = device_id;
            stamp_last_update(&mut update);
            update
        })
        .collect()
}

/// Build a service-device registration from a gRPC-discovered host
/// candidate, applying the ephemeral-collector skip rule.
/// Returns `None` when the candidate is filtered out.
pub fn register_service_device_candidate(
    candidate: &ServiceDeviceCandidate,
    partition: &str,
    timestamp: i64,
) -> Option<DeviceUpdate> {
    let hostname = candidate.hostname.as_deref().unwrap_or("");
    if should_skip_ephemeral_collector(&candidate.host_ip, hostname) {
        return None;
    }

    let mut update = DeviceUpdateBuilder::new(partition, &candidate.host_ip, DiscoverySource::SelfReported)
        .timestamp(timestamp)
        .hostname(candidate.hostname.clone())
        .build();
    stamp_last_update(&mut update);
    Some(update)
}
