//! Sysmon decoder.
//!
//! Host-level system metrics (CPU, disk, memory, process table). The
//! reporting host is registered as a device (`source=self_reported`); the
//! actual buffering and stall detection live behind [`SysmonStallTracker`]
//! since they require state across calls, which the dispatcher owns.

use serde::{Deserialize, Serialize};
use serviceradar_common::{CoreError, DiscoverySource, Result, SysmonStatus};

use crate::builder::DeviceUpdateBuilder;
use crate::decoders::{DecodeContext, DecodeOutput};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SysmonPayload {
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub response_time: Option<i64>,
    pub status: SysmonStatus,
}

/// Decoded sysmon payload plus the host device update and stall signal,
/// ready for the dispatcher's buffer/stall-tracker to consume.
pub struct SysmonDecoded {
    pub output: DecodeOutput,
    pub host_id: String,
    pub stalled: bool,
    /// The raw system snapshot, forwarded to the sysmon buffer untouched.
    pub status: SysmonStatus,
}

pub fn decode(ctx: &DecodeContext, message: &[u8]) -> Result<SysmonDecoded> {
    let chunks: Vec<SysmonPayload> = serviceradar_common::chunked::decode_concatenated(message);
    let payload = chunks
        .into_iter()
        .last()
        .ok_or_else(|| CoreError::decode("sysmon", "payload did not decode"))?;

    let ip = if payload.status.host_ip.is_empty() {
        ctx.source_ip.clone()
    } else {
        payload.status.host_ip.clone()
    };

    let update = DeviceUpdateBuilder::new(&ctx.partition, &ip, DiscoverySource::SelfReported)
        .agent_id(ctx.agent_id.clone())
        .poller_id(ctx.poller_id.clone())
        .timestamp(ctx.timestamp)
        .available(payload.available)
        .hostname(if payload.status.host_id.is_empty() {
            None
        } else {
            Some(payload.status.host_id.clone())
        })
        .metadata("sysmon_response_time_ns", payload.response_time.unwrap_or(0).to_string())
        .build();

    let mut output = DecodeOutput::default();
    let stalled = payload.status.is_empty_of_capability_data();
    output.device_updates.push(update);

    Ok(SysmonDecoded {
        output,
        host_id: payload.status.host_id.clone(),
        stalled,
        status: payload.status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> DecodeContext {
        DecodeContext {
            poller_id: "poller1".to_string(),
            agent_id: "agent1".to_string(),
            partition: "default".to_string(),
            source_ip: "10.0.0.10".to_string(),
            timestamp: 1_700_000_000_000,
            service_name: "sysmon".to_string(),
        }
    }

    #[test]
    fn decodes_and_registers_host_device() {
        let payload = br#"{
            "available": true,
            "response_time": 500000,
            "status": {
                "timestamp": 1700000000,
                "host_id": "web01",
                "host_ip": "10.0.0.5",
                "cpus": [{"core": 0, "usage": 12.5}],
                "disks": [],
                "memory": {"total": 1024, "used": 512},
                "processes": []
            }
        }"#;

        let decoded = decode(&ctx(), payload).unwrap();
        assert_eq!(decoded.output.device_updates.len(), 1);
        assert_eq!(decoded.output.device_updates[0].ip, "10.0.0.5");
        assert!(!decoded.stalled);
        assert_eq!(decoded.status.cpus.len(), 1);
        assert!(decoded.status.memory.is_some());
    }

    #[test]
    fn empty_capability_data_signals_stall() {
        let payload = br#"{
            "available": true,
            "status": {"host_id": "web01", "host_ip": "10.0.0.5"}
        }"#;

        let decoded = decode(&ctx(), payload).unwrap();
        assert!(decoded.stalled);
    }

    #[test]
    fn missing_host_ip_falls_back_to_report_source_ip() {
        let payload = br#"{"available": true, "status": {"host_id": "web01"}}"#;
        let decoded = decode(&ctx(), payload).unwrap();
        assert_eq!(decoded.output.device_updates[0].ip, "10.0.0.10");
    }
}
