//! ICMP decoder.

use std::collections::HashMap;

use serde::Deserialize;
use serviceradar_common::{service_device_id, CoreError, DeviceUpdate, MetricType, Result, TimeseriesMetric};

use crate::decoders::{DecodeContext, DecodeOutput};

#[derive(Debug, Deserialize)]
struct IcmpPayload {
    host: String,
    response_time: i64,
    #[serde(default)]
    packet_loss: f64,
    available: bool,
    #[serde(default)]
    device_id: Option<String>,
}

/// Decode one ICMP probe result.
///
/// An empty `agent_id` leaves no anchor device to attribute the metric to,
/// so the record is dropped entirely — no metric, no device update.
pub fn decode(ctx: &DecodeContext, message: &[u8]) -> Result<DecodeOutput> {
    if ctx.agent_id.is_empty() {
        return Ok(DecodeOutput::default());
    }

    let payload: IcmpPayload = serde_json::from_slice(message)
        .map_err(|e| CoreError::decode("icmp", e.to_string()))?;

    let device_id = service_device_id("agent", &ctx.agent_id);
    let target_device_id = payload
        .device_id
        .clone()
        .unwrap_or_else(|| DeviceUpdate::provisional_id(&ctx.partition, &payload.host));

    let mut metadata = HashMap::new();
    metadata.insert("target_host".to_string(), payload.host.clone());
    metadata.insert("target_device_id".to_string(), target_device_id);
    metadata.insert("packet_loss".to_string(), payload.packet_loss.to_string());
    metadata.insert("available".to_string(), payload.available.to_string());

    let response_time_ms = payload.response_time as f64 / 1_000_000.0;

    let mut output = DecodeOutput::default();
    output.metrics.push(TimeseriesMetric {
        poller_id: ctx.poller_id.clone(),
        target_device_ip: payload.host,
        device_id,
        partition: ctx.partition.clone(),
        if_index: 0,
        name: format!("icmp_{}_response_time_ms", ctx.service_name),
        metric_type: MetricType::Icmp,
        value: format!("{response_time_ms:.3}"),
        timestamp: ctx.timestamp,
        metadata: serde_json::to_string(&metadata).unwrap_or_default(),
    });
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(agent_id: &str) -> DecodeContext {
        DecodeContext {
            poller_id: "k8s-poller".to_string(),
            agent_id: agent_id.to_string(),
            partition: "default".to_string(),
            source_ip: "10.0.0.10".to_string(),
            timestamp: 1_700_000_000_000,
            service_name: "ping".to_string(),
        }
    }

    const PAYLOAD: &[u8] =
        br#"{"host":"8.8.8.8","response_time":10000000,"packet_loss":0,"available":true}"#;

    #[test]
    fn empty_agent_id_drops_the_record() {
        let output = decode(&ctx(""), PAYLOAD).unwrap();
        assert!(output.metrics.is_empty());
        assert!(output.device_updates.is_empty());
    }

    #[test]
    fn attributes_metric_to_the_agent_service_device() {
        let output = decode(&ctx("k8s-agent"), PAYLOAD).unwrap();
        assert_eq!(output.metrics.len(), 1);
        assert_eq!(output.metrics[0].device_id, "serviceradar:agent:k8s-agent");
        assert_eq!(output.metrics[0].target_device_ip, "8.8.8.8");
        assert_eq!(output.metrics[0].name, "icmp_ping_response_time_ms");
        assert_eq!(output.metrics[0].value, "10.000");
        assert!(output.device_updates.is_empty());
    }
}
