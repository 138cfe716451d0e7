//! SNMP-metrics decoder.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use serviceradar_common::{CoreError, DiscoverySource, MetricType, Result, TimeseriesMetric};

use crate::builder::DeviceUpdateBuilder;
use crate::decoders::{DecodeContext, DecodeOutput};
use crate::json_walk::fmt_value;
use crate::oid::parse_oid_config_name;

#[derive(Debug, Deserialize)]
struct OidStatus {
    last_value: Value,
    #[serde(default)]
    last_update: Option<String>,
    #[serde(default)]
    error_count: Option<i64>,
    #[serde(default)]
    last_error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TargetStatus {
    #[serde(default)]
    available: bool,
    #[serde(default)]
    host_ip: Option<String>,
    #[serde(default)]
    host_name: Option<String>,
    #[serde(default)]
    last_poll: Option<String>,
    #[serde(default)]
    oid_status: HashMap<String, OidStatus>,
}

type Payload = HashMap<String, TargetStatus>;

pub fn decode(ctx: &DecodeContext, message: &[u8]) -> Result<DecodeOutput> {
    let chunks: Vec<Payload> = serviceradar_common::chunked::decode_concatenated(message);
    if chunks.is_empty() {
        return Err(CoreError::decode("snmp", "payload did not decode as a target-status map"));
    }

    let mut targets: Payload = HashMap::new();
    for chunk in chunks {
        targets.extend(chunk);
    }

    let mut output = DecodeOutput::default();

    for (target_name, status) in targets {
        let ip = status.host_ip.clone().unwrap_or_else(|| target_name.clone());
        let hostname = status.host_name.clone().unwrap_or_else(|| target_name.clone());

        let device_update = DeviceUpdateBuilder::new(&ctx.partition, &ip, DiscoverySource::Snmp)
            .agent_id(ctx.agent_id.clone())
            .poller_id(ctx.poller_id.clone())
            .timestamp(ctx.timestamp)
            .available(status.available)
            .hostname(Some(hostname))
            .metadata("last_poll", status.last_poll.clone().unwrap_or_default())
            .build();
        let device_id = device_update.device_id.clone();
        output.device_updates.push(device_update);

        if !status.available {
            continue;
        }

        for (oid_name, oid) in &status.oid_status {
            let parsed = parse_oid_config_name(oid_name);
            let mut metadata = HashMap::new();
            metadata.insert("oid".to_string(), oid_name.clone());
            if let Some(last_update) = &oid.last_update {
                metadata.insert("last_update".to_string(), last_update.clone());
            }
            if let Some(error_count) = oid.error_count {
                metadata.insert("error_count".to_string(), error_count.to_string());
            }
            if let Some(last_error) = &oid.last_error {
                metadata.insert("last_error".to_string(), last_error.clone());
            }

            output.metrics.push(TimeseriesMetric {
                poller_id: ctx.poller_id.clone(),
                target_device_ip: ip.clone(),
                device_id: device_id.clone(),
                partition: ctx.partition.clone(),
                if_index: parsed.if_index,
                name: parsed.base,
                metric_type: MetricType::Snmp,
                value: fmt_value(&oid.last_value),
                timestamp: ctx.timestamp,
                metadata: serde_json::to_string(&metadata).unwrap_or_default(),
            });
        }
    }

    Ok(output)
}
