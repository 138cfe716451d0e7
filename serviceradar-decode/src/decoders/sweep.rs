//! Sweep decoder.
//!
//! Network-sweep summaries carry a batch of per-host ping/port results.
//! Before emission each host is checked against the canonical-hydration
//! seam: a host with an existing strong identity in the datastore
//! has its provisional device ID overridden with the canonical one and
//! selected metadata copied across.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serviceradar_common::hydrate::CanonicalHydrator;
use serviceradar_common::{CoreError, DiscoverySource, Result};

use crate::builder::DeviceUpdateBuilder;
use crate::decoders::{DecodeContext, DecodeOutput};

/// Keys copied from a hydrated alias onto the update's metadata when the
/// update doesn't already carry them.
const HYDRATED_METADATA_KEYS: &[&str] = &[
    "armis_device_id",
    "integration_id",
    "integration_type",
    "netbox_device_id",
    "canonical_partition",
    "canonical_metadata_hash",
    "canonical_hostname",
];

const MAX_PORT_RESULTS: usize = 512;
const MAX_OPEN_PORTS: usize = 256;
const ONE_DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IcmpStatus {
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub response_time: Option<i64>,
    #[serde(default)]
    pub packet_loss: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortResult {
    pub port: u16,
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub service: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostResult {
    pub host: String,
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub response_time: Option<i64>,
    #[serde(default)]
    pub icmp_status: Option<IcmpStatus>,
    #[serde(default)]
    pub port_results: Option<Vec<PortResult>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SweepSummary {
    pub network: String,
    #[serde(default)]
    pub total_hosts: i64,
    #[serde(default)]
    pub available_hosts: i64,
    #[serde(default)]
    pub last_sweep: i64,
    #[serde(default)]
    pub hosts: Vec<HostResult>,
}

/// Clamp `last_sweep` to `now` when it lies more than 24h in the future.
fn validate_last_sweep(summary: &mut SweepSummary, now: i64) {
    if summary.last_sweep > now + ONE_DAY_MILLIS {
        summary.last_sweep = now;
    }
}

fn port_metadata(ports: &[PortResult]) -> HashMap<String, String> {
    let mut metadata = HashMap::new();

    let truncated_detail = ports.len() > MAX_PORT_RESULTS;
    let detail_slice = &ports[..ports.len().min(MAX_PORT_RESULTS)];
    if let Ok(encoded) = serde_json::to_string(detail_slice) {
        metadata.insert("port_results".to_string(), encoded);
    }
    metadata.insert(
        "port_results_truncated".to_string(),
        truncated_detail.to_string(),
    );

    let open: Vec<u16> = ports.iter().filter(|p| p.available).map(|p| p.port).collect();
    let truncated_open = open.len() > MAX_OPEN_PORTS;
    let open_slice = &open[..open.len().min(MAX_OPEN_PORTS)];
    if let Ok(encoded) = serde_json::to_string(open_slice) {
        metadata.insert("open_ports".to_string(), encoded);
    }
    metadata.insert("open_ports_truncated".to_string(), truncated_open.to_string());

    metadata
}

pub async fn decode<H: CanonicalHydrator>(
    ctx: &DecodeContext,
    message: &[u8],
    hydrator: &H,
) -> Result<DecodeOutput> {
    let chunks: Vec<SweepSummary> = serviceradar_common::chunked::decode_concatenated(message);
    if chunks.is_empty() {
        return Err(CoreError::decode("sweep", "payload did not decode as a sweep summary"));
    }

    let (mut summary, hosts) =
        serviceradar_common::chunked::merge_object_chunks(chunks, |s| std::mem::take(&mut s.hosts))
            .expect("non-empty chunk list");
    summary.hosts = hosts;
    validate_last_sweep(&mut summary, ctx.timestamp);

    let live_hosts: Vec<&HostResult> = summary.hosts.iter().filter(|h| !h.host.is_empty()).collect();
    let ips: Vec<String> = live_hosts.iter().map(|h| h.host.clone()).collect();
    let aliases = hydrator.hydrate_batch(&ips).await;

    let mut output = DecodeOutput::default();
    output.sweep_summary = Some(summary);

    for host in live_hosts {
        let mut builder = DeviceUpdateBuilder::new(&ctx.partition, &host.host, DiscoverySource::Sweep)
            .agent_id(ctx.agent_id.clone())
            .poller_id(ctx.poller_id.clone())
            .timestamp(ctx.timestamp)
            .available(host.available);

        if let Some(icmp) = &host.icmp_status {
            builder = builder
                .metadata("icmp_available", icmp.available.to_string())
                .metadata(
                    "icmp_response_time_ms",
                    icmp.response_time
                        .map(|rt| (rt as f64 / 1_000_000.0).to_string())
                        .unwrap_or_default(),
                )
                .metadata(
                    "icmp_packet_loss",
                    icmp.packet_loss.map(|l| l.to_string()).unwrap_or_default(),
                );
        }

        if let Some(ports) = &host.port_results {
            for (key, value) in port_metadata(ports) {
                builder = builder.metadata(key, value);
            }
        }

        let mut update = builder.build();

        if let Some(alias) = aliases.get(&host.host) {
            let has_strong_identity = alias.mac.as_deref().is_some_and(|m| !m.is_empty())
                || HYDRATED_METADATA_KEYS[..4]
                    .iter()
                    .any(|k| alias.metadata.get(*k).is_some_and(|v| !v.is_empty()));

            if has_strong_identity {
                update.device_id = alias.device_id.clone();
                update
                    .metadata
                    .insert("canonical_device_id".to_string(), alias.device_id.clone());
                if update.mac.is_none() {
                    update.mac = alias.mac.clone();
                }
                if let Some(mac) = alias.mac.as_deref().filter(|m| !m.is_empty()) {
                    update.metadata.entry("mac".to_string()).or_insert_with(|| mac.to_string());
                }
                for key in HYDRATED_METADATA_KEYS {
                    if !update.metadata.contains_key(*key) {
                        if let Some(value) = alias.metadata.get(*key) {
                            update.metadata.insert((*key).to_string(), value.clone());
                        }
                    }
                }
            }
        }

        output.device_updates.push(update);
    }

    Ok(output)
}
