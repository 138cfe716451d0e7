//! Rperf throughput-test decoder.

use serde::{Deserialize, Serialize};
use serviceradar_common::{service_device_id, CoreError, MetricType, Result, TimeseriesMetric};

use crate::decoders::{DecodeContext, DecodeOutput};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RperfMetric {
    #[serde(default)]
    pub bits_per_second: f64,
    #[serde(default)]
    pub jitter_ms: f64,
    #[serde(default)]
    pub loss_percent: f64,
    #[serde(default)]
    pub response_time_ns: i64,
    #[serde(default)]
    pub bytes_received: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RperfResult {
    pub target: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub status: RperfMetric,
}

impl Default for RperfMetric {
    fn default() -> Self {
        Self {
            bits_per_second: 0.0,
            jitter_ms: 0.0,
            loss_percent: 0.0,
            response_time_ns: 0,
            bytes_received: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RperfStatus {
    #[serde(default)]
    pub results: Vec<RperfResult>,
    #[serde(default)]
    pub timestamp: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RperfPayload {
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub response_time: Option<i64>,
    pub status: RperfStatus,
}

pub fn decode(ctx: &DecodeContext, message: &[u8]) -> Result<DecodeOutput> {
    let payload: RperfPayload = serde_json::from_slice(message)
        .map_err(|e| CoreError::decode("rperf", e.to_string()))?;

    let device_id = service_device_id("agent", &ctx.agent_id);
    let mut output = DecodeOutput::default();

    for result in &payload.status.results {
        if !result.success {
            continue;
        }

        let metadata = serde_json::to_string(&result.status).unwrap_or_default();
        let bandwidth_mbps = result.status.bits_per_second / 1_000_000.0;

        let metrics = [
            (
                format!("rperf_{}_bandwidth_mbps", result.target),
                format!("{bandwidth_mbps:.2}"),
            ),
            (
                format!("rperf_{}_jitter_ms", result.target),
                format!("{:.2}", result.status.jitter_ms),
            ),
            (
                format!("rperf_{}_loss_percent", result.target),
                format!("{:.1}", result.status.loss_percent),
            ),
            (
                format!("rperf_{}_response_time_ns", result.target),
                result.status.response_time_ns.to_string(),
            ),
        ];

        for (name, value) in metrics {
            output.metrics.push(TimeseriesMetric {
                poller_id: ctx.poller_id.clone(),
                target_device_ip: result.target.clone(),
                device_id: device_id.clone(),
                partition: ctx.partition.clone(),
                if_index: 0,
                name,
                metric_type: MetricType::Rperf,
                value,
                timestamp: ctx.timestamp,
                metadata: metadata.clone(),
            });
        }
    }

    Ok(output)
}
