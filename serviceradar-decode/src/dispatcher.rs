//! Payload dispatcher.
//!
//! Unwraps the optional enhanced-context envelope, routes one
//! [`ServiceStatus`] to the matching decoder, and surfaces a service-device
//! registration candidate for every gRPC-typed, non-`"results"` service
//! whose payload resolves to a host IP.

use serviceradar_common::hydrate::CanonicalHydrator;
use serviceradar_common::{CoreError, ServiceMetricsPayload, ServiceStatus, SysmonStatus};

use crate::decoders::{icmp, rperf, snmp, snmp_discovery, sweep, sync_discovery, sysmon};
use crate::decoders::{DecodeContext, DecodeOutput};
use crate::json_walk::{find_host_ip, find_hostname};

/// Report-level context available before envelope unwrapping.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub poller_id: String,
    pub partition: String,
    pub source_ip: String,
    pub timestamp: i64,
}

/// A host discovered inside a gRPC payload, to be registered as a
/// service-device by the ingest core.
#[derive(Debug, Clone)]
pub struct ServiceDeviceCandidate {
    pub host_ip: String,
    pub hostname: Option<String>,
}

/// A stall signal raised by the sysmon decoder, forwarded to the stats
/// aggregator's per-host stall tracker (owned by `serviceradar-emit`).
#[derive(Debug, Clone)]
pub struct SysmonSignal {
    pub host_id: String,
    pub empty_capability_data: bool,
    pub status: SysmonStatus,
}

/// Everything one `dispatch` call can produce.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub output: DecodeOutput,
    pub service_device_candidate: Option<ServiceDeviceCandidate>,
    pub sysmon_signal: Option<SysmonSignal>,
    /// Decode errors, logged by the caller but never fatal to the report.
    pub errors: Vec<CoreError>,
}

/// Dispatch one service payload to its decoder. Requires a
/// [`CanonicalHydrator`] for the sweep decoder's canonical-hydration seam.
pub async fn dispatch<H: CanonicalHydrator>(
    report: &ReportContext,
    status: &ServiceStatus,
    hydrator: &H,
) -> DispatchOutcome {
    let envelope = ServiceMetricsPayload::try_detect(&status.message);
    let (ctx, message): (DecodeContext, Vec<u8>) = match &envelope {
        Some(env) => (
            DecodeContext {
                poller_id: env.poller_id.clone(),
                agent_id: env.agent_id.clone(),
                partition: if env.partition.is_empty() {
                    report.partition.clone()
                } else {
                    env.partition.clone()
                },
                source_ip: report.source_ip.clone(),
                timestamp: report.timestamp,
                service_name: status.service_name.clone(),
            },
            env.data.clone(),
        ),
        None => (
            DecodeContext {
                poller_id: report.poller_id.clone(),
                agent_id: status.agent_id.clone(),
                partition: report.partition.clone(),
                source_ip: report.source_ip.clone(),
                timestamp: report.timestamp,
                service_name: status.service_name.clone(),
            },
            status.message.clone(),
        ),
    };

    let mut outcome = DispatchOutcome::default();
    let is_grpc = status.service_type == "grpc";

    match status.service_type.as_str() {
        "snmp" => match snmp::decode(&ctx, &message) {
            Ok(o) => outcome.output = o,
            Err(e) => {
                tracing::warn!(service = %status.service_name, error = %e, "snmp decode failed");
                outcome.errors.push(e);
            }
        },
        "icmp" => match icmp::decode(&ctx, &message) {
            Ok(o) => outcome.output = o,
            Err(e) => {
                tracing::warn!(service = %status.service_name, error = %e, "icmp decode failed");
                outcome.errors.push(e);
            }
        },
        "sweep" => match sweep::decode(&ctx, &message, hydrator).await {
            Ok(o) => outcome.output = o,
            Err(e) => {
                tracing::warn!(service = %status.service_name, error = %e, "sweep decode failed");
                outcome.errors.push(e);
            }
        },
        "snmp-discovery-results" | "mapper-discovery" => match snmp_discovery::decode(&ctx, &message) {
            Ok(o) => outcome.output = o,
            Err(e) => {
                tracing::warn!(service = %status.service_name, error = %e, "snmp-discovery decode failed");
                outcome.errors.push(e);
            }
        },
        "sync-discovery-results" => match sync_discovery::decode(&message) {
            Ok(o) => outcome.output = o,
            Err(e) => {
                tracing::warn!(service = %status.service_name, error = %e, "sync-discovery decode failed");
                outcome.errors.push(e);
            }
        },
        "grpc" => match status.service_name.as_str() {
            "rperf-checker" => match rperf::decode(&ctx, &message) {
                Ok(o) => outcome.output = o,
                Err(e) => {
                    tracing::warn!(error = %e, "rperf decode failed");
                    outcome.errors.push(e);
                }
            },
            "sysmon" => match sysmon::decode(&ctx, &message) {
                Ok(decoded) => {
                    outcome.sysmon_signal = Some(SysmonSignal {
                        host_id: decoded.host_id.clone(),
                        empty_capability_data: decoded.stalled,
                        status: decoded.status,
                    });
                    outcome.output = decoded.output;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "sysmon decode failed");
                    outcome.errors.push(e);
                }
            },
            "sync" => match sync_discovery::decode(&message) {
                Ok(o) => outcome.output = o,
                Err(e) => {
                    tracing::warn!(error = %e, "sync decode failed");
                    outcome.errors.push(e);
                }
            },
            other => {
                tracing::warn!(service_name = %other, "unknown grpc service name; ignoring");
            }
        },
        other => {
            tracing::warn!(service_type = %other, "unknown service type; ignoring");
        }
    }

    if is_grpc && status.source != "results" {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&message) {
            if let Some(host_ip) = find_host_ip(&value) {
                outcome.service_device_candidate = Some(ServiceDeviceCandidate {
                    host_ip,
                    hostname: find_hostname(&value),
                });
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use serviceradar_common::hydrate::NoopHydrator;

    fn report() -> ReportContext {
        ReportContext {
            poller_id: "k8s-poller".to_string(),
            partition: "default".to_string(),
            source_ip: "10.0.0.10".to_string(),
            timestamp: 1_700_000_000_000,
        }
    }

    fn status(service_type: &str, service_name: &str, source: &str, message: &[u8]) -> ServiceStatus {
        ServiceStatus {
            service_name: service_name.to_string(),
            service_type: service_type.to_string(),
            available: true,
            source: source.to_string(),
            message: message.to_vec(),
            agent_id: "k8s-agent".to_string(),
            poller_id: "k8s-poller".to_string(),
            kv_store_id: None,
        }
    }

    #[tokio::test]
    async fn routes_icmp_and_anchors_metric_to_agent() {
        let payload =
            br#"{"host":"8.8.8.8","response_time":10000000,"packet_loss":0,"available":true}"#;
        let outcome = dispatch(&report(), &status("icmp", "ping", "results", payload), &NoopHydrator).await;
        assert_eq!(outcome.output.metrics.len(), 1);
        assert_eq!(outcome.output.metrics[0].device_id, "serviceradar:agent:k8s-agent");
    }

    #[tokio::test]
    async fn icmp_with_empty_agent_drops_record() {
        let mut s = status(
            "icmp",
            "ping",
            "results",
            br#"{"host":"8.8.8.8","response_time":1,"packet_loss":0,"available":true}"#,
        );
        s.agent_id.clear();
        let outcome = dispatch(&report(), &s, &NoopHydrator).await;
        assert!(outcome.output.metrics.is_empty());
    }

    #[tokio::test]
    async fn unknown_service_type_is_ignored_without_error() {
        let outcome = dispatch(&report(), &status("carrier-pigeon", "x", "status", b"{}"), &NoopHydrator).await;
        assert!(outcome.output.device_updates.is_empty());
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn grpc_results_source_never_registers_service_device() {
        let payload = br#"{"host_ip": "172.18.0.5", "status": {"results": []}}"#;
        let outcome = dispatch(&report(), &status("grpc", "rperf-checker", "results", payload), &NoopHydrator).await;
        assert!(outcome.service_device_candidate.is_none());
    }

    #[tokio::test]
    async fn grpc_non_results_source_surfaces_service_device_candidate() {
        let payload = br#"{"available":true,"status":{"host_id":"web01","host_ip":"172.18.0.5"}}"#;
        let outcome = dispatch(&report(), &status("grpc", "sysmon", "status", payload), &NoopHydrator).await;
        let candidate = outcome.service_device_candidate.expect("candidate present");
        assert_eq!(candidate.host_ip, "172.18.0.5");
    }

    #[tokio::test]
    async fn envelope_overrides_report_level_context() {
        let envelope = br#"{
            "poller_id": "envelope-poller",
            "agent_id": "envelope-agent",
            "partition": "envelope-partition",
            "data": "{\"host\":\"8.8.8.8\",\"response_time\":1,\"packet_loss\":0,\"available\":true}"
        }"#;
        let outcome = dispatch(&report(), &status("icmp", "ping", "results", envelope), &NoopHydrator).await;
        assert_eq!(outcome.output.metrics[0].device_id, "serviceradar:agent:envelope-agent");
    }
}
