//! The `ReportStatus` RPC facade: the single entry point every
//! poller report passes through. Wires the dispatcher, registry,
//! buffered emitter, liveness tracker, and service-device
//! registrar together as a per-call handler.

use std::sync::Arc;

use serviceradar_common::hydrate::CanonicalHydrator;
use serviceradar_common::{AlertSink, Database, PollerStatusRequest, PollerStatusResponse, Service, ServiceStatus};
use serviceradar_decode::decoders::DecodeOutput;
use serviceradar_decode::dispatcher::{dispatch, DispatchOutcome, ReportContext, SysmonSignal};
use serviceradar_emit::{BufferedEmitter, LivenessTracker, SysmonStallTracker};
use serviceradar_registry::DeviceRegistry;

use crate::service_device::{register_core_service_devices, register_host_device, register_service_device_candidate};

/// Implements `ReportStatus`: dispatch every service in the report, fold
/// the results into the registry/emitter/liveness/capability state, and
/// always acknowledge — per-service decode failures are logged, never
/// surfaced to the caller.
pub struct CoreHandler<D, H, A>
where
    D: Database + Clone,
    H: CanonicalHydrator,
    A: AlertSink,
{
    db: D,
    registry: Arc<DeviceRegistry<D>>,
    emitter: Arc<BufferedEmitter>,
    hydrator: H,
    liveness: Arc<LivenessTracker>,
    sysmon_stall: Arc<SysmonStallTracker>,
    alerts: A,
}

impl<D, H, A> CoreHandler<D, H, A>
where
    D: Database + Clone,
    H: CanonicalHydrator,
    A: AlertSink,
{
    pub fn new(
        db: D,
        registry: Arc<DeviceRegistry<D>>,
        emitter: Arc<BufferedEmitter>,
        hydrator: H,
        liveness: Arc<LivenessTracker>,
        sysmon_stall: Arc<SysmonStallTracker>,
        alerts: A,
    ) -> Self {
        Self {
            db,
            registry,
            emitter,
            hydrator,
            liveness,
            sysmon_stall,
            alerts,
        }
    }

    pub async fn report_status(&self, report: PollerStatusRequest) -> PollerStatusResponse {
        let now = report.timestamp;

        if !self.liveness.is_unknown(&report.poller_id) {
            self.liveness.mark_recovered_if_needed(&report.poller_id, now, &self.alerts).await;
        }

        let report_ctx = ReportContext {
            poller_id: report.poller_id.clone(),
            partition: report.partition.clone(),
            source_ip: report.source_ip.clone(),
            timestamp: report.timestamp,
        };

        let mut device_updates = Vec::new();
        let mut interfaces = Vec::new();
        let mut topology_events = Vec::new();

        for service in &report.services {
            let outcome = dispatch(&report_ctx, service, &self.hydrator).await;

            for err in &outcome.errors {
                tracing::warn!(
                    poller_id = %report.poller_id,
                    service = %service.service_name,
                    error = %err,
                    "service decode failed"
                );
            }

            if let Some(signal) = &outcome.sysmon_signal {
                self.emitter.buffer_sysmon(
                    &report.poller_id,
                    signal.host_id.clone(),
                    signal.status.clone(),
                    report.partition.clone(),
                );
            } else if !outcome.output.metrics.is_empty() {
                self.emitter.buffer_metrics(&report.poller_id, outcome.output.metrics.clone());
            }

            self.track_capability(service, &outcome);

            if let Some(signal) = &outcome.sysmon_signal {
                self.track_sysmon_stall(signal, &outcome.output).await;
            }

            device_updates.extend(outcome.output.device_updates.clone());
            interfaces.extend(outcome.output.interfaces);
            topology_events.extend(outcome.output.topology_events);

            self.buffer_service_catalogue(&report, service);

            if let Some(candidate) = &outcome.service_device_candidate {
                if let Some(update) = register_service_device_candidate(candidate, &report.partition, report.timestamp) {
                    self.emitter.buffer_service_device(update);
                }
            }
        }

        if !device_updates.is_empty() {
            if let Err(e) = self.registry.process_batch_device_updates(device_updates).await {
                tracing::warn!(poller_id = %report.poller_id, error = %e, "device update batch failed");
            }
        }

        if !interfaces.is_empty() {
            if let Err(e) = self.db.publish_batch_discovered_interfaces(&interfaces).await {
                tracing::warn!(poller_id = %report.poller_id, error = %e, "discovered interface publish failed");
            }
        }

        if !topology_events.is_empty() {
            if let Err(e) = self.db.publish_batch_topology_discovery_events(&topology_events).await {
                tracing::warn!(poller_id = %report.poller_id, error = %e, "topology discovery event publish failed");
            }
        }

        self.register_service_devices(&report);

        self.liveness.record_report(&report.poller_id, now, &self.emitter).await;

        PollerStatusResponse { received: true }
    }

    fn buffer_service_catalogue(&self, report: &PollerStatusRequest, service: &ServiceStatus) {
        self.emitter.buffer_service_status(&report.poller_id, service.clone());
        self.emitter.buffer_service(
            &report.poller_id,
            Service {
                poller_id: report.poller_id.clone(),
                agent_id: service.agent_id.clone(),
                service_name: service.service_name.clone(),
                service_type: service.service_type.clone(),
                available: service.available,
                timestamp: report.timestamp,
            },
        );
    }

    /// Register the host device (when partition/source_ip are present) and
    /// every core-service device named in the report.
    fn register_service_devices(&self, report: &PollerStatusRequest) {
        if !report.partition.is_empty() && !report.source_ip.is_empty() {
            let has_agent = !report.agent_id.is_empty();
            match register_host_device(&report.partition, &report.source_ip, has_agent, report.timestamp) {
                Ok(update) => self.emitter.buffer_service_device(update),
                Err(e) => tracing::warn!(poller_id = %report.poller_id, error = %e, "host device registration skipped"),
            }
        }

        for update in register_core_service_devices(report) {
            self.emitter.buffer_service_device(update);
        }
    }

    /// Mark a device's icmp/snmp collector capability present based on
    /// which device_id the decode outcome attributed its output to — the
    /// icmp decoder anchors to the reporting agent, the snmp decoder to
    /// each polled target.
    fn track_capability(&self, service: &ServiceStatus, outcome: &DispatchOutcome) {
        match service.service_type.as_str() {
            "icmp" => {
                for metric in &outcome.output.metrics {
                    self.mark_capability(&metric.device_id, "icmp");
                }
            }
            "snmp" => {
                for update in &outcome.output.device_updates {
                    self.mark_capability(&update.device_id, "snmp");
                }
            }
            _ => {}
        }
    }

    fn mark_capability(&self, device_id: &str, capability: &str) {
        let mut capabilities = self.registry.get_collector_capabilities(device_id);
        if capabilities.capabilities.insert(capability.to_string()) {
            self.registry.set_collector_capabilities(device_id, &capabilities);
        }
    }

    /// Feed a sysmon stall signal into the tracker and clear the `sysmon`
    /// capability exactly once, on the transition into the stalled state
    ///.
    async fn track_sysmon_stall(&self, signal: &SysmonSignal, output: &DecodeOutput) {
        let stalled = self.sysmon_stall.record(&signal.host_id, signal.empty_capability_data).await;
        if !stalled {
            return;
        }

        if let Some(update) = output.device_updates.first() {
            let mut capabilities = self.registry.get_collector_capabilities(&update.device_id);
            if capabilities.capabilities.remove("sysmon") {
                self.registry.set_collector_capabilities(&update.device_id, &capabilities);
            }
        }
    }
}
