//! The buffered emitter: six per-poller buffers, each behind its
//! own short-critical-section mutex, drained on a periodic tick or on
//! shutdown. One lock per concern, never held across a datastore call.

use std::collections::HashMap;
use std::mem;
use std::sync::Mutex;

use serviceradar_common::{
    Database, DeviceUpdate, PollerStatus, Result, Service, ServiceStatus, SysmonMetricsBatch,
    SysmonStatus, TimeseriesMetric,
};
use serviceradar_registry::DeviceRegistry;

/// Per-channel flush outcome, used by callers to log/retry.
#[derive(Debug, Default)]
pub struct FlushReport {
    pub metrics_flushed: usize,
    pub services_flushed: usize,
    pub service_lists_flushed: usize,
    pub sysmon_flushed: usize,
    pub service_devices_flushed: usize,
    pub poller_statuses_flushed: usize,
    pub errors: Vec<serviceradar_common::CoreError>,
}

/// Buffers metrics, service statuses, catalogue rows, sysmon batches,
/// service-device updates, and poller-status updates in memory, draining
/// each to its datastore target on a timer or at shutdown.
#[derive(Default)]
pub struct BufferedEmitter {
    metrics: Mutex<HashMap<String, Vec<TimeseriesMetric>>>,
    services: Mutex<HashMap<String, Vec<ServiceStatus>>>,
    service_lists: Mutex<HashMap<String, Vec<Service>>>,
    sysmon: Mutex<HashMap<String, Vec<SysmonMetricsBatch>>>,
    /// Keyed by `device_id`; kept the update with the greatest `timestamp`.
    service_devices: Mutex<HashMap<String, DeviceUpdate>>,
    poller_statuses: Mutex<HashMap<String, PollerStatus>>,
}

impl BufferedEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer_metrics(&self, poller_id: &str, metrics: impl IntoIterator<Item = TimeseriesMetric>) {
        let mut guard = self.metrics.lock().expect("metrics buffer lock poisoned");
        guard.entry(poller_id.to_string()).or_default().extend(metrics);
    }

    pub fn buffer_service_status(&self, poller_id: &str, status: ServiceStatus) {
        let mut guard = self.services.lock().expect("services buffer lock poisoned");
        guard.entry(poller_id.to_string()).or_default().push(status);
    }

    pub fn buffer_service(&self, poller_id: &str, service: Service) {
        let mut guard = self.service_lists.lock().expect("service list buffer lock poisoned");
        guard.entry(poller_id.to_string()).or_default().push(service);
    }

    pub fn buffer_sysmon(&self, poller_id: &str, host_id: String, status: SysmonStatus, partition: String) {
        let mut guard = self.sysmon.lock().expect("sysmon buffer lock poisoned");
        guard
            .entry(poller_id.to_string())
            .or_default()
            .push(SysmonMetricsBatch { host_id, partition, status });
    }

    /// Buffer a service-device update, keeping the one with the greatest
    /// `timestamp` when one is already buffered for the same `device_id`.
    pub fn buffer_service_device(&self, update: DeviceUpdate) {
        let mut guard = self.service_devices.lock().expect("service device buffer lock poisoned");
        guard
            .entry(update.device_id.clone())
            .and_modify(|existing| {
                if update.timestamp > existing.timestamp {
                    *existing = update.clone();
                }
            })
            .or_insert(update);
    }

    pub fn buffer_poller_status(&self, poller_id: &str, status: PollerStatus) {
        let mut guard = self.poller_statuses.lock().expect("poller status buffer lock poisoned");
        guard
            .entry(poller_id.to_string())
            .and_modify(|existing| {
                if status.last_seen > existing.last_seen {
                    *existing = status;
                }
            })
            .or_insert(status);
    }

    fn drain_metrics(&self) -> HashMap<String, Vec<TimeseriesMetric>> {
        mem::take(&mut *self.metrics.lock().expect("metrics buffer lock poisoned"))
    }

    fn restore_metrics(&self, drained: HashMap<String, Vec<TimeseriesMetric>>) {
        let mut guard = self.metrics.lock().expect("metrics buffer lock poisoned");
        for (poller_id, mut batch) in drained {
            guard.entry(poller_id).or_default().append(&mut batch);
        }
    }

    /// Flush every buffer against `db` (and the service-device buffer
    /// against `registry`). A channel that fails to flush is retained,
    /// merged with anything buffered since the drain began, and retried on
    /// the next call.
    pub async fn flush_all<D: Database>(&self, db: &D, registry: &DeviceRegistry<D>) -> FlushReport {
        let mut report = FlushReport::default();

        let metrics = self.drain_metrics();
        if !metrics.is_empty() {
            let flat: Vec<TimeseriesMetric> = metrics.values().flatten().cloned().collect();
            match db.store_metrics(&flat).await {
                Ok(()) => report.metrics_flushed = flat.len(),
                Err(e) => {
                    tracing::warn!(error = %e, "metrics flush failed; retaining buffer");
                    report.errors.push(e);
                    self.restore_metrics(metrics);
                }
            }
        }

        let services = mem::take(&mut *self.services.lock().expect("services buffer lock poisoned"));
        if !services.is_empty() {
            let flat: Vec<ServiceStatus> = services.values().flatten().cloned().collect();
            match db.update_service_statuses(&flat).await {
                Ok(()) => report.services_flushed = flat.len(),
                Err(e) => {
                    tracing::warn!(error = %e, "service status flush failed; retaining buffer");
                    report.errors.push(e);
                    let mut guard = self.services.lock().expect("services buffer lock poisoned");
                    for (poller_id, mut batch) in services {
                        guard.entry(poller_id).or_default().append(&mut batch);
                    }
                }
            }
        }

        let service_lists = mem::take(&mut *self.service_lists.lock().expect("service list buffer lock poisoned"));
        if !service_lists.is_empty() {
            let flat: Vec<Service> = service_lists.values().flatten().cloned().collect();
            match db.store_services(&flat).await {
                Ok(()) => report.service_lists_flushed = flat.len(),
                Err(e) => {
                    tracing::warn!(error = %e, "service catalogue flush failed; retaining buffer");
                    report.errors.push(e);
                    let mut guard = self.service_lists.lock().expect("service list buffer lock poisoned");
                    for (poller_id, mut batch) in service_lists {
                        guard.entry(poller_id).or_default().append(&mut batch);
                    }
                }
            }
        }

        let sysmon = mem::take(&mut *self.sysmon.lock().expect("sysmon buffer lock poisoned"));
        if !sysmon.is_empty() {
            let flat: Vec<SysmonMetricsBatch> = sysmon.values().flatten().cloned().collect();
            match db.store_sysmon_metrics(&flat).await {
                Ok(()) => report.sysmon_flushed = flat.len(),
                Err(e) => {
                    tracing::warn!(error = %e, "sysmon flush failed; retaining buffer");
                    report.errors.push(e);
                    let mut guard = self.sysmon.lock().expect("sysmon buffer lock poisoned");
                    for (poller_id, mut batch) in sysmon {
                        guard.entry(poller_id).or_default().append(&mut batch);
                    }
                }
            }
        }

        let service_devices = mem::take(&mut *self.service_devices.lock().expect("service device buffer lock poisoned"));
        if !service_devices.is_empty() {
            let updates: Vec<DeviceUpdate> = service_devices.values().cloned().collect();
            match registry.process_batch_device_updates(updates).await {
                Ok(()) => report.service_devices_flushed = service_devices.len(),
                Err(e) => {
                    tracing::warn!(error = %e, "service device flush failed; retaining buffer");
                    report.errors.push(e);
                    let mut guard = self.service_devices.lock().expect("service device buffer lock poisoned");
                    for (device_id, update) in service_devices {
                        guard
                            .entry(device_id)
                            .and_modify(|existing| {
                                if update.timestamp > existing.timestamp {
                                    *existing = update.clone();
                                }
                            })
                            .or_insert(update);
                    }
                }
            }
        }

        let poller_statuses = mem::take(&mut *self.poller_statuses.lock().expect("poller status buffer lock poisoned"));
        for (poller_id, status) in &poller_statuses {
            if let Err(e) = db.update_poller_status(poller_id, *status).await {
                tracing::warn!(%poller_id, error = %e, "poller status flush failed; retaining entry");
                report.errors.push(e);
                let mut guard = self.poller_statuses.lock().expect("poller status buffer lock poisoned");
                guard
                    .entry(poller_id.clone())
                    .and_modify(|existing| {
                        if status.last_seen > existing.last_seen {
                            *existing = *status;
                        }
                    })
                    .or_insert(*status);
            } else {
                report.poller_statuses_flushed += 1;
            }
        }

        report
    }
}
