//! In-memory `Database`/`AlertSink` implementations for tests and local
//! smoke-running. Not a production datastore: `Database`/`AlertSink`
//! model an external system this crate only calls into, never owns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serviceradar_common::{
    AlertSink, Database, DeviceMetadata, DeviceUpdate, DiscoveredInterface, PollerStatus, Result,
    Service, ServiceStatus, SysmonMetricsBatch, TimeseriesMetric, TopologyDiscoveryEvent,
    UnifiedDevice, WebhookAlert,
};

/// An in-memory stand-in for the streaming datastore. Every write lands in
/// a `Mutex`-guarded map or vec; reads serve straight from memory. Cheap to
/// `Clone` (every field is `Arc`-backed) so the same store can back both
/// the device registry and direct interface/topology publishes.
#[derive(Clone, Default)]
pub struct InMemoryDatabase {
    unified_devices: Arc<Mutex<HashMap<String, UnifiedDevice>>>,
    poller_statuses: Arc<Mutex<HashMap<String, PollerStatus>>>,
    metrics: Arc<Mutex<Vec<TimeseriesMetric>>>,
    service_statuses: Arc<Mutex<Vec<ServiceStatus>>>,
    services: Arc<Mutex<Vec<Service>>>,
    interfaces: Arc<Mutex<Vec<DiscoveredInterface>>>,
    topology_events: Arc<Mutex<Vec<TopologyDiscoveryEvent>>>,
    sysmon_batches: Arc<Mutex<Vec<SysmonMetricsBatch>>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics_len(&self) -> usize {
        self.metrics.lock().expect("metrics lock poisoned").len()
    }

    pub fn sysmon_batches_len(&self) -> usize {
        self.sysmon_batches.lock().expect("sysmon batches lock poisoned").len()
    }

    fn upsert(&self, update: &DeviceUpdate) {
        let mut devices = self.unified_devices.lock().expect("unified device lock poisoned");
        let entry = devices.entry(update.device_id.clone()).or_insert_with(|| UnifiedDevice {
            device_id: update.device_id.clone(),
            ip: update.ip.clone(),
            is_available: update.is_available,
            first_seen: update.timestamp,
            last_seen: update.timestamp,
            hostname: update.hostname.clone(),
            mac: update.mac.clone(),
            metadata: DeviceMetadata::default(),
            discovery_sources: Vec::new(),
        });

        entry.ip = update.ip.clone();
        entry.is_available = update.is_available;
        entry.last_seen = update.timestamp;
        if update.hostname.is_some() {
            entry.hostname = update.hostname.clone();
        }
        if update.mac.is_some() {
            entry.mac = update.mac.clone();
        }
        entry.metadata.value.extend(update.metadata.clone());
        if !entry.discovery_sources.contains(&update.source) {
            entry.discovery_sources.push(update.source);
        }
    }
}

#[allow(async_fn_in_trait)]
impl Database for InMemoryDatabase {
    async fn publish_sweep_result(&self, update: &DeviceUpdate) -> Result<()> {
        self.upsert(update);
        Ok(())
    }

    async fn publish_batch_sweep_results(&self, updates: &[DeviceUpdate]) -> Result<()> {
        for update in updates {
            self.upsert(update);
        }
        Ok(())
    }

    async fn publish_batch_discovered_interfaces(&self, interfaces: &[DiscoveredInterface]) -> Result<()> {
        self.interfaces
            .lock()
            .expect("interfaces lock poisoned")
            .extend(interfaces.iter().cloned());
        Ok(())
    }

    async fn publish_batch_topology_discovery_events(&self, events: &[TopologyDiscoveryEvent]) -> Result<()> {
        self.topology_events
            .lock()
            .expect("topology events lock poisoned")
            .extend(events.iter().cloned());
        Ok(())
    }

    async fn store_metrics(&self, metrics: &[TimeseriesMetric]) -> Result<()> {
        self.metrics.lock().expect("metrics lock poisoned").extend(metrics.iter().cloned());
        Ok(())
    }

    async fn update_service_statuses(&self, statuses: &[ServiceStatus]) -> Result<()> {
        self.service_statuses
            .lock()
            .expect("service statuses lock poisoned")
            .extend(statuses.iter().cloned());
        Ok(())
    }

    async fn store_services(&self, services: &[Service]) -> Result<()> {
        self.services.lock().expect("services lock poisoned").extend(services.iter().cloned());
        Ok(())
    }

    async fn store_sysmon_metrics(&self, batches: &[SysmonMetricsBatch]) -> Result<()> {
        self.sysmon_batches
            .lock()
            .expect("sysmon batches lock poisoned")
            .extend(batches.iter().cloned());
        Ok(())
    }

    async fn update_poller_status(&self, poller_id: &str, status: PollerStatus) -> Result<()> {
        self.poller_statuses
            .lock()
            .expect("poller statuses lock poisoned")
            .insert(poller_id.to_string(), status);
        Ok(())
    }

    async fn get_poller_status(&self, poller_id: &str) -> Result<Option<PollerStatus>> {
        Ok(self
            .poller_statuses
            .lock()
            .expect("poller statuses lock poisoned")
            .get(poller_id)
            .copied())
    }

    async fn get_unified_device(&self, device_id: &str) -> Result<Option<UnifiedDevice>> {
        Ok(self
            .unified_devices
            .lock()
            .expect("unified device lock poisoned")
            .get(device_id)
            .cloned())
    }

    async fn get_unified_devices_by_ip(&self, ips: &[String]) -> Result<HashMap<String, UnifiedDevice>> {
        let devices = self.unified_devices.lock().expect("unified device lock poisoned");
        Ok(ips
            .iter()
            .filter_map(|ip| devices.values().find(|d| &d.ip == ip).map(|d| (ip.clone(), d.clone())))
            .collect())
    }

    async fn get_unified_devices_by_ips_or_ids(&self, ips_or_ids: &[String]) -> Result<HashMap<String, UnifiedDevice>> {
        let devices = self.unified_devices.lock().expect("unified device lock poisoned");
        Ok(ips_or_ids
            .iter()
            .filter_map(|key| {
                devices
                    .get(key)
                    .or_else(|| devices.values().find(|d| &d.ip == key))
                    .map(|d| (key.clone(), d.clone()))
            })
            .collect())
    }

    async fn list_unified_devices(&self) -> Result<Vec<UnifiedDevice>> {
        Ok(self.unified_devices.lock().expect("unified device lock poisoned").values().cloned().collect())
    }

    async fn count_unified_devices(&self) -> Result<u64> {
        Ok(self.unified_devices.lock().expect("unified device lock poisoned").len() as u64)
    }
}

/// An [`AlertSink`] that records every alert it receives, for assertions in
/// tests and for local runs where no real webhook transport is configured.
#[derive(Clone, Default)]
pub struct RecordingAlertSink {
    alerts: Arc<Mutex<Vec<WebhookAlert>>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fired(&self) -> Vec<WebhookAlert> {
        self.alerts.lock().expect("alert sink lock poisoned").clone()
    }
}

#[allow(async_fn_in_trait)]
impl AlertSink for RecordingAlertSink {
    async fn alert(&self, alert: WebhookAlert) -> Result<()> {
        tracing::info!(title = %alert.title, poller_id = %alert.poller_id, "alert fired");
        self.alerts.lock().expect("alert sink lock poisoned").push(alert);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serviceradar_common::DiscoverySource;

    fn update(device_id: &str, ip: &str) -> DeviceUpdate {
        DeviceUpdate {
            device_id: device_id.to_string(),
            ip: ip.to_string(),
            mac: None,
            hostname: None,
            partition: "default".to_string(),
            source: DiscoverySource::Sweep,
            agent_id: String::new(),
            poller_id: String::new(),
            timestamp: 1,
            is_available: true,
            metadata: HashMap::new(),
            confidence: DiscoverySource::Sweep.confidence(),
        }
    }

    #[tokio::test]
    async fn publish_then_count_round_trips() {
        let db = InMemoryDatabase::new();
        db.publish_batch_sweep_results(&[update("default:10.0.0.1", "10.0.0.1")]).await.unwrap();
        assert_eq!(db.count_unified_devices().await.unwrap(), 1);

        let found = db.get_unified_devices_by_ip(&["10.0.0.1".to_string()]).await.unwrap();
        assert!(found.contains_key("10.0.0.1"));
    }

    #[tokio::test]
    async fn recording_alert_sink_keeps_fired_alerts() {
        let sink = RecordingAlertSink::new();
        sink.alert(WebhookAlert::new(
            serviceradar_common::AlertLevel::Critical,
            "Poller Offline",
            "silent",
            "p1",
            1,
        ))
        .await
        .unwrap();

        assert_eq!(sink.fired().len(), 1);
        assert_eq!(sink.fired()[0].title, "Poller Offline");
    }
}
