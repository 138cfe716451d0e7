//! The device registry: an in-memory, datastore-backed canonical
//! device store. The in-memory side is a `HashMap` behind a
//! `std::sync::RwLock`, short critical sections, never held across an
//! `.await` on the datastore.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use serviceradar_common::{now_millis, CoreError, Database, DeviceUpdate, DiscoverySource, Result};

/// One in-memory record tracked by the registry. A simplified, queryable
/// projection of the `DeviceUpdate`s applied to a given `device_id`.
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub device_id: String,
    pub ip: String,
    pub mac: Option<String>,
    pub hostname: Option<String>,
    pub partition: String,
    pub is_available: bool,
    pub first_seen: i64,
    pub last_seen: i64,
    pub metadata: HashMap<String, String>,
    pub discovery_sources: Vec<DiscoverySource>,
}

impl DeviceRecord {
    fn from_update(update: &DeviceUpdate) -> Self {
        Self {
            device_id: update.device_id.clone(),
            ip: update.ip.clone(),
            mac: update.mac.clone(),
            hostname: update.hostname.clone(),
            partition: update.partition.clone(),
            is_available: update.is_available,
            first_seen: update.timestamp,
            last_seen: update.timestamp,
            metadata: update.metadata.clone(),
            discovery_sources: vec![update.source],
        }
    }

    fn apply_update(&mut self, update: &DeviceUpdate) {
        self.ip = update.ip.clone();
        if update.mac.is_some() {
            self.mac = update.mac.clone();
        }
        if update.hostname.is_some() {
            self.hostname = update.hostname.clone();
        }
        self.is_available = update.is_available;
        self.last_seen = update.timestamp;
        self.metadata.extend(update.metadata.clone());
        if !self.discovery_sources.contains(&update.source) {
            self.discovery_sources.push(update.source);
        }
    }

    /// The canonical ID this record claims, falling back to its own ID
    /// when `metadata.canonical_device_id` is unset.
    pub fn canonical_device_id(&self) -> &str {
        self.metadata
            .get("canonical_device_id")
            .map(String::as_str)
            .unwrap_or(&self.device_id)
    }

    pub fn is_tombstoned(&self) -> bool {
        self.metadata.get("_deleted").map(String::as_str) == Some("true")
            || self.metadata.contains_key("_merged_into")
    }

    pub fn is_service_component(&self) -> bool {
        serviceradar_common::is_service_device_id(&self.device_id)
    }

    pub fn has_strong_identity(&self) -> bool {
        let has_mac = self.mac.as_deref().is_some_and(|m| !m.is_empty());
        let has_meta = |key: &str| self.metadata.get(key).is_some_and(|v| !v.is_empty());
        has_mac || has_meta("armis_device_id") || has_meta("integration_id") || has_meta("netbox_device_id")
    }

    /// True when the record's only discovery source is `sweep`.
    pub fn is_sweep_only(&self) -> bool {
        self.discovery_sources == [DiscoverySource::Sweep]
    }
}

/// Tie-break rule applied whenever two records claim the same canonical ID:
/// later `last_seen` wins; on tie, `is_available` wins; on tie, the smaller
/// `device_id` wins. Returns `true` if `a` wins over `b`.
pub fn a_wins_tiebreak(a: &DeviceRecord, b: &DeviceRecord) -> bool {
    if a.last_seen != b.last_seen {
        return a.last_seen > b.last_seen;
    }
    if a.is_available != b.is_available {
        return a.is_available;
    }
    a.device_id < b.device_id
}

/// Per-device collector capability flags (icmp/snmp/sysmon/...).
#[derive(Debug, Clone, Default)]
pub struct CollectorCapabilities {
    pub capabilities: HashSet<String>,
}

struct Inner {
    /// Records keyed by `device_id`.
    records: HashMap<String, DeviceRecord>,
    /// IP → set of device IDs that currently claim that IP (primary or
    /// alternate), used for enrichment lookups.
    ip_index: HashMap<String, HashSet<String>>,
    /// capability name → set of device IDs.
    capability_index: HashMap<String, HashSet<String>>,
}

/// The device registry. Generic over the datastore implementation so the
/// ingest core can swap in a real streaming-database client.
pub struct DeviceRegistry<D: Database> {
    db: D,
    inner: RwLock<Inner>,
}

impl<D: Database> DeviceRegistry<D> {
    pub fn new(db: D) -> Self {
        Self {
            db,
            inner: RwLock::new(Inner {
                records: HashMap::new(),
                ip_index: HashMap::new(),
                capability_index: HashMap::new(),
            }),
        }
    }

    /// Every IP (primary + alternates) known for a given update, used to
    /// seed the enrichment lookup.
    fn ips_for(update: &DeviceUpdate) -> Vec<String> {
        let mut ips = vec![update.ip.clone()];
        ips.extend(update.alternate_ips());
        ips
    }

    /// Enrichment: union the primary+alternate IPs of every existing
    /// in-memory record that shares any IP with `update`, and assign the
    /// canonical ID as the lexicographically smallest device_id among the
    /// matches (or the update's own ID if nothing matched).
    fn enrich(&self, update: &mut DeviceUpdate) {
        let inner = self.inner.read().expect("registry lock poisoned");

        let mut matched_device_ids: HashSet<String> = HashSet::new();
        let mut all_ips: HashSet<String> = Self::ips_for(update).into_iter().collect();

        for ip in Self::ips_for(update) {
            if let Some(device_ids) = inner.ip_index.get(&ip) {
                matched_device_ids.extend(device_ids.iter().cloned());
            }
        }

        for device_id in &matched_device_ids {
            if let Some(record) = inner.records.get(device_id) {
                all_ips.insert(record.ip.clone());
                all_ips.extend(record.alternate_ips_from_metadata());
            }
        }

        let canonical = matched_device_ids
            .iter()
            .chain(std::iter::once(&update.device_id))
            .min()
            .cloned()
            .unwrap_or_else(|| update.device_id.clone());

        let alternates: Vec<String> = all_ips.into_iter().filter(|ip| ip != &update.ip).collect();
        update.set_alternate_ips(&alternates);
        update
            .metadata
            .insert("canonical_device_id".to_string(), canonical);
    }

    /// Apply one enriched update to the in-memory store (upsert + index
    /// maintenance). Called after enrichment so the store always reflects
    /// what was (attempted to be) published.
    fn upsert_locked(inner: &mut Inner, update: &DeviceUpdate) {
        inner
            .records
            .entry(update.device_id.clone())
            .and_modify(|r| r.apply_update(update))
            .or_insert_with(|| DeviceRecord::from_update(update));

        let mut ips = vec![update.ip.clone()];
        ips.extend(update.alternate_ips());
        for ip in ips {
            inner.ip_index.entry(ip).or_default().insert(update.device_id.clone());
        }
    }

    /// Process a batch of device updates: enrich, publish, upsert the
    /// in-memory store.
    pub async fn process_batch_device_updates(&self, updates: Vec<DeviceUpdate>) -> Result<()> {
        let mut enriched = Vec::with_capacity(updates.len());

        for mut update in updates {
            self.enrich(&mut update);
            enriched.push(update);
        }

        {
            let mut inner = self.inner.write().expect("registry lock poisoned");
            for update in &enriched {
                Self::upsert_locked(&mut inner, update);
            }
        }

        self.db
            .publish_batch_sweep_results(&enriched)
            .await
            .map_err(|e| CoreError::registry(format!("publish failed: {e}")))
    }

    pub async fn process_device_update(&self, update: DeviceUpdate) -> Result<()> {
        self.process_batch_device_updates(vec![update]).await
    }

    /// Datastore-backed canonical lookup by IP.
    pub async fn find_canonical_devices_by_ips(
        &self,
        ips: &[String],
    ) -> Result<HashMap<String, serviceradar_common::UnifiedDevice>> {
        self.db
            .get_unified_devices_by_ip(ips)
            .await
            .map_err(|e| CoreError::registry(format!("canonical lookup failed: {e}")))
    }

    /// A point-in-time copy of every in-memory record.
    pub fn snapshot_records(&self) -> Vec<DeviceRecord> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.records.values().cloned().collect()
    }

    pub fn list_devices_with_capability(&self, name: &str) -> Vec<String> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner
            .capability_index
            .get(name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_collector_capabilities(&self, device_id: &str) -> CollectorCapabilities {
        let inner = self.inner.read().expect("registry lock poisoned");
        let capabilities = inner
            .capability_index
            .iter()
            .filter(|(_, devices)| devices.contains(device_id))
            .map(|(name, _)| name.clone())
            .collect();
        CollectorCapabilities { capabilities }
    }

    pub fn set_collector_capabilities(&self, device_id: &str, capabilities: &CollectorCapabilities) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        for capability_set in inner.capability_index.values_mut() {
            capability_set.remove(device_id);
        }
        for capability in &capabilities.capabilities {
            inner
                .capability_index
                .entry(capability.clone())
                .or_default()
                .insert(device_id.to_string());
        }
    }

    /// Overwrite the entire capability index for one capability name in a
    /// single pass, e.g. the sysmon stall detector marking a device
    /// `sysmon = failed`.
    pub fn set_device_capability_snapshot(&self, capability: &str, device_ids: HashSet<String>) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.capability_index.insert(capability.to_string(), device_ids);
    }

    /// Sample up to `limit` device IDs tracked in-memory but absent from
    /// `known` (used to detect registry/datastore drift).
    pub fn sample_missing_device_ids(&self, known: &HashSet<String>, limit: usize) -> Vec<String> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner
            .records
            .keys()
            .filter(|id| !known.contains(*id))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn upsert_device_record(&self, record: DeviceRecord) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let mut ips = vec![record.ip.clone()];
        ips.extend(record.alternate_ips_from_metadata());
        for ip in ips {
            inner.ip_index.entry(ip).or_default().insert(record.device_id.clone());
        }
        inner.records.insert(record.device_id.clone(), record);
    }

    pub async fn count_unified_devices(&self) -> Result<u64> {
        self.db
            .count_unified_devices()
            .await
            .map_err(|e| CoreError::registry(format!("count failed: {e}")))
    }
}

impl DeviceRecord {
    fn alternate_ips_from_metadata(&self) -> Vec<String> {
        self.metadata
            .get("alternate_ips")
            .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
            .unwrap_or_default()
    }
}

/// Convenience: the current time in millis, matching `DeviceUpdate.timestamp`.
pub fn now() -> i64 {
    now_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serviceradar_common::{DiscoveredInterface, PollerStatus, Service, ServiceStatus, TimeseriesMetric, TopologyDiscoveryEvent};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeDb {
        published: Mutex<Vec<DeviceUpdate>>,
        unified: HashMap<String, serviceradar_common::UnifiedDevice>,
    }

    #[allow(async_fn_in_trait)]
    impl Database for FakeDb {
        async fn publish_sweep_result(&self, update: &DeviceUpdate) -> Result<()> {
            self.published.lock().unwrap().push(update.clone());
            Ok(())
        }
        async fn publish_batch_sweep_results(&self, updates: &[DeviceUpdate]) -> Result<()> {
            self.published.lock().unwrap().extend(updates.iter().cloned());
            Ok(())
        }
        async fn publish_batch_discovered_interfaces(&self, _interfaces: &[DiscoveredInterface]) -> Result<()> {
            Ok(())
        }
        async fn publish_batch_topology_discovery_events(&self, _events: &[TopologyDiscoveryEvent]) -> Result<()> {
            Ok(())
        }
        async fn store_metrics(&self, _metrics: &[TimeseriesMetric]) -> Result<()> {
            Ok(())
        }
        async fn update_service_statuses(&self, _statuses: &[ServiceStatus]) -> Result<()> {
            Ok(())
        }
        async fn store_services(&self, _services: &[Service]) -> Result<()> {
            Ok(())
        }
        async fn store_sysmon_metrics(&self, _batches: &[serviceradar_common::SysmonMetricsBatch]) -> Result<()> {
            Ok(())
        }
        async fn update_poller_status(&self, _poller_id: &str, _status: PollerStatus) -> Result<()> {
            Ok(())
        }
        async fn get_poller_status(&self, _poller_id: &str) -> Result<Option<PollerStatus>> {
            Ok(None)
        }
        async fn get_unified_device(&self, _device_id: &str) -> Result<Option<serviceradar_common::UnifiedDevice>> {
            Ok(None)
        }
        async fn get_unified_devices_by_ip(&self, ips: &[String]) -> Result<HashMap<String, serviceradar_common::UnifiedDevice>> {
            Ok(ips
                .iter()
                .filter_map(|ip| self.unified.get(ip).map(|d| (ip.clone(), d.clone())))
                .collect())
        }
        async fn get_unified_devices_by_ips_or_ids(&self, _ips_or_ids: &[String]) -> Result<HashMap<String, serviceradar_common::UnifiedDevice>> {
            Ok(HashMap::new())
        }
        async fn list_unified_devices(&self) -> Result<Vec<serviceradar_common::UnifiedDevice>> {
            Ok(Vec::new())
        }
        async fn count_unified_devices(&self) -> Result<u64> {
            Ok(self.unified.len() as u64)
        }
    }

    fn update(device_id: &str, ip: &str, timestamp: i64) -> DeviceUpdate {
        DeviceUpdate {
            device_id: device_id.to_string(),
            ip: ip.to_string(),
            mac: None,
            hostname: None,
            partition: "default".to_string(),
            source: DiscoverySource::Sweep,
            agent_id: String::new(),
            poller_id: String::new(),
            timestamp,
            is_available: true,
            metadata: HashMap::new(),
            confidence: DiscoverySource::Sweep.confidence(),
        }
    }

    #[tokio::test]
    async fn batch_with_shared_alternate_ip_gets_same_canonical_id() {
        let registry = DeviceRegistry::new(FakeDb::default());

        let mut a = update("default:10.0.0.1", "10.0.0.1", 1);
        a.set_alternate_ips(&["10.0.0.2".to_string()]);
        let b = update("default:10.0.0.2", "10.0.0.2", 1);

        registry.process_batch_device_updates(vec![a, b]).await.unwrap();

        let records = registry.snapshot_records();
        let canon_a = records.iter().find(|r| r.device_id == "default:10.0.0.1").unwrap().canonical_device_id().to_string();
        let canon_b = records.iter().find(|r| r.device_id == "default:10.0.0.2").unwrap().canonical_device_id().to_string();
        assert_eq!(canon_a, canon_b);
        assert_eq!(canon_a, "default:10.0.0.1");
    }

    #[tokio::test]
    async fn canonical_id_is_lexicographically_smallest() {
        let registry = DeviceRegistry::new(FakeDb::default());
        registry
            .process_device_update(update("default:10.0.0.2", "10.0.0.2", 1))
            .await
            .unwrap();

        let mut correlated = update("default:10.0.0.1", "10.0.0.1", 2);
        correlated.set_alternate_ips(&["10.0.0.2".to_string()]);
        registry.process_device_update(correlated).await.unwrap();

        let records = registry.snapshot_records();
        for record in &records {
            assert_eq!(record.canonical_device_id(), "default:10.0.0.1");
        }
    }

    #[tokio::test]
    async fn idempotent_reapplication_yields_same_snapshot() {
        let registry = DeviceRegistry::new(FakeDb::default());
        let batch = vec![update("default:10.0.0.1", "10.0.0.1", 1)];

        registry.process_batch_device_updates(batch.clone()).await.unwrap();
        let first: Vec<_> = registry.snapshot_records().into_iter().map(|r| r.canonical_device_id().to_string()).collect();

        registry.process_batch_device_updates(batch).await.unwrap();
        let second: Vec<_> = registry.snapshot_records().into_iter().map(|r| r.canonical_device_id().to_string()).collect();

        assert_eq!(first, second);
    }

    #[test]
    fn tiebreak_prefers_later_last_seen_then_available_then_smaller_id() {
        let mut a = DeviceRecord {
            device_id: "default:10.0.0.2".to_string(),
            ip: "10.0.0.2".to_string(),
            mac: None,
            hostname: None,
            partition: "default".to_string(),
            is_available: true,
            first_seen: 1,
            last_seen: 5,
            metadata: HashMap::new(),
            discovery_sources: vec![DiscoverySource::Sweep],
        };
        let mut b = a.clone();
        b.device_id = "default:10.0.0.1".to_string();
        b.last_seen = 10;

        assert!(a_wins_tiebreak(&b, &a));

        b.last_seen = 5;
        assert!(a_wins_tiebreak(&b, &a), "smaller device_id wins on full tie");

        a.last_seen = 5;
        b.last_seen = 5;
        a.is_available = false;
        assert!(a_wins_tiebreak(&b, &a), "available wins over unavailable");
    }
}
