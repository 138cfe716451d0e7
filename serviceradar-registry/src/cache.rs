//! The canonical-ID alias cache: a TTL + LRU cache fronting
//! datastore lookups for the sweep decoder's canonical-hydration seam.
//!
//! Hand-rolled rather than pulled from a crate: a `HashMap` for O(1)
//! lookup plus a `VecDeque` tracking access order for eviction, guarded
//! by a `std::sync::Mutex` with short critical sections.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serviceradar_common::hydrate::{CanonicalHydrator, HydratedAlias};
use serviceradar_common::Database;

struct Entry {
    alias: HydratedAlias,
    inserted_at: Instant,
}

struct Inner {
    entries: HashMap<String, Entry>,
    /// Most-recently-used IPs at the back; eviction pops from the front.
    order: VecDeque<String>,
}

/// TTL + LRU cache of canonical aliases keyed by IP, backed by a
/// [`Database`] for misses. A negative miss (no datastore hit) is never
/// cached, so a device that later gains a strong identity is found on its
/// very next lookup.
pub struct AliasCache<D: Database> {
    db: D,
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: Duration,
}

impl<D: Database> AliasCache<D> {
    pub fn new(db: D, capacity: usize, ttl: Duration) -> Self {
        Self {
            db,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity,
            ttl,
        }
    }

    fn get_fresh(&self, ip: &str) -> Option<HydratedAlias> {
        let mut inner = self.inner.lock().expect("alias cache lock poisoned");
        let expired = match inner.entries.get(ip) {
            Some(entry) => entry.inserted_at.elapsed() >= self.ttl,
            None => return None,
        };
        if expired {
            inner.entries.remove(ip);
            inner.order.retain(|k| k != ip);
            return None;
        }
        // Touch: move to the back as most-recently-used.
        inner.order.retain(|k| k != ip);
        inner.order.push_back(ip.to_string());
        inner.entries.get(ip).map(|e| e.alias.clone())
    }

    fn insert(&self, ip: String, alias: HydratedAlias) {
        let mut inner = self.inner.lock().expect("alias cache lock poisoned");
        if !inner.entries.contains_key(&ip) && inner.entries.len() >= self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.entries.remove(&evicted);
            }
        }
        inner.order.retain(|k| k != &ip);
        inner.order.push_back(ip.clone());
        inner.entries.insert(
            ip,
            Entry {
                alias,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Evict every entry, forcing the next lookup to consult the datastore.
    /// Intended for tests and explicit cache-busting on merge events.
    pub fn invalidate(&self, ip: &str) {
        let mut inner = self.inner.lock().expect("alias cache lock poisoned");
        inner.entries.remove(ip);
        inner.order.retain(|k| k != ip);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("alias cache lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<D: Database> CanonicalHydrator for AliasCache<D> {
    async fn hydrate(&self, ip: &str) -> Option<HydratedAlias> {
        if let Some(alias) = self.get_fresh(ip) {
            return Some(alias);
        }

        let ips = [ip.to_string()];
        let found = match self.db.get_unified_devices_by_ip(&ips).await {
            Ok(devices) => devices,
            Err(e) => {
                tracing::warn!(%ip, error = %e, "canonical lookup failed; treating as miss");
                return None;
            }
        };

        let device = found.into_iter().next().map(|(_, device)| device)?;
        let alias = HydratedAlias {
            device_id: device.device_id,
            mac: device.mac,
            metadata: device.metadata.value,
        };
        self.insert(ip.to_string(), alias.clone());
        Some(alias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serviceradar_common::{DeviceMetadata, DiscoveredInterface, PollerStatus, Service, ServiceStatus, TimeseriesMetric, TopologyDiscoveryEvent, UnifiedDevice};
    use serviceradar_common::error::Result;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDb {
        device: Option<UnifiedDevice>,
        lookups: AtomicUsize,
    }

    #[allow(async_fn_in_trait)]
    impl Database for CountingDb {
        async fn publish_sweep_result(&self, _update: &serviceradar_common::DeviceUpdate) -> Result<()> {
            Ok(())
        }
        async fn publish_batch_sweep_results(&self, _updates: &[serviceradar_common::DeviceUpdate]) -> Result<()> {
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
        async fn get_unified_device(&self, _device_id: &str) -> Result<Option<UnifiedDevice>> {
            Ok(None)
        }
        async fn get_unified_devices_by_ip(&self, ips: &[String]) -> Result<HashMap<String, UnifiedDevice>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(match &self.device {
                Some(device) if ips.contains(&device.ip) => {
                    HashMap::from([(device.ip.clone(), device.clone())])
                }
                _ => HashMap::new(),
            })
        }
        async fn get_unified_devices_by_ips_or_ids(&self, _ips_or_ids: &[String]) -> Result<HashMap<String, UnifiedDevice>> {
            Ok(HashMap::new())
        }
        async fn list_unified_devices(&self) -> Result<Vec<UnifiedDevice>> {
            Ok(Vec::new())
        }
        async fn count_unified_devices(&self) -> Result<u64> {
            Ok(0)
        }
    }

    fn device(ip: &str) -> UnifiedDevice {
        UnifiedDevice {
            device_id: format!("default:{ip}"),
            ip: ip.to_string(),
            is_available: true,
            first_seen: 1,
            last_seen: 1,
            hostname: None,
            mac: Some("AA:BB:CC:DD:EE:01".to_string()),
            metadata: DeviceMetadata::default(),
            discovery_sources: Vec::new(),
        }
    }

    #[tokio::test]
    async fn miss_then_hit_hydrates_and_caches() {
        let db = CountingDb {
            device: Some(device("10.0.0.1")),
            lookups: AtomicUsize::new(0),
        };
        let cache = AliasCache::new(db, 16, Duration::from_secs(60));

        let first = cache.hydrate("10.0.0.1").await.expect("hydrated");
        assert_eq!(first.device_id, "default:10.0.0.1");
        assert_eq!(cache.db.lookups.load(Ordering::SeqCst), 1);

        let second = cache.hydrate("10.0.0.1").await.expect("hydrated from cache");
        assert_eq!(second.device_id, first.device_id);
        assert_eq!(cache.db.lookups.load(Ordering::SeqCst), 1, "second lookup served from cache");
    }

    #[tokio::test]
    async fn negative_miss_is_never_cached() {
        let db = CountingDb {
            device: None,
            lookups: AtomicUsize::new(0),
        };
        let cache = AliasCache::new(db, 16, Duration::from_secs(60));

        assert!(cache.hydrate("10.0.0.9").await.is_none());
        assert!(cache.hydrate("10.0.0.9").await.is_none());
        assert_eq!(cache.db.lookups.load(Ordering::SeqCst), 2, "misses always re-check the datastore");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn expired_entry_is_refetched() {
        let db = CountingDb {
            device: Some(device("10.0.0.1")),
            lookups: AtomicUsize::new(0),
        };
        let cache = AliasCache::new(db, 16, Duration::from_millis(1));

        cache.hydrate("10.0.0.1").await.expect("hydrated");
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.hydrate("10.0.0.1").await.expect("hydrated again");

        assert_eq!(cache.db.lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let db = CountingDb {
            device: None,
            lookups: AtomicUsize::new(0),
        };
        let cache = AliasCache::new(db, 2, Duration::from_secs(60));

        cache.insert("a".to_string(), HydratedAlias {
            device_id: "default:a".to_string(),
            mac: None,
            metadata: HashMap::new(),
        });
        cache.insert("b".to_string(), HydratedAlias {
            device_id: "default:b".to_string(),
            mac: None,
            metadata: HashMap::new(),
        });
        cache.insert("c".to_string(), HydratedAlias {
            device_id: "default:c".to_string(),
            mac: None,
            metadata: HashMap::new(),
        });

        assert_eq!(cache.len(), 2);
        assert!(cache.get_fresh("a").is_none(), "oldest entry evicted");
        assert!(cache.get_fresh("b").is_some());
        assert!(cache.get_fresh("c").is_some());
    }

    #[test]
    fn invalidate_clears_entry() {
        let db = CountingDb {
            device: None,
            lookups: AtomicUsize::new(0),
        };
        let cache = AliasCache::new(db, 16, Duration::from_secs(60));
        cache.insert("a".to_string(), HydratedAlias {
            device_id: "default:a".to_string(),
            mac: None,
            metadata: HashMap::new(),
        });
        cache.invalidate("a");
        assert!(cache.is_empty());
    }
}
