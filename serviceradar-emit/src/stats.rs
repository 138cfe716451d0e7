//! The stats aggregator: periodically snapshots the registry,
//! reconciles it against the datastore's authoritative count, and exposes
//! aggregate gauges plus an anomaly alert when non-canonical records spike.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serviceradar_common::{AlertLevel, AlertSink, Database, DeviceStatsMeta, DeviceStatsSnapshot, PartitionStats, StatsSink, WebhookAlert};
use serviceradar_registry::{a_wins_tiebreak, DeviceRecord, DeviceRegistry};

use crate::cooldown::CooldownTracker;

const ONE_DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// Picks a winner within one canonical-ID group: records that claim their
/// own `device_id` as canonical are preferred over aliases, then
/// `a_wins_tiebreak` decides among equals.
fn group_winner(records: &[&DeviceRecord]) -> usize {
    let mut best = 0;
    for i in 1..records.len() {
        let a_is_canonical = records[i].device_id == records[i].canonical_device_id();
        let b_is_canonical = records[best].device_id == records[best].canonical_device_id();
        let a_wins = match (a_is_canonical, b_is_canonical) {
            (true, false) => true,
            (false, true) => false,
            _ => a_wins_tiebreak(records[i], records[best]),
        };
        if a_wins {
            best = i;
        }
    }
    best
}

/// Periodically computes a [`DeviceStatsSnapshot`] from the registry's
/// in-memory records, reconciled against the datastore's authoritative
/// device count.
pub struct StatsAggregator<D: Database> {
    registry: std::sync::Arc<DeviceRegistry<D>>,
    sink: Box<dyn StatsSink>,
    anomaly_cooldown: CooldownTracker,
    previous_skipped_non_canonical: AtomicU64,
}

impl<D: Database> StatsAggregator<D> {
    pub fn new(registry: std::sync::Arc<DeviceRegistry<D>>, sink: Box<dyn StatsSink>, anomaly_cooldown: std::time::Duration) -> Self {
        Self {
            registry,
            sink,
            anomaly_cooldown: CooldownTracker::new(anomaly_cooldown),
            previous_skipped_non_canonical: AtomicU64::new(0),
        }
    }

    /// Run one refresh cycle, then fire the anomaly alert if the caller
    /// supplies an `alerts` sink and the threshold condition is met.
    pub async fn refresh<A: AlertSink>(&self, now: i64, alerts: Option<&A>) -> (DeviceStatsSnapshot, DeviceStatsMeta) {
        let records = self.registry.snapshot_records();
        let mut meta = DeviceStatsMeta::default();
        meta.raw_records = records.len() as u64;

        let mut groups: HashMap<String, Vec<&DeviceRecord>> = HashMap::new();
        for record in &records {
            if record.device_id.is_empty() {
                meta.skipped_nil += 1;
                continue;
            }
            if record.is_tombstoned() {
                meta.skipped_tombstoned += 1;
                continue;
            }
            if record.is_service_component() {
                meta.skipped_service_components += 1;
                continue;
            }
            groups.entry(record.canonical_device_id().to_string()).or_default().push(record);
        }

        let mut retained: Vec<(DeviceRecord, bool)> = Vec::new(); // (record, is_inferred_fallback)
        for (canonical_id, group) in &groups {
            let winner_idx = group_winner(group);
            meta.skipped_non_canonical += (group.len() - 1) as u64;

            let winner = group[winner_idx];
            let is_inferred = winner.device_id != *canonical_id;
            if is_inferred {
                meta.inferred_canonical_fallback += 1;
            }

            if winner.is_sweep_only() && !winner.has_strong_identity() {
                meta.skipped_sweep_only += 1;
                continue;
            }

            retained.push((winner.clone(), is_inferred));
        }

        if let Ok(db_count) = self.registry_db_count().await {
            if (db_count as usize) < retained.len() {
                let to_prune = retained.len() - db_count as usize;
                let mut inferred_indices: Vec<usize> = retained
                    .iter()
                    .enumerate()
                    .filter(|(_, (_, inferred))| *inferred)
                    .map(|(i, _)| i)
                    .collect();
                inferred_indices.sort_by(|&a, &b| {
                    retained[a]
                        .0
                        .last_seen
                        .cmp(&retained[b].0.last_seen)
                        .then_with(|| retained[a].0.device_id.cmp(&retained[b].0.device_id))
                });
                let prune_set: std::collections::HashSet<usize> =
                    inferred_indices.into_iter().take(to_prune).collect();
                let mut kept = Vec::with_capacity(retained.len());
                for (i, entry) in retained.into_iter().enumerate() {
                    if !prune_set.contains(&i) {
                        kept.push(entry);
                    }
                }
                retained = kept;
            }
        }

        meta.processed_records = retained.iter().filter(|(_, inferred)| !inferred).count() as u64;

        let icmp_capable = self.registry.list_devices_with_capability("icmp");
        let snmp_capable = self.registry.list_devices_with_capability("snmp");
        let sysmon_capable = self.registry.list_devices_with_capability("sysmon");
        let icmp_set: std::collections::HashSet<&str> = icmp_capable.iter().map(String::as_str).collect();
        let snmp_set: std::collections::HashSet<&str> = snmp_capable.iter().map(String::as_str).collect();
        let sysmon_set: std::collections::HashSet<&str> = sysmon_capable.iter().map(String::as_str).collect();

        let mut snapshot = DeviceStatsSnapshot::default();
        let mut partitions: HashMap<String, PartitionStats> = HashMap::new();

        for (record, _) in &retained {
            snapshot.total += 1;
            if record.is_available {
                snapshot.available += 1;
            } else {
                snapshot.unavailable += 1;
            }
            if now - record.last_seen <= ONE_DAY_MILLIS {
                snapshot.active += 1;
            }

            let id = record.device_id.as_str();
            let has_icmp = icmp_set.contains(id);
            let has_snmp = snmp_set.contains(id);
            let has_sysmon = sysmon_set.contains(id);
            if has_icmp {
                snapshot.with_icmp += 1;
            }
            if has_snmp {
                snapshot.with_snmp += 1;
            }
            if has_sysmon {
                snapshot.with_sysmon += 1;
            }
            if has_icmp || has_snmp || has_sysmon {
                snapshot.with_collectors += 1;
            }

            let partition = record.device_id.split_once(':').map(|(p, _)| p).unwrap_or(&record.partition);
            let entry = partitions.entry(partition.to_string()).or_insert_with(|| PartitionStats {
                partition: partition.to_string(),
                device_count: 0,
                available_count: 0,
            });
            entry.device_count += 1;
            if record.is_available {
                entry.available_count += 1;
            }
        }

        snapshot.partitions = partitions.into_values().collect();
        self.sink.publish(&snapshot, &meta);

        let previous = self.previous_skipped_non_canonical.swap(meta.skipped_non_canonical, Ordering::SeqCst);
        if let Some(alerts) = alerts {
            if meta.skipped_non_canonical > previous {
                self.handle_anomaly(now, meta.skipped_non_canonical, alerts).await;
            }
        }

        (snapshot, meta)
    }

    async fn registry_db_count(&self) -> serviceradar_common::Result<u64> {
        self.registry.count_unified_devices().await
    }

    async fn handle_anomaly<A: AlertSink>(&self, now: i64, skipped_non_canonical: u64, alerts: &A) {
        if self.anomaly_cooldown.check("", "Stats Anomaly", "", now).is_err() {
            return;
        }

        let alert = WebhookAlert::new(
            AlertLevel::Warning,
            "Stats Anomaly",
            format!("skipped_non_canonical rose to {skipped_non_canonical}"),
            "",
            now,
        );
        if let Err(e) = alerts.alert(alert).await {
            if !e.is_cooldown() {
                tracing::warn!(error = %e, "failed to deliver stats anomaly alert");
            }
        }
    }
}
