//! Sysmon stall detection: if a host's sysmon payloads come back
//! empty of CPU/disk/memory/process data N times in a row, mark its
//! `sysmon` collector capability as failed.
//!
//! A `tokio::sync::RwLock<HashMap<...>>` over per-host stall counters:
//! read on every dispatch, written on every dispatch.

use std::collections::HashMap;

use tokio::sync::RwLock;

/// Tracks consecutive empty sysmon payloads per host, emitting a
/// capability-snapshot signal once `threshold` is reached.
pub struct SysmonStallTracker {
    threshold: u32,
    counts: RwLock<HashMap<String, u32>>,
}

impl SysmonStallTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            counts: RwLock::new(HashMap::new()),
        }
    }

    /// Record one sysmon observation for `host_id`. Returns `true` exactly
    /// once the consecutive-empty count first reaches `threshold` (the
    /// caller should mark the `sysmon` capability as failed on that
    /// transition, not on every subsequent empty payload).
    pub async fn record(&self, host_id: &str, empty_capability_data: bool) -> bool {
        if host_id.is_empty() {
            return false;
        }

        let mut counts = self.counts.write().await;
        if !empty_capability_data {
            counts.remove(host_id);
            return false;
        }

        let count = counts.entry(host_id.to_string()).or_insert(0);
        *count += 1;
        *count == self.threshold
    }

    pub async fn consecutive_empty(&self, host_id: &str) -> u32 {
        self.counts.read().await.get(host_id).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fires_exactly_on_the_nth_consecutive_empty_payload() {
        let tracker = SysmonStallTracker::new(3);

        assert!(!tracker.record("host1", true).await);
        assert!(!tracker.record("host1", true).await);
        assert!(tracker.record("host1", true).await, "third consecutive empty payload fires");
        assert!(!tracker.record("host1", true).await, "does not re-fire every subsequent payload");
    }

    #[tokio::test]
    async fn non_empty_payload_resets_the_streak() {
        let tracker = SysmonStallTracker::new(2);

        assert!(!tracker.record("host1", true).await);
        assert!(!tracker.record("host1", false).await);
        assert_eq!(tracker.consecutive_empty("host1").await, 0);
        assert!(!tracker.record("host1", true).await, "streak restarted");
    }

    #[tokio::test]
    async fn empty_host_id_is_ignored() {
        let tracker = SysmonStallTracker::new(1);
        assert!(!tracker.record("", true).await);
    }
}
