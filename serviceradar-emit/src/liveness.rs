//! Poller liveness tracking and offline/recovery alerting.
//!
//! A reader-writer lock over a `HashMap`: read on evaluation, write on
//! update.

use std::collections::HashMap;

use tokio::sync::RwLock;

use serviceradar_common::{AlertLevel, AlertSink, PollerStatus, Result, WebhookAlert};

use crate::buffer::BufferedEmitter;
use crate::cooldown::CooldownTracker;

/// Tracks per-poller health in memory and emits webhook alerts on
/// offline/recovery transitions, subject to a shared cooldown.
pub struct LivenessTracker {
    cache: RwLock<HashMap<String, PollerStatus>>,
    alert_threshold_millis: i64,
    cooldown: CooldownTracker,
    known_pollers: Vec<String>,
}

impl LivenessTracker {
    pub fn new(alert_threshold: std::time::Duration, alert_cooldown: std::time::Duration, known_pollers: Vec<String>) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            alert_threshold_millis: alert_threshold.as_millis() as i64,
            cooldown: CooldownTracker::new(alert_cooldown),
            known_pollers,
        }
    }

    /// True when an allow-list is configured and `poller_id` is absent from
    /// it. Unknown pollers are still acknowledged by the RPC facade but get
    /// no liveness bookkeeping.
    pub fn is_unknown(&self, poller_id: &str) -> bool {
        !self.known_pollers.is_empty() && !self.known_pollers.iter().any(|p| p == poller_id)
    }

    /// Refresh the cache for `poller_id` and enqueue a status write
    ///. No-op bookkeeping for unknown pollers.
    pub async fn record_report(&self, poller_id: &str, now: i64, emitter: &BufferedEmitter) {
        if self.is_unknown(poller_id) {
            return;
        }

        let mut cache = self.cache.write().await;
        let entry = cache.entry(poller_id.to_string()).or_insert(PollerStatus {
            is_healthy: true,
            first_seen: now,
            last_seen: now,
        });
        entry.is_healthy = true;
        entry.last_seen = now;
        let snapshot = *entry;
        drop(cache);

        emitter.buffer_poller_status(poller_id, snapshot);
    }

    /// One periodic evaluator sweep: transitions any poller silent past
    /// `alert_threshold` to offline and fires "Poller Offline"; recovery is
    /// fired from [`record_report`]'s caller via [`mark_recovered_if_needed`].
    pub async fn evaluate<A: AlertSink>(&self, now: i64, emitter: &BufferedEmitter, alerts: &A) {
        let offline_pollers: Vec<String> = {
            let cache = self.cache.read().await;
            cache
                .iter()
                .filter(|(_, status)| status.is_healthy && now - status.last_seen > self.alert_threshold_millis)
                .map(|(poller_id, _)| poller_id.clone())
                .collect()
        };

        for poller_id in offline_pollers {
            {
                let mut cache = self.cache.write().await;
                if let Some(status) = cache.get_mut(&poller_id) {
                    status.is_healthy = false;
                    emitter.buffer_poller_status(&poller_id, *status);
                }
            }

            self.fire_alert(&poller_id, "Poller Offline", "", AlertLevel::Critical, now, alerts)
                .await;
        }
    }

    /// Called by the RPC facade when a report arrives for a poller that was
    /// previously marked offline — fires "Poller Recovery".
    pub async fn mark_recovered_if_needed<A: AlertSink>(&self, poller_id: &str, now: i64, alerts: &A) {
        let was_offline = {
            let cache = self.cache.read().await;
            cache.get(poller_id).is_some_and(|s| !s.is_healthy)
        };

        if was_offline {
            self.fire_alert(poller_id, "Poller Recovery", "", AlertLevel::Info, now, alerts)
                .await;
        }
    }

    async fn fire_alert<A: AlertSink>(
        &self,
        poller_id: &str,
        title: &str,
        service_name: &str,
        level: AlertLevel,
        now: i64,
        alerts: &A,
    ) {
        if let Err(e) = self.cooldown.check(poller_id, title, service_name, now) {
            tracing::debug!(%poller_id, %title, "alert suppressed by cooldown: {e}");
            return;
        }

        let alert = WebhookAlert::new(level, title, format!("{title} for poller {poller_id}"), poller_id, now)
            .with_service_name(service_name);

        if let Err(e) = alerts.alert(alert).await {
            if !e.is_cooldown() {
                tracing::warn!(%poller_id, %title, error = %e, "failed to deliver alert");
            }
        }
    }

    pub async fn status(&self, poller_id: &str) -> Option<PollerStatus> {
        self.cache.read().await.get(poller_id).copied()
    }
}

/// No-op result alias kept for call sites that don't need the cooldown
/// sentinel surfaced.
pub type AlertResult = Result<()>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        fired: Mutex<Vec<String>>,
    }

    #[allow(async_fn_in_trait)]
    impl AlertSink for RecordingSink {
        async fn alert(&self, alert: WebhookAlert) -> Result<()> {
            self.fired.lock().unwrap().push(alert.title);
            Ok(())
        }
    }

    #[tokio::test]
    async fn healthy_poller_within_threshold_does_not_fire() {
        let tracker = LivenessTracker::new(Duration::from_secs(300), Duration::from_secs(60), vec![]);
        let emitter = BufferedEmitter::new();
        let sink = RecordingSink::default();

        tracker.record_report("p1", 0, &emitter).await;
        tracker.evaluate(60_000, &emitter, &sink).await;

        assert!(sink.fired.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn silent_poller_past_threshold_fires_offline_once() {
        let tracker = LivenessTracker::new(Duration::from_secs(300), Duration::from_secs(60), vec![]);
        let emitter = BufferedEmitter::new();
        let sink = RecordingSink::default();

        tracker.record_report("p1", 0, &emitter).await;
        tracker.evaluate(360_000, &emitter, &sink).await;
        tracker.evaluate(370_000, &emitter, &sink).await;

        let fired = sink.fired.lock().unwrap();
        assert_eq!(fired.as_slice(), ["Poller Offline"]);
    }

    #[tokio::test]
    async fn recovery_fires_after_offline_report() {
        let tracker = LivenessTracker::new(Duration::from_secs(300), Duration::from_secs(60), vec![]);
        let emitter = BufferedEmitter::new();
        let sink = RecordingSink::default();

        tracker.record_report("p1", 0, &emitter).await;
        tracker.evaluate(360_000, &emitter, &sink).await;
        tracker.mark_recovered_if_needed("p1", 420_000, &sink).await;
        tracker.record_report("p1", 420_000, &emitter).await;

        let fired = sink.fired.lock().unwrap();
        assert_eq!(fired.as_slice(), ["Poller Offline", "Poller Recovery"]);
    }

    #[tokio::test]
    async fn unknown_poller_gets_no_bookkeeping() {
        let tracker = LivenessTracker::new(Duration::from_secs(300), Duration::from_secs(60), vec!["p1".to_string()]);
        let emitter = BufferedEmitter::new();

        assert!(tracker.is_unknown("p2"));
        tracker.record_report("p2", 0, &emitter).await;
        assert!(tracker.status("p2").await.is_none());
    }
}
