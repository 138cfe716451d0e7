//! Alert cooldown tracking shared by the liveness evaluator and the
//! stats aggregator's anomaly alert.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serviceradar_common::{CoreError, Result};

/// Tracks the last-fired timestamp per `(poller_id, title, service_name)`
/// key and suppresses repeats within `cooldown`. `cooldown = 0` disables
/// suppression entirely.
pub struct CooldownTracker {
    cooldown: Duration,
    last_fired: Mutex<HashMap<(String, String, String), i64>>,
}

impl CooldownTracker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_fired: Mutex::new(HashMap::new()),
        }
    }

    /// Check the cooldown for `(poller_id, title, service_name)` at time
    /// `now` (millis). On success the key's timestamp is recorded and
    /// `Ok(())` is returned; on suppression, a sentinel error is returned
    /// and no state changes.
    pub fn check(&self, poller_id: &str, title: &str, service_name: &str, now: i64) -> Result<()> {
        if self.cooldown.is_zero() {
            return Ok(());
        }

        let key = (poller_id.to_string(), title.to_string(), service_name.to_string());
        let mut last_fired = self.last_fired.lock().expect("cooldown lock poisoned");

        if let Some(&fired_at) = last_fired.get(&key) {
            let elapsed_ms = now.saturating_sub(fired_at);
            if elapsed_ms >= 0 && (elapsed_ms as u128) < self.cooldown.as_millis() {
                return Err(CoreError::AlertCooldown {
                    poller_id: key.0,
                    title: key.1,
                    service: key.2,
                });
            }
        }

        last_fired.insert(key, now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_alert_within_window_is_suppressed() {
        let tracker = CooldownTracker::new(Duration::from_secs(60));
        assert!(tracker.check("p1", "Poller Offline", "", 0).is_ok());
        let err = tracker.check("p1", "Poller Offline", "", 30_000).unwrap_err();
        assert!(err.is_cooldown());
    }

    #[test]
    fn alert_after_window_elapses_fires_again() {
        let tracker = CooldownTracker::new(Duration::from_secs(60));
        assert!(tracker.check("p1", "Poller Offline", "", 0).is_ok());
        assert!(tracker.check("p1", "Poller Offline", "", 60_001).is_ok());
    }

    #[test]
    fn zero_cooldown_never_suppresses() {
        let tracker = CooldownTracker::new(Duration::ZERO);
        assert!(tracker.check("p1", "Poller Offline", "", 0).is_ok());
        assert!(tracker.check("p1", "Poller Offline", "", 0).is_ok());
    }

    #[test]
    fn distinct_keys_do_not_interfere() {
        let tracker = CooldownTracker::new(Duration::from_secs(60));
        assert!(tracker.check("p1", "Poller Offline", "", 0).is_ok());
        assert!(tracker.check("p1", "Service Down", "ping", 0).is_ok());
        assert!(tracker.check("p2", "Poller Offline", "", 0).is_ok());
    }
}
