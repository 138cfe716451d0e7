//! The canonical-hydration seam between the sweep decoder and the
//! canonical-ID resolver's alias cache. Kept in `serviceradar-common`
//! so the decode crate can depend on the trait alone without depending on
//! the registry crate that implements it.

use std::collections::HashMap;

/// The subset of a datastore-resident [`crate::model::UnifiedDevice`] the
/// sweep decoder needs to hydrate a provisional record with an existing
/// strong identity.
#[derive(Debug, Clone)]
pub struct HydratedAlias {
    pub device_id: String,
    pub mac: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Looks up canonical identity for an IP, fronted by a TTL cache.
/// A negative miss (no datastore hit) is never cached.
#[allow(async_fn_in_trait)]
pub trait CanonicalHydrator: Send + Sync {
    /// Hydrate a single IP.
    async fn hydrate(&self, ip: &str) -> Option<HydratedAlias>;

    /// Hydrate a batch of IPs in one round trip where possible.
    async fn hydrate_batch(&self, ips: &[String]) -> HashMap<String, HydratedAlias> {
        let mut out = HashMap::new();
        for ip in ips {
            if let Some(alias) = self.hydrate(ip).await {
                out.insert(ip.clone(), alias);
            }
        }
        out
    }
}

/// A [`CanonicalHydrator`] that never hydrates anything — the default for
/// callers that don't have a registry wired up (e.g. narrow unit tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHydrator;

impl CanonicalHydrator for NoopHydrator {
    async fn hydrate(&self, _ip: &str) -> Option<HydratedAlias> {
        None
    }
}
