//! The in-memory device registry, canonical-ID resolution, and the
//! datastore-backed alias cache for the ServiceRadar ingest core.
//!
//! - [`registry`] — enrichment, canonical-ID assignment, and publish
//! - [`cache`] — TTL + LRU alias cache implementing `CanonicalHydrator`

pub mod cache;
pub mod registry;

pub use cache::AliasCache;
pub use registry::{a_wins_tiebreak, now, CollectorCapabilities, DeviceRecord, DeviceRegistry};
