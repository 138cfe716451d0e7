//! Buffered emission, poller liveness/alerting, and stats aggregation for
//! the ServiceRadar ingest core.
//!
//! - [`buffer`] — the six per-poller buffers and their flush targets
//! - [`liveness`] — poller offline/recovery tracking
//! - [`stats`] — periodic registry snapshot + anomaly alerting
//! - [`cooldown`] — shared alert-cooldown tracker used by the liveness evaluator and the stats aggregator
//! - [`sysmon_stall`] — per-host consecutive-empty-payload stall detector

pub mod buffer;
pub mod cooldown;
pub mod liveness;
pub mod stats;
pub mod sysmon_stall;

pub use buffer::{BufferedEmitter, FlushReport};
pub use cooldown::CooldownTracker;
pub use liveness::LivenessTracker;
pub use stats::StatsAggregator;
pub use sysmon_stall::SysmonStallTracker;
