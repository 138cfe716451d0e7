//! Shared types, configuration, and error handling for the ServiceRadar
//! ingest core.
//!
//! - [`model`] — the canonical data model (`DeviceUpdate`, `PollerStatusRequest`, ...)
//! - [`config`] — `CoreConfig` loading (JSON5) and tracing initialization
//! - [`error`] — the crate-wide error type
//! - [`chunked`] — permissive concatenated-JSON decoding
//! - [`db`] — the `Database` / `AlertSink` / `StatsSink` contracts
//! - [`hydrate`] — the canonical-hydration seam used by the sweep decoder

pub mod chunked;
pub mod config;
pub mod db;
pub mod error;
pub mod hydrate;
pub mod model;

pub use config::{init_tracing, CoreConfig, LogFormat, LoggingConfig};
pub use db::{AlertSink, AlertLevel, Database, StatsSink, TracingStatsSink, WebhookAlert};
pub use error::{CoreError, Result};
pub use hydrate::{CanonicalHydrator, HydratedAlias, NoopHydrator};
pub use model::*;

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
