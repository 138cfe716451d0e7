//! Payload dispatch, per-service decoders, and device-update building for
//! the ServiceRadar ingest core.
//!
//! - [`dispatcher`] — envelope unwrapping + routing table
//! - [`decoders`] — one module per service type
//! - [`builder`] — `DeviceUpdate` construction rules
//! - [`classify`] — SNMP-discovered device-type classifier
//! - [`oid`] — OID config-name parsing
//! - [`json_walk`] — duck-typed JSON traversal for loosely-specified payloads

pub mod builder;
pub mod classify;
pub mod decoders;
pub mod dispatcher;
pub mod json_walk;
pub mod oid;

pub use dispatcher::{dispatch, DispatchOutcome, ReportContext, ServiceDeviceCandidate, SysmonSignal};
