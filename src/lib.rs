//! Consumer-side pipeline for a real-time vote tallying system.
//!
//! Votes arrive on an ingress log topic, get deduplicated and tallied against an external store,
//! and the resulting tallies fan out to WebSocket subscribers. Anything the Vote Processor
//! rejects (a duplicate, a frame that won't decode, a store error) is routed to a dead-letter
//! topic instead of being dropped.

pub mod config;
pub mod deadletter;
pub mod hub;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod processing;
pub mod store;
