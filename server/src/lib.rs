//! Ariadne: a local-first observability backend for agent-framework
//! telemetry.
//!
//! Agent processes POST trace and span events to `/ingest`; viewers
//! subscribe to `/events` and receive every accepted event as a live SSE
//! stream, in arrival order, with per-subscriber filtering and drop-oldest
//! backpressure. The most recent events are kept in a bounded in-memory
//! buffer; nothing is persisted.

pub mod api;
pub mod ingest;
pub mod model;
pub mod runtime_config;
pub mod sse;
pub mod store;
