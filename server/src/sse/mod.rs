//! Live event streaming over Server-Sent Events.
//!
//! Every ingested event is fanned out to the subscriptions that match its
//! filter. Delivery is per-subscriber and non-blocking: each subscription
//! owns a bounded queue that drops its oldest event (leaving a warning
//! comment) when a client cannot keep up.

mod filter;
mod manager;
mod subscription;

pub use filter::EventFilter;
pub use manager::{Manager, HEARTBEAT_INTERVAL};
pub use subscription::{BACKPRESSURE_COMMENT, HEARTBEAT_COMMENT};
