mod cors;
mod error;
mod events;
mod healthz;
mod ingest;
mod server;

pub use error::*;
pub use ingest::MAX_BODY_BYTES;
pub use server::*;
