use std::sync::Arc;

use anyhow::Context;
use axum::extract::Request;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::error::Error;
use super::{cors, events, healthz, ingest};
use crate::runtime_config::RuntimeConfig;
use crate::sse;
use crate::store::EventStore;

/// The long-lived values every handler needs, wired explicitly through the
/// router state instead of living in module-level globals.
#[derive(Debug, Clone)]
pub struct Deps {
    pub store: Arc<EventStore>,
    pub sse: sse::Manager,
}

impl Deps {
    /// Builds the store and stream manager from the runtime configuration.
    /// Must be called from within a tokio runtime.
    pub fn new(cfg: &RuntimeConfig) -> Self {
        Self {
            store: Arc::new(EventStore::new(cfg.max_events)),
            sse: sse::Manager::new(cfg.queue_capacity),
        }
    }
}

pub fn router(deps: Deps, cors_origin: &str) -> Router {
    Router::new()
        .route("/", get(healthz::index))
        .route("/healthz", get(healthz::healthz))
        .route("/ingest", post(ingest::ingest))
        .route("/events", get(events::events))
        .fallback(not_found)
        .layer(cors::layer(cors_origin))
        .with_state(deps)
}

async fn not_found(req: Request) -> Error {
    Error::not_found(format!("no such endpoint: {}", req.uri().path()))
}

/// Serves the API on an already-bound listener until the token is
/// cancelled, then closes every live subscription.
pub async fn serve(
    listener: TcpListener,
    deps: Deps,
    cors_origin: String,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let streams = deps.sse.clone();
    let addr = listener
        .local_addr()
        .context("failed to read listener address")?
        .to_string();
    let app = router(deps, &cors_origin);

    log::info!(addr = addr.as_str(); "ariadne listening");
    axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                shutdown.cancelled().await;
                // Open SSE responses only end once their subscriptions are
                // closed, and the graceful shutdown waits for every open
                // response. Close them first.
                streams.shutdown();
            }
        })
        .await
        .context("server error")?;

    log::info!("ariadne stopped");
    Ok(())
}
