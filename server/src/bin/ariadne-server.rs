use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use ariadne_server::api::{self, Deps};
use ariadne_server::runtime_config::RuntimeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cfg = RuntimeConfig::from_env().context("invalid configuration")?;
    let listener = TcpListener::bind((cfg.host.as_str(), cfg.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", cfg.host, cfg.port))?;

    let deps = Deps::new(&cfg);
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_err() {
                log::warn!("failed to listen for shutdown signal");
            } else {
                log::info!("shutdown signal received");
            }
            shutdown.cancel();
        }
    });

    api::serve(listener, deps, cfg.cors_origin.clone(), shutdown).await
}
