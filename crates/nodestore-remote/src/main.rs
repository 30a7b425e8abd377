use std::sync::Arc;

use clap::Parser;
use nodestore_core::Store;
use nodestore_remote::config::RemoteConfig;
use nodestore_remote::manager::RemoteManager;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::error;

#[tokio::main]
async fn main() {
    let config = RemoteConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn run(config: RemoteConfig) -> anyhow::Result<()> {
    let addr = config.bind_addr();
    let shutdown = CancellationToken::new();

    let store = Store::new(config.store.clone());
    store.spawn_cleaner();

    let manager = RemoteManager::new(Arc::clone(&store), config.reconnect_timeout(), config.pick_deadline());

    let router = nodestore_remote::http::build_router(Arc::clone(&manager));
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!(addr = %addr, "nodestore-remote listening");

    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        shutdown_signal.cancel();
    });

    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}
