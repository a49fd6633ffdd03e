use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;

use gatehouse::api::{create_router, AppState};
use gatehouse::config::Config;
use gatehouse::observability;
use gatehouse::service::Gatehouse;
use gatehouse::storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    observability::init(&config);

    // Any storage problem here is fatal: a PDP must not serve decisions
    // from a registry it could not load.
    let backend = config.storage_backend()?;
    let store = storage::connect(&backend).await?;

    let watch = store.watch();
    let service = Gatehouse::load(store, config.storage_timeout()).await?;

    if let Some(events) = watch {
        service.spawn_watcher(events);
    }

    let state = Arc::new(AppState {
        service,
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    let app = create_router(state);

    let addr: SocketAddr = config.listen_addr.parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    if config.graceful_shutdown {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        axum::serve(listener, app).await?;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on the first shutdown signal, logging which one arrived.
async fn shutdown_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");

        tokio::select! {
            _ = ctrl_c => info!("received ctrl-c, shutting down"),
            _ = terminate.recv() => info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("received ctrl-c, shutting down");
    }
}
