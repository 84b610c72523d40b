use tokio::net::TcpListener;
use tracing::info;

use crate::{AppState, app, config::ServeConfig, db::Store};

/// Runs the HTTP + WebSocket server until Ctrl-C.
pub async fn serve(config: &ServeConfig, store: Store) -> anyhow::Result<()> {
    let app = app(AppState::new(store), config.cors()?);

    let listener = TcpListener::bind(config.bind).await?;
    info!(addr = %listener.local_addr()?, origins = ?config.cors_origins, "roomcast listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("roomcast stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
