// Gateway entry point: configuration, observability, the HTTP/WebSocket
// listener, and graceful shutdown sequencing.
use anyhow::{Context, Result};
use gateway::app::{AppState, build_router};
use gateway::config::GatewayConfig;
use gateway::observability;
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<()> {
    let metrics_handle = observability::init_observability();
    let config = GatewayConfig::from_env_or_yaml().context("load gateway config")?;
    tracing::info!(
        port = config.port,
        ring_buffer = config.ring_buffer_size,
        subscriber_queue = config.subscriber_queue_size,
        auth_enabled = config.auth_enabled,
        "starting relay gateway"
    );

    let state = AppState::new(config.clone());
    let engine = state.engine.clone();

    tokio::spawn(observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(%addr, "gateway listening");

    // On signal: close engine subscribers first so in-flight frames can
    // flush within their write deadlines, then stop accepting.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let supervisor = {
        let engine = engine.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("shutdown signal received");
            engine.shutdown().await;
            let _ = shutdown_tx.send(());
        })
    };

    let server = async move {
        axum::serve(listener, build_router(state).into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
    };

    let shutdown_timeout = config.shutdown_timeout;
    tokio::select! {
        result = server => {
            result.context("server error")?;
        }
        _ = async {
            let _ = supervisor.await;
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            tracing::warn!("graceful shutdown window elapsed; exiting");
        }
    }

    tracing::info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install ctrl-c handler");
    };
    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install sigterm handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
