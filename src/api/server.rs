use crate::api::routes;
use crate::app::App;
use crate::cli::ServeOpts;
use crate::config::Config;

use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::info;

/// Shared state for the API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub app: App,
    pub start_time: std::time::Instant,
    pub version: String,
}

impl ApiState {
    pub fn new(app: App) -> Self {
        Self {
            app,
            start_time: std::time::Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// The HTTP API server.
pub struct ApiServer {
    state: ApiState,
    listener: TcpListener,
    cors_origins: Vec<String>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ApiServer {
    /// Open the notepad and bind the listening socket. CLI options win over
    /// the configured host and port.
    pub async fn start(config: Config, opts: &ServeOpts) -> Result<Self> {
        let host = opts.host.clone().unwrap_or_else(|| config.server.host.clone());
        let port = opts.port.unwrap_or(config.server.port);

        let app = App::open(&config)?;
        let listener = TcpListener::bind((host.as_str(), port))
            .await
            .with_context(|| format!("Failed to bind {host}:{port}"))?;

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            state: ApiState::new(app),
            listener,
            cors_origins: config.server.cors_origins,
            shutdown_tx,
        })
    }

    /// Run the server until shutdown signal is received.
    pub async fn run_until_shutdown(self) -> Result<()> {
        let addr = self.addr()?;
        let app = build_router(self.state.clone(), &self.cors_origins);

        info!("LLM Notepad API v{} listening on http://{}", self.state.version, addr);
        info!("  Health: http://{}/health", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let signal_tx = self.shutdown_tx.clone();
        tokio::spawn(shutdown_signal(signal_tx));

        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        info!("API server shut down gracefully");
        Ok(())
    }

    /// Get the bound server address.
    pub fn addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle that triggers graceful shutdown when sent to.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: ApiState, cors_origins: &[String]) -> Router {
    routes::build_routes(state, cors_origins)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }

    let _ = shutdown_tx.send(());
}
