//! API Server
//!
//! Binds the router, installs the middleware stack and serves until a
//! shutdown signal arrives.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::config::ServerConfig;
use crate::errors::FruitcutResult;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

pub struct ApiServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    pub async fn run(self) -> FruitcutResult<()> {
        let addr = self.socket_addr()?;
        let app = self.create_app();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Fruit cut server listening on http://{}", addr);
        self.log_server_info();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped gracefully");
        Ok(())
    }

    /// Router with the middleware stack applied
    pub fn create_app(&self) -> axum::Router {
        // last layer is outermost: trace, timeout, cors, request id
        create_router(self.state.clone())
            .layer(axum::middleware::from_fn(request_id_middleware))
            .layer(create_cors_layer(self.config.allowed_origins.clone()))
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.request_timeout_secs,
            )))
            .layer(TraceLayer::new_for_http())
    }

    fn socket_addr(&self) -> FruitcutResult<SocketAddr> {
        let ip: std::net::IpAddr = self.config.host.parse()?;
        Ok(SocketAddr::from((ip, self.config.port)))
    }

    fn log_server_info(&self) {
        info!("CORS: {:?}", self.config.allowed_origins);
        info!("Request timeout: {}s", self.config.request_timeout_secs);
        info!("Available endpoints:");
        info!("   GET  /health     - Health check");
        info!("   GET  /ws         - Game socket (token, game_id)");
        info!("   GET  /history    - Settled wagers of a player");
        info!("   GET  /topwin     - Largest wins");
        info!("   GET  /matchdata  - Recent rounds of a player");
        info!("   GET  /metrics    - Prometheus metrics");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
