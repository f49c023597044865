//! API Server

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::config::ApiConfig;
use crate::errors::{BingoResult, ConfigurationError};
use crate::services::BingoService;
use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

pub struct ApiServer {
    config: ApiConfig,
    service: Arc<BingoService>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, service: Arc<BingoService>) -> Self {
        Self { config, service }
    }

    /// Serve until `shutdown` resolves, then finish in-flight requests
    pub async fn run<F>(self, shutdown: F) -> BingoResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.create_app();
        let addr = self.get_socket_addr()?;

        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            ConfigurationError::InvalidValue {
                field: "api.port".to_string(),
                value: addr.to_string(),
                reason: e.to_string(),
            }
        })?;

        info!(%addr, origins = ?self.config.allowed_origins, "Bingo API listening");

        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
            warn!(error = %e, "API server terminated with error");
        }

        info!("API server stopped");
        Ok(())
    }

    /// Router with the middleware stack applied
    pub fn create_app(&self) -> axum::Router {
        build_app(Arc::clone(&self.service), &self.config)
    }

    fn get_socket_addr(&self) -> Result<SocketAddr, ConfigurationError> {
        let ip = self
            .config
            .host
            .parse::<std::net::IpAddr>()
            .map_err(|e| ConfigurationError::InvalidValue {
                field: "api.host".to_string(),
                value: self.config.host.clone(),
                reason: e.to_string(),
            })?;
        Ok(SocketAddr::from((ip, self.config.port)))
    }
}

pub fn build_app(service: Arc<BingoService>, config: &ApiConfig) -> axum::Router {
    let state = Arc::new(AppState::new(service));

    create_router(state)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(create_cors_layer(config.allowed_origins.clone()))
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(TraceLayer::new_for_http())
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
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
