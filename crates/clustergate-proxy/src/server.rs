//! Proxy server

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{any, get};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tracing::info;

use crate::access::ClusterAccess;
use crate::api_router::ApiRouter;
use crate::error::Error;
use crate::proxy::{logconfig_handler, proxy_handler};

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind the server
    pub addr: SocketAddr,
    /// TLS certificate and key PEM; plain HTTP when absent
    pub tls: Option<(Vec<u8>, Vec<u8>)>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("addr", &self.addr)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    /// Cluster resolution and per-identity connections
    pub access: Arc<ClusterAccess>,
    /// Group/version routing table
    pub router: Arc<ApiRouter>,
}

/// Build the HTTP router
pub fn build_router(state: AppState) -> Router {
    let logconfigs = get(logconfig_handler)
        .post(logconfig_handler)
        .put(logconfig_handler)
        .patch(logconfig_handler)
        .delete(logconfig_handler)
        .options(logconfig_handler);

    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/clusters/{cluster_name}/logconfigs", logconfigs.clone())
        .route("/clusters/{cluster_name}/logconfigs/{name}", logconfigs)
        .route("/clusters/{cluster_name}/api", any(proxy_handler))
        .route("/clusters/{cluster_name}/api/{*path}", any(proxy_handler))
        .route("/clusters/{cluster_name}/apis", any(proxy_handler))
        .route("/clusters/{cluster_name}/apis/{*path}", any(proxy_handler))
        .with_state(state)
}

/// Start the proxy server
pub async fn start_server(config: ServerConfig, state: AppState) -> Result<(), Error> {
    let app = build_router(state);

    match config.tls {
        Some((cert_pem, key_pem)) => {
            let tls_config = RustlsConfig::from_pem(cert_pem, key_pem)
                .await
                .map_err(|e| Error::Internal(format!("TLS config error: {}", e)))?;

            info!(addr = %config.addr, "Starting cluster proxy over TLS");
            axum_server::bind_rustls(config.addr, tls_config)
                .serve(app.into_make_service())
                .await
                .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;
        }
        None => {
            info!(addr = %config.addr, "Starting cluster proxy without TLS");
            axum_server::bind(config.addr)
                .serve(app.into_make_service())
                .await
                .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;
        }
    }

    Ok(())
}
