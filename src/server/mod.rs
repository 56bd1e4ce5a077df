mod error;
mod resources;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use eyre::{Context, Result};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::api_resolver::ApiResolver;
use crate::config::Config;
use crate::discovery::DiscoveryCache;
use crate::render::ChartRenderer;
use crate::server::resources::resources_handler;
use crate::service_registry::ServiceRegistry;
use crate::shutdown::Shutdown;
use crate::spawn_service::spawn_service;

pub use crate::server::error::ApiError;

/// Start the HTTP API serving `/resources` and `/healthz`.
pub async fn start_server(
    api_resolver: &ApiResolver,
    discovery: &DiscoveryCache,
    renderer: Arc<dyn ChartRenderer>,
    config: &Config,
    service_registry: &ServiceRegistry,
    shutdown: &Shutdown,
) -> Result<SocketAddr> {
    let app = router(AppState {
        api_resolver: api_resolver.clone(),
        discovery: discovery.clone(),
        renderer,
        service_registry: service_registry.clone(),
        krateo_namespace: config.krateo_namespace.clone(),
    });

    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.port))
        .await
        .with_context(|| format!("unable to bind port {}", config.port))?;
    let local_addr = listener.local_addr()?;
    info!("listening {}", local_addr);

    let signal = service_registry.register("server");
    spawn_service(shutdown, "server", {
        let shutdown = shutdown.clone();

        async move {
            signal.ready();
            let server = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.wait_shutdown_triggered());
            if let Err(err) = server.await {
                error!(%err, "server stopped");
            }
        }
    })?;

    Ok(local_addr)
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub api_resolver: ApiResolver,
    pub discovery: DiscoveryCache,
    pub renderer: Arc<dyn ChartRenderer>,
    pub service_registry: ServiceRegistry,
    pub krateo_namespace: String,
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/resources", get(resources_handler))
        .with_state(state)
}

async fn healthz_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let not_ready = state.service_registry.get_not_ready_services();
    let status_code = if not_ready.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(json!({ "not_ready": not_ready })))
}
