//! HTTP Gateway
//!
//! Maps routes to orchestrator use cases and `TransferError` to status codes.

pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

use std::future::Future;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::ServerConfig;
use state::AppState;

/// Build the complete router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/live", get(handlers::live))
        .route("/info", get(handlers::info))
        .route("/get/{id}", get(handlers::get_transfer))
        .route("/add/transfer", post(handlers::add_transfer))
        .route("/add/transferEvent", post(handlers::add_transfer_event))
        .route("/creditTransferEvent", post(handlers::credit_transfer_event))
        .route("/debitTransferEvent", post(handlers::debit_transfer_event))
        .route("/transfer", post(handlers::transfer))
        .with_state(state)
        // Stateless, added after with_state
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` resolves, then drain in-flight requests.
pub async fn run_server<F>(
    config: &ServerConfig,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;

    info!(addr = %addr, "Gateway listening");
    info!(docs = %format!("http://{}/docs", addr), "API docs");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
