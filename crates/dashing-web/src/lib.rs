//! Dashing Web Server
//!
//! Axum-based server for dashboards, widget fragments, event ingestion and
//! the Server-Sent Events stream.

pub mod error;
pub mod routes;
pub mod state;
pub mod stream;

use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub use error::ApiError;
pub use state::AppState;

/// Create the application router.
///
/// Applications add their own routes with [`Router::merge`].
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public = ServeDir::new(state.webroot().join("public"));

    Router::new()
        .route("/", get(routes::pages::index))
        .route("/events", get(stream::events_handler))
        .route("/healthz", get(routes::health::healthz))
        .route("/{dashboard}", get(routes::pages::dashboard))
        .route("/dashboards/{id}", post(routes::ingest::dashboard_event))
        .route("/views/{widget}", get(routes::pages::widget))
        .route("/widgets/{id}", post(routes::ingest::widget_event))
        .nest_service("/public", public)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Run the web server until `shutdown` resolves.
pub async fn run_server(
    state: AppState,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Web server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
