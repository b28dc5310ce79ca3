//! API route definitions.

use axum::http::{Method, header};
use axum::{Router, routing::get};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::ws;

use super::handlers;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Tracing layer with request timing
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // The gateway fronts a local chat UI; keep CORS permissive for reads.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/read", get(handlers::read_file))
        .route("/api/download", get(handlers::download_report))
        .route("/api/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(cors)
        .layer(trace_layer)
}
