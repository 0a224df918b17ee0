//! HTTP server for the session token gate.
//!
//! Three gated generation endpoints (one per product) plus the purchase
//! plumbing around them: checkout creation, payment verification, and right
//! activation. All session state rides in the signed token; the server keeps
//! nothing between requests.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod prompts;
pub mod resolver;
pub mod routes;
pub mod state;

use axum::http::header::CACHE_CONTROL;
use axum::http::HeaderValue;
use axum::routing::post;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::state::AppState;

/// Build the full router; separated from `serve` so tests can drive it with
/// `tower::ServiceExt::oneshot`.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Responses carry rotating tokens; never let an intermediary cache one.
    let no_store = SetResponseHeaderLayer::overriding(
        CACHE_CONTROL,
        HeaderValue::from_static("no-store, max-age=0"),
    );

    Router::new()
        .route("/api/diagnostic-ia", post(routes::generate::diagnostic))
        .route(
            "/api/studio-scenarios",
            post(routes::generate::studio_scenarios),
        )
        .route(
            "/api/pre-brief-board",
            post(routes::generate::pre_brief_board),
        )
        .route("/api/checkout/{product}", post(routes::checkout::create))
        .route("/api/verify", post(routes::verify::verify))
        .route("/api/activate-right", post(routes::activate::activate))
        .layer(TraceLayer::new_for_http())
        .layer(no_store)
        .layer(cors)
        .with_state(state)
}

pub async fn serve(config: Config, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(AppState::new(config));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
