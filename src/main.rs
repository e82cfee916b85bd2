use std::net::SocketAddr;

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::info;

use rag_gateway::config::Settings;
use rag_gateway::handlers;
use rag_gateway::logging::init_logger;
use rag_gateway::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    init_logger()?;

    info!("starting rag gateway");

    let settings = Settings::load()?;
    info!("configuration loaded");

    let max_upload_bytes = settings.server.max_upload_bytes;
    let host = settings.server.host.clone();
    let port = settings.server.port;

    let state = AppState::new(settings);

    let app = build_router(state).layer(DefaultBodyLimit::max(max_upload_bytes as usize));

    let addr = SocketAddr::from((host.parse::<std::net::IpAddr>()?, port));
    info!(%addr, "server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/chat/completions", post(handlers::chat_completions))
        .route("/api/v1/files", post(handlers::upload_files))
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/status", get(handlers::status))
        .route("/api/v1/metrics", get(handlers::metrics))
        .layer(
            TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}
