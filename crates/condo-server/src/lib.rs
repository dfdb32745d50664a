//! Lifecycle engine and HTTP surface for ClawCondos goals.

pub mod bus;
pub mod driver;
pub mod engine;
pub mod error;
pub mod routes;
pub mod spawner;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: state::AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/events", get(routes::events::sse_events))
        .route("/api/rpc", post(routes::rpc::rpc))
        .route("/api/condos", get(routes::goals::list_condos))
        .route("/api/goals", get(routes::goals::list_goals))
        .route("/api/goals/{id}", get(routes::goals::get_goal))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Open the project at `root`, start the cascade driver and serve until the
/// listener fails.
pub async fn serve(root: PathBuf, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    serve_on(root, listener).await
}

/// Like [`serve`], on a pre-bound listener (port 0 lets the OS pick).
pub async fn serve_on(root: PathBuf, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let app_state = state::AppState::open(root)?;
    let tick = Duration::from_millis(app_state.engine.lifecycle().cascade_tick_ms);
    let driver = driver::spawn_cascade_driver(app_state.engine.clone(), tick);

    let port = listener.local_addr()?.port();
    tracing::info!("condo server listening on http://localhost:{port}");

    let result = axum::serve(listener, build_router(app_state)).await;
    driver.abort();
    result?;
    Ok(())
}
