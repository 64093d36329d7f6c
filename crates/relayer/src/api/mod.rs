//! HTTP routes: liveness, WebSocket upgrade, stats, session check.

mod routes;

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::config::Config;
use crate::relay::Hub;

/// Shared app state.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub config: Arc<Config>,
}

pub fn router(state: AppState) -> Router {
    // Browser peers connect from any origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let session_routes = Router::new()
        .route("/me", get(routes::me))
        .route_layer(middleware::from_fn_with_state(
            state.config.clone(),
            auth::require_session,
        ));

    Router::new()
        .route("/", get(liveness))
        .route(shared::WS_PATH, get(routes::ws_handler))
        .route("/stats", get(routes::stats))
        .nest("/auth", session_routes)
        .layer(TimeoutLayer::new(state.config.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn liveness() -> &'static str {
    shared::LIVENESS_MESSAGE
}
