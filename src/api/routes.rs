//! REST API routes configuration

use crate::api::handlers::{self, ApiState};
use crate::api::websocket::ws_handler;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

/// Create the API router with all routes
pub fn create_router(state: ApiState) -> Router {
    // Configure CORS for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // WebSocket for real-time updates
        .route("/ws", get(ws_handler))
        // Registries
        .route("/api/registries", post(handlers::create_registry))
        .route(
            "/api/registries/{address}/wallets",
            post(handlers::create_wallet),
        )
        .route(
            "/api/registries/{address}/wallets/{wallet}",
            get(handlers::get_registry_wallet),
        )
        .route(
            "/api/registries/{address}/members/{member}",
            get(handlers::get_member_wallets),
        )
        // Wallets
        .route("/api/wallets/{address}", get(handlers::get_wallet))
        .route(
            "/api/wallets/{address}/submit",
            post(handlers::submit_transaction),
        )
        .route(
            "/api/wallets/{address}/confirm",
            post(handlers::confirm_transaction),
        )
        .route(
            "/api/wallets/{address}/revoke",
            post(handlers::revoke_confirmation),
        )
        .route(
            "/api/wallets/{address}/execute",
            post(handlers::execute_transaction),
        )
        .route(
            "/api/wallets/{address}/transactions",
            get(handlers::list_transactions),
        )
        .route(
            "/api/wallets/{address}/transactions/{id}",
            get(handlers::get_transaction),
        )
        // Events
        .route("/api/events", get(handlers::get_events))
        // Add state and middleware
        .with_state(state)
        .layer(cors)
}
