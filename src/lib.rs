//! account_ledger Library
//!
//! Account and balance transaction ledger. Re-exports modules for the server
//! binary and integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod handlers;
pub mod jobs;
pub mod lock;
pub mod store;

mod error;

use axum::{middleware, Router};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub use api::AppState;
pub use config::Config;
pub use domain::{Amount, AmountError, Balance, DomainError, ErrorCode, OperationContext};
pub use error::{AppError, AppResult, ErrorResponse};

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // Axum layers run in reverse order (last added = first executed):
    // request context -> logging -> handler
    let api_routes = api::create_router()
        .layer(middleware::from_fn(api::middleware::logging_middleware))
        .layer(middleware::from_fn(api::middleware::request_context_middleware));

    Router::new()
        // Health check (no request context)
        .route("/health", axum::routing::get(health_check))
        .merge(api_routes)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
