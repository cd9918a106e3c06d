//! API Routes
//!
//! This module organizes all HTTP endpoints for the application:
//! - `/api/auth` - Credential gate (login/logout)
//! - `/api/session` - Session view, reset, trace toggle, model selection
//! - `/api/models` - Generation-capable model listing
//! - `/api/files` - Dataset upload handling
//! - `/api/chat` - Main chat endpoint
//! - `/api/export` - PDF report download
//! - `/api/health` - Health checks

pub mod auth;
pub mod chat;
pub mod export;
pub mod files;
pub mod health;
pub mod session;

use axum::http::HeaderValue;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::models::AppState;

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let cors = build_cors(&state.config.server.cors_allowed_origins);

    Router::new()
        .merge(auth::router(state.clone()))
        .merge(session::router(state.clone()))
        .merge(files::router(state.clone()))
        .merge(chat::router(state.clone()))
        .merge(export::router(state))
        .merge(health::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
}

fn build_cors(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}
