//! Ad Provisioning API Library
//!
//! Creates a campaign, ad set, ad creative and ad on the Meta Graph API in one
//! request, threading each created id into the next step, with bounded retry
//! around every remote call.
//!
//! # Modules
//!
//! - `api`: HTTP-facing namespace.
//! - `core`: Provisioning domain namespace.
//! - `integrations`: External service integrations.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `graph_client`: Remote resource client for the Graph API.
//! - `handlers`: HTTP request handlers.
//! - `models`: Request, reference and payload types.
//! - `pipeline`: The ordered creation chain.
//! - `retry`: Fixed-delay retry policy.
//! - `validation`: Inbound request validation.

pub mod api;
pub mod core;
pub mod integrations;

pub mod config;
pub mod errors;
pub mod graph_client;
pub mod handlers;
pub mod models;
pub mod pipeline;
pub mod retry;
pub mod validation;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::handlers::AppState;

/// Largest accepted `POST /create-ad` body.
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Builds the application router.
///
/// With `rate_limit` set, `/create-ad` is limited to 10 req/s per client IP
/// (burst 20). The server must then be started with connect info so the
/// limiter can fall back to the peer address.
pub fn create_router(state: Arc<AppState>, rate_limit: bool) -> anyhow::Result<Router> {
    let provisioning_routes = Router::new()
        .route("/create-ad", post(handlers::create_ad))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BYTES));

    let provisioning_routes = if rate_limit {
        let governor_conf = Arc::new(
            GovernorConfigBuilder::default()
                .per_second(10)
                .burst_size(20)
                .key_extractor(SmartIpKeyExtractor)
                .finish()
                .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
        );
        provisioning_routes.layer(ServiceBuilder::new().layer(GovernorLayer {
            config: governor_conf,
        }))
    } else {
        provisioning_routes
    };

    Ok(Router::new()
        .route("/", get(handlers::form_page))
        .route("/health", get(handlers::health))
        .route("/docs", get(handlers::serve_swagger_ui))
        .route("/api-docs/openapi.yml", get(handlers::serve_openapi_spec))
        .merge(provisioning_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()))
}
