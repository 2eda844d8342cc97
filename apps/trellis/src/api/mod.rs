//! # Trellis HTTP API Module
//!
//! This module implements the JSON:API surface using axum. Routes are
//! generic: `{collection}` is the path segment of any registered resource
//! type (`User` is served under `/users`).
//!
//! ## Endpoints
//!
//! - `GET /{collection}` - List resources (index)
//! - `POST /{collection}` - Create a resource
//! - `GET /{collection}/{id}` - Fetch one resource
//! - `PATCH /{collection}/{id}` - Update a resource's attributes
//! - `DELETE /{collection}/{id}` - Delete a resource
//! - `PATCH /{collection}/{id}/relationships/{name}` - Replace related resources
//! - `POST /{collection}/{id}/relationships/{name}` - Add related resources
//! - `DELETE /{collection}/{id}/relationships/{name}` - Remove related resources
//! - `GET /health` - Health check
//!
//! ## Configuration (Environment Variables)
//!
//! - `TRELLIS_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `TRELLIS_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)

mod error;
mod handlers;
mod middleware;
mod types;

pub use error::ApiError;
pub use middleware::{create_rate_limiter, get_rate_limit_from_env};
pub use handlers::{
    add_relationship_handler, create_handler, delete_handler, get_handler, health_handler,
    index_handler, remove_relationship_handler, replace_relationship_handler, update_handler,
};
pub use types::{HealthResponse, INVALID_INPUT, RelationshipBody, ResourceBody};

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, patch},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use trellis_core::{Capability, DynBackend, JsonApi, TrellisError};

/// Default request body limit: 2 MiB.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state: the engine and the request body limit.
#[derive(Clone, Debug)]
pub struct AppState {
    /// The engine serving every route.
    pub api: JsonApi,
    /// Maximum accepted request body, in bytes.
    pub body_limit: usize,
}

impl AppState {
    /// Create app state around an engine.
    #[must_use]
    pub fn new(api: JsonApi) -> Self {
        Self {
            api,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Override the request body limit.
    #[must_use]
    pub fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }

    /// The backend serving a collection path segment, checked for `capability`.
    ///
    /// Unknown segments are `NotFound`; a backend lacking the capability
    /// yields `UnsupportedCapability`.
    pub fn backend(
        &self,
        collection: &str,
        capability: Capability,
    ) -> Result<Arc<dyn DynBackend>, TrellisError> {
        let resource_type = self
            .api
            .registry()
            .lookup_path(collection)
            .ok_or_else(|| {
                TrellisError::not_found(
                    "Resource type not found",
                    format!("No resource type is served at /{}", collection),
                )
            })?;
        let backend = self.api.backend(resource_type)?;

        if !backend.capabilities().supports(capability) {
            return Err(TrellisError::UnsupportedCapability {
                resource_type: resource_type.to_string(),
                capability,
            });
        }
        Ok(backend)
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

const CORS_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
];

/// Build CORS layer from environment configuration.
///
/// Reads `TRELLIS_CORS_ORIGINS`:
/// - If "*": allows all origins
/// - If not set: localhost only
/// - Otherwise: a comma-separated list of allowed origins
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("TRELLIS_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (TRELLIS_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in TRELLIS_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods(CORS_METHODS)
                    .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
            }
        }
        None => {
            tracing::info!("CORS: No TRELLIS_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|origin| origin.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(CORS_METHODS)
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Body limit
/// 4. Rate Limiting - if enabled
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer();
    let body_limit = state.body_limit;

    let rate_limit = get_rate_limit_from_env();
    let rate_limiter = if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route(
            "/{collection}",
            get(handlers::index_handler).post(handlers::create_handler),
        )
        .route(
            "/{collection}/{id}",
            get(handlers::get_handler)
                .patch(handlers::update_handler)
                .delete(handlers::delete_handler),
        )
        .route(
            "/{collection}/{id}/relationships/{relationship}",
            patch(handlers::replace_relationship_handler)
                .post(handlers::add_relationship_handler)
                .delete(handlers::remove_relationship_handler),
        );

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(addr: &str, state: AppState) -> Result<(), TrellisError> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| TrellisError::Io(format!("Bind failed: {}", e)))?;

    tracing::info!("Trellis HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| TrellisError::Io(format!("Server error: {}", e)))
}
