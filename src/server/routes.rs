//! Router configuration for Snap Vault.
//!
//! This module defines the HTTP routes and applies middleware for request
//! traces, authentication, body limits and CORS.
//!
//! # Route Structure
//!
//! ```text
//! /v1/healthcheck                        - Health check (public)
//! /v1/public/images                      - Published images (public)
//! /v1/public/images/{id}                 - One published image (public)
//! /v1/public/images/{id}/download        - Published payload (public)
//! /v1/public/galleries/{id}/images       - Images of a published gallery (public)
//! /v1/galleries/{id}/images              - List / upload (owner)
//! /v1/images/{id}                        - Show / update / delete (owner)
//! /v1/images/{id}/download               - Payload (owner)
//! ```
//!
//! # Middleware Order
//!
//! Outermost first: CORS, `trace_requests`, `authenticate`, body limit,
//! then `require_auth` on owner routes only.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use snap_vault::media::MediaService;
//! use snap_vault::server::routes::{create_router, RouterConfig};
//! use snap_vault::store::LocalStore;
//!
//! let store = Arc::new(LocalStore::open("./data/images").await?);
//! let media = MediaService::new(store.clone(), store);
//!
//! let config = RouterConfig::new("my-secret-key")
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//! let router = create_router(media, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:4000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{middleware, routing::get, Router};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::auth::{authenticate, require_auth, TokenAuth};
use super::context::trace_requests;
use super::handlers::{
    delete_image_handler, download_image_handler, download_public_image_handler,
    get_image_handler, get_public_image_handler, health_handler, insert_image_handler,
    list_gallery_images_handler, list_public_gallery_images_handler, list_public_images_handler,
    method_not_allowed_handler, not_found_handler, update_image_handler, AppState,
};
use crate::media::MediaService;
use crate::store::{GalleryStore, ImageStore};

/// Default upload size limit (20 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Clone)]
pub struct RouterConfig {
    /// Secret key for bearer token verification
    pub auth_secret: String,

    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Largest accepted request body in bytes
    pub max_upload_bytes: usize,

    /// Whether to enable tower-http request tracing
    pub enable_tracing: bool,
}

impl RouterConfig {
    /// Create a new router configuration with the given auth secret.
    ///
    /// By default CORS allows any origin, uploads are capped at 20 MiB and
    /// tracing is enabled.
    pub fn new(auth_secret: impl Into<String>) -> Self {
        Self {
            auth_secret: auth_secret.into(),
            cors_origins: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            enable_tracing: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    pub fn with_max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
pub fn create_router<I, G>(media: MediaService<I, G>, config: RouterConfig) -> Router
where
    I: ImageStore + 'static,
    G: GalleryStore + 'static,
{
    let state = AppState::new(media);
    let auth = TokenAuth::new(&config.auth_secret);
    let cors = build_cors_layer(&config);

    let public_routes = Router::new()
        .route("/v1/healthcheck", get(health_handler))
        .route("/v1/public/images", get(list_public_images_handler::<I, G>))
        .route("/v1/public/images/{id}", get(get_public_image_handler::<I, G>))
        .route(
            "/v1/public/images/{id}/download",
            get(download_public_image_handler::<I, G>),
        )
        .route(
            "/v1/public/galleries/{id}/images",
            get(list_public_gallery_images_handler::<I, G>),
        );

    let owner_routes = Router::new()
        .route(
            "/v1/galleries/{id}/images",
            get(list_gallery_images_handler::<I, G>).post(insert_image_handler::<I, G>),
        )
        .route(
            "/v1/images/{id}",
            get(get_image_handler::<I, G>)
                .put(update_image_handler::<I, G>)
                .delete(delete_image_handler::<I, G>),
        )
        .route("/v1/images/{id}/download", get(download_image_handler::<I, G>))
        .route_layer(middleware::from_fn(require_auth));

    let router = Router::new()
        .merge(public_routes)
        .merge(owner_routes)
        .fallback(not_found_handler)
        .method_not_allowed_fallback(method_not_allowed_handler)
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes))
        .layer(middleware::from_fn_with_state(auth, authenticate))
        .layer(middleware::from_fn(trace_requests))
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
