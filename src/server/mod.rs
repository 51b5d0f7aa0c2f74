//! HTTP server layer for Snap Vault.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │    auth     │  │        routes           │  │
//! │  │ (requests)  │  │ (bearer)    │  │  (router config)        │  │
//! │  └──────┬──────┘  └─────────────┘  └─────────────────────────┘  │
//! │         ▼                                                       │
//! │  ┌─────────────────────────────┐  ┌─────────────────────────┐   │
//! │  │          response           │  │        context          │   │
//! │  │ (JSON, errors, streaming)   │  │ (trace + caller)        │   │
//! │  └─────────────────────────────┘  └─────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod context;
pub mod handlers;
pub mod response;
pub mod routes;

pub use auth::{authenticate, require_auth, AuthError, TokenAuth};
pub use context::{trace_requests, REQUEST_ID_HEADER};
pub use handlers::{AppState, HealthResponse, ImageEnvelope, ImagesEnvelope, UpdateImageRequest};
pub use response::{send_headers, send_json, send_json_error, stream_bytes, ErrorResponse, SERVER_ERROR_MESSAGE};
pub use routes::{create_router, RouterConfig, DEFAULT_MAX_UPLOAD_BYTES};
