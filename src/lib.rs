//! # Snap Vault
//!
//! An image and gallery API with public and owner-only access paths.
//!
//! Images belong to galleries. A published gallery's images can be listed,
//! fetched and downloaded by anyone; everything else is visible only to the
//! owning user. Payloads are streamed from the store to the client without
//! being buffered whole, and every request carries a trace record that is
//! written to the log once the response has been fully sent.
//!
//! ## Architecture
//!
//! - [`store`] - Store contract (`ImageStore`, `GalleryStore`) and a local reference store
//! - [`media`] - Media service enforcing visibility and ownership
//! - [`context`] - Per-request caller identity and trace record
//! - [`io`] - Readable payload sources with explicit release
//! - [`server`] - Axum routes, bearer auth and the response pipeline
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use snap_vault::{create_router, LocalStore, MediaService, RouterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(LocalStore::open("./data/images").await?);
//!     let media = MediaService::new(Arc::clone(&store), store);
//!     let router = create_router(media, RouterConfig::new("my-secret-key"));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:4000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod io;
pub mod media;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use config::{Cli, Command, Config, SignConfig};
pub use context::{RequestContext, TraceHandle, TraceRecord};
pub use error::{ServiceError, StoreError, ValidationErrors, IMAGE_GALLERY_FK};
pub use io::{ByteSource, ContentReader, FileContent, ReleasableRead};
pub use media::MediaService;
pub use server::{
    create_router, send_headers, send_json, send_json_error, stream_bytes, AppState, AuthError,
    ErrorResponse, RouterConfig, TokenAuth,
};
pub use store::{
    AuthData, Filter, Gallery, GalleryStore, Image, ImageStore, LocalStore, Metadata,
    UploadReader, User,
};
