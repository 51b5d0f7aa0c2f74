//! Store contract consumed by the media service.
//!
//! The service never talks to a database or filesystem directly. It holds two
//! named handles, one per capability:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              MediaService               │
//! └─────────┬─────────────────────┬─────────┘
//!           │                     │
//!           ▼                     ▼
//! ┌──────────────────┐  ┌──────────────────┐
//! │    ImageStore    │  │   GalleryStore   │
//! │ (metadata + blob)│  │   (metadata)     │
//! └──────────────────┘  └──────────────────┘
//! ```
//!
//! Both traits must be safe for concurrent use: every in-flight request
//! shares the same store.

mod filters;
mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::error::StoreError;
use crate::io::ContentReader;

pub use filters::{Filter, Metadata, MAX_PAGE, MAX_PAGE_SIZE, SORT_SAFELIST};
pub use local::LocalStore;

// =============================================================================
// Records
// =============================================================================

/// An image belonging to a gallery. The payload bytes are never held here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: i64,
    pub gallery_id: i64,
    pub user_id: i64,
    pub title: String,
    pub caption: String,
    pub content_type: String,
    pub published: bool,

    /// Payload length in bytes, set by the store on insert
    pub size: u64,

    pub created_at: DateTime<Utc>,
}

/// An owned collection of images.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gallery {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub published: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
}

/// The authenticated caller of the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthData {
    pub user: User,
}

impl AuthData {
    pub fn new(user_id: i64) -> Self {
        Self {
            user: User { id: user_id },
        }
    }

    pub fn user_id(&self) -> i64 {
        self.user.id
    }
}

/// Upload body handed to [`ImageStore::insert`].
pub type UploadReader = Box<dyn AsyncRead + Send + Unpin>;

// =============================================================================
// Store Traits
// =============================================================================

/// Image metadata and payload storage.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Fetch one image by id.
    async fn get(&self, id: i64) -> Result<Image, StoreError>;

    /// List published images across all galleries.
    async fn get_all_public(&self, filter: &Filter) -> Result<(Vec<Image>, Metadata), StoreError>;

    /// List every image of one gallery, published or not.
    async fn get_all_for_gallery(
        &self,
        gallery_id: i64,
        filter: &Filter,
    ) -> Result<(Vec<Image>, Metadata), StoreError>;

    /// Open the payload of an image for streaming.
    ///
    /// Returns `RecordNotFound` when the payload is missing.
    async fn get_reader(&self, id: i64) -> Result<ContentReader, StoreError>;

    /// Store a new image and its payload, returning the record with its new id.
    ///
    /// Returns `EmptyBytes` for a zero-length payload and a
    /// `ForeignKeyViolation` when the gallery does not exist.
    async fn insert(&self, content: UploadReader, image: Image) -> Result<Image, StoreError>;

    /// Persist the given image record over the existing one.
    async fn update(&self, image: Image) -> Result<Image, StoreError>;

    /// Remove an image and its payload.
    async fn delete(&self, id: i64) -> Result<(), StoreError>;
}

/// Gallery metadata lookups.
#[async_trait]
pub trait GalleryStore: Send + Sync {
    async fn get(&self, id: i64) -> Result<Gallery, StoreError>;
}
