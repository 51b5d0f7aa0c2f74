//! Media Service for image reads and writes.
//!
//! Every operation takes the caller's [`RequestContext`] and enforces one of
//! two access paths:
//!
//! - **Public**: the gallery must be published; the caller may be anonymous.
//! - **Owner**: the caller must be authenticated as the gallery or image owner.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        MediaService                          │
//! │  1. Resolve gallery / image    3. Call the image store       │
//! │  2. Check visibility or owner  4. Map store errors           │
//! │           │                                  │               │
//! │           ▼                                  ▼               │
//! │    ┌──────────────┐                  ┌──────────────┐        │
//! │    │ GalleryStore │                  │  ImageStore  │        │
//! │    └──────────────┘                  └──────────────┘        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Store errors without a domain meaning are passed through as
//! [`ServiceError::Store`] so the response layer can report them as
//! internal failures.

use std::sync::Arc;

use tracing::debug;

use crate::context::RequestContext;
use crate::error::{ServiceError, StoreError, ValidationErrors};
use crate::io::ContentReader;
use crate::store::{Filter, Gallery, GalleryStore, Image, ImageStore, Metadata, UploadReader};

/// Service for image operations scoped by gallery visibility and ownership.
///
/// # Type Parameters
///
/// * `I` - The image store (metadata and payloads)
/// * `G` - The gallery store (metadata only)
///
/// Both stores are shared by every in-flight request; the service itself
/// holds no per-request state.
pub struct MediaService<I: ImageStore, G: GalleryStore> {
    images: Arc<I>,
    galleries: Arc<G>,
}

impl<I: ImageStore, G: GalleryStore> Clone for MediaService<I, G> {
    fn clone(&self) -> Self {
        Self {
            images: Arc::clone(&self.images),
            galleries: Arc::clone(&self.galleries),
        }
    }
}

impl<I: ImageStore, G: GalleryStore> MediaService<I, G> {
    pub fn new(images: Arc<I>, galleries: Arc<G>) -> Self {
        Self { images, galleries }
    }

    pub fn image_store(&self) -> &Arc<I> {
        &self.images
    }

    pub fn gallery_store(&self) -> &Arc<G> {
        &self.galleries
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// List published images across all galleries.
    pub async fn list_all_public(
        &self,
        _ctx: &RequestContext,
        filter: &Filter,
    ) -> Result<(Vec<Image>, Metadata), ServiceError> {
        filter.validate().into_result()?;
        Ok(self.images.get_all_public(filter).await?)
    }

    /// List the images of one gallery.
    ///
    /// On the public path the gallery must be published. Otherwise the caller
    /// must own it.
    pub async fn list_for_gallery(
        &self,
        ctx: &RequestContext,
        gallery_id: i64,
        filter: &Filter,
        public: bool,
    ) -> Result<(Vec<Image>, Metadata), ServiceError> {
        filter.validate().into_result()?;

        let gallery = self.gallery(gallery_id).await?;
        check_visible(ctx, public, gallery.published, gallery.user_id)?;

        Ok(self.images.get_all_for_gallery(gallery_id, filter).await?)
    }

    /// Fetch one image record.
    pub async fn get(
        &self,
        ctx: &RequestContext,
        image_id: i64,
        public: bool,
    ) -> Result<Image, ServiceError> {
        let image = self.image(image_id).await?;
        check_visible(ctx, public, image.published, image.user_id)?;
        Ok(image)
    }

    /// Fetch an image record and open its payload.
    ///
    /// The returned reader must be released by the caller once streaming is
    /// done. No reader is opened when the access check fails. A record whose
    /// payload is missing is reported as an edit conflict.
    pub async fn download(
        &self,
        ctx: &RequestContext,
        image_id: i64,
        public: bool,
    ) -> Result<(Image, ContentReader), ServiceError> {
        let image = self.get(ctx, image_id, public).await?;

        let reader = self
            .images
            .get_reader(image.id)
            .await
            .map_err(|err| match err {
                StoreError::RecordNotFound => ServiceError::EditConflict,
                other => ServiceError::Store(other),
            })?;

        Ok((image, reader))
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store a new image in a gallery owned by the caller.
    ///
    /// Only `gallery_id`, `title`, `caption` and `content_type` are taken from
    /// `image`. The owner is always the caller.
    pub async fn insert(
        &self,
        ctx: &RequestContext,
        content: UploadReader,
        image: Image,
    ) -> Result<Image, ServiceError> {
        let gallery = self.gallery(image.gallery_id).await?;
        let caller = check_owner(ctx, gallery.user_id)?;

        let record = Image {
            gallery_id: image.gallery_id,
            user_id: caller,
            title: image.title,
            caption: image.caption,
            content_type: image.content_type,
            ..Image::default()
        };

        let stored = self
            .images
            .insert(content, record)
            .await
            .map_err(|err| match err {
                StoreError::EmptyBytes => {
                    let mut v = ValidationErrors::new();
                    v.add("body", "no bytes in body");
                    ServiceError::Validation(v)
                }
                other => map_write_error(other),
            })?;

        debug!(
            image_id = stored.id,
            gallery_id = stored.gallery_id,
            size = stored.size,
            "inserted image"
        );
        Ok(stored)
    }

    /// Change the title and caption of an image owned by the caller.
    ///
    /// Every other field of `changes` is ignored.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        changes: Image,
    ) -> Result<Image, ServiceError> {
        let mut image = self.image(changes.id).await?;
        check_owner(ctx, image.user_id)?;

        image.title = changes.title;
        image.caption = changes.caption;

        self.images.update(image).await.map_err(map_write_error)
    }

    /// Delete an image owned by the caller, returning the record as it was.
    pub async fn delete(&self, ctx: &RequestContext, image_id: i64) -> Result<Image, ServiceError> {
        let image = self.image(image_id).await?;
        check_owner(ctx, image.user_id)?;

        self.images
            .delete(image.id)
            .await
            .map_err(map_not_found)?;

        debug!(image_id = image.id, "deleted image");
        Ok(image)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn gallery(&self, id: i64) -> Result<Gallery, ServiceError> {
        self.galleries.get(id).await.map_err(map_not_found)
    }

    async fn image(&self, id: i64) -> Result<Image, ServiceError> {
        self.images.get(id).await.map_err(map_not_found)
    }
}

/// Public path: the entity must be published. Owner path: the caller must own it.
fn check_visible(
    ctx: &RequestContext,
    public: bool,
    published: bool,
    owner_id: i64,
) -> Result<(), ServiceError> {
    if public {
        if published {
            Ok(())
        } else {
            Err(ServiceError::Forbidden)
        }
    } else {
        check_owner(ctx, owner_id).map(|_| ())
    }
}

/// Returns the caller's user id when it matches `owner_id`.
fn check_owner(ctx: &RequestContext, owner_id: i64) -> Result<i64, ServiceError> {
    match ctx.auth() {
        Some(auth) if auth.user_id() == owner_id => Ok(auth.user_id()),
        _ => Err(ServiceError::Forbidden),
    }
}

fn map_not_found(err: StoreError) -> ServiceError {
    match err {
        StoreError::RecordNotFound => ServiceError::NotFound,
        other => ServiceError::Store(other),
    }
}

fn map_write_error(err: StoreError) -> ServiceError {
    if err.is_gallery_link_violation() {
        ServiceError::EditConflict
    } else {
        map_not_found(err)
    }
}
