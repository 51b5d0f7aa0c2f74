//! LocalStore: in-memory metadata with payloads on local disk.
//!
//! Payloads live at `base_path/{shard}/{image_id}.bin`, where the shard is the
//! image id modulo 256 in hex. Uploads are streamed into a temp file beside the
//! final location and renamed into place once the metadata row is committed.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StoreError, IMAGE_GALLERY_FK};
use crate::io::{ContentReader, FileContent};

use super::{Filter, Gallery, GalleryStore, Image, ImageStore, Metadata, UploadReader};

#[derive(Default)]
struct Tables {
    next_image_id: i64,
    next_gallery_id: i64,
    images: HashMap<i64, Image>,
    galleries: HashMap<i64, Gallery>,
}

/// Reference store for development and tests.
pub struct LocalStore {
    base_path: PathBuf,
    tables: RwLock<Tables>,
}

impl LocalStore {
    /// Open a store rooted at `base_path`, creating the directory if needed.
    pub async fn open(base_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;
        Ok(Self {
            base_path,
            tables: RwLock::new(Tables::default()),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Path of the payload file for an image. The parent may not exist yet.
    pub fn payload_path(&self, image_id: i64) -> PathBuf {
        let shard = format!("{:02x}", image_id.rem_euclid(256));
        self.base_path
            .join(shard)
            .join(format!("{}.bin", image_id))
    }

    /// Create a gallery. The id and timestamp are assigned by the store.
    pub async fn insert_gallery(&self, gallery: Gallery) -> Gallery {
        let mut tables = self.tables.write().await;
        tables.next_gallery_id += 1;
        let gallery = Gallery {
            id: tables.next_gallery_id,
            created_at: Utc::now(),
            ..gallery
        };
        tables.galleries.insert(gallery.id, gallery.clone());
        gallery
    }

    /// Remove a gallery record. Images pointing at it are left dangling.
    pub async fn delete_gallery(&self, id: i64) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .galleries
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::RecordNotFound)
    }

    /// Flip the published flag of an image.
    pub async fn set_image_published(&self, id: i64, published: bool) -> Result<Image, StoreError> {
        let mut tables = self.tables.write().await;
        let image = tables
            .images
            .get_mut(&id)
            .ok_or(StoreError::RecordNotFound)?;
        image.published = published;
        Ok(image.clone())
    }

    fn gallery_link_violation() -> StoreError {
        StoreError::ForeignKeyViolation {
            constraint: IMAGE_GALLERY_FK.to_string(),
        }
    }

    /// Stream `content` into a temp file under `base_path`, returning its path and size.
    async fn spool(&self, mut content: UploadReader) -> Result<(PathBuf, u64), StoreError> {
        let tmp_path = self.base_path.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let copied = async {
            let size = tokio::io::copy(&mut content, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<u64, std::io::Error>(size)
        }
        .await;

        match copied {
            Ok(0) => {
                let _ = fs::remove_file(&tmp_path).await;
                Err(StoreError::EmptyBytes)
            }
            Ok(size) => Ok((tmp_path, size)),
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                Err(StoreError::Io(err))
            }
        }
    }
}

#[async_trait]
impl ImageStore for LocalStore {
    async fn get(&self, id: i64) -> Result<Image, StoreError> {
        self.tables
            .read()
            .await
            .images
            .get(&id)
            .cloned()
            .ok_or(StoreError::RecordNotFound)
    }

    async fn get_all_public(&self, filter: &Filter) -> Result<(Vec<Image>, Metadata), StoreError> {
        let tables = self.tables.read().await;
        let images = tables
            .images
            .values()
            .filter(|image| image.published)
            .cloned()
            .collect();
        Ok(filter.paginate(images))
    }

    async fn get_all_for_gallery(
        &self,
        gallery_id: i64,
        filter: &Filter,
    ) -> Result<(Vec<Image>, Metadata), StoreError> {
        let tables = self.tables.read().await;
        let images = tables
            .images
            .values()
            .filter(|image| image.gallery_id == gallery_id)
            .cloned()
            .collect();
        Ok(filter.paginate(images))
    }

    async fn get_reader(&self, id: i64) -> Result<ContentReader, StoreError> {
        let path = self.payload_path(id);
        let file = File::open(&path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::RecordNotFound
            } else {
                StoreError::Io(err)
            }
        })?;
        Ok(Box::new(FileContent::new(file)))
    }

    async fn insert(&self, content: UploadReader, image: Image) -> Result<Image, StoreError> {
        if !self
            .tables
            .read()
            .await
            .galleries
            .contains_key(&image.gallery_id)
        {
            return Err(Self::gallery_link_violation());
        }

        let (tmp_path, size) = self.spool(content).await?;

        // The gallery may have gone away while the payload was being written.
        let mut tables = self.tables.write().await;
        if !tables.galleries.contains_key(&image.gallery_id) {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Self::gallery_link_violation());
        }

        let id = tables.next_image_id + 1;
        let final_path = self.payload_path(id);
        let placed = async {
            if let Some(parent) = final_path.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::rename(&tmp_path, &final_path).await
        }
        .await;
        if let Err(err) = placed {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        tables.next_image_id = id;
        let image = Image {
            id,
            size,
            created_at: Utc::now(),
            ..image
        };
        tables.images.insert(id, image.clone());
        debug!(image_id = id, size, "stored image payload");

        Ok(image)
    }

    async fn update(&self, image: Image) -> Result<Image, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.images.contains_key(&image.id) {
            return Err(StoreError::RecordNotFound);
        }
        if !tables.galleries.contains_key(&image.gallery_id) {
            return Err(Self::gallery_link_violation());
        }
        tables.images.insert(image.id, image.clone());
        Ok(image)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .images
            .remove(&id)
            .ok_or(StoreError::RecordNotFound)?;

        let path = self.payload_path(id);
        match fs::remove_file(&path).await {
            Ok(()) => debug!("removed payload {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("payload {} already missing", path.display());
            }
            Err(err) => {
                // The row is already gone; the delete has happened.
                warn!(
                    image_id = id,
                    error = %err,
                    "failed to remove payload {}",
                    path.display()
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl GalleryStore for LocalStore {
    async fn get(&self, id: i64) -> Result<Gallery, StoreError> {
        self.tables
            .read()
            .await
            .galleries
            .get(&id)
            .cloned()
            .ok_or(StoreError::RecordNotFound)
    }
}
