use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Name of the storage constraint linking an image to its parent gallery.
pub const IMAGE_GALLERY_FK: &str = "image_to_galleries_fk";

/// Errors surfaced by the store contract.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record (metadata or payload) does not exist
    #[error("record not found")]
    RecordNotFound,

    /// An upload carried no bytes
    #[error("no bytes in content")]
    EmptyBytes,

    /// Reserved for stores that enforce access control themselves
    #[error("forbidden")]
    Forbidden,

    /// A concurrent write changed the record underneath the caller
    #[error("edit conflict")]
    EditConflict,

    /// A referential constraint rejected the write
    #[error("foreign key constraint `{constraint}` violated")]
    ForeignKeyViolation { constraint: String },

    /// Filesystem or stream error while moving payload bytes
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend failure, kept opaque
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether this error reports a dangling image -> gallery reference.
    pub fn is_gallery_link_violation(&self) -> bool {
        matches!(
            self,
            StoreError::ForeignKeyViolation { constraint } if constraint == IMAGE_GALLERY_FK
        )
    }
}

/// Field-level validation failures, keyed by field name.
///
/// Serializes as a flat JSON object (`{"body": "no bytes in body"}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for `field`. The first message recorded for a field wins.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    /// Record a failure for `field` unless `ok` holds.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add(field, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Iterate `(field, message)` pairs in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Convert into a `Result`, failing when any field was recorded.
    pub fn into_result(self) -> Result<(), ServiceError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", field, message)?;
            first = false;
        }
        Ok(())
    }
}

/// Domain errors returned by the media service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The referenced image or gallery does not exist
    #[error("the requested resource could not be found")]
    NotFound,

    /// The entity exists but the caller may not see or change it
    #[error("you don't have the necessary permissions to access this resource")]
    Forbidden,

    /// The write would leave a dangling reference, or stored content is inconsistent
    #[error("unable to complete the request due to an edit conflict, please try again")]
    EditConflict,

    /// Caller-supplied data failed a business rule
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// Unclassified store failure, passed through unmodified
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        ServiceError::Store(err)
    }
}
