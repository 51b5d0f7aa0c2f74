//! Image operations with gallery-scoped visibility rules.
//!
//! This module contains:
//! - [`MediaService`]: list, fetch, download and mutate images on behalf of a caller

mod service;

pub use service::MediaService;
