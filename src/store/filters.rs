//! Pagination and sorting parameters for list queries.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::ValidationErrors;

use super::Image;

/// Largest page number a caller may request.
pub const MAX_PAGE: u64 = 10_000_000;

/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Sort keys accepted by list endpoints. A leading `-` means descending.
pub const SORT_SAFELIST: [&str; 6] = ["id", "title", "created_at", "-id", "-title", "-created_at"];

fn default_page() -> u64 {
    1
}

fn default_page_size() -> u64 {
    20
}

fn default_sort() -> String {
    "id".to_string()
}

/// Pagination input for list queries.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Filter {
    #[serde(default = "default_page")]
    pub page: u64,

    #[serde(default = "default_page_size")]
    pub page_size: u64,

    #[serde(default = "default_sort")]
    pub sort: String,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
            sort: default_sort(),
        }
    }
}

impl Filter {
    pub fn new(page: u64, page_size: u64, sort: impl Into<String>) -> Self {
        Self {
            page,
            page_size,
            sort: sort.into(),
        }
    }

    /// Check the filter against the allowed ranges and sort safelist.
    pub fn validate(&self) -> ValidationErrors {
        let mut v = ValidationErrors::new();
        v.check(self.page > 0, "page", "must be greater than zero");
        v.check(self.page <= MAX_PAGE, "page", "must be a maximum of 10 million");
        v.check(self.page_size > 0, "page_size", "must be greater than zero");
        v.check(
            self.page_size <= MAX_PAGE_SIZE,
            "page_size",
            "must be a maximum of 100",
        );
        v.check(
            SORT_SAFELIST.contains(&self.sort.as_str()),
            "sort",
            "invalid sort value",
        );
        v
    }

    /// Column name without the direction prefix.
    pub fn sort_column(&self) -> &str {
        self.sort.trim_start_matches('-')
    }

    pub fn sort_descending(&self) -> bool {
        self.sort.starts_with('-')
    }

    pub fn limit(&self) -> usize {
        self.page_size as usize
    }

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) * self.page_size) as usize
    }

    /// Order two images by the filter's sort key, breaking ties on id.
    pub fn compare(&self, a: &Image, b: &Image) -> Ordering {
        let ord = match self.sort_column() {
            "title" => a.title.cmp(&b.title),
            "created_at" => a.created_at.cmp(&b.created_at),
            _ => a.id.cmp(&b.id),
        }
        .then(a.id.cmp(&b.id));

        if self.sort_descending() {
            ord.reverse()
        } else {
            ord
        }
    }

    /// Sort `images` and cut out the requested page.
    pub fn paginate(&self, mut images: Vec<Image>) -> (Vec<Image>, Metadata) {
        let total = images.len() as u64;
        images.sort_by(|a, b| self.compare(a, b));
        let page = images
            .into_iter()
            .skip(self.offset())
            .take(self.limit())
            .collect();
        (page, Metadata::calculate(total, self.page, self.page_size))
    }
}

/// Pagination metadata returned alongside list results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_records: u64,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

impl Metadata {
    /// Build metadata for `total_records` rows; empty when there are none.
    pub fn calculate(total_records: u64, page: u64, page_size: u64) -> Self {
        if total_records == 0 || page_size == 0 {
            return Self::default();
        }
        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: total_records.div_ceil(page_size),
            total_records,
        }
    }
}
