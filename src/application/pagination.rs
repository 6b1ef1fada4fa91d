//! Offset pagination shared by the list operations.

use serde::Serialize;

use crate::config::MessagingSettings;

/// A normalized 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    /// Clamp raw query values: page >= 1, 1 <= limit <= `max_page_size`,
    /// falling back to `default_page_size` when no limit is given.
    pub fn new(page: Option<i64>, limit: Option<i64>, settings: &MessagingSettings) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(settings.default_page_size)
                .clamp(1, settings.max_page_size),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

/// Pagination metadata returned next to list results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    pub fn new(request: PageRequest, total: i64) -> Self {
        Self {
            page: request.page,
            limit: request.limit,
            total,
            pages: (total + request.limit - 1) / request.limit,
        }
    }
}

/// A page of items with its totals.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: i64) -> Self {
        Self {
            items,
            pagination: Pagination::new(request, total),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}
