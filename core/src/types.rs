//! Shared primitive types used across the fraud pipeline.

use serde::{Deserialize, Serialize};

/// A stable, opaque identifier for any persisted entity.
pub type EntityId = String;

/// Actor recorded against audited changes when no operator is involved.
pub const SYSTEM_ACTOR: &str = "system";

/// 1-based page selector for list operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    /// Clamp to page >= 1 and 1 <= page_size <= max_page_size.
    pub fn normalized(self, max_page_size: u32) -> Self {
        Self {
            page: self.page.max(1),
            page_size: self.page_size.clamp(1, max_page_size.max(1)),
        }
    }

    pub fn limit(&self) -> i64 {
        self.page_size as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.page_size as i64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, page_size: 20 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page,
            page_size: request.page_size,
        }
    }

    pub fn total_pages(&self) -> u32 {
        if self.page_size == 0 {
            return 0;
        }
        ((self.total.max(0) as u64).div_ceil(self.page_size as u64)) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_is_clamped() {
        let req = PageRequest::new(0, 500).normalized(100);
        assert_eq!(req, PageRequest::new(1, 100));
        assert_eq!(req.offset(), 0);

        let req = PageRequest::new(3, 0).normalized(100);
        assert_eq!(req.page_size, 1);
        assert_eq!(req.offset(), 2);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page: Page<u8> = Page::new(vec![], 41, PageRequest::new(1, 20));
        assert_eq!(page.total_pages(), 3);
    }
}
