use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Fixed catalog page size. Every listing route (products, category, search)
/// slices the result set into pages of this length.
pub const PAGE_SIZE: i64 = 12;

/// Page
///
/// One slice of a paginated result set, together with the totals needed to
/// render pagination controls. `page` is zero-based to match the `?page=`
/// query parameter of the listing routes.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_items: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    /// Builds a page from a fetched slice plus the overall item count.
    /// `total_pages` is the ceiling of total_items / page_size.
    pub fn new(items: Vec<T>, total_items: i64, page: i64, page_size: i64) -> Self {
        let total_pages = if page_size > 0 {
            (total_items + page_size - 1) / page_size
        } else {
            0
        };
        Self {
            items,
            total_items,
            page,
            page_size,
            total_pages,
        }
    }

    /// The ordered page links shown under a listing: exactly `[1..N]` for N
    /// total pages, and empty when there are no pages at all.
    pub fn page_numbers(&self) -> Vec<i64> {
        if self.total_pages <= 0 {
            Vec::new()
        } else {
            (1..=self.total_pages).collect()
        }
    }
}
