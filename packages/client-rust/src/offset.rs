//! Offset pagination state for paged grids.

use backoffice_core::page::page_count;
use backoffice_core::OffsetPage;
use tracing::debug;

use crate::config::PaginationConfig;
use crate::error::PaginationError;

/// Current page and page size of an offset-paginated list.
///
/// `page` is 1-based and always stays inside `[1, total_pages]` once a total
/// is known. Changing the page size, or the filters, returns to page 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetPagination {
    page: u32,
    page_size: u32,
    options: Vec<u32>,
    total_elements: Option<u64>,
    total_pages: Option<u32>,
}

impl OffsetPagination {
    #[must_use]
    pub fn new(config: &PaginationConfig) -> Self {
        Self {
            page: 1,
            page_size: config.default_page_size,
            options: config.page_size_options.clone(),
            total_elements: None,
            total_pages: None,
        }
    }

    #[must_use]
    pub fn page(&self) -> u32 {
        self.page
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    #[must_use]
    pub fn page_size_options(&self) -> &[u32] {
        &self.options
    }

    #[must_use]
    pub fn total_elements(&self) -> Option<u64> {
        self.total_elements
    }

    /// Number of pages, once a response has reported a total.
    #[must_use]
    pub fn total_pages(&self) -> Option<u32> {
        self.total_pages
    }

    /// Moves to page `page`.
    ///
    /// # Errors
    ///
    /// Refuses page 0, and pages past the last one once the total is known.
    pub fn set_page(&mut self, page: u32) -> Result<(), PaginationError> {
        if page == 0 {
            return Err(PaginationError::ZeroPage);
        }
        if let Some(total_pages) = self.total_pages {
            if page > total_pages.max(1) {
                return Err(PaginationError::PageOutOfRange { page, total_pages });
            }
        }
        self.page = page;
        Ok(())
    }

    /// Changes the page size and returns to page 1.
    ///
    /// # Errors
    ///
    /// Refuses sizes that are not among the offered options.
    pub fn set_page_size(&mut self, size: u32) -> Result<(), PaginationError> {
        if !self.options.contains(&size) {
            return Err(PaginationError::PageSizeNotAllowed { size });
        }
        if size != self.page_size {
            debug!(from = self.page_size, to = size, "page size changed, back to page 1");
            self.page_size = size;
            self.page = 1;
            self.total_pages = self.total_elements.map(|n| page_count(n, size));
        }
        Ok(())
    }

    /// Records the totals a response reported.
    ///
    /// A reported page count wins over one derived from the element count.
    /// If the list shrank below the current page, the page is clamped to the
    /// last one.
    pub fn set_total(&mut self, total_elements: u64, total_pages: Option<u32>) {
        let pages = total_pages.unwrap_or_else(|| page_count(total_elements, self.page_size));
        self.total_elements = Some(total_elements);
        self.total_pages = Some(pages);
        let last = pages.max(1);
        if self.page > last {
            debug!(page = self.page, last, "clamping page to the new last page");
            self.page = last;
        }
    }

    /// Records the totals of a received page.
    pub fn observe<T>(&mut self, page: &OffsetPage<T>) {
        self.set_total(page.total_elements, Some(page.total_pages));
    }

    /// Returns to page 1, for a filter or search change.
    pub fn reset(&mut self) {
        self.page = 1;
    }

    #[must_use]
    pub fn can_prev(&self) -> bool {
        self.page > 1
    }

    #[must_use]
    pub fn can_next(&self) -> bool {
        self.total_pages.is_some_and(|total| self.page < total)
    }

    /// Zero-based index of the first row on the current page.
    #[must_use]
    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.page_size as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pagination() -> OffsetPagination {
        OffsetPagination::new(&PaginationConfig::default())
    }

    #[test]
    fn starts_on_first_page_with_default_size() {
        let p = pagination();
        assert_eq!(p.page(), 1);
        assert_eq!(p.page_size(), 25);
        assert_eq!(p.total_pages(), None);
        assert!(!p.can_prev());
        assert!(!p.can_next());
    }

    #[test]
    fn page_size_change_returns_to_first_page() {
        let mut p = pagination();
        p.set_total(200, None);
        p.set_page(3).unwrap();
        assert_eq!(p.offset(), 50);

        p.set_page_size(50).unwrap();
        assert_eq!(p.page(), 1);
        assert_eq!(p.page_size(), 50);
        assert_eq!(p.total_pages(), Some(4));
    }

    #[test]
    fn same_page_size_keeps_the_page() {
        let mut p = pagination();
        p.set_total(200, None);
        p.set_page(3).unwrap();
        p.set_page_size(25).unwrap();
        assert_eq!(p.page(), 3);
    }

    #[test]
    fn unknown_page_size_is_refused() {
        let mut p = pagination();
        assert_eq!(
            p.set_page_size(33),
            Err(PaginationError::PageSizeNotAllowed { size: 33 })
        );
        assert_eq!(p.page_size(), 25);
    }

    #[test]
    fn navigation_outside_the_window_is_refused() {
        let mut p = pagination();
        assert_eq!(p.set_page(0), Err(PaginationError::ZeroPage));

        p.set_total(60, None);
        assert_eq!(p.total_pages(), Some(3));
        assert_eq!(
            p.set_page(4),
            Err(PaginationError::PageOutOfRange {
                page: 4,
                total_pages: 3
            })
        );
        p.set_page(3).unwrap();
        assert!(!p.can_next());
        assert!(p.can_prev());
    }

    #[test]
    fn reported_page_count_wins() {
        let mut p = pagination();
        p.observe(&OffsetPage::<()> {
            items: Vec::new(),
            total_elements: 60,
            total_pages: 5,
        });
        assert_eq!(p.total_pages(), Some(5));
    }

    #[test]
    fn shrinking_total_clamps_the_page() {
        let mut p = pagination();
        p.set_total(200, None);
        p.set_page(8).unwrap();

        p.set_total(30, None);
        assert_eq!(p.page(), 2);

        p.set_total(0, None);
        assert_eq!(p.page(), 1);
        assert_eq!(p.total_pages(), Some(0));
        assert_eq!(p.set_page(1), Ok(()));
    }

    #[test]
    fn reset_returns_to_first_page() {
        let mut p = pagination();
        p.set_total(100, None);
        p.set_page(4).unwrap();
        p.reset();
        assert_eq!(p.page(), 1);
    }
}
