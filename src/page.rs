use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_number: u32,
    pub total_count: u64,
    pub has_more: bool,
}

impl<T> Page<T> {
    /// A final page with nothing in it.
    pub fn empty(page_number: u32) -> Self {
        Self {
            items: Vec::new(),
            page_number,
            total_count: 0,
            has_more: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppendError {
    #[error("page {got} was already applied (next page is {expected})")]
    AlreadyApplied { expected: u32, got: u32 },

    #[error("page {got} arrived out of order (next page is {expected})")]
    OutOfOrder { expected: u32, got: u32 },

    #[error("page {got} arrived after the feed was exhausted")]
    Exhausted { got: u32 },
}

/// Ordered items of one query lineage plus its pagination cursor.
///
/// Items are never deduplicated; exactly-once delivery is enforced by only
/// accepting the page numbered `next_page`.
#[derive(Debug, Clone)]
pub struct PageAccumulator<T> {
    items: Vec<T>,
    next_page: u32,
    has_more: bool,
    total_count: Option<u64>,
}

impl<T> Default for PageAccumulator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PageAccumulator<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            next_page: 1,
            has_more: true,
            total_count: None,
        }
    }

    pub fn reset(&mut self) {
        self.items.clear();
        self.next_page = 1;
        self.has_more = true;
        self.total_count = None;
    }

    /// Appends `page` and returns how many items it added.
    pub fn append(&mut self, page: Page<T>) -> Result<usize, AppendError> {
        let expected = self.next_page;
        if page.page_number < expected {
            return Err(AppendError::AlreadyApplied {
                expected,
                got: page.page_number,
            });
        }
        if page.page_number > expected {
            return Err(AppendError::OutOfOrder {
                expected,
                got: page.page_number,
            });
        }
        if !self.has_more {
            return Err(AppendError::Exhausted {
                got: page.page_number,
            });
        }

        let added = page.items.len();
        self.items.extend(page.items);
        self.next_page = self.next_page.saturating_add(1);
        self.has_more = page.has_more;
        self.total_count = Some(page.total_count);
        Ok(added)
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn next_page(&self) -> u32 {
        self.next_page
    }

    pub fn pages_loaded(&self) -> u32 {
        self.next_page - 1
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn total_count(&self) -> Option<u64> {
        self.total_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(number: u32, items: std::ops::Range<u32>, has_more: bool) -> Page<u32> {
        Page {
            items: items.collect(),
            page_number: number,
            total_count: 20,
            has_more,
        }
    }

    #[test]
    fn appends_pages_in_order() {
        let mut acc = PageAccumulator::new();
        assert_eq!(acc.append(page(1, 0..12, true)), Ok(12));
        assert_eq!(acc.append(page(2, 12..20, false)), Ok(8));

        assert_eq!(acc.len(), 20);
        assert_eq!(acc.items(), (0..20).collect::<Vec<_>>().as_slice());
        assert_eq!(acc.next_page(), 3);
        assert_eq!(acc.pages_loaded(), 2);
        assert!(!acc.has_more());
        assert_eq!(acc.total_count(), Some(20));
    }

    #[test]
    fn rejects_duplicate_and_skipped_pages() {
        let mut acc = PageAccumulator::new();
        acc.append(page(1, 0..3, true)).expect("page 1");

        assert_eq!(
            acc.append(page(1, 0..3, true)),
            Err(AppendError::AlreadyApplied {
                expected: 2,
                got: 1
            })
        );
        assert_eq!(
            acc.append(page(3, 6..9, true)),
            Err(AppendError::OutOfOrder {
                expected: 2,
                got: 3
            })
        );
        assert_eq!(acc.len(), 3);
    }

    #[test]
    fn keeps_duplicate_items_across_pages() {
        let mut acc = PageAccumulator::new();
        acc.append(page(1, 0..2, true)).expect("page 1");
        acc.append(page(2, 0..2, false)).expect("page 2");
        assert_eq!(acc.items(), &[0, 1, 0, 1]);
    }

    #[test]
    fn reset_restores_initial_cursor() {
        let mut acc = PageAccumulator::new();
        acc.append(page(1, 0..5, false)).expect("page 1");
        assert_eq!(acc.append(page(2, 5..6, false)), Err(AppendError::Exhausted { got: 2 }));

        acc.reset();
        assert!(acc.is_empty());
        assert_eq!(acc.next_page(), 1);
        assert!(acc.has_more());
        assert_eq!(acc.total_count(), None);
    }
}
