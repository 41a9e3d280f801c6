use crate::storage::PAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Identifier of a page on disk. `PageId::INVALID` marks a frame that holds
/// no page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub i32);

impl PageId {
    pub const INVALID: PageId = PageId(-1);

    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PageId({})", self.0)
    }
}

/// A fixed-size frame in the buffer pool: the resident page's bytes plus the
/// metadata the pool needs to schedule its residency. Metadata is only
/// mutated by the buffer pool under its latch; the bytes belong to whoever
/// holds a pin.
pub struct Page {
    data: Box<[u8; PAGE_SIZE]>,
    page_id: PageId,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
}

impl Page {
    pub(crate) fn new() -> Self {
        Self {
            data: Box::new([0u8; PAGE_SIZE]),
            page_id: PageId::INVALID,
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::SeqCst)
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::SeqCst)
    }

    pub fn data(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.data
    }

    pub(crate) fn reset(&mut self) {
        self.page_id = PageId::INVALID;
        self.pin_count.store(0, Ordering::SeqCst);
        self.is_dirty.store(false, Ordering::SeqCst);
        self.data.fill(0);
    }

    pub(crate) fn set_page_id(&mut self, page_id: PageId) {
        self.page_id = page_id;
    }

    pub(crate) fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::SeqCst);
    }

    pub(crate) fn inc_pin_count(&self) {
        self.pin_count.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn dec_pin_count(&self) {
        self.pin_count.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_page_id() {
        assert!(!PageId::INVALID.is_valid());
        assert!(PageId(0).is_valid());
        assert!(PageId(42).is_valid());
        assert!(!PageId(-7).is_valid());
    }

    #[test]
    fn test_new_frame_is_empty() {
        let page = Page::new();
        assert_eq!(page.page_id(), PageId::INVALID);
        assert_eq!(page.pin_count(), 0);
        assert!(!page.is_dirty());
        assert!(page.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut page = Page::new();
        page.set_page_id(PageId(3));
        page.inc_pin_count();
        page.set_dirty(true);
        page.data_mut()[0] = 0xAB;

        page.reset();
        assert_eq!(page.page_id(), PageId::INVALID);
        assert_eq!(page.pin_count(), 0);
        assert!(!page.is_dirty());
        assert_eq!(page.data()[0], 0);
    }

    #[test]
    fn test_pin_count_tracking() {
        let page = Page::new();
        page.inc_pin_count();
        page.inc_pin_count();
        assert_eq!(page.pin_count(), 2);
        page.dec_pin_count();
        assert_eq!(page.pin_count(), 1);
    }
}
