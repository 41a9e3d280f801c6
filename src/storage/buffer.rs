pub mod lru_k;
pub mod replacer;

use crate::container::ExtendibleHashTable;
use crate::storage::disk::DiskManager;
use crate::storage::error::StorageResult;
use crate::storage::page::{Page, PageId};
use crate::storage::wal::LogManager;
use lru_k::LruKReplacer;
use parking_lot::{Mutex, RwLock};
use replacer::{FrameId, INVALID_FRAME_ID, Replacer};
use std::collections::VecDeque;
use std::sync::Arc;

/// Entries per bucket in the page directory.
const PAGE_TABLE_BUCKET_SIZE: usize = 4;

/// A pinned reference to a frame. The bytes may be read and written through
/// the lock for as long as the pin is held; every successful
/// `new_page`/`fetch_page` must be paired with exactly one `unpin_page`,
/// and the lock must not be held across buffer pool calls.
pub type PageRef = Arc<RwLock<Page>>;

/// The page cache: hands out pinned references to disk pages, bounded to
/// `pool_size` frames, writing dirty victims back before their frame is
/// reused. A single latch serializes every operation end-to-end, disk I/O
/// included.
#[derive(Clone)]
pub struct BufferPoolManager {
    inner: Arc<BufferPoolInner>,
}

struct BufferPoolInner {
    pool_size: usize,
    frames: Vec<PageRef>,
    /// page id → frame id; an `INVALID_FRAME_ID` entry is a tombstone for a
    /// page that was resident once and has been evicted.
    page_table: ExtendibleHashTable<PageId, FrameId>,
    replacer: Box<dyn Replacer>,
    disk: Mutex<DiskManager>,
    log: Option<LogManager>,
    latch: Mutex<PoolState>,
}

struct PoolState {
    free_list: VecDeque<FrameId>,
    next_page_id: i32,
}

impl BufferPoolManager {
    /// Seeds the page-id counter from the pages already on disk, so ids
    /// stay monotonic over a persistent file.
    pub fn new(
        pool_size: usize,
        disk: DiskManager,
        replacer_k: usize,
        log: Option<LogManager>,
    ) -> StorageResult<Self> {
        let next_page_id = disk.num_pages()? as i32;
        let frames = (0..pool_size)
            .map(|_| Arc::new(RwLock::new(Page::new())))
            .collect();
        let free_list = (0..pool_size as FrameId).collect();

        Ok(Self {
            inner: Arc::new(BufferPoolInner {
                pool_size,
                frames,
                page_table: ExtendibleHashTable::new(PAGE_TABLE_BUCKET_SIZE),
                replacer: Box::new(LruKReplacer::new(pool_size, replacer_k)),
                disk: Mutex::new(disk),
                log,
                latch: Mutex::new(PoolState {
                    free_list,
                    next_page_id,
                }),
            }),
        })
    }

    pub fn pool_size(&self) -> usize {
        self.inner.pool_size
    }

    pub fn log_manager(&self) -> Option<&LogManager> {
        self.inner.log.as_ref()
    }

    /// Allocate a fresh page, pinned into a frame. Returns Ok(None) when
    /// every frame is pinned.
    pub fn new_page(&self) -> StorageResult<Option<(PageId, PageRef)>> {
        let mut state = self.inner.latch.lock();

        let Some(frame_id) = self.replacement_frame(&mut state) else {
            return Ok(None);
        };
        let page_id = PageId(state.next_page_id);
        state.next_page_id += 1;

        let frame = &self.inner.frames[frame_id as usize];
        self.evict_occupant(frame)?;
        {
            let mut page = frame.write();
            page.set_page_id(page_id);
            page.inc_pin_count();
        }
        self.inner.replacer.record_access(frame_id);
        self.inner.replacer.set_evictable(frame_id, false);
        self.inner.page_table.insert(page_id, frame_id);

        Ok(Some((page_id, Arc::clone(frame))))
    }

    /// Pin the page, loading it from disk if it is not resident. Returns
    /// Ok(None) when the page is not resident and every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> StorageResult<Option<PageRef>> {
        let mut state = self.inner.latch.lock();

        if let Some(frame_id) = self.inner.page_table.find(&page_id) {
            if frame_id != INVALID_FRAME_ID {
                let frame = &self.inner.frames[frame_id as usize];
                let page = frame.read();
                if page.page_id() == page_id {
                    page.inc_pin_count();
                    drop(page);
                    self.inner.replacer.record_access(frame_id);
                    self.inner.replacer.set_evictable(frame_id, false);
                    return Ok(Some(Arc::clone(frame)));
                }
            }
        }

        // Not resident (or tombstoned): bring it in from disk.
        let Some(frame_id) = self.replacement_frame(&mut state) else {
            return Ok(None);
        };
        let frame = &self.inner.frames[frame_id as usize];
        self.evict_occupant(frame)?;
        {
            let mut page = frame.write();
            if let Err(e) = self.inner.disk.lock().read_page(page_id, page.data_mut()) {
                // The frame is clean and unowned again; hand it back.
                page.reset();
                drop(page);
                state.free_list.push_front(frame_id);
                return Err(e);
            }
            page.set_page_id(page_id);
            page.inc_pin_count();
        }
        self.inner.replacer.record_access(frame_id);
        self.inner.replacer.set_evictable(frame_id, false);
        self.inner.page_table.insert(page_id, frame_id);

        Ok(Some(Arc::clone(frame)))
    }

    /// Drop one pin on the page. The dirty bit is sticky: once a caller
    /// unpins with `is_dirty`, later clean unpins do not clear it. Returns
    /// false for a page that is not resident or not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let _state = self.inner.latch.lock();

        let Some(frame_id) = self.inner.page_table.find(&page_id) else {
            return false;
        };
        if frame_id == INVALID_FRAME_ID {
            return false;
        }
        let frame = &self.inner.frames[frame_id as usize];
        let page = frame.read();
        if page.page_id() != page_id || page.pin_count() == 0 {
            return false;
        }
        page.dec_pin_count();
        if is_dirty {
            page.set_dirty(true);
        }
        if page.pin_count() == 0 {
            self.inner.replacer.set_evictable(frame_id, true);
        }
        true
    }

    /// Write the page's bytes to disk and clear its dirty bit, leaving pin
    /// count and eviction status alone. Returns false if not resident.
    pub fn flush_page(&self, page_id: PageId) -> StorageResult<bool> {
        let _state = self.inner.latch.lock();

        let Some(frame_id) = self.inner.page_table.find(&page_id) else {
            return Ok(false);
        };
        if frame_id == INVALID_FRAME_ID {
            return Ok(false);
        }
        let frame = &self.inner.frames[frame_id as usize];
        let page = frame.read();
        if page.page_id() != page_id {
            return Ok(false);
        }
        self.inner.disk.lock().write_page(page_id, page.data())?;
        page.set_dirty(false);
        Ok(true)
    }

    pub fn flush_all_pages(&self) -> StorageResult<()> {
        let _state = self.inner.latch.lock();

        for frame in &self.inner.frames {
            let page = frame.read();
            if page.page_id().is_valid() {
                self.inner
                    .disk
                    .lock()
                    .write_page(page.page_id(), page.data())?;
                page.set_dirty(false);
            }
        }
        Ok(())
    }

    /// Drop the page from the pool and deallocate it on disk. Returns false
    /// if the page is pinned; a page that is not resident counts as already
    /// deleted.
    pub fn delete_page(&self, page_id: PageId) -> StorageResult<bool> {
        let mut state = self.inner.latch.lock();

        let Some(frame_id) = self.inner.page_table.find(&page_id) else {
            return Ok(true);
        };
        if frame_id == INVALID_FRAME_ID {
            self.inner.page_table.remove(&page_id);
            return Ok(true);
        }
        let frame = &self.inner.frames[frame_id as usize];
        let mut page = frame.write();
        if page.pin_count() > 0 {
            return Ok(false);
        }
        if page.is_dirty() {
            self.inner.disk.lock().write_page(page_id, page.data())?;
        }
        page.reset();
        drop(page);

        self.inner.replacer.remove(frame_id);
        self.inner.page_table.remove(&page_id);
        state.free_list.push_back(frame_id);
        self.inner.disk.lock().deallocate_page(page_id)?;
        Ok(true)
    }

    /// A frame to load into: the free list first, then an eviction victim.
    fn replacement_frame(&self, state: &mut PoolState) -> Option<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Some(frame_id);
        }
        self.inner.replacer.evict()
    }

    /// Write back and unmap whatever page currently occupies the frame,
    /// leaving a tombstone in the page directory, then reset the frame.
    fn evict_occupant(&self, frame: &PageRef) -> StorageResult<()> {
        let mut page = frame.write();
        if page.page_id().is_valid() {
            if page.is_dirty() {
                self.inner
                    .disk
                    .lock()
                    .write_page(page.page_id(), page.data())?;
            }
            self.inner
                .page_table
                .insert(page.page_id(), INVALID_FRAME_ID);
        }
        page.reset();
        Ok(())
    }
}
