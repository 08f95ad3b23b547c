use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{FrameId, PageId, Result, SiltError, DEFAULT_BUCKET_SIZE, INVALID_PAGE_ID};
use crate::container::ExtendibleHashTable;
use crate::recovery::LogManager;
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{Frame, LruKReplacer, ReadPageGuard, WritePageGuard};

/// BufferPoolManager mediates every page-level read and write between the
/// higher storage layers and the disk. It owns a fixed pool of frames,
/// caches pages in them, and uses the LRU-K replacement policy to decide
/// which page to evict when the pool is full.
///
/// A page table (extendible hash table) maps resident page ids to frames.
/// Every public operation serializes on the pool latch end to end,
/// including the disk I/O it issues; the page table and the replacer carry
/// their own mutexes and are only ever locked while the pool latch is held.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    /// The buffer pool frames
    frames: Vec<Arc<Frame>>,
    /// Page table: maps resident page IDs to frame IDs
    page_table: ExtendibleHashTable<PageId, FrameId>,
    /// LRU-K replacer for eviction decisions
    replacer: LruKReplacer,
    /// Frames that hold no page
    free_list: Mutex<VecDeque<FrameId>>,
    /// Pool latch serializing all public operations
    latch: Mutex<()>,
    /// Disk scheduler for page I/O
    disk_scheduler: DiskScheduler,
    /// Optional WAL collaborator, notified before dirty write-back
    log_manager: Option<Arc<dyn LogManager>>,
}

impl BufferPoolManager {
    /// Creates a new BufferPoolManager with the given pool size, k value
    /// for LRU-K, and disk manager.
    pub fn new(pool_size: usize, replacer_k: usize, disk_manager: Arc<dyn DiskManager>) -> Self {
        assert!(pool_size > 0, "pool_size must be positive");

        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(Frame::new(frame_id)));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            frames,
            page_table: ExtendibleHashTable::new(DEFAULT_BUCKET_SIZE),
            replacer: LruKReplacer::new(replacer_k, pool_size),
            free_list: Mutex::new(free_list),
            latch: Mutex::new(()),
            disk_scheduler: DiskScheduler::new(disk_manager),
            log_manager: None,
        }
    }

    /// Attaches a WAL collaborator. Before any dirty page is written back,
    /// the collaborator is asked to flush the log up to the page's LSN.
    pub fn with_log_manager(mut self, log_manager: Arc<dyn LogManager>) -> Self {
        self.log_manager = Some(log_manager);
        self
    }

    /// Creates a new page in the buffer pool, pinned for the caller.
    ///
    /// A fresh page id is allocated from the disk manager and the frame's
    /// memory is zeroed. Returns `Ok(None)` when every frame is pinned.
    pub fn new_page(&self) -> Result<Option<Arc<Frame>>> {
        let _latch = self.latch.lock();

        let Some(frame_id) = self.get_available_frame()? else {
            return Ok(None);
        };
        let frame = &self.frames[frame_id.as_usize()];

        let page_id = self.disk_scheduler.disk_manager().allocate_page()?;
        frame.install(page_id);

        if let Err(e) = self.page_table.insert(page_id, frame_id) {
            frame.reset();
            self.free_list.lock().push_back(frame_id);
            self.disk_scheduler
                .disk_manager()
                .deallocate_page(page_id)
                .ok();
            return Err(e);
        }
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);

        Ok(Some(Arc::clone(frame)))
    }

    /// Fetches the page with the given id, pinning it for the caller.
    ///
    /// A resident page is pinned in place; otherwise a frame is freed up
    /// and the page is read from disk. Returns `Ok(None)` when every frame
    /// is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Result<Option<Arc<Frame>>> {
        if page_id == INVALID_PAGE_ID {
            return Err(SiltError::InvalidPageId(page_id));
        }
        let _latch = self.latch.lock();

        if let Some(frame_id) = self.page_table.find(&page_id) {
            let frame = &self.frames[frame_id.as_usize()];
            frame.pin();
            self.replacer.record_access(frame_id);
            self.replacer.set_evictable(frame_id, false);
            return Ok(Some(Arc::clone(frame)));
        }

        let Some(frame_id) = self.get_available_frame()? else {
            return Ok(None);
        };
        let frame = &self.frames[frame_id.as_usize()];

        if let Err(e) = self
            .disk_scheduler
            .read_page_sync(page_id, &mut frame.write_data()[..])
        {
            self.free_list.lock().push_back(frame_id);
            return Err(e);
        }
        frame.install(page_id);

        if let Err(e) = self.page_table.insert(page_id, frame_id) {
            frame.reset();
            self.free_list.lock().push_back(frame_id);
            return Err(e);
        }
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);

        Ok(Some(Arc::clone(frame)))
    }

    /// Drops one pin on the page, recording whether the caller dirtied it.
    ///
    /// The dirty flag is sticky: once set it stays until the page is
    /// flushed. When the pin count reaches zero the frame becomes
    /// evictable. Returns false when the page is not resident or not
    /// pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let _latch = self.latch.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.as_usize()];
        if frame.pin_count() == 0 {
            return false;
        }
        if is_dirty {
            frame.set_dirty(true);
        }
        if let Some(0) = frame.unpin() {
            self.replacer.set_evictable(frame_id, true);
        }
        true
    }

    /// Writes the page through to disk regardless of its dirty flag and
    /// clears the flag. Pin state is unchanged. Returns `Ok(false)` when
    /// the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Err(SiltError::InvalidPageId(page_id));
        }
        let _latch = self.latch.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(false);
        };
        self.write_back(&self.frames[frame_id.as_usize()], page_id)?;
        Ok(true)
    }

    /// Writes every resident page through to disk and clears dirty flags.
    pub fn flush_all_pages(&self) -> Result<()> {
        let _latch = self.latch.lock();

        for frame in &self.frames {
            let page_id = frame.page_id();
            if page_id != INVALID_PAGE_ID {
                self.write_back(frame, page_id)?;
            }
        }
        tracing::debug!("flushed all resident pages");
        Ok(())
    }

    /// Deletes the page from the pool, returning its frame to the free
    /// list and deallocating its id at the disk manager.
    ///
    /// Returns `Ok(true)` when the page is not resident (nothing to do)
    /// and `Ok(false)` when it is still pinned. A dirty page is written
    /// back before the frame is recycled.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let _latch = self.latch.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(true);
        };
        let frame = &self.frames[frame_id.as_usize()];
        if frame.pin_count() > 0 {
            return Ok(false);
        }
        if frame.is_dirty() {
            self.write_back(frame, page_id)?;
        }

        frame.reset();
        self.page_table.remove(&page_id);
        self.replacer.remove(frame_id);
        self.free_list.lock().push_back(frame_id);
        self.disk_scheduler.disk_manager().deallocate_page(page_id)?;

        tracing::trace!(page_id = %page_id, "deleted page");
        Ok(true)
    }

    /// Fetches a page for read access. The guard unpins the page on drop.
    /// Returns `Ok(None)` when every frame is pinned.
    pub fn checked_read_page(&self, page_id: PageId) -> Result<Option<ReadPageGuard<'_>>> {
        Ok(self
            .fetch_page(page_id)?
            .map(|frame| ReadPageGuard::new(self, page_id, frame)))
    }

    /// Fetches a page for write access. The guard unpins the page on drop,
    /// reporting it dirty if it was written through the guard.
    pub fn checked_write_page(&self, page_id: PageId) -> Result<Option<WritePageGuard<'_>>> {
        Ok(self
            .fetch_page(page_id)?
            .map(|frame| WritePageGuard::new(self, page_id, frame)))
    }

    /// Returns the pin count for a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let _latch = self.latch.lock();
        self.page_table
            .find(&page_id)
            .map(|frame_id| self.frames[frame_id.as_usize()].pin_count())
    }

    /// Returns the pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of free frames.
    pub fn free_frame_count(&self) -> usize {
        self.free_list.lock().len()
    }

    /// Obtains a frame for a new mapping: from the free list if possible,
    /// otherwise by evicting the replacer's victim. An evicted dirty page
    /// is written back before its mapping is removed. Every frame handed
    /// out is in the reset state; the caller installs the new mapping.
    fn get_available_frame(&self) -> Result<Option<FrameId>> {
        if let Some(frame_id) = self.free_list.lock().pop_front() {
            return Ok(Some(frame_id));
        }

        let Some(frame_id) = self.replacer.evict() else {
            return Ok(None);
        };
        let frame = &self.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            if let Err(e) = self.write_back(frame, old_page_id) {
                // The page stays mapped and dirty; hand the frame back to
                // the replacer so the invariants keep holding.
                self.replacer.record_access(frame_id);
                self.replacer.set_evictable(frame_id, true);
                return Err(e);
            }
            tracing::debug!(page_id = %old_page_id, frame_id = %frame_id, "wrote back dirty page on eviction");
        }

        self.page_table.remove(&old_page_id);
        frame.reset();
        Ok(Some(frame_id))
    }

    /// Writes the frame's page through to disk, honoring the WAL rule
    /// first, and clears the dirty flag.
    fn write_back(&self, frame: &Arc<Frame>, page_id: PageId) -> Result<()> {
        if let Some(log_manager) = &self.log_manager {
            log_manager.flush_until(frame.lsn());
        }
        self.disk_scheduler
            .write_page_sync(page_id, &frame.read_data()[..])?;
        frame.set_dirty(false);
        Ok(())
    }
}
