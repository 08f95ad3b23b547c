use parking_lot::{Mutex, RwLock};

use crate::common::{FrameId, Lsn, PageId, INVALID_LSN, INVALID_PAGE_ID, PAGE_SIZE};

/// Bookkeeping for the page a frame currently holds.
#[derive(Debug, Clone, Copy)]
struct FrameMeta {
    page_id: PageId,
    pin_count: u32,
    is_dirty: bool,
    lsn: Lsn,
}

impl FrameMeta {
    fn free() -> Self {
        Self {
            page_id: INVALID_PAGE_ID,
            pin_count: 0,
            is_dirty: false,
            lsn: INVALID_LSN,
        }
    }
}

/// A single buffer frame in the buffer pool.
///
/// A frame exists for the life of the pool at a fixed slot; the page it
/// holds rotates as pages are fetched and evicted. The pool latch
/// serializes every identity change, so the metadata needs no finer
/// machinery than one small mutex, which also keeps reads coherent for
/// callers that hold the frame across latch release. The data `RwLock` is
/// the page-content latch callers use to coordinate concurrent reads and
/// writes while pinned.
pub struct Frame {
    /// The frame ID (index in the buffer pool)
    frame_id: FrameId,
    /// Identity and bookkeeping of the held page
    meta: Mutex<FrameMeta>,
    /// The actual page data
    pub(crate) data: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl Frame {
    /// Creates a new free frame for the given frame ID.
    pub(crate) fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            meta: Mutex::new(FrameMeta::free()),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    /// Returns the frame ID.
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Returns the page ID stored in this frame.
    pub fn page_id(&self) -> PageId {
        self.meta.lock().page_id
    }

    /// Returns the current pin count.
    pub fn pin_count(&self) -> u32 {
        self.meta.lock().pin_count
    }

    /// Returns whether the page is dirty.
    pub fn is_dirty(&self) -> bool {
        self.meta.lock().is_dirty
    }

    /// Returns the LSN of the last log record touching this page.
    pub fn lsn(&self) -> Lsn {
        self.meta.lock().lsn
    }

    /// Records the LSN of a log record touching this page. Callers that log
    /// their page mutations set this so write-back can honor the WAL rule.
    pub fn set_lsn(&self, lsn: Lsn) {
        self.meta.lock().lsn = lsn;
    }

    /// Makes the frame hold `page_id`, clean and with a single pin. The
    /// frame must be in the reset state; the caller owns the data bytes.
    pub(crate) fn install(&self, page_id: PageId) {
        let mut meta = self.meta.lock();
        debug_assert_eq!(meta.page_id, INVALID_PAGE_ID);
        meta.page_id = page_id;
        meta.pin_count = 1;
        meta.is_dirty = false;
        meta.lsn = INVALID_LSN;
    }

    /// Adds a pin and returns the new count.
    pub(crate) fn pin(&self) -> u32 {
        let mut meta = self.meta.lock();
        meta.pin_count += 1;
        meta.pin_count
    }

    /// Drops a pin and returns the new count, or None if there was none.
    pub(crate) fn unpin(&self) -> Option<u32> {
        let mut meta = self.meta.lock();
        if meta.pin_count == 0 {
            return None;
        }
        meta.pin_count -= 1;
        Some(meta.pin_count)
    }

    pub(crate) fn set_dirty(&self, dirty: bool) {
        self.meta.lock().is_dirty = dirty;
    }

    /// Returns a read guard to the page data.
    pub fn read_data(&self) -> parking_lot::RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.read()
    }

    /// Returns a write guard to the page data. Callers must hold a pin and
    /// report the mutation when unpinning.
    pub fn write_data(&self) -> parking_lot::RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.write()
    }

    /// Returns the frame to its free state: no page, no pins, zeroed data.
    pub(crate) fn reset(&self) {
        *self.meta.lock() = FrameMeta::free();
        self.data.write().fill(0);
    }
}
