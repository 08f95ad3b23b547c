//! Integration tests for the buffer pool manager

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use silt::buffer::BufferPoolManager;
use silt::common::{Lsn, PageId, Result};
use silt::recovery::LogManager;
use silt::storage::disk::DiskManager;

/// In-memory disk double that records the order of reads, writes, and
/// deallocations.
#[derive(Default)]
struct RecordingDiskManager {
    pages: Mutex<HashMap<PageId, Vec<u8>>>,
    next_page_id: AtomicU32,
    reads: Mutex<Vec<PageId>>,
    writes: Mutex<Vec<PageId>>,
    deallocated: Mutex<Vec<PageId>>,
}

impl RecordingDiskManager {
    fn writes(&self) -> Vec<PageId> {
        self.writes.lock().clone()
    }

    fn reads(&self) -> Vec<PageId> {
        self.reads.lock().clone()
    }

    fn page_bytes(&self, page_id: PageId) -> Option<Vec<u8>> {
        self.pages.lock().get(&page_id).cloned()
    }
}

impl DiskManager for RecordingDiskManager {
    fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        self.reads.lock().push(page_id);
        match self.pages.lock().get(&page_id) {
            Some(bytes) => data.copy_from_slice(bytes),
            None => data.fill(0),
        }
        Ok(())
    }

    fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        self.writes.lock().push(page_id);
        self.pages.lock().insert(page_id, data.to_vec());
        Ok(())
    }

    fn allocate_page(&self) -> Result<PageId> {
        Ok(PageId::new(self.next_page_id.fetch_add(1, Ordering::SeqCst)))
    }

    fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        self.deallocated.lock().push(page_id);
        Ok(())
    }
}

fn create_bpm(pool_size: usize) -> (BufferPoolManager, Arc<RecordingDiskManager>) {
    let disk = Arc::new(RecordingDiskManager::default());
    let bpm = BufferPoolManager::new(pool_size, 2, Arc::clone(&disk) as Arc<dyn DiskManager>);
    (bpm, disk)
}

#[test]
fn test_new_page_until_full_then_none() {
    let (bpm, _disk) = create_bpm(3);

    for expected in 0..3u32 {
        let page = bpm.new_page().unwrap().unwrap();
        assert_eq!(page.page_id(), PageId::new(expected));
        assert_eq!(page.pin_count(), 1);
    }

    // Every frame is pinned: no page can be created.
    assert!(bpm.new_page().unwrap().is_none());
}

#[test]
fn test_eviction_prefers_infinite_k_distance() {
    let (bpm, disk) = create_bpm(3);

    for _ in 0..3 {
        let page = bpm.new_page().unwrap().unwrap();
        drop(page);
    }
    // Pages 0 and 1 become evictable; page 2 stays pinned.
    assert!(bpm.unpin_page(PageId::new(0), false));
    assert!(bpm.unpin_page(PageId::new(1), false));

    // Page 0 gets a second access, graduating it out of the
    // infinite-k-distance set.
    let page = bpm.fetch_page(PageId::new(0)).unwrap().unwrap();
    drop(page);
    assert!(bpm.unpin_page(PageId::new(0), false));

    // The new page must displace page 1, not the re-accessed page 0.
    let page = bpm.new_page().unwrap().unwrap();
    assert_eq!(page.page_id(), PageId::new(3));
    assert_eq!(bpm.get_pin_count(PageId::new(1)), None);
    assert_eq!(bpm.get_pin_count(PageId::new(0)), Some(0));

    // Page 0 never traveled through the disk.
    assert!(!disk.reads().contains(&PageId::new(0)));
}

#[test]
fn test_dirty_flag_is_sticky() {
    let (bpm, disk) = create_bpm(3);

    let page = bpm.new_page().unwrap().unwrap();
    let page_id = page.page_id();
    page.write_data()[0] = 0xAB;
    drop(page);
    assert!(bpm.unpin_page(page_id, true));

    // A later clean unpin must not mask the earlier mutation.
    let page = bpm.fetch_page(page_id).unwrap().unwrap();
    drop(page);
    assert!(bpm.unpin_page(page_id, false));

    assert!(bpm.flush_page(page_id).unwrap());
    let bytes = disk.page_bytes(page_id).unwrap();
    assert_eq!(bytes[0], 0xAB);
}

#[test]
fn test_no_lost_writes_through_eviction() {
    let (bpm, disk) = create_bpm(2);

    let page = bpm.new_page().unwrap().unwrap();
    let victim_id = page.page_id();
    page.write_data()[0] = 0x5A;
    drop(page);
    assert!(bpm.unpin_page(victim_id, true));

    let page = bpm.new_page().unwrap().unwrap();
    let second_id = page.page_id();
    drop(page);
    assert!(bpm.unpin_page(second_id, false));

    // Creating a third page evicts the dirty victim and must write it back
    // before the mapping disappears.
    let _pinned = bpm.new_page().unwrap().unwrap();
    assert!(disk.writes().contains(&victim_id));

    // Fetching the victim again reads the written-back contents.
    let page = bpm.fetch_page(victim_id).unwrap().unwrap();
    assert_eq!(page.read_data()[0], 0x5A);
    drop(page);
    bpm.unpin_page(victim_id, false);
}

#[test]
fn test_clean_page_evicted_without_write() {
    let (bpm, disk) = create_bpm(1);

    let page = bpm.new_page().unwrap().unwrap();
    let first_id = page.page_id();
    drop(page);
    assert!(bpm.unpin_page(first_id, false));

    let _page = bpm.new_page().unwrap().unwrap();
    assert!(!disk.writes().contains(&first_id));
}

#[test]
fn test_flush_page_writes_through_regardless_of_dirty() {
    let (bpm, disk) = create_bpm(3);

    let page = bpm.new_page().unwrap().unwrap();
    let page_id = page.page_id();
    drop(page);
    bpm.unpin_page(page_id, false);

    // The page is clean, yet flush still writes it.
    assert!(bpm.flush_page(page_id).unwrap());
    assert_eq!(disk.writes(), vec![page_id]);

    // Unknown pages report false.
    assert!(!bpm.flush_page(PageId::new(42)).unwrap());
}

#[test]
fn test_flush_preserves_pin_state() {
    let (bpm, _disk) = create_bpm(3);

    let page = bpm.new_page().unwrap().unwrap();
    let page_id = page.page_id();

    assert!(bpm.flush_page(page_id).unwrap());
    assert_eq!(bpm.get_pin_count(page_id), Some(1));

    let page2 = bpm.fetch_page(page_id).unwrap().unwrap();
    assert!(!page2.is_dirty());
    drop(page2);
    bpm.unpin_page(page_id, false);
    bpm.unpin_page(page_id, false);
}

#[test]
fn test_flush_all_pages() {
    let (bpm, disk) = create_bpm(4);

    let mut page_ids = Vec::new();
    for i in 0..3u8 {
        let page = bpm.new_page().unwrap().unwrap();
        page.write_data()[0] = i;
        page_ids.push(page.page_id());
        drop(page);
        bpm.unpin_page(page_ids[i as usize], true);
    }

    bpm.flush_all_pages().unwrap();

    let writes = disk.writes();
    for (i, page_id) in page_ids.iter().enumerate() {
        assert!(writes.contains(page_id));
        assert_eq!(disk.page_bytes(*page_id).unwrap()[0], i as u8);
    }
}

#[test]
fn test_delete_unpinned_dirty_page_writes_back() {
    let (bpm, disk) = create_bpm(3);

    let page = bpm.new_page().unwrap().unwrap();
    let page_id = page.page_id();
    page.write_data()[0] = 0xEE;
    drop(page);
    assert!(bpm.unpin_page(page_id, true));

    assert!(bpm.delete_page(page_id).unwrap());
    assert!(disk.writes().contains(&page_id));
    assert_eq!(disk.page_bytes(page_id).unwrap()[0], 0xEE);
    assert_eq!(*disk.deallocated.lock(), vec![page_id]);
    assert_eq!(bpm.get_pin_count(page_id), None);
    assert_eq!(bpm.free_frame_count(), 3);
}

#[test]
fn test_delete_pinned_page_refused() {
    let (bpm, _disk) = create_bpm(3);

    let page = bpm.new_page().unwrap().unwrap();
    let page_id = page.page_id();

    assert!(!bpm.delete_page(page_id).unwrap());
    assert_eq!(bpm.get_pin_count(page_id), Some(1));
}

#[test]
fn test_delete_unknown_page_is_noop() {
    let (bpm, disk) = create_bpm(3);
    assert!(bpm.delete_page(PageId::new(9)).unwrap());
    assert!(disk.deallocated.lock().is_empty());
}

#[test]
fn test_unpin_more_than_pinned_fails() {
    let (bpm, _disk) = create_bpm(3);

    let page = bpm.new_page().unwrap().unwrap();
    let page_id = page.page_id();

    assert!(bpm.unpin_page(page_id, false));
    assert!(!bpm.unpin_page(page_id, false));
}

#[test]
fn test_fetch_miss_reads_from_disk() {
    let (bpm, disk) = create_bpm(1);

    let page = bpm.new_page().unwrap().unwrap();
    let first_id = page.page_id();
    page.write_data()[7] = 0x77;
    drop(page);
    bpm.unpin_page(first_id, true);

    // Force the page out of the pool.
    let page = bpm.new_page().unwrap().unwrap();
    let second_id = page.page_id();
    drop(page);
    bpm.unpin_page(second_id, false);

    let page = bpm.fetch_page(first_id).unwrap().unwrap();
    assert_eq!(page.read_data()[7], 0x77);
    assert!(disk.reads().contains(&first_id));
    drop(page);
    bpm.unpin_page(first_id, false);
}

#[test]
fn test_fetch_when_all_pinned_returns_none() {
    let (bpm, _disk) = create_bpm(2);

    let _p0 = bpm.new_page().unwrap().unwrap();
    let _p1 = bpm.new_page().unwrap().unwrap();

    assert!(bpm.fetch_page(PageId::new(40)).unwrap().is_none());
}

#[test]
fn test_page_guards_round_trip() {
    let (bpm, _disk) = create_bpm(3);

    let page = bpm.new_page().unwrap().unwrap();
    let page_id = page.page_id();
    drop(page);
    bpm.unpin_page(page_id, false);

    {
        let mut guard = bpm.checked_write_page(page_id).unwrap().unwrap();
        guard.data_mut()[..4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
    }
    assert_eq!(bpm.get_pin_count(page_id), Some(0));

    {
        let guard = bpm.checked_read_page(page_id).unwrap().unwrap();
        assert_eq!(&guard.data()[..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }
    assert_eq!(bpm.get_pin_count(page_id), Some(0));
}

/// Log double that records each flush request.
#[derive(Default)]
struct RecordingLogManager {
    flushed: Mutex<Vec<Lsn>>,
}

impl LogManager for RecordingLogManager {
    fn flush_until(&self, lsn: Lsn) {
        self.flushed.lock().push(lsn);
    }
}

#[test]
fn test_wal_hook_fires_before_write_back() {
    let disk = Arc::new(RecordingDiskManager::default());
    let log = Arc::new(RecordingLogManager::default());
    let bpm = BufferPoolManager::new(3, 2, Arc::clone(&disk) as Arc<dyn DiskManager>)
        .with_log_manager(Arc::clone(&log) as Arc<dyn LogManager>);

    let page = bpm.new_page().unwrap().unwrap();
    let page_id = page.page_id();
    page.write_data()[0] = 1;
    page.set_lsn(42);
    drop(page);
    bpm.unpin_page(page_id, true);

    assert!(bpm.flush_page(page_id).unwrap());
    assert_eq!(*log.flushed.lock(), vec![42]);
}

#[test]
fn test_concurrent_new_write_read() {
    let (bpm, _disk) = create_bpm(8);
    let bpm = Arc::new(bpm);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let bpm = Arc::clone(&bpm);
            thread::spawn(move || {
                let mut ids = Vec::new();
                for _ in 0..2 {
                    let page = bpm.new_page().unwrap().unwrap();
                    let page_id = page.page_id();
                    page.write_data()[0] = page_id.as_u32() as u8;
                    drop(page);
                    assert!(bpm.unpin_page(page_id, true));
                    ids.push(page_id);
                }
                ids
            })
        })
        .collect();

    let mut all_ids = Vec::new();
    for handle in handles {
        all_ids.extend(handle.join().unwrap());
    }

    assert_eq!(all_ids.len(), 8);
    for page_id in all_ids {
        let page = bpm.fetch_page(page_id).unwrap().unwrap();
        assert_eq!(page.read_data()[0], page_id.as_u32() as u8);
        drop(page);
        assert!(bpm.unpin_page(page_id, false));
    }
}

#[test]
fn test_page_data_zeroed_on_new_page() {
    let (bpm, _disk) = create_bpm(1);

    let page = bpm.new_page().unwrap().unwrap();
    let first_id = page.page_id();
    page.write_data().fill(0xFF);
    drop(page);
    bpm.unpin_page(first_id, true);

    // The recycled frame must not leak the previous page's bytes.
    let page = bpm.new_page().unwrap().unwrap();
    assert!(page.read_data().iter().all(|&b| b == 0));
}
