//! Silt - the page buffer pool of a disk-oriented storage engine
//!
//! This crate provides the bounded in-memory page cache that sits between
//! higher-level storage components (access methods, catalog, logging) and a
//! durable page store. All page-level reads and writes go through it.
//!
//! # Architecture
//!
//! The core is three tightly coupled subsystems:
//!
//! - **Buffer Pool** (`buffer`): frame lifecycle and page caching
//!   - `BufferPoolManager`: pins, fetch/flush/delete, eviction coordination
//!   - `LruKReplacer`: LRU-K page replacement policy
//!   - `Frame`: per-frame metadata and page data
//!   - `ReadPageGuard`/`WritePageGuard`: RAII guards that unpin on drop
//!
//! - **Containers** (`container`): in-memory data structures
//!   - `ExtendibleHashTable`: the page table, mapping page ids to frames
//!     with split-on-overflow directory growth
//!
//! - **Storage Layer** (`storage`): the durable store collaborators
//!   - `DiskManager`: page-granular read/write and page id lifecycle
//!   - `FileDiskManager`: single-file implementation
//!   - `DiskScheduler`: background disk I/O worker
//!
//! - **Recovery** (`recovery`): the WAL hook the pool honors on write-back
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use silt::buffer::BufferPoolManager;
//! use silt::storage::disk::FileDiskManager;
//!
//! // Create a disk manager for a database file
//! let disk_manager = Arc::new(FileDiskManager::new("test.db").unwrap());
//!
//! // Create a buffer pool with 100 frames and LRU-2 replacement
//! let bpm = BufferPoolManager::new(100, 2, disk_manager);
//!
//! // Allocate a new page and write to it
//! let page = bpm.new_page().unwrap().expect("every frame is pinned");
//! let page_id = page.page_id();
//! page.write_data()[0] = 42;
//! bpm.unpin_page(page_id, true);
//!
//! // Flush changes to disk
//! bpm.flush_page(page_id).unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod container;
pub mod recovery;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{FrameId, PageId, Result, SiltError};
