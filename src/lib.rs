//! shardpool - a sharded database buffer pool with LRU eviction.
//!
//! # Architecture
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                    ShardedBufferPool                      │
//! │   route: page_id % N          new page: round-robin       │
//! │  ┌─────────────────┐  ┌─────────────────┐                 │
//! │  │ BufferPool      │  │ BufferPool      │   ...  (N)      │
//! │  │ Instance 0      │  │ Instance 1      │                 │
//! │  │  page_table     │  │  page_table     │                 │
//! │  │  free_list      │  │  free_list      │                 │
//! │  │  LruReplacer    │  │  LruReplacer    │                 │
//! │  │  frames[]       │  │  frames[]       │                 │
//! │  └────────┬────────┘  └────────┬────────┘                 │
//! │           └──────────┬─────────┘                          │
//! │                      ▼                                    │
//! │               ┌─────────────┐                             │
//! │               │ DiskManager │  single database file       │
//! │               └─────────────┘                             │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Each instance serializes its own state transitions behind one mutex;
//! shards are independent, so contention is divided by N. Page ids are
//! allocated by instance offset (instance k of N owns ids k, k+N, ...),
//! which makes routing a single modulo.
//!
//! # Modules
//! - [`common`] - shared primitives (PageId, FrameId, Error, config)
//! - [`buffer`] - pool instances, sharding, eviction, guards
//! - [`storage`] - disk I/O and the page type
//! - [`recovery`] - reserved write-ahead-log seam
//!
//! # Quick Start
//! ```no_run
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use shardpool::{DiskManager, ShardedBufferPool};
//!
//! let disk = Arc::new(Mutex::new(DiskManager::create("my.db").unwrap()));
//! let pool = ShardedBufferPool::new(4, 64, disk);
//!
//! let mut guard = pool.new_page().unwrap();
//! guard.as_mut_slice()[0] = 0xAB;
//! let page_id = guard.page_id();
//! drop(guard); // unpins; the page is dirty and will be written back
//!
//! let guard = pool.fetch_page_read(page_id).unwrap();
//! assert_eq!(guard.as_slice()[0], 0xAB);
//! ```

pub mod buffer;
pub mod common;
pub mod recovery;
pub mod storage;

pub use common::config::PAGE_SIZE;
pub use common::{Error, FrameId, PageId, Result};

pub use buffer::{
    BufferPoolInstance, BufferPoolStats, Frame, LruReplacer, PageReadGuard,
    PageWriteGuard, ShardedBufferPool, StatsSnapshot,
};
pub use recovery::LogManager;
pub use storage::page::Page;
pub use storage::DiskManager;
