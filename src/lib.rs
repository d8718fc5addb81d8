//! bptdb - a disk-resident B+Tree key-value engine
//!
//! Records map signed 64-bit keys to short string values and live in a single
//! store file of fixed-size pages. A line protocol on stdin/stdout drives the
//! engine one command at a time.
//!
//! # Architecture
//!
//! The system is organized into layers, each depending only on the ones
//! below it:
//!
//! - **Protocol** (`protocol`): parses `i`/`d`/`f`/`r`/`q` lines and writes
//!   responses
//!   - `Command`: a parsed line
//!   - `Dispatcher`: the read-execute-respond loop
//!
//! - **Engine** (`engine`): owns the storage stack for one store file
//!
//! - **Index** (`index`): the B+Tree
//!   - `BTreeIndex`: insert, find, delete, range scan and integrity checks
//!   - `LeafPage`/`InternalPage`: node layouts within a page
//!   - `BTreeIterator`: ascending scan along the leaf chain
//!   - `MergeJoin`: sort-merge join of two trees on equal keys
//!
//! - **Buffer Pool** (`buffer`): memory management for store pages
//!   - `BufferPoolManager`: fetches pages from disk and caches them in memory
//!   - `LruKReplacer`: LRU-K page replacement policy
//!   - `FrameHeader`: per-frame metadata and data storage
//!   - `ReadPageGuard`/`WritePageGuard`: RAII guards that unpin on drop
//!
//! - **Storage Layer** (`storage`): the store file
//!   - `DiskManager`: page I/O, page allocation and the free list
//!   - `StoreHeader`: page 0, locating the root and the free list
//!
//! # Example
//!
//! ```rust,no_run
//! use bptdb::common::EngineConfig;
//! use bptdb::engine::Engine;
//!
//! let mut engine = Engine::open(&EngineConfig::new("test.db")).unwrap();
//! engine.insert(5, "a5").unwrap();
//! assert_eq!(engine.find(5).unwrap().as_deref(), Some("a5"));
//! engine.close().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod engine;
pub mod index;
pub mod protocol;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{DbError, Key, PageId, Result};
