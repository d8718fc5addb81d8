use std::path::PathBuf;

use super::types::PageId;

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Invalid page ID constant
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// Page 0 always holds the store header
pub const HEADER_PAGE_ID: PageId = PageId(0);

/// Default K value for LRU-K replacement policy
pub const DEFAULT_LRUK_K: usize = 2;

/// Default buffer pool size (number of frames, 4 MB of pages)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 1024;

/// Maximum length of a value in bytes
pub const MAX_VALUE_SIZE: usize = 120;

/// Default leaf order (max records per leaf)
pub const DEFAULT_LEAF_ORDER: usize = 31;

/// Default internal order (max separator keys per internal node)
pub const DEFAULT_INTERNAL_ORDER: usize = 248;

/// Store file used when none is given on the command line
pub const DEFAULT_DB_PATH: &str = "test.db";

/// Runtime settings for an [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path of the backing store file
    pub db_path: PathBuf,
    /// Number of frames in the buffer pool
    pub pool_size: usize,
    /// K value for the LRU-K replacer
    pub lru_k: usize,
    /// Max records per leaf node
    pub leaf_order: usize,
    /// Max separator keys per internal node
    pub internal_order: usize,
}

impl EngineConfig {
    pub fn new<P: Into<PathBuf>>(db_path: P) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_lru_k(mut self, k: usize) -> Self {
        self.lru_k = k;
        self
    }

    pub fn with_orders(mut self, leaf_order: usize, internal_order: usize) -> Self {
        self.leaf_order = leaf_order;
        self.internal_order = internal_order;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            pool_size: DEFAULT_BUFFER_POOL_SIZE,
            lru_k: DEFAULT_LRUK_K,
            leaf_order: DEFAULT_LEAF_ORDER,
            internal_order: DEFAULT_INTERNAL_ORDER,
        }
    }
}
