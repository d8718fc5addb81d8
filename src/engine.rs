use std::io::Write;
use std::sync::Arc;

use log::info;

use crate::buffer::BufferPoolManager;
use crate::common::{EngineConfig, Key, Result};
use crate::index::{BTreeIndex, MergeJoin, TableInfo, TreeStats};
use crate::storage::disk::DiskManager;

/// Owns the whole storage stack for one store file: disk manager, buffer
/// pool and index. Opened at startup and closed on quit.
pub struct Engine {
    index: BTreeIndex,
    bpm: Arc<BufferPoolManager>,
    disk_manager: Arc<DiskManager>,
}

impl Engine {
    /// Opens (or creates) the store described by `config` and rebuilds the
    /// index from its header.
    pub fn open(config: &EngineConfig) -> Result<Self> {
        let disk_manager = Arc::new(DiskManager::open(&config.db_path)?);
        let bpm = Arc::new(BufferPoolManager::new(
            config.pool_size,
            config.lru_k,
            Arc::clone(&disk_manager),
        ));
        let index = BTreeIndex::with_orders(
            Arc::clone(&bpm),
            config.leaf_order,
            config.internal_order,
        );

        info!(
            "engine ready: {} records, {} frames, lru-{}",
            index.len(),
            config.pool_size,
            config.lru_k
        );

        Ok(Self {
            index,
            bpm,
            disk_manager,
        })
    }

    pub fn insert(&mut self, key: Key, value: &str) -> Result<()> {
        self.index.insert(key, value)
    }

    pub fn find(&self, key: Key) -> Result<Option<String>> {
        self.index.find(key)
    }

    pub fn delete(&mut self, key: Key) -> Result<()> {
        self.index.delete(key)
    }

    pub fn range(&self, lo: Key, hi: Key) -> Result<Vec<(Key, String)>> {
        self.index.range_scan(lo, hi)
    }

    pub fn len(&self) -> u64 {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn check_integrity(&self) -> Result<TreeStats> {
        self.index.check_integrity()
    }

    pub fn table_info(&self) -> Result<TableInfo> {
        self.index.table_info()
    }

    /// Joins this store with `other` on equal keys and writes one
    /// `key,value,key,value` line per match to `output`. Returns the number
    /// of matches.
    pub fn join<W: Write>(&self, other: &Engine, output: &mut W) -> Result<u64> {
        let mut matched = 0;
        let mut rows = MergeJoin::new(&self.index, &other.index)?;

        while let Some(row) = rows.next()? {
            writeln!(output, "{},{},{},{}", row.key, row.left, row.key, row.right)?;
            matched += 1;
        }
        output.flush()?;

        info!(
            "joined {} with {}: {} matches",
            self.disk_manager.get_db_path().display(),
            other.disk_manager.get_db_path().display(),
            matched
        );
        Ok(matched)
    }

    /// Writes every dirty page back and syncs the file.
    pub fn flush(&self) -> Result<()> {
        self.bpm.flush_all_pages()
    }

    /// Flushes and releases the store.
    pub fn close(self) -> Result<()> {
        self.flush()?;
        info!(
            "closed store {} ({} records, {} reads, {} writes)",
            self.disk_manager.get_db_path().display(),
            self.index.len(),
            self.disk_manager.get_num_reads(),
            self.disk_manager.get_num_writes()
        );
        Ok(())
    }
}
