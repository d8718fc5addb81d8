use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use log::{debug, info, trace, warn};
use parking_lot::Mutex;

use crate::common::{DbError, PageId, Result, HEADER_PAGE_ID, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::page::{FreePage, StoreHeader};

/// File handle and the cached header, guarded together so header updates and
/// the page I/O they describe never interleave.
struct DiskState {
    file: File,
    header: StoreHeader,
    /// The cached header differs from page 0 on disk
    header_dirty: bool,
}

impl DiskState {
    fn read_at(&mut self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(page_id.file_offset(PAGE_SIZE)))?;

        // Pages allocated but never written back read as zeros
        let mut filled = 0;
        while filled < PAGE_SIZE {
            let n = self.file.read(&mut data[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        data[filled..].fill(0);
        Ok(())
    }

    fn write_at(&mut self, page_id: PageId, data: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(page_id.file_offset(PAGE_SIZE)))?;
        self.file.write_all(data)?;
        self.file.flush()?;
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        let mut data = [0u8; PAGE_SIZE];
        self.header.encode(&mut data);
        self.write_at(HEADER_PAGE_ID, &data)?;
        self.header_dirty = false;
        Ok(())
    }

    /// Writes the header if it changed, then syncs the file.
    fn sync(&mut self) -> Result<()> {
        if self.header_dirty {
            self.write_header()?;
        }
        self.file.sync_all()?;
        Ok(())
    }

    fn check_data_page(&self, page_id: PageId) -> Result<()> {
        if page_id == HEADER_PAGE_ID
            || page_id == INVALID_PAGE_ID
            || page_id.as_u32() >= self.header.page_count
        {
            return Err(DbError::InvalidPageId(page_id));
        }
        Ok(())
    }
}

/// DiskManager owns the store file. It performs fixed-size page I/O, hands
/// out page ids from the free list or by growing the file, and caches the
/// store header (page 0).
///
/// Header changes stay in memory until [`DiskManager::sync`], which the
/// buffer pool calls after writing back its dirty pages. The header on disk
/// therefore never names a root that was not flushed with it.
pub struct DiskManager {
    state: Mutex<DiskState>,
    /// Path to the database file
    db_path: PathBuf,
    /// Number of disk reads performed
    num_reads: AtomicU32,
    /// Number of disk writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens the store file at `db_path`, creating it if it does not exist.
    /// An empty file is initialized with a fresh header; a non-empty file must
    /// carry a valid one.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        let file_size = file.metadata()?.len();

        let header = if file_size == 0 {
            StoreHeader::empty()
        } else {
            let mut data = [0u8; PAGE_SIZE];
            file.read_exact(&mut data).map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => DbError::InvalidDatabaseFile,
                _ => DbError::Io(e),
            })?;
            StoreHeader::decode(&data)?
        };

        let mut state = DiskState {
            file,
            header,
            header_dirty: false,
        };
        if file_size == 0 {
            state.write_header()?;
        }

        info!(
            "opened store {} (pages: {}, records: {}, root: {})",
            db_path.as_ref().display(),
            header.page_count,
            header.record_count,
            header.root_page_id
        );

        Ok(Self {
            state: Mutex::new(state),
            db_path: db_path.as_ref().to_path_buf(),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    /// Reads a page from disk into the provided buffer.
    /// The buffer must be exactly PAGE_SIZE bytes.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let mut state = self.state.lock();
        state.check_data_page(page_id)?;
        state.read_at(page_id, data)?;

        trace!("read {}", page_id);
        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page to disk from the provided buffer.
    /// The buffer must be exactly PAGE_SIZE bytes.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let mut state = self.state.lock();
        state.check_data_page(page_id)?;
        state.write_at(page_id, data)?;

        trace!("wrote {}", page_id);
        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Allocates a page, reusing the head of the free list when there is one
    /// and growing the file by one zeroed page otherwise.
    pub fn allocate_page(&self) -> Result<PageId> {
        let mut state = self.state.lock();

        let head = state.header.free_list_head;
        let page_id = if head != INVALID_PAGE_ID {
            let mut data = [0u8; PAGE_SIZE];
            state.read_at(head, &mut data)?;
            state.header.free_list_head = FreePage::decode_next(head, &data)?;
            head
        } else {
            let page_id = PageId::new(state.header.page_count);
            state.write_at(page_id, &[0u8; PAGE_SIZE])?;
            state.header.page_count += 1;
            page_id
        };

        state.header_dirty = true;
        debug!("allocated {}", page_id);
        Ok(page_id)
    }

    /// Pushes a page onto the free list.
    pub fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        let mut state = self.state.lock();
        state.check_data_page(page_id)?;

        let mut data = [0u8; PAGE_SIZE];
        FreePage::encode(&mut data, state.header.free_list_head);
        state.write_at(page_id, &data)?;

        state.header.free_list_head = page_id;
        state.header_dirty = true;
        debug!("freed {}", page_id);
        Ok(())
    }

    /// Returns a copy of the cached header.
    pub fn header(&self) -> StoreHeader {
        self.state.lock().header
    }

    pub fn root_page_id(&self) -> PageId {
        self.state.lock().header.root_page_id
    }

    pub fn set_root_page_id(&self, page_id: PageId) {
        let mut state = self.state.lock();
        if state.header.root_page_id != page_id {
            state.header.root_page_id = page_id;
            state.header_dirty = true;
        }
    }

    pub fn record_count(&self) -> u64 {
        self.state.lock().header.record_count
    }

    pub fn set_record_count(&self, count: u64) {
        let mut state = self.state.lock();
        if state.header.record_count != count {
            state.header.record_count = count;
            state.header_dirty = true;
        }
    }

    pub fn free_list_head(&self) -> PageId {
        self.state.lock().header.free_list_head
    }

    /// Walks the free list from its head.
    pub fn free_pages(&self) -> Result<Vec<PageId>> {
        let mut state = self.state.lock();
        let mut pages = Vec::new();
        let mut current = state.header.free_list_head;
        let mut data = [0u8; PAGE_SIZE];

        while current != INVALID_PAGE_ID {
            state.check_data_page(current)?;
            if pages.len() as u32 >= state.header.page_count {
                return Err(DbError::IndexCorrupted("free list contains a cycle".into()));
            }
            state.read_at(current, &mut data)?;
            pages.push(current);
            current = FreePage::decode_next(current, &data)?;
        }

        Ok(pages)
    }

    /// Returns the number of pages in the store, header included.
    pub fn get_num_pages(&self) -> u32 {
        self.state.lock().header.page_count
    }

    /// Returns the number of disk reads performed.
    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of disk writes performed.
    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    /// Returns the path to the database file.
    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    /// Persists the cached header if it changed and flushes the file.
    pub fn sync(&self) -> Result<()> {
        self.state.lock().sync()
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        if let Err(e) = self.state.get_mut().sync() {
            warn!("failed to sync {} on drop: {}", self.db_path.display(), e);
        }
    }
}
