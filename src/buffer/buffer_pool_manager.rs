use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use log::trace;
use parking_lot::Mutex;

use crate::common::{DbError, FrameId, PageId, Result, HEADER_PAGE_ID, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::disk::DiskManager;

use super::{FrameHeader, LruKReplacer, ReadPageGuard, WritePageGuard};

/// Page table and free frames, guarded together.
struct PoolInner {
    /// Maps resident page IDs to frame IDs
    page_table: HashMap<PageId, FrameId>,
    /// Frames not bound to any page
    free_list: VecDeque<FrameId>,
}

/// State shared between the pool and its outstanding page guards.
pub(crate) struct BufferPoolState {
    frames: Vec<Arc<FrameHeader>>,
    inner: Mutex<PoolInner>,
    replacer: LruKReplacer,
}

impl BufferPoolState {
    /// Drops one pin; the frame becomes evictable when the last pin goes.
    pub(crate) fn unpin_frame(&self, frame: &FrameHeader, is_dirty: bool) -> bool {
        if is_dirty {
            frame.set_dirty(true);
        }
        match frame.unpin() {
            Some(0) => {
                self.replacer.set_evictable(frame.frame_id(), true);
                true
            }
            Some(_) => true,
            None => false,
        }
    }
}

/// BufferPoolManager caches store pages in a fixed number of frames. Pages
/// are pinned while a guard is alive, written back when dirty frames are
/// evicted or flushed, and evicted under the LRU-K policy.
pub struct BufferPoolManager {
    pool_size: usize,
    state: Arc<BufferPoolState>,
    disk_manager: Arc<DiskManager>,
}

impl BufferPoolManager {
    /// Creates a pool of `pool_size` frames using LRU-`k` replacement.
    pub fn new(pool_size: usize, k: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let state = Arc::new(BufferPoolState {
            frames,
            inner: Mutex::new(PoolInner {
                page_table: HashMap::with_capacity(pool_size),
                free_list,
            }),
            replacer: LruKReplacer::new(k, pool_size),
        });

        Self {
            pool_size,
            state,
            disk_manager,
        }
    }

    /// The disk manager backing this pool.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    /// Allocates a new page and returns it pinned, zero-filled and dirty.
    pub fn new_page(&self) -> Result<WritePageGuard> {
        let frame = {
            let mut inner = self.state.inner.lock();
            let frame_id = self.acquire_frame(&mut inner)?;

            let page_id = match self.disk_manager.allocate_page() {
                Ok(page_id) => page_id,
                Err(e) => {
                    inner.free_list.push_back(frame_id);
                    return Err(e);
                }
            };

            let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
            frame.reset_to(page_id);
            frame.set_dirty(true);
            frame.pin();

            inner.page_table.insert(page_id, frame_id);
            self.state.replacer.record_access(frame_id);
            self.state.replacer.set_evictable(frame_id, false);
            frame
        };

        let page_id = frame.page_id();
        // Safety: the frame is pinned and owned through the Arc.
        Ok(unsafe { WritePageGuard::new(page_id, frame, Arc::clone(&self.state)) })
    }

    /// Fetches a page for read access.
    pub fn read_page(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame = self.fetch_frame(page_id)?;
        // Safety: fetch_frame pinned the frame for this page.
        Ok(unsafe { ReadPageGuard::new(page_id, frame, Arc::clone(&self.state)) })
    }

    /// Fetches a page for write access.
    pub fn write_page(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame = self.fetch_frame(page_id)?;
        // Safety: fetch_frame pinned the frame for this page.
        Ok(unsafe { WritePageGuard::new(page_id, frame, Arc::clone(&self.state)) })
    }

    /// Releases one pin on a resident page. Returns false if the page is not
    /// resident or not pinned. Guards call this on drop.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let frame = {
            let inner = self.state.inner.lock();
            match inner.page_table.get(&page_id) {
                Some(&frame_id) => Arc::clone(&self.state.frames[frame_id.as_usize()]),
                None => return false,
            }
        };
        self.state.unpin_frame(&frame, is_dirty)
    }

    /// Drops a page from the pool without writing it back and returns it to
    /// the store's free list.
    pub fn delete_page(&self, page_id: PageId) -> Result<()> {
        {
            let mut inner = self.state.inner.lock();

            if let Some(&frame_id) = inner.page_table.get(&page_id) {
                let frame = &self.state.frames[frame_id.as_usize()];
                if frame.pin_count() > 0 {
                    return Err(DbError::PageStillPinned(page_id));
                }

                inner.page_table.remove(&page_id);
                frame.reset();
                self.state.replacer.remove(frame_id);
                inner.free_list.push_back(frame_id);
            }
        }

        self.disk_manager.deallocate_page(page_id)
    }

    /// Writes a resident page back to disk. Returns false if the page is not
    /// resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Err(DbError::InvalidPageId(page_id));
        }

        let inner = self.state.inner.lock();
        match inner.page_table.get(&page_id) {
            Some(&frame_id) => {
                self.write_back(&self.state.frames[frame_id.as_usize()])?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Writes every dirty resident page back to disk and syncs the file.
    pub fn flush_all_pages(&self) -> Result<()> {
        let inner = self.state.inner.lock();

        for &frame_id in inner.page_table.values() {
            let frame = &self.state.frames[frame_id.as_usize()];
            if frame.is_dirty() {
                self.write_back(frame)?;
            }
        }

        self.disk_manager.sync()
    }

    /// Returns the pin count of a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let inner = self.state.inner.lock();
        inner
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of frames not bound to any page.
    pub fn free_frame_count(&self) -> usize {
        self.state.inner.lock().free_list.len()
    }

    /// Returns the number of frames currently pinned by live guards.
    pub fn pinned_frame_count(&self) -> usize {
        self.state
            .frames
            .iter()
            .filter(|frame| frame.pin_count() > 0)
            .count()
    }

    /// Pins `page_id` in a frame, reading it from disk on a miss.
    fn fetch_frame(&self, page_id: PageId) -> Result<Arc<FrameHeader>> {
        if page_id == INVALID_PAGE_ID || page_id == HEADER_PAGE_ID {
            return Err(DbError::InvalidPageId(page_id));
        }

        let mut inner = self.state.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
            frame.pin();
            self.state.replacer.record_access(frame_id);
            self.state.replacer.set_evictable(frame_id, false);
            return Ok(frame);
        }

        let frame_id = self.acquire_frame(&mut inner)?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        frame.reset_to(page_id);

        let loaded = {
            let mut data = frame.data.write();
            self.disk_manager.read_page(page_id, &mut data[..])
        };
        if let Err(e) = loaded {
            frame.reset();
            inner.free_list.push_back(frame_id);
            return Err(e);
        }

        frame.pin();
        inner.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, false);

        Ok(frame)
    }

    /// Takes a frame from the free list, or evicts one (writing it back first
    /// if dirty).
    fn acquire_frame(&self, inner: &mut PoolInner) -> Result<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self.state.replacer.evict().ok_or(DbError::BufferPoolFull)?;
        let frame = &self.state.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            if let Err(e) = self.write_back(frame) {
                // Keep the page resident so its changes are not lost
                self.state.replacer.record_access(frame_id);
                self.state.replacer.set_evictable(frame_id, true);
                return Err(e);
            }
        }

        trace!("evicted {} from {}", old_page_id, frame_id);
        inner.page_table.remove(&old_page_id);
        frame.reset();

        Ok(frame_id)
    }

    fn write_back(&self, frame: &FrameHeader) -> Result<()> {
        let page_id = frame.page_id();
        let mut data = [0u8; PAGE_SIZE];
        if !frame.try_copy_to(&mut data) {
            return Err(DbError::PageStillPinned(page_id));
        }

        self.disk_manager.write_page(page_id, &data)?;
        frame.set_dirty(false);
        Ok(())
    }
}

impl Drop for BufferPoolManager {
    fn drop(&mut self) {
        if let Err(e) = self.flush_all_pages() {
            log::error!("failed to flush buffer pool on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_bpm(pool_size: usize) -> (BufferPoolManager, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::open(temp_file.path()).unwrap());
        let bpm = BufferPoolManager::new(pool_size, 2, dm);
        (bpm, temp_file)
    }

    #[test]
    fn test_buffer_pool_manager_new() {
        let (bpm, _temp) = create_bpm(10);
        assert_eq!(bpm.pool_size(), 10);
        assert_eq!(bpm.free_frame_count(), 10);
        assert_eq!(bpm.pinned_frame_count(), 0);
    }

    #[test]
    fn test_buffer_pool_manager_new_page_is_pinned_and_zeroed() {
        let (bpm, _temp) = create_bpm(10);

        let guard = bpm.new_page().unwrap();
        let page_id = guard.page_id();
        assert_eq!(page_id, PageId::new(1));
        assert_eq!(bpm.get_pin_count(page_id), Some(1));
        assert!(guard.data().iter().all(|&b| b == 0));

        drop(guard);
        assert_eq!(bpm.get_pin_count(page_id), Some(0));
        assert_eq!(bpm.free_frame_count(), 9);
    }

    #[test]
    fn test_buffer_pool_manager_header_page_is_off_limits() {
        let (bpm, _temp) = create_bpm(4);
        assert!(matches!(
            bpm.read_page(HEADER_PAGE_ID),
            Err(DbError::InvalidPageId(_))
        ));
        assert!(matches!(
            bpm.write_page(INVALID_PAGE_ID),
            Err(DbError::InvalidPageId(_))
        ));
    }

    #[test]
    fn test_buffer_pool_manager_unpin_page() {
        let (bpm, _temp) = create_bpm(4);
        let page_id = bpm.new_page().unwrap().page_id();

        let guard = bpm.read_page(page_id).unwrap();
        let guard2 = bpm.read_page(page_id).unwrap();
        assert_eq!(bpm.get_pin_count(page_id), Some(2));
        drop(guard2);
        drop(guard);

        assert!(!bpm.unpin_page(page_id, false));
        assert!(!bpm.unpin_page(PageId::new(77), false));
    }

    #[test]
    fn test_buffer_pool_manager_delete_page() {
        let (bpm, _temp) = create_bpm(10);

        let page_id = bpm.new_page().unwrap().page_id();

        {
            let _guard = bpm.read_page(page_id).unwrap();
            assert!(matches!(
                bpm.delete_page(page_id),
                Err(DbError::PageStillPinned(_))
            ));
        }

        bpm.delete_page(page_id).unwrap();
        assert_eq!(bpm.get_pin_count(page_id), None);
        assert_eq!(bpm.free_frame_count(), 10);
        assert_eq!(bpm.disk_manager().free_list_head(), page_id);

        // The freed page is handed out again
        let reused = bpm.new_page().unwrap();
        assert_eq!(reused.page_id(), page_id);
        assert!(reused.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_buffer_pool_manager_buffer_pool_full() {
        let (bpm, _temp) = create_bpm(2);

        let _guard1 = bpm.new_page().unwrap();
        let _guard2 = bpm.new_page().unwrap();

        assert!(matches!(bpm.new_page(), Err(DbError::BufferPoolFull)));
        // The failed allocation must not leak a page
        assert_eq!(bpm.disk_manager().get_num_pages(), 3);
    }
}
