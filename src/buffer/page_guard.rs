use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::buffer_pool_manager::BufferPoolState;
use super::FrameHeader;

/// RAII guard for read-only access to a pinned page.
/// Unpins the page when dropped.
pub struct ReadPageGuard {
    // Declared before `frame`: fields drop in order, so the lock is
    // released while the frame is still alive.
    data: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>,
    page_id: PageId,
    frame: Arc<FrameHeader>,
    pool: Arc<BufferPoolState>,
}

impl ReadPageGuard {
    /// # Safety
    /// The frame must already be pinned for `page_id`; the guard keeps the
    /// frame alive through its `Arc` for as long as the lock is held.
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        pool: Arc<BufferPoolState>,
    ) -> Self {
        let data = frame.data.read();
        let data: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> = std::mem::transmute(data);

        Self {
            data,
            page_id,
            frame,
            pool,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..]
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        self.pool.unpin_frame(&self.frame, false);
    }
}

/// RAII guard for read-write access to a pinned page.
/// Marks the frame dirty if the bytes were borrowed mutably, then unpins it.
pub struct WritePageGuard {
    data: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>,
    page_id: PageId,
    is_dirty: bool,
    frame: Arc<FrameHeader>,
    pool: Arc<BufferPoolState>,
}

impl WritePageGuard {
    /// # Safety
    /// Same contract as [`ReadPageGuard::new`].
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        pool: Arc<BufferPoolState>,
    ) -> Self {
        let data = frame.data.write();
        let data: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> = std::mem::transmute(data);

        Self {
            data,
            page_id,
            is_dirty: false,
            frame,
            pool,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.is_dirty = true;
        &mut self.data[..]
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.pool.unpin_frame(&self.frame, self.is_dirty);
    }
}
