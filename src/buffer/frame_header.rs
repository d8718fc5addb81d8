use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::RwLock;

use crate::common::{FrameId, PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// FrameHeader manages a single buffer frame in the buffer pool.
/// It stores metadata about the frame and the cached page bytes.
pub struct FrameHeader {
    /// The frame ID (index in the buffer pool)
    frame_id: FrameId,
    /// The page ID stored in this frame (INVALID_PAGE_ID if empty)
    page_id: RwLock<PageId>,
    /// Number of live page guards on this frame
    pin_count: AtomicU32,
    /// Whether the page has been modified since it was last written back
    is_dirty: AtomicBool,
    /// The page bytes (pub(crate) for page guard access)
    pub(crate) data: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl FrameHeader {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: RwLock::new(INVALID_PAGE_ID),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn page_id(&self) -> PageId {
        *self.page_id.read()
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count and returns the new value.
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the pin count and returns the new value.
    /// Returns None if the frame was not pinned.
    pub fn unpin(&self) -> Option<u32> {
        self.pin_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            })
            .ok()
            .map(|previous| previous - 1)
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// Copies the frame bytes into `data`, or returns false if a write guard
    /// currently holds the page.
    pub fn try_copy_to(&self, data: &mut [u8]) -> bool {
        assert_eq!(data.len(), PAGE_SIZE);
        match self.data.try_read() {
            Some(guard) => {
                data.copy_from_slice(&guard[..]);
                true
            }
            None => false,
        }
    }

    /// Binds the frame to `page_id` with clean, zeroed contents.
    pub fn reset_to(&self, page_id: PageId) {
        *self.page_id.write() = page_id;
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
        self.data.write().fill(0);
    }

    /// Returns the frame to its empty state.
    pub fn reset(&self) {
        self.reset_to(INVALID_PAGE_ID);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_header_new() {
        let frame = FrameHeader::new(FrameId::new(3));
        assert_eq!(frame.frame_id(), FrameId::new(3));
        assert_eq!(frame.page_id(), INVALID_PAGE_ID);
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_frame_header_pin_unpin() {
        let frame = FrameHeader::new(FrameId::new(0));

        assert_eq!(frame.pin(), 1);
        assert_eq!(frame.pin(), 2);

        assert_eq!(frame.unpin(), Some(1));
        assert_eq!(frame.unpin(), Some(0));
        assert_eq!(frame.unpin(), None);
        assert_eq!(frame.pin_count(), 0);
    }

    #[test]
    fn test_frame_header_copy_blocked_by_writer() {
        let frame = FrameHeader::new(FrameId::new(0));
        frame.data.write()[7] = 9;

        let mut out = [0u8; PAGE_SIZE];
        assert!(frame.try_copy_to(&mut out));
        assert_eq!(out[7], 9);

        let _writer = frame.data.write();
        assert!(!frame.try_copy_to(&mut out));
    }

    #[test]
    fn test_frame_header_reset_to() {
        let frame = FrameHeader::new(FrameId::new(0));
        frame.reset_to(PageId::new(5));
        frame.pin();
        frame.set_dirty(true);
        frame.data.write().fill(1);

        frame.reset_to(PageId::new(8));

        assert_eq!(frame.page_id(), PageId::new(8));
        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
        assert!(frame.data.read().iter().all(|&b| b == 0));
    }
}
