use bytes::{Buf, BufMut};

use crate::common::{DbError, PageId, Result, PAGE_SIZE};

use super::PageType;

const NEXT_FREE_OFFSET: usize = 4;

/// Layout of a page sitting on the free list: type tag plus the id of the
/// next free page (`INVALID_PAGE_ID` terminates the list).
pub struct FreePage;

impl FreePage {
    pub fn encode(data: &mut [u8], next: PageId) {
        assert_eq!(data.len(), PAGE_SIZE);
        data.fill(0);
        data[0] = PageType::Free as u8;
        (&mut data[NEXT_FREE_OFFSET..]).put_u32_le(next.as_u32());
    }

    /// Returns the next pointer, failing if the page is not marked free.
    pub fn decode_next(page_id: PageId, data: &[u8]) -> Result<PageId> {
        assert_eq!(data.len(), PAGE_SIZE);
        if PageType::of(data) != Some(PageType::Free) {
            return Err(DbError::IndexCorrupted(format!(
                "free list entry {} is not a free page",
                page_id
            )));
        }
        Ok(PageId::new((&data[NEXT_FREE_OFFSET..]).get_u32_le()))
    }
}
