use bytes::{Buf, BufMut};

use crate::common::{DbError, PageId, Result, INVALID_PAGE_ID, PAGE_SIZE};

const MAGIC_NUMBER: u32 = 0x4250_5444; // "BPTD" in hex
const VERSION: u32 = 1;

const MAGIC_OFFSET: usize = 0;
const VERSION_OFFSET: usize = 4;
const ROOT_PAGE_OFFSET: usize = 8;
const FREE_LIST_HEAD_OFFSET: usize = 12;
const PAGE_COUNT_OFFSET: usize = 16;
const RECORD_COUNT_OFFSET: usize = 24;

/// Decoded contents of the store header (page 0).
///
/// `page_count` includes the header page itself, so a fresh store has a
/// page count of 1 and no root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHeader {
    pub root_page_id: PageId,
    pub free_list_head: PageId,
    pub page_count: u32,
    pub record_count: u64,
}

impl StoreHeader {
    /// Header of a store with no tree and no free pages.
    pub fn empty() -> Self {
        Self {
            root_page_id: INVALID_PAGE_ID,
            free_list_head: INVALID_PAGE_ID,
            page_count: 1,
            record_count: 0,
        }
    }

    /// Reads a header from a page buffer, rejecting foreign or corrupt files.
    pub fn decode(data: &[u8]) -> Result<Self> {
        assert_eq!(data.len(), PAGE_SIZE);

        let mut buf = &data[MAGIC_OFFSET..];
        if buf.get_u32_le() != MAGIC_NUMBER {
            return Err(DbError::InvalidDatabaseFile);
        }

        let mut buf = &data[VERSION_OFFSET..];
        if buf.get_u32_le() != VERSION {
            return Err(DbError::InvalidDatabaseFile);
        }

        let header = Self {
            root_page_id: PageId::new((&data[ROOT_PAGE_OFFSET..]).get_u32_le()),
            free_list_head: PageId::new((&data[FREE_LIST_HEAD_OFFSET..]).get_u32_le()),
            page_count: (&data[PAGE_COUNT_OFFSET..]).get_u32_le(),
            record_count: (&data[RECORD_COUNT_OFFSET..]).get_u64_le(),
        };

        if header.page_count == 0 {
            return Err(DbError::InvalidDatabaseFile);
        }

        Ok(header)
    }

    /// Writes the header into a page buffer. Bytes past the header are zeroed.
    pub fn encode(&self, data: &mut [u8]) {
        assert_eq!(data.len(), PAGE_SIZE);
        data.fill(0);

        let mut buf = &mut data[MAGIC_OFFSET..];
        buf.put_u32_le(MAGIC_NUMBER);
        buf.put_u32_le(VERSION);
        buf.put_u32_le(self.root_page_id.as_u32());
        buf.put_u32_le(self.free_list_head.as_u32());
        buf.put_u32_le(self.page_count);
        buf.put_u32_le(0);
        buf.put_u64_le(self.record_count);
    }

    pub fn has_root(&self) -> bool {
        self.root_page_id != INVALID_PAGE_ID
    }
}
