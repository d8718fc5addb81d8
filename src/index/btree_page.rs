use bytes::{Buf, BufMut};

use crate::common::{DbError, Key, PageId, Result, INVALID_PAGE_ID, MAX_VALUE_SIZE, PAGE_SIZE};
use crate::storage::page::PageType;

// Node header, shared by leaf and internal pages:
//   [0]      page type
//   [2..4]   number of keys (u16)
//   [4..8]   next leaf page id (leaf only)
const NODE_HEADER_SIZE: usize = 16;

const PAGE_TYPE_OFFSET: usize = 0;
const NUM_KEYS_OFFSET: usize = 2;
const NEXT_PAGE_OFFSET: usize = 4;

// Leaf slot: key (8) + value length (2) + value bytes
const KEY_SIZE: usize = 8;
const VALUE_LEN_SIZE: usize = 2;
const LEAF_SLOT_SIZE: usize = KEY_SIZE + VALUE_LEN_SIZE + MAX_VALUE_SIZE;

// Internal layout: child 0, then (key i, child i + 1) pairs
const CHILD_SIZE: usize = 4;
const INTERNAL_FIRST_CHILD_OFFSET: usize = NODE_HEADER_SIZE;
const INTERNAL_ENTRIES_OFFSET: usize = NODE_HEADER_SIZE + CHILD_SIZE;
const INTERNAL_ENTRY_SIZE: usize = KEY_SIZE + CHILD_SIZE;

/// Records that physically fit in a leaf page.
pub const LEAF_CAPACITY: usize = (PAGE_SIZE - NODE_HEADER_SIZE) / LEAF_SLOT_SIZE;

/// Separator keys that physically fit in an internal page.
pub const INTERNAL_CAPACITY: usize = (PAGE_SIZE - INTERNAL_ENTRIES_OFFSET) / INTERNAL_ENTRY_SIZE;

/// A leaf record as moved around during splits and merges.
pub type LeafEntry = (Key, Vec<u8>);

/// Fails with `ValueTooLarge` if `value` does not fit in a leaf slot.
pub fn check_value(value: &[u8]) -> Result<()> {
    if value.len() > MAX_VALUE_SIZE {
        return Err(DbError::ValueTooLarge {
            len: value.len(),
            max: MAX_VALUE_SIZE,
        });
    }
    Ok(())
}

/// Reads the node type of a page, failing if it is neither a leaf nor an
/// internal node or if its key count overruns the page.
///
/// `LeafPage` and `InternalPage` index slots by the stored count, so pages
/// read from disk pass through here first.
pub fn node_type(page_id: PageId, data: &[u8]) -> Result<PageType> {
    let node_type = match PageType::of(data) {
        Some(t @ (PageType::Leaf | PageType::Internal)) => t,
        other => {
            return Err(DbError::IndexCorrupted(format!(
                "{} is not a tree node (type {:?})",
                page_id, other
            )))
        }
    };

    let capacity = match node_type {
        PageType::Leaf => LEAF_CAPACITY,
        _ => INTERNAL_CAPACITY,
    };
    let num_keys = read_num_keys(data);
    if num_keys > capacity {
        return Err(DbError::IndexCorrupted(format!(
            "{} claims {} keys, room for {}",
            page_id, num_keys, capacity
        )));
    }

    Ok(node_type)
}

fn read_num_keys(data: &[u8]) -> usize {
    (&data[NUM_KEYS_OFFSET..]).get_u16_le() as usize
}

fn write_num_keys(data: &mut [u8], num: usize) {
    (&mut data[NUM_KEYS_OFFSET..]).put_u16_le(num as u16);
}

fn read_page_id(data: &[u8], offset: usize) -> PageId {
    PageId::new((&data[offset..]).get_u32_le())
}

fn write_page_id(data: &mut [u8], offset: usize, page_id: PageId) {
    (&mut data[offset..]).put_u32_le(page_id.as_u32());
}

/// View of a leaf page: sorted fixed-size (key, value) slots and a link to
/// the next leaf.
pub struct LeafPage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> LeafPage<B> {
    pub fn new(data: B) -> Self {
        assert_eq!(data.as_ref().len(), PAGE_SIZE);
        Self { data }
    }

    fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn slot_offset(index: usize) -> usize {
        NODE_HEADER_SIZE + index * LEAF_SLOT_SIZE
    }

    pub fn num_keys(&self) -> usize {
        read_num_keys(self.bytes())
    }

    pub fn next_page_id(&self) -> Option<PageId> {
        let next = read_page_id(self.bytes(), NEXT_PAGE_OFFSET);
        (next != INVALID_PAGE_ID).then_some(next)
    }

    pub fn key_at(&self, index: usize) -> Key {
        (&self.bytes()[Self::slot_offset(index)..]).get_i64_le()
    }

    pub fn value_at(&self, index: usize) -> &[u8] {
        let offset = Self::slot_offset(index) + KEY_SIZE;
        let len = (&self.bytes()[offset..]).get_u16_le() as usize;
        let start = offset + VALUE_LEN_SIZE;
        &self.bytes()[start..start + len.min(MAX_VALUE_SIZE)]
    }

    /// Binary search over the keys: `Ok(index)` if present, otherwise
    /// `Err(insert_position)`.
    pub fn search(&self, key: Key) -> std::result::Result<usize, usize> {
        let mut left = 0;
        let mut right = self.num_keys();

        while left < right {
            let mid = left + (right - left) / 2;
            match self.key_at(mid).cmp(&key) {
                std::cmp::Ordering::Less => left = mid + 1,
                std::cmp::Ordering::Greater => right = mid,
                std::cmp::Ordering::Equal => return Ok(mid),
            }
        }

        Err(left)
    }

    pub fn entry_at(&self, index: usize) -> LeafEntry {
        (self.key_at(index), self.value_at(index).to_vec())
    }

    pub fn entries(&self) -> Vec<LeafEntry> {
        (0..self.num_keys()).map(|i| self.entry_at(i)).collect()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> LeafPage<B> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    /// Formats the page as an empty leaf with no next link.
    pub fn init(&mut self) {
        let data = self.bytes_mut();
        data.fill(0);
        data[PAGE_TYPE_OFFSET] = PageType::Leaf as u8;
        write_num_keys(data, 0);
        write_page_id(data, NEXT_PAGE_OFFSET, INVALID_PAGE_ID);
    }

    pub fn set_next_page_id(&mut self, page_id: Option<PageId>) {
        write_page_id(
            self.bytes_mut(),
            NEXT_PAGE_OFFSET,
            page_id.unwrap_or(INVALID_PAGE_ID),
        );
    }

    fn write_slot(&mut self, index: usize, key: Key, value: &[u8]) {
        debug_assert!(value.len() <= MAX_VALUE_SIZE);
        let offset = Self::slot_offset(index);
        let slot = &mut self.bytes_mut()[offset..offset + LEAF_SLOT_SIZE];
        slot.fill(0);

        let mut buf = &mut slot[..];
        buf.put_i64_le(key);
        buf.put_u16_le(value.len() as u16);
        buf.put_slice(value);
    }

    /// Inserts a record at `index`, shifting later slots right. The caller
    /// guarantees there is room.
    pub fn insert_at(&mut self, index: usize, key: Key, value: &[u8]) {
        let num_keys = self.num_keys();
        assert!(num_keys < LEAF_CAPACITY && index <= num_keys);

        let start = Self::slot_offset(index);
        let end = Self::slot_offset(num_keys);
        self.bytes_mut()
            .copy_within(start..end, start + LEAF_SLOT_SIZE);

        self.write_slot(index, key, value);
        write_num_keys(self.bytes_mut(), num_keys + 1);
    }

    /// Removes and returns the record at `index`, shifting later slots left.
    pub fn remove_at(&mut self, index: usize) -> LeafEntry {
        let num_keys = self.num_keys();
        assert!(index < num_keys);
        let entry = self.entry_at(index);

        let start = Self::slot_offset(index + 1);
        let end = Self::slot_offset(num_keys);
        self.bytes_mut()
            .copy_within(start..end, start - LEAF_SLOT_SIZE);

        let last = Self::slot_offset(num_keys - 1);
        self.bytes_mut()[last..last + LEAF_SLOT_SIZE].fill(0);
        write_num_keys(self.bytes_mut(), num_keys - 1);
        entry
    }

    /// Replaces all records, keeping the page type and next link.
    pub fn set_entries(&mut self, entries: &[LeafEntry]) {
        assert!(entries.len() <= LEAF_CAPACITY);
        let start = Self::slot_offset(0);
        self.bytes_mut()[start..].fill(0);

        for (i, (key, value)) in entries.iter().enumerate() {
            self.write_slot(i, *key, value);
        }
        write_num_keys(self.bytes_mut(), entries.len());
    }
}

/// View of an internal page: `n` separator keys and `n + 1` children.
/// Child `i` holds keys in `[key(i - 1), key(i))`.
pub struct InternalPage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> InternalPage<B> {
    pub fn new(data: B) -> Self {
        assert_eq!(data.as_ref().len(), PAGE_SIZE);
        Self { data }
    }

    fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn key_offset(index: usize) -> usize {
        INTERNAL_ENTRIES_OFFSET + index * INTERNAL_ENTRY_SIZE
    }

    fn child_offset(index: usize) -> usize {
        if index == 0 {
            INTERNAL_FIRST_CHILD_OFFSET
        } else {
            Self::key_offset(index - 1) + KEY_SIZE
        }
    }

    pub fn num_keys(&self) -> usize {
        read_num_keys(self.bytes())
    }

    pub fn key_at(&self, index: usize) -> Key {
        (&self.bytes()[Self::key_offset(index)..]).get_i64_le()
    }

    pub fn child_at(&self, index: usize) -> PageId {
        read_page_id(self.bytes(), Self::child_offset(index))
    }

    /// Index of the child whose key range contains `key`: the number of
    /// separators less than or equal to it.
    pub fn child_index_for(&self, key: Key) -> usize {
        let mut left = 0;
        let mut right = self.num_keys();

        while left < right {
            let mid = left + (right - left) / 2;
            if self.key_at(mid) <= key {
                left = mid + 1;
            } else {
                right = mid;
            }
        }

        left
    }

    pub fn keys(&self) -> Vec<Key> {
        (0..self.num_keys()).map(|i| self.key_at(i)).collect()
    }

    pub fn children(&self) -> Vec<PageId> {
        (0..=self.num_keys()).map(|i| self.child_at(i)).collect()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> InternalPage<B> {
    fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    /// Formats the page as an internal node with a single child.
    pub fn init(&mut self, first_child: PageId) {
        let data = self.bytes_mut();
        data.fill(0);
        data[PAGE_TYPE_OFFSET] = PageType::Internal as u8;
        write_num_keys(data, 0);
        write_page_id(data, NEXT_PAGE_OFFSET, INVALID_PAGE_ID);
        write_page_id(data, INTERNAL_FIRST_CHILD_OFFSET, first_child);
    }

    pub fn set_key_at(&mut self, index: usize, key: Key) {
        let offset = Self::key_offset(index);
        (&mut self.bytes_mut()[offset..]).put_i64_le(key);
    }

    fn set_child_at(&mut self, index: usize, child: PageId) {
        let offset = Self::child_offset(index);
        write_page_id(self.bytes_mut(), offset, child);
    }

    /// Inserts separator `key` at `index` with `right_child` directly after it.
    pub fn insert_at(&mut self, index: usize, key: Key, right_child: PageId) {
        let num_keys = self.num_keys();
        assert!(num_keys < INTERNAL_CAPACITY && index <= num_keys);

        let start = Self::key_offset(index);
        let end = Self::key_offset(num_keys);
        self.bytes_mut()
            .copy_within(start..end, start + INTERNAL_ENTRY_SIZE);

        write_num_keys(self.bytes_mut(), num_keys + 1);
        self.set_key_at(index, key);
        self.set_child_at(index + 1, right_child);
    }

    /// Removes separator `index` and the child to its right.
    pub fn remove_at(&mut self, index: usize) -> (Key, PageId) {
        let num_keys = self.num_keys();
        assert!(index < num_keys);
        let removed = (self.key_at(index), self.child_at(index + 1));

        let start = Self::key_offset(index + 1);
        let end = Self::key_offset(num_keys);
        self.bytes_mut()
            .copy_within(start..end, start - INTERNAL_ENTRY_SIZE);

        let last = Self::key_offset(num_keys - 1);
        self.bytes_mut()[last..last + INTERNAL_ENTRY_SIZE].fill(0);
        write_num_keys(self.bytes_mut(), num_keys - 1);
        removed
    }

    /// Removes child 0 and separator 0, returning both.
    pub fn remove_first(&mut self) -> (PageId, Key) {
        let first_child = self.child_at(0);
        let first_key = self.key_at(0);
        let second_child = self.child_at(1);

        // Dropping (key 0, child 1) then restoring child 1 as child 0
        self.remove_at(0);
        self.set_child_at(0, second_child);
        (first_child, first_key)
    }

    /// Prepends `child` as child 0 with `key` separating it from the old
    /// first child.
    pub fn push_front(&mut self, child: PageId, key: Key) {
        let old_first = self.child_at(0);
        self.insert_at(0, key, old_first);
        self.set_child_at(0, child);
    }

    /// Replaces all separators and children. `children.len()` must be
    /// `keys.len() + 1`.
    pub fn set_entries(&mut self, keys: &[Key], children: &[PageId]) {
        assert!(keys.len() <= INTERNAL_CAPACITY);
        assert_eq!(children.len(), keys.len() + 1);

        self.bytes_mut()[INTERNAL_FIRST_CHILD_OFFSET..].fill(0);
        write_num_keys(self.bytes_mut(), keys.len());
        self.set_child_at(0, children[0]);
        for (i, key) in keys.iter().enumerate() {
            self.set_key_at(i, *key);
            self.set_child_at(i + 1, children[i + 1]);
        }
    }
}
