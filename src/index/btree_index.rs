use std::collections::HashSet;
use std::sync::Arc;

use log::debug;

use crate::buffer::{BufferPoolManager, WritePageGuard};
use crate::common::{
    DbError, Key, PageId, Result, DEFAULT_INTERNAL_ORDER, DEFAULT_LEAF_ORDER, HEADER_PAGE_ID,
    INVALID_PAGE_ID,
};
use crate::storage::page::PageType;

use super::btree_iterator::BTreeIterator;
use super::btree_page::{
    check_value, node_type, InternalPage, LeafPage, INTERNAL_CAPACITY, LEAF_CAPACITY,
};

// Upper bound on tree height; a longer descent means the links form a cycle.
const MAX_DEPTH: usize = 64;

/// One step of a root-to-leaf descent: an internal page and the child index
/// taken from it.
#[derive(Debug, Clone, Copy)]
struct PathEntry {
    page_id: PageId,
    child_index: usize,
}

/// Shape of the tree as measured by [`BTreeIndex::check_integrity`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Number of levels; 0 for an empty tree, 1 for a lone leaf root
    pub height: usize,
    pub leaf_pages: usize,
    pub internal_pages: usize,
    pub records: u64,
    pub free_pages: usize,
}

/// Record count and key bounds gathered from the leaf chain by
/// [`BTreeIndex::table_info`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableInfo {
    pub records: u64,
    pub min_key: Option<Key>,
    pub max_key: Option<Key>,
}

impl TableInfo {
    /// `(min, max)` of a non-empty tree.
    pub fn key_range(&self) -> Option<(Key, Key)> {
        self.min_key.zip(self.max_key)
    }
}

/// Disk-resident B+Tree mapping `i64` keys to short string values.
///
/// Nodes live in buffer pool pages. The root page id and the record count
/// are kept in the store header so the tree can be reopened. There are no
/// parent pointers: mutations record the descent path and walk it back up.
pub struct BTreeIndex {
    root_page_id: PageId,
    bpm: Arc<BufferPoolManager>,
    leaf_order: usize,
    internal_order: usize,
}

impl BTreeIndex {
    /// Opens the tree rooted where the store header says, with the default
    /// node orders.
    pub fn open(bpm: Arc<BufferPoolManager>) -> Self {
        Self::with_orders(bpm, DEFAULT_LEAF_ORDER, DEFAULT_INTERNAL_ORDER)
    }

    /// Opens the tree with custom node orders. `leaf_order` is the max number
    /// of records per leaf and `internal_order` the max number of separator
    /// keys per internal node.
    ///
    /// # Panics
    /// If an order is below 2 (leaf) or 3 (internal), or exceeds what fits
    /// in a page.
    pub fn with_orders(
        bpm: Arc<BufferPoolManager>,
        leaf_order: usize,
        internal_order: usize,
    ) -> Self {
        assert!(
            (2..=LEAF_CAPACITY).contains(&leaf_order),
            "leaf order must be in 2..={}",
            LEAF_CAPACITY
        );
        assert!(
            (3..=INTERNAL_CAPACITY).contains(&internal_order),
            "internal order must be in 3..={}",
            INTERNAL_CAPACITY
        );

        let root_page_id = bpm.disk_manager().root_page_id();
        debug!(
            "b+tree opened at root {} (leaf order {}, internal order {})",
            root_page_id, leaf_order, internal_order
        );

        Self {
            root_page_id,
            bpm,
            leaf_order,
            internal_order,
        }
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    /// Number of records, as persisted in the store header.
    pub fn len(&self) -> u64 {
        self.bpm.disk_manager().record_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn leaf_min(&self) -> usize {
        (self.leaf_order + 1) / 2
    }

    fn internal_min(&self) -> usize {
        self.internal_order / 2
    }

    fn set_root(&mut self, page_id: PageId) {
        debug!("b+tree root {} -> {}", self.root_page_id, page_id);
        self.root_page_id = page_id;
        self.bpm.disk_manager().set_root_page_id(page_id);
    }

    fn add_to_record_count(&self, delta: i64) -> Result<()> {
        let dm = self.bpm.disk_manager();
        let count = dm.record_count().checked_add_signed(delta).ok_or_else(|| {
            DbError::IndexCorrupted("record count out of range".to_string())
        })?;
        dm.set_record_count(count);
        Ok(())
    }

    /// Reads the node type and rejects a node holding more keys than the
    /// configured order allows.
    fn checked_node_type(&self, page_id: PageId, data: &[u8]) -> Result<PageType> {
        let node_type = node_type(page_id, data)?;
        let (num_keys, max) = match node_type {
            PageType::Leaf => (LeafPage::new(data).num_keys(), self.leaf_order),
            _ => (InternalPage::new(data).num_keys(), self.internal_order),
        };

        if num_keys > max {
            return corrupted(format!(
                "{} holds {} keys, order allows {}",
                page_id, num_keys, max
            ));
        }
        Ok(node_type)
    }

    /// Descends to the leaf whose key range covers `key`. Returns the leaf id
    /// and the internal pages passed on the way, root first.
    fn find_leaf(&self, key: Key) -> Result<(PageId, Vec<PathEntry>)> {
        let mut path = Vec::new();
        let mut current_page_id = self.root_page_id;

        loop {
            let guard = self.bpm.read_page(current_page_id)?;

            match self.checked_node_type(current_page_id, guard.data())? {
                PageType::Leaf => return Ok((current_page_id, path)),
                _ => {
                    let node = InternalPage::new(guard.data());
                    let child_index = node.child_index_for(key);
                    path.push(PathEntry {
                        page_id: current_page_id,
                        child_index,
                    });
                    current_page_id = node.child_at(child_index);
                }
            }

            if path.len() > MAX_DEPTH {
                return Err(DbError::IndexCorrupted(format!(
                    "descent for key {} exceeds {} levels",
                    key, MAX_DEPTH
                )));
            }
        }
    }

    /// Looks up the value stored under `key`.
    pub fn find(&self, key: Key) -> Result<Option<String>> {
        if self.root_page_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let (leaf_page_id, _) = self.find_leaf(key)?;
        let guard = self.bpm.read_page(leaf_page_id)?;
        let leaf = LeafPage::new(guard.data());

        Ok(leaf
            .search(key)
            .ok()
            .map(|pos| String::from_utf8_lossy(leaf.value_at(pos)).into_owned()))
    }

    /// Inserts a new record. Fails with `DuplicateKey` if `key` is already
    /// present, leaving the stored value untouched.
    pub fn insert(&mut self, key: Key, value: &str) -> Result<()> {
        let value = value.as_bytes();
        check_value(value)?;

        if self.root_page_id == INVALID_PAGE_ID {
            self.start_new_tree(key, value)?;
            return self.add_to_record_count(1);
        }

        let (leaf_page_id, path) = self.find_leaf(key)?;

        let split = {
            let mut guard = self.bpm.write_page(leaf_page_id)?;
            let pos = match LeafPage::new(guard.data()).search(key) {
                Ok(_) => return Err(DbError::DuplicateKey(key)),
                Err(pos) => pos,
            };

            if LeafPage::new(guard.data()).num_keys() < self.leaf_order {
                LeafPage::new(guard.data_mut()).insert_at(pos, key, value);
                None
            } else {
                Some(self.split_leaf(&mut guard, pos, key, value)?)
            }
        };

        if let Some((separator, right_page_id)) = split {
            self.insert_into_parent(path, leaf_page_id, separator, right_page_id)?;
        }

        self.add_to_record_count(1)
    }

    fn start_new_tree(&mut self, key: Key, value: &[u8]) -> Result<()> {
        let root_page_id = {
            let mut guard = self.bpm.new_page()?;
            let mut leaf = LeafPage::new(guard.data_mut());
            leaf.init();
            leaf.insert_at(0, key, value);
            guard.page_id()
        };

        self.set_root(root_page_id);
        Ok(())
    }

    /// Splits a full leaf while inserting `(key, value)` at `pos`. The left
    /// half stays in place; returns the first key of the new right leaf and
    /// its page id.
    fn split_leaf(
        &self,
        guard: &mut WritePageGuard,
        pos: usize,
        key: Key,
        value: &[u8],
    ) -> Result<(Key, PageId)> {
        // Allocate before touching the full leaf so a failure leaves it intact
        let mut right_guard = self.bpm.new_page()?;
        let right_page_id = right_guard.page_id();

        let mut leaf = LeafPage::new(guard.data_mut());
        let mut entries = leaf.entries();
        entries.insert(pos, (key, value.to_vec()));

        let right_entries = entries.split_off(entries.len() / 2);
        let separator = right_entries[0].0;

        let mut right = LeafPage::new(right_guard.data_mut());
        right.init();
        right.set_entries(&right_entries);
        right.set_next_page_id(leaf.next_page_id());

        leaf.set_entries(&entries);
        leaf.set_next_page_id(Some(right_page_id));

        debug!(
            "split leaf {} -> {} at key {} ({} + {})",
            guard.page_id(),
            right_page_id,
            separator,
            entries.len(),
            right_entries.len()
        );
        Ok((separator, right_page_id))
    }

    /// Adds separator `key` with `right_child` next to `left_child`, walking
    /// up `path` and splitting full internal nodes. Grows a new root if the
    /// old root splits.
    fn insert_into_parent(
        &mut self,
        mut path: Vec<PathEntry>,
        left_child: PageId,
        key: Key,
        right_child: PageId,
    ) -> Result<()> {
        let mut left_child = left_child;
        let mut separator = key;
        let mut right_child = right_child;

        while let Some(entry) = path.pop() {
            let mut guard = self.bpm.write_page(entry.page_id)?;
            let node = InternalPage::new(guard.data());

            if node.num_keys() < self.internal_order {
                InternalPage::new(guard.data_mut()).insert_at(
                    entry.child_index,
                    separator,
                    right_child,
                );
                return Ok(());
            }

            let mut keys = node.keys();
            let mut children = node.children();
            keys.insert(entry.child_index, separator);
            children.insert(entry.child_index + 1, right_child);

            let mid = keys.len() / 2;
            let promoted = keys[mid];
            let right_keys = keys.split_off(mid + 1);
            keys.truncate(mid);
            let right_children = children.split_off(mid + 1);

            let mut new_guard = self.bpm.new_page()?;
            let mut right = InternalPage::new(new_guard.data_mut());
            right.init(right_children[0]);
            right.set_entries(&right_keys, &right_children);

            InternalPage::new(guard.data_mut()).set_entries(&keys, &children);

            debug!(
                "split internal {} -> {} promoting key {}",
                entry.page_id,
                new_guard.page_id(),
                promoted
            );

            left_child = entry.page_id;
            separator = promoted;
            right_child = new_guard.page_id();
        }

        let new_root_id = {
            let mut guard = self.bpm.new_page()?;
            let mut root = InternalPage::new(guard.data_mut());
            root.init(left_child);
            root.insert_at(0, separator, right_child);
            guard.page_id()
        };

        self.set_root(new_root_id);
        Ok(())
    }

    /// Removes the record stored under `key`. Fails with `KeyNotFound`
    /// without modifying anything if it is absent.
    pub fn delete(&mut self, key: Key) -> Result<()> {
        if self.root_page_id == INVALID_PAGE_ID {
            return Err(DbError::KeyNotFound(key));
        }

        let (leaf_page_id, path) = self.find_leaf(key)?;

        {
            let mut guard = self.bpm.write_page(leaf_page_id)?;
            let pos = LeafPage::new(guard.data())
                .search(key)
                .map_err(|_| DbError::KeyNotFound(key))?;
            LeafPage::new(guard.data_mut()).remove_at(pos);
        }

        self.add_to_record_count(-1)?;
        self.rebalance(leaf_page_id, path)
    }

    /// Restores minimum occupancy from `page_id` upward after a removal.
    fn rebalance(&mut self, page_id: PageId, mut path: Vec<PathEntry>) -> Result<()> {
        let mut current = page_id;

        loop {
            let Some(parent) = path.pop() else {
                return self.adjust_root(current);
            };

            let underflow = {
                let guard = self.bpm.read_page(current)?;
                match node_type(current, guard.data())? {
                    PageType::Leaf => LeafPage::new(guard.data()).num_keys() < self.leaf_min(),
                    _ => InternalPage::new(guard.data()).num_keys() < self.internal_min(),
                }
            };

            if !underflow || !self.fix_underflow(parent, current)? {
                return Ok(());
            }

            current = parent.page_id;
        }
    }

    /// Merges `page_id` with a sibling or borrows one entry from it. Returns
    /// true if a merge removed a separator from the parent.
    fn fix_underflow(&mut self, parent: PathEntry, page_id: PageId) -> Result<bool> {
        let mut parent_guard = self.bpm.write_page(parent.page_id)?;

        let (left_id, right_id, separator_index) = {
            let node = InternalPage::new(parent_guard.data());
            let idx = parent.child_index;

            if node.num_keys() == 0 || idx > node.num_keys() || node.child_at(idx) != page_id {
                return Err(DbError::IndexCorrupted(format!(
                    "{} is not child {} of {}",
                    page_id, idx, parent.page_id
                )));
            }

            // Prefer the left sibling; the leftmost child pairs with its right one
            if idx > 0 {
                (node.child_at(idx - 1), page_id, idx - 1)
            } else {
                (page_id, node.child_at(1), 0)
            }
        };

        if left_id == right_id || left_id == parent.page_id || right_id == parent.page_id {
            return Err(DbError::IndexCorrupted(format!(
                "{} links a page to itself",
                parent.page_id
            )));
        }

        let underflowing_is_right = right_id == page_id;

        let freed = {
            let mut left_guard = self.bpm.write_page(left_id)?;
            let mut right_guard = self.bpm.write_page(right_id)?;

            let left_type = node_type(left_id, left_guard.data())?;
            if node_type(right_id, right_guard.data())? != left_type {
                return Err(DbError::IndexCorrupted(format!(
                    "siblings {} and {} differ in node type",
                    left_id, right_id
                )));
            }

            let mut parent_node = InternalPage::new(parent_guard.data_mut());

            match left_type {
                PageType::Leaf => {
                    let mut left = LeafPage::new(left_guard.data_mut());
                    let mut right = LeafPage::new(right_guard.data_mut());

                    if left.num_keys() + right.num_keys() <= self.leaf_order {
                        let mut entries = left.entries();
                        entries.extend(right.entries());
                        left.set_entries(&entries);
                        left.set_next_page_id(right.next_page_id());
                        parent_node.remove_at(separator_index);
                        true
                    } else if underflowing_is_right {
                        let (key, value) = left.remove_at(left.num_keys() - 1);
                        right.insert_at(0, key, &value);
                        parent_node.set_key_at(separator_index, key);
                        false
                    } else {
                        let (key, value) = right.remove_at(0);
                        left.insert_at(left.num_keys(), key, &value);
                        parent_node.set_key_at(separator_index, right.key_at(0));
                        false
                    }
                }
                _ => {
                    let mut left = InternalPage::new(left_guard.data_mut());
                    let mut right = InternalPage::new(right_guard.data_mut());
                    let separator = parent_node.key_at(separator_index);

                    if left.num_keys() + right.num_keys() + 1 <= self.internal_order {
                        let mut keys = left.keys();
                        keys.push(separator);
                        keys.extend(right.keys());
                        let mut children = left.children();
                        children.extend(right.children());

                        left.set_entries(&keys, &children);
                        parent_node.remove_at(separator_index);
                        true
                    } else if underflowing_is_right {
                        let (key, child) = left.remove_at(left.num_keys() - 1);
                        right.push_front(child, separator);
                        parent_node.set_key_at(separator_index, key);
                        false
                    } else {
                        let (child, key) = right.remove_first();
                        let end = left.num_keys();
                        left.insert_at(end, separator, child);
                        parent_node.set_key_at(separator_index, key);
                        false
                    }
                }
            }
        };

        drop(parent_guard);

        if freed {
            debug!("merged {} into {}", right_id, left_id);
            self.bpm.delete_page(right_id)?;
        } else {
            debug!("redistributed between {} and {}", left_id, right_id);
        }

        Ok(freed)
    }

    /// Shrinks the tree at the root: an internal root without keys gives way
    /// to its only child and an empty leaf root empties the tree.
    fn adjust_root(&mut self, root_page_id: PageId) -> Result<()> {
        let new_root = {
            let guard = self.bpm.read_page(root_page_id)?;
            match node_type(root_page_id, guard.data())? {
                PageType::Leaf if LeafPage::new(guard.data()).num_keys() == 0 => INVALID_PAGE_ID,
                PageType::Internal if InternalPage::new(guard.data()).num_keys() == 0 => {
                    InternalPage::new(guard.data()).child_at(0)
                }
                _ => return Ok(()),
            }
        };

        self.set_root(new_root);
        self.bpm.delete_page(root_page_id)
    }

    /// Iterates records with keys in `[lo, hi]` in ascending order. Bounds
    /// given in reverse order are swapped.
    pub fn range(&self, lo: Key, hi: Key) -> Result<BTreeIterator> {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };

        let start = if self.root_page_id == INVALID_PAGE_ID {
            None
        } else {
            Some(self.find_leaf(lo)?.0)
        };

        Ok(BTreeIterator::new(Arc::clone(&self.bpm), start, lo, hi))
    }

    /// Counts the records and finds the smallest and largest key by walking
    /// the leaf chain from the leftmost leaf.
    pub fn table_info(&self) -> Result<TableInfo> {
        let mut info = TableInfo::default();
        if self.root_page_id == INVALID_PAGE_ID {
            return Ok(info);
        }

        let max_leaves = self.bpm.disk_manager().get_num_pages() as usize;
        let mut visited = 0;
        let mut current = Some(self.find_leaf(Key::MIN)?.0);

        while let Some(page_id) = current {
            visited += 1;
            if visited > max_leaves {
                return corrupted("leaf chain contains a cycle".to_string());
            }

            let guard = self.bpm.read_page(page_id)?;
            if node_type(page_id, guard.data())? != PageType::Leaf {
                return corrupted(format!("leaf chain reaches non-leaf {}", page_id));
            }

            let leaf = LeafPage::new(guard.data());
            let num_keys = leaf.num_keys();
            if num_keys > 0 {
                info.min_key.get_or_insert(leaf.key_at(0));
                info.max_key = Some(leaf.key_at(num_keys - 1));
                info.records += num_keys as u64;
            }
            current = leaf.next_page_id();
        }

        Ok(info)
    }

    /// Collects every record with a key in `[lo, hi]`.
    pub fn range_scan(&self, lo: Key, hi: Key) -> Result<Vec<(Key, String)>> {
        self.range(lo, hi)?.collect()
    }

    /// Walks the whole tree and the free list and verifies the structural
    /// invariants:
    ///
    /// - keys sorted within every node and inside their separator bounds
    /// - node occupancy within the configured orders
    /// - every leaf at the same depth, chained left to right
    /// - the header record count matches the leaves
    /// - every page is the header, a reachable node or a free page, exactly once
    pub fn check_integrity(&self) -> Result<TreeStats> {
        let dm = self.bpm.disk_manager();
        let mut stats = TreeStats::default();
        let mut seen = HashSet::new();
        seen.insert(HEADER_PAGE_ID);

        if self.root_page_id != INVALID_PAGE_ID {
            let mut leaves = Vec::new();
            let mut walk = IntegrityWalk {
                index: self,
                seen: &mut seen,
                stats: &mut stats,
                leaves: &mut leaves,
                leaf_depth: None,
            };
            walk.visit(self.root_page_id, None, None, 1)?;
            let height = walk.leaf_depth.unwrap_or(0);
            stats.height = height;
            self.check_leaf_chain(&leaves)?;
        }

        let recorded = dm.record_count();
        if recorded != stats.records {
            return corrupted(format!(
                "header counts {} records, leaves hold {}",
                recorded, stats.records
            ));
        }

        for page_id in dm.free_pages()? {
            if !seen.insert(page_id) {
                return corrupted(format!("free {} is also in use", page_id));
            }
            stats.free_pages += 1;
        }

        let num_pages = dm.get_num_pages() as usize;
        if seen.len() != num_pages {
            return corrupted(format!(
                "{} pages allocated but {} accounted for",
                num_pages,
                seen.len()
            ));
        }

        Ok(stats)
    }

    fn check_leaf_chain(&self, leaves: &[PageId]) -> Result<()> {
        for (i, &page_id) in leaves.iter().enumerate() {
            let guard = self.bpm.read_page(page_id)?;
            let next = LeafPage::new(guard.data()).next_page_id();
            let expected = leaves.get(i + 1).copied();
            if next != expected {
                return corrupted(format!(
                    "leaf {} links to {:?}, expected {:?}",
                    page_id, next, expected
                ));
            }
        }
        Ok(())
    }
}

fn corrupted<T>(message: String) -> Result<T> {
    Err(DbError::IndexCorrupted(message))
}

/// Depth-first state for [`BTreeIndex::check_integrity`].
struct IntegrityWalk<'a> {
    index: &'a BTreeIndex,
    seen: &'a mut HashSet<PageId>,
    stats: &'a mut TreeStats,
    leaves: &'a mut Vec<PageId>,
    leaf_depth: Option<usize>,
}

impl IntegrityWalk<'_> {
    /// Checks the subtree at `page_id`, whose keys must lie in
    /// `[lower, upper)`.
    fn visit(
        &mut self,
        page_id: PageId,
        lower: Option<Key>,
        upper: Option<Key>,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_DEPTH {
            return corrupted(format!("tree deeper than {} levels", MAX_DEPTH));
        }
        if !self.seen.insert(page_id) {
            return corrupted(format!("{} is reachable more than once", page_id));
        }

        let is_root = depth == 1;
        let guard = self.index.bpm.read_page(page_id)?;

        let (keys, children) = match node_type(page_id, guard.data())? {
            PageType::Leaf => {
                let leaf = LeafPage::new(guard.data());
                let keys: Vec<Key> = (0..leaf.num_keys()).map(|i| leaf.key_at(i)).collect();
                (keys, Vec::new())
            }
            _ => {
                let node = InternalPage::new(guard.data());
                (node.keys(), node.children())
            }
        };
        drop(guard);

        let is_leaf = children.is_empty();
        let (min, max) = if is_leaf {
            (self.index.leaf_min(), self.index.leaf_order)
        } else {
            (self.index.internal_min(), self.index.internal_order)
        };
        let min = if is_root { 1 } else { min };

        if keys.len() < min || keys.len() > max {
            return corrupted(format!(
                "{} holds {} keys, allowed {}..={}",
                page_id,
                keys.len(),
                min,
                max
            ));
        }

        if keys.windows(2).any(|w| w[0] >= w[1]) {
            return corrupted(format!("{} has unsorted keys", page_id));
        }

        let first = keys[0];
        let last = keys[keys.len() - 1];
        if lower.is_some_and(|lo| first < lo) || upper.is_some_and(|hi| last >= hi) {
            return corrupted(format!(
                "{} keys {}..={} escape bounds {:?}..{:?}",
                page_id, first, last, lower, upper
            ));
        }

        if is_leaf {
            match self.leaf_depth {
                Some(d) if d != depth => {
                    return corrupted(format!(
                        "leaf {} at depth {}, others at {}",
                        page_id, depth, d
                    ));
                }
                _ => self.leaf_depth = Some(depth),
            }
            self.stats.leaf_pages += 1;
            self.stats.records += keys.len() as u64;
            self.leaves.push(page_id);
            return Ok(());
        }

        self.stats.internal_pages += 1;
        for (i, &child) in children.iter().enumerate() {
            let child_lower = if i == 0 { lower } else { Some(keys[i - 1]) };
            let child_upper = if i == keys.len() { upper } else { Some(keys[i]) };
            self.visit(child, child_lower, child_upper, depth + 1)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::disk::DiskManager;
    use tempfile::NamedTempFile;

    fn create_index(leaf_order: usize, internal_order: usize) -> (BTreeIndex, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let disk_manager = Arc::new(DiskManager::open(temp_file.path()).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(64, 2, disk_manager));
        (BTreeIndex::with_orders(bpm, leaf_order, internal_order), temp_file)
    }

    #[test]
    fn test_simple_insert_search() {
        let (mut index, _temp) = create_index(DEFAULT_LEAF_ORDER, DEFAULT_INTERNAL_ORDER);
        assert!(index.is_empty());
        assert_eq!(index.root_page_id(), INVALID_PAGE_ID);
        assert_eq!(index.find(10).unwrap(), None);

        index.insert(10, "a10").unwrap();
        index.insert(20, "a20").unwrap();
        index.insert(-30, "neg").unwrap();

        assert_eq!(index.find(10).unwrap().as_deref(), Some("a10"));
        assert_eq!(index.find(20).unwrap().as_deref(), Some("a20"));
        assert_eq!(index.find(-30).unwrap().as_deref(), Some("neg"));
        assert_eq!(index.find(15).unwrap(), None);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_duplicate_keeps_first_value() {
        let (mut index, _temp) = create_index(4, 3);
        index.insert(5, "a5").unwrap();
        assert!(matches!(index.insert(5, "b5"), Err(DbError::DuplicateKey(5))));
        assert_eq!(index.find(5).unwrap().as_deref(), Some("a5"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_value_too_large_is_rejected() {
        let (mut index, _temp) = create_index(4, 3);
        let long = "x".repeat(121);
        assert!(matches!(
            index.insert(1, &long),
            Err(DbError::ValueTooLarge { len: 121, .. })
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn test_leaf_split_grows_root() {
        let (mut index, _temp) = create_index(4, 3);
        for key in 0..5 {
            index.insert(key, &format!("v{}", key)).unwrap();
        }

        let stats = index.check_integrity().unwrap();
        assert_eq!(stats.height, 2);
        assert_eq!(stats.leaf_pages, 2);
        assert_eq!(stats.internal_pages, 1);
        assert_eq!(stats.records, 5);
    }

    #[test]
    fn test_delete_collapses_to_empty() {
        let (mut index, _temp) = create_index(4, 3);
        for key in 0..40 {
            index.insert(key, "v").unwrap();
        }
        assert!(index.check_integrity().unwrap().height >= 3);

        for key in 0..40 {
            index.delete(key).unwrap();
            index.check_integrity().unwrap();
        }

        assert!(index.is_empty());
        assert_eq!(index.root_page_id(), INVALID_PAGE_ID);
        let stats = index.check_integrity().unwrap();
        assert_eq!(stats.height, 0);
        // Every node page went back to the free list
        assert_eq!(
            stats.free_pages as u32 + 1,
            index.bpm.disk_manager().get_num_pages()
        );
    }

    #[test]
    fn test_delete_missing_key_changes_nothing() {
        let (mut index, _temp) = create_index(4, 3);
        assert!(matches!(index.delete(1), Err(DbError::KeyNotFound(1))));

        index.insert(1, "a").unwrap();
        assert!(matches!(index.delete(2), Err(DbError::KeyNotFound(2))));
        assert_eq!(index.len(), 1);
        assert_eq!(index.find(1).unwrap().as_deref(), Some("a"));
    }

    #[test]
    fn test_range_scan_crosses_leaves() {
        let (mut index, _temp) = create_index(4, 3);
        for key in (0..50).rev() {
            index.insert(key * 2, &format!("v{}", key * 2)).unwrap();
        }

        let keys: Vec<Key> = index
            .range_scan(11, 31)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![12, 14, 16, 18, 20, 22, 24, 26, 28, 30]);

        let swapped = index.range_scan(31, 11).unwrap();
        assert_eq!(swapped.len(), 10);
        assert_eq!(swapped[0], (12, "v12".to_string()));

        assert!(index.range_scan(1000, 2000).unwrap().is_empty());
    }

    #[test]
    fn test_table_info_walks_leaf_chain() {
        let (mut index, _temp) = create_index(4, 3);
        assert_eq!(index.table_info().unwrap(), TableInfo::default());
        assert_eq!(index.table_info().unwrap().key_range(), None);

        for key in (-40..60).rev() {
            index.insert(key, "v").unwrap();
        }
        for key in [-40, 59, 10] {
            index.delete(key).unwrap();
        }

        let info = index.table_info().unwrap();
        assert_eq!(info.records, 97);
        assert_eq!(info.records, index.len());
        assert_eq!(info.key_range(), Some((-39, 58)));
    }

    #[test]
    fn test_descent_rejects_node_over_order() {
        let (mut index, _temp) = create_index(4, 3);
        for key in 0..4 {
            index.insert(key, "v").unwrap();
        }

        // A lone leaf root holding 4 records is over the order of a
        // tree opened with leaf order 3
        let narrow = BTreeIndex::with_orders(Arc::clone(&index.bpm), 3, 3);
        assert!(matches!(narrow.find(1), Err(DbError::IndexCorrupted(_))));
        assert_eq!(index.find(1).unwrap().as_deref(), Some("v"));
    }

    #[test]
    #[should_panic(expected = "leaf order")]
    fn test_oversized_order_panics() {
        let _ = create_index(LEAF_CAPACITY + 1, 3);
    }
}
