use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{DbError, Key, PageId, Result};
use crate::storage::page::PageType;

use super::btree_page::{node_type, LeafPage};

/// Ascending scan over `[start_key, end_key]` following the leaf chain.
pub struct BTreeIterator {
    bpm: Arc<BufferPoolManager>,
    current_page_id: Option<PageId>,
    current_index: usize,
    start_key: Key,
    end_key: Key,
    done: bool,
}

impl BTreeIterator {
    /// `start_page_id` is the leaf that would hold `start_key`, or None for
    /// an empty tree.
    pub fn new(
        bpm: Arc<BufferPoolManager>,
        start_page_id: Option<PageId>,
        start_key: Key,
        end_key: Key,
    ) -> Self {
        Self {
            bpm,
            current_page_id: start_page_id,
            current_index: 0,
            start_key,
            end_key,
            done: start_page_id.is_none() || start_key > end_key,
        }
    }

    pub fn next(&mut self) -> Result<Option<(Key, String)>> {
        if self.done {
            return Ok(None);
        }

        while let Some(page_id) = self.current_page_id {
            let next_page = {
                let guard = self.bpm.read_page(page_id)?;
                if node_type(page_id, guard.data())? != PageType::Leaf {
                    return Err(DbError::IndexCorrupted(format!(
                        "leaf chain reaches non-leaf {}",
                        page_id
                    )));
                }
                let leaf = LeafPage::new(guard.data());

                while self.current_index < leaf.num_keys() {
                    let key = leaf.key_at(self.current_index);

                    if key > self.end_key {
                        self.done = true;
                        return Ok(None);
                    }

                    self.current_index += 1;
                    if key >= self.start_key {
                        let value = String::from_utf8_lossy(leaf.value_at(self.current_index - 1));
                        return Ok(Some((key, value.into_owned())));
                    }
                }

                leaf.next_page_id()
            };

            self.current_page_id = next_page;
            self.current_index = 0;
        }

        self.done = true;
        Ok(None)
    }
}

impl Iterator for BTreeIterator {
    type Item = Result<(Key, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        match BTreeIterator::next(self) {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
