//! Sort-merge equi-join of two trees on their keys.

use std::cmp::Ordering;

use crate::common::{Key, Result};

use super::btree_index::BTreeIndex;
use super::btree_iterator::BTreeIterator;

/// A key present in both trees, with the value each one stores for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRow {
    pub key: Key,
    pub left: String,
    pub right: String,
}

/// Pull-based merge join over two leaf chains.
///
/// Both sides are already sorted and keys are unique, so each side is walked
/// once and every key matches at most one row on the other side. The scans
/// are restricted to the overlap of the two key ranges; trees whose ranges do
/// not overlap produce nothing without touching a leaf.
pub struct MergeJoin {
    left: Option<BTreeIterator>,
    right: Option<BTreeIterator>,
    left_row: Option<(Key, String)>,
    right_row: Option<(Key, String)>,
}

impl MergeJoin {
    pub fn new(left: &BTreeIndex, right: &BTreeIndex) -> Result<Self> {
        let overlap = match (left.table_info()?.key_range(), right.table_info()?.key_range()) {
            (Some((l_min, l_max)), Some((r_min, r_max))) => {
                let lo = l_min.max(r_min);
                let hi = l_max.min(r_max);
                (lo <= hi).then_some((lo, hi))
            }
            _ => None,
        };

        let Some((lo, hi)) = overlap else {
            return Ok(Self {
                left: None,
                right: None,
                left_row: None,
                right_row: None,
            });
        };

        let mut left_iter = left.range(lo, hi)?;
        let mut right_iter = right.range(lo, hi)?;
        let left_row = left_iter.next()?;
        let right_row = right_iter.next()?;

        Ok(Self {
            left: Some(left_iter),
            right: Some(right_iter),
            left_row,
            right_row,
        })
    }

    fn advance_left(&mut self) -> Result<()> {
        self.left_row = match self.left.as_mut() {
            Some(iter) => iter.next()?,
            None => None,
        };
        Ok(())
    }

    fn advance_right(&mut self) -> Result<()> {
        self.right_row = match self.right.as_mut() {
            Some(iter) => iter.next()?,
            None => None,
        };
        Ok(())
    }

    /// Returns the next matching row in ascending key order.
    pub fn next(&mut self) -> Result<Option<JoinRow>> {
        loop {
            let order = match (&self.left_row, &self.right_row) {
                (Some((l, _)), Some((r, _))) => l.cmp(r),
                _ => return Ok(None),
            };

            match order {
                Ordering::Less => self.advance_left()?,
                Ordering::Greater => self.advance_right()?,
                Ordering::Equal => {
                    let row = match (self.left_row.take(), self.right_row.take()) {
                        (Some((key, left)), Some((_, right))) => JoinRow { key, left, right },
                        _ => return Ok(None),
                    };
                    self.advance_left()?;
                    self.advance_right()?;
                    return Ok(Some(row));
                }
            }
        }
    }
}

impl Iterator for MergeJoin {
    type Item = Result<JoinRow>;

    fn next(&mut self) -> Option<Self::Item> {
        match MergeJoin::next(self) {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => None,
            Err(e) => {
                self.left_row = None;
                self.right_row = None;
                Some(Err(e))
            }
        }
    }
}
