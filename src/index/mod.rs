pub mod btree_index;
pub mod btree_iterator;
pub mod btree_page;
pub mod merge_join;

pub use btree_index::{BTreeIndex, TableInfo, TreeStats};
pub use btree_iterator::BTreeIterator;
pub use btree_page::{InternalPage, LeafPage, INTERNAL_CAPACITY, LEAF_CAPACITY};
pub use merge_join::{JoinRow, MergeJoin};
