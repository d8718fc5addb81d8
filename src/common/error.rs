use thiserror::Error;

use super::types::PageId;

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Buffer pool is full, no evictable frames available")]
    BufferPoolFull,

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Page {0} is still pinned")]
    PageStillPinned(PageId),

    #[error("Invalid database file")]
    InvalidDatabaseFile,

    #[error("Index corrupted: {0}")]
    IndexCorrupted(String),

    #[error("Value of {len} bytes exceeds the maximum of {max} bytes")]
    ValueTooLarge { len: usize, max: usize },

    #[error("Duplicate key: {0}")]
    DuplicateKey(i64),

    #[error("Key not found: {0}")]
    KeyNotFound(i64),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl DbError {
    /// Whether the error leaves the store in a state that can no longer be
    /// trusted. Protocol, logical and capacity errors are recoverable.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            DbError::Parse(_)
                | DbError::DuplicateKey(_)
                | DbError::KeyNotFound(_)
                | DbError::ValueTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(!DbError::Parse("x".into()).is_fatal());
        assert!(!DbError::DuplicateKey(5).is_fatal());
        assert!(!DbError::KeyNotFound(5).is_fatal());
        assert!(!DbError::ValueTooLarge { len: 200, max: 120 }.is_fatal());

        assert!(DbError::BufferPoolFull.is_fatal());
        assert!(DbError::InvalidDatabaseFile.is_fatal());
        assert!(DbError::IndexCorrupted("bad page type".into()).is_fatal());
        assert!(DbError::Io(std::io::Error::other("disk")).is_fatal());
    }
}
