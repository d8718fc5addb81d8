mod free_page;
mod header_page;

pub use free_page::*;
pub use header_page::*;

/// Type tag stored in the first byte of every non-header page.
///
/// A zeroed page decodes as `Unused`, which is what file growth produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageType {
    Unused = 0,
    Leaf = 1,
    Internal = 2,
    Free = 3,
}

impl PageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PageType::Unused),
            1 => Some(PageType::Leaf),
            2 => Some(PageType::Internal),
            3 => Some(PageType::Free),
            _ => None,
        }
    }

    /// Reads the type tag of a page buffer.
    pub fn of(data: &[u8]) -> Option<Self> {
        Self::from_u8(data[0])
    }
}
