//! Crate error type.

use std::fmt;

/// Convenient Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong in the buffer pool and its disk
/// collaborator.
///
/// Failure of a predicate (unpin of an unknown page, flush of a
/// non-resident page) is reported as a boolean return, not an error;
/// this enum covers the cases where an operation cannot complete.
#[derive(Debug)]
pub enum Error {
    /// I/O error from the disk collaborator.
    Io(std::io::Error),

    /// Every frame is pinned; nothing on the free list, nothing evictable.
    NoFreeFrames,

    /// Attempted to delete a page that still has outstanding pins.
    PagePinned(u32),

    /// An I/O operation was addressed to the INVALID page id sentinel.
    InvalidPageId(u32),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::NoFreeFrames => write!(f, "no free frames available in buffer pool"),
            Error::PagePinned(pid) => write!(f, "page {} is pinned and cannot be deleted", pid),
            Error::InvalidPageId(pid) => write!(f, "invalid page id: {}", pid),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
