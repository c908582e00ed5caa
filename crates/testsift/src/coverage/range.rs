//! Type-Safe Slot Addressing (Poka-Yoke)
//!
//! Coverage slots form a flat address space owned by the source registry.
//! A slot may stand for a statement, a branch or a method entry; this crate
//! never interprets them, it only stores and intersects them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Contiguous range of coverage slots `[start, start + len)`
///
/// A source file, a class or a method each occupy one such range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotRange {
    start: u32,
    len: u32,
}

impl SlotRange {
    /// Create a new range
    #[inline]
    #[must_use]
    pub const fn new(start: u32, len: u32) -> Self {
        Self { start, len }
    }

    /// Range covering `[start, end)`; an inverted pair yields an empty range
    #[must_use]
    pub const fn from_bounds(start: u32, end: u32) -> Self {
        if end <= start {
            Self { start, len: 0 }
        } else {
            Self {
                start,
                len: end - start,
            }
        }
    }

    /// First slot of the range
    #[inline]
    #[must_use]
    pub const fn start(self) -> u32 {
        self.start
    }

    /// Number of slots in the range
    #[inline]
    #[must_use]
    pub const fn len(self) -> u32 {
        self.len
    }

    /// One past the last slot (saturating at `u32::MAX`)
    #[inline]
    #[must_use]
    pub const fn end(self) -> u32 {
        self.start.saturating_add(self.len)
    }

    /// True if the range holds no slots
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.len == 0
    }

    /// Check whether a slot falls inside this range
    #[inline]
    #[must_use]
    pub const fn contains(self, slot: u32) -> bool {
        slot >= self.start && slot < self.end()
    }

    /// Check whether two ranges share at least one slot
    #[must_use]
    pub const fn overlaps(self, other: Self) -> bool {
        !self.is_empty() && !other.is_empty() && self.start < other.end() && other.start < self.end()
    }
}

impl fmt::Display for SlotRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{})", self.start, self.end())
    }
}
