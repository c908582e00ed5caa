//! Coverage slot primitives.
//!
//! [`SlotRange`] addresses a contiguous block of coverage slots and
//! [`CoverageBitSet`] records which slots a test or run hit.

mod bitset;
mod range;

pub use bitset::CoverageBitSet;
pub use range::SlotRange;
