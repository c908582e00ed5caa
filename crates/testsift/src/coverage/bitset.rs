//! Packed Coverage Bitset
//!
//! One bit per coverage slot, packed into little-endian ordered `u64` words
//! (slot `i` lives in word `i / 64`, bit `i % 64`). Most per-test coverage
//! is sparse, so operations skip zero words wherever possible.

use super::SlotRange;

const WORD_BITS: u32 = 64;

#[inline]
const fn word_index(slot: u32) -> usize {
    (slot / WORD_BITS) as usize
}

#[inline]
const fn bit_mask(slot: u32) -> u64 {
    1u64 << (slot % WORD_BITS)
}

/// Growable bitset over coverage slots
#[derive(Debug, Clone, Default)]
pub struct CoverageBitSet {
    words: Vec<u64>,
}

impl CoverageBitSet {
    /// Create an empty bitset
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty bitset with room for `slots` bits
    #[must_use]
    pub fn with_capacity(slots: u32) -> Self {
        Self {
            words: vec![0; word_index(slots.saturating_add(WORD_BITS - 1))],
        }
    }

    /// Build from raw words
    #[must_use]
    pub fn from_words(words: Vec<u64>) -> Self {
        Self { words }
    }

    /// Build from per-slot hit counters: every non-zero counter sets its bit
    #[must_use]
    pub fn from_hit_counts(counts: &[u64]) -> Self {
        let mut bits = Self::with_capacity(counts.len() as u32);
        for (slot, &count) in counts.iter().enumerate() {
            if count != 0 {
                bits.set(slot as u32);
            }
        }
        bits
    }

    /// Build from an iterator of slots
    pub fn from_slots<I: IntoIterator<Item = u32>>(slots: I) -> Self {
        let mut bits = Self::new();
        for slot in slots {
            bits.set(slot);
        }
        bits
    }

    /// Raw words
    #[inline]
    #[must_use]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    fn ensure_word(&mut self, idx: usize) {
        if idx >= self.words.len() {
            self.words.resize(idx + 1, 0);
        }
    }

    /// Set a slot
    pub fn set(&mut self, slot: u32) {
        let idx = word_index(slot);
        self.ensure_word(idx);
        self.words[idx] |= bit_mask(slot);
    }

    /// Set every slot in a range
    pub fn set_range(&mut self, range: SlotRange) {
        for slot in range.start()..range.end() {
            self.set(slot);
        }
    }

    /// Clear a slot
    pub fn clear(&mut self, slot: u32) {
        if let Some(word) = self.words.get_mut(word_index(slot)) {
            *word &= !bit_mask(slot);
        }
    }

    /// Check whether a slot is set
    #[inline]
    #[must_use]
    pub fn get(&self, slot: u32) -> bool {
        self.words
            .get(word_index(slot))
            .is_some_and(|word| word & bit_mask(slot) != 0)
    }

    /// First set slot at or after `from`
    #[must_use]
    pub fn next_set_bit(&self, from: u32) -> Option<u32> {
        let mut idx = word_index(from);
        if idx >= self.words.len() {
            return None;
        }
        let mut word = self.words[idx] & (!0u64 << (from % WORD_BITS));
        loop {
            if word != 0 {
                return Some(idx as u32 * WORD_BITS + word.trailing_zeros());
            }
            idx += 1;
            if idx >= self.words.len() {
                return None;
            }
            word = self.words[idx];
        }
    }

    /// Iterate over set slots in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().enumerate().flat_map(|(idx, &word)| {
            let base = idx as u32 * WORD_BITS;
            let mut rest = word;
            std::iter::from_fn(move || {
                if rest == 0 {
                    None
                } else {
                    let bit = rest.trailing_zeros();
                    rest &= rest - 1;
                    Some(base + bit)
                }
            })
        })
    }

    /// Number of set slots
    #[must_use]
    pub fn cardinality(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// True when no slot is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// In-place union
    pub fn union_with(&mut self, other: &Self) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (mine, theirs) in self.words.iter_mut().zip(&other.words) {
            *mine |= theirs;
        }
    }

    /// In-place intersection
    pub fn intersect_with(&mut self, other: &Self) {
        for (idx, mine) in self.words.iter_mut().enumerate() {
            *mine &= other.words.get(idx).copied().unwrap_or(0);
        }
    }

    /// In-place difference: clears every slot set in `other`
    pub fn difference_with(&mut self, other: &Self) {
        for (mine, theirs) in self.words.iter_mut().zip(&other.words) {
            *mine &= !theirs;
        }
    }

    /// Check whether the two sets share any slot
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(&other.words)
            .any(|(a, b)| a & b != 0)
    }

    /// Check whether any slot inside `range` is set
    #[must_use]
    pub fn any_in(&self, range: SlotRange) -> bool {
        if range.is_empty() {
            return false;
        }
        self.next_set_bit(range.start())
            .is_some_and(|slot| slot < range.end())
    }

    /// Copy of this set restricted to `range`
    #[must_use]
    pub fn masked(&self, range: SlotRange) -> Self {
        let mut out = Self::new();
        if range.is_empty() {
            return out;
        }
        let mut next = self.next_set_bit(range.start());
        while let Some(slot) = next {
            if slot >= range.end() {
                break;
            }
            out.set(slot);
            next = slot.checked_add(1).and_then(|from| self.next_set_bit(from));
        }
        out
    }

    /// Heap footprint of the packed words, used to weigh cache entries
    #[must_use]
    pub fn size_in_bytes(&self) -> usize {
        self.words.len() * std::mem::size_of::<u64>()
    }

    /// Drop trailing zero words
    pub fn shrink(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

impl PartialEq for CoverageBitSet {
    fn eq(&self, other: &Self) -> bool {
        let common = self.words.len().min(other.words.len());
        self.words[..common] == other.words[..common]
            && self.words[common..].iter().all(|&w| w == 0)
            && other.words[common..].iter().all(|&w| w == 0)
    }
}

impl Eq for CoverageBitSet {}

impl FromIterator<u32> for CoverageBitSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self::from_slots(iter)
    }
}
