//! Dense bit set used for dataflow facts.
//!
//! Every analysis in this crate manipulates sets over a fixed expression
//! domain, so a flat `Vec<u64>` beats hash sets for both the meet loops and
//! the per-block transfer functions.

use serde::{Deserialize, Serialize};

/// Efficient bit set for dataflow analysis over a fixed-size domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitSet {
    /// Backing storage: each u64 holds 64 bits.
    bits: Vec<u64>,
    /// Number of elements that can be stored.
    capacity: usize,
}

impl BitSet {
    /// Create a new empty BitSet with given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let num_words = capacity.div_ceil(64);
        Self {
            bits: vec![0; num_words],
            capacity,
        }
    }

    /// Create a BitSet with all bits set (universe).
    pub fn full(capacity: usize) -> Self {
        let mut set = Self::with_capacity(capacity);
        set.fill();
        set
    }

    /// Insert an element. Returns true if the element was not already present.
    #[inline]
    pub fn insert(&mut self, elem: usize) -> bool {
        if elem >= self.capacity {
            return false;
        }
        let mask = 1u64 << (elem % 64);
        let word = &mut self.bits[elem / 64];
        let was_present = (*word & mask) != 0;
        *word |= mask;
        !was_present
    }

    /// Remove an element. Returns true if the element was present.
    #[inline]
    pub fn remove(&mut self, elem: usize) -> bool {
        if elem >= self.capacity {
            return false;
        }
        let mask = 1u64 << (elem % 64);
        let word = &mut self.bits[elem / 64];
        let was_present = (*word & mask) != 0;
        *word &= !mask;
        was_present
    }

    /// Check if an element is in the set.
    #[inline]
    pub fn contains(&self, elem: usize) -> bool {
        if elem >= self.capacity {
            return false;
        }
        (self.bits[elem / 64] & (1u64 << (elem % 64))) != 0
    }

    /// Union: self = self | other
    #[inline]
    pub fn union_with(&mut self, other: &BitSet) {
        for (a, b) in self.bits.iter_mut().zip(other.bits.iter()) {
            *a |= *b;
        }
    }

    /// Intersection: self = self & other
    #[inline]
    pub fn intersect_with(&mut self, other: &BitSet) {
        for (a, b) in self.bits.iter_mut().zip(other.bits.iter()) {
            *a &= *b;
        }
    }

    /// Difference: self = self - other
    #[inline]
    pub fn difference_with(&mut self, other: &BitSet) {
        for (a, b) in self.bits.iter_mut().zip(other.bits.iter()) {
            *a &= !*b;
        }
    }

    /// Complement: self = universe - self
    #[inline]
    pub fn flip(&mut self) {
        for w in &mut self.bits {
            *w = !*w;
        }
        self.mask_tail();
    }

    /// Check if the set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&w| w == 0)
    }

    /// Check whether every element of `self` is also in `other`.
    #[inline]
    pub fn is_subset_of(&self, other: &BitSet) -> bool {
        self.bits
            .iter()
            .zip(other.bits.iter())
            .all(|(a, b)| a & !b == 0)
    }

    /// Count the number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Number of elements the set can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clear all elements.
    #[inline]
    pub fn clear(&mut self) {
        for w in &mut self.bits {
            *w = 0;
        }
    }

    /// Set all elements (make universe).
    #[inline]
    pub fn fill(&mut self) {
        for w in &mut self.bits {
            *w = u64::MAX;
        }
        self.mask_tail();
    }

    /// Copy contents from another BitSet.
    #[inline]
    pub fn copy_from(&mut self, other: &BitSet) {
        for (a, b) in self.bits.iter_mut().zip(other.bits.iter()) {
            *a = *b;
        }
    }

    /// Iterate over all elements in the set.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        let capacity = self.capacity;
        self.bits
            .iter()
            .enumerate()
            .flat_map(move |(word_idx, &word)| {
                (0..64).filter_map(move |bit_idx| {
                    if (word & (1u64 << bit_idx)) != 0 && word_idx * 64 + bit_idx < capacity {
                        Some(word_idx * 64 + bit_idx)
                    } else {
                        None
                    }
                })
            })
    }

    /// Clear bits beyond capacity in the last word.
    #[inline]
    fn mask_tail(&mut self) {
        if self.capacity % 64 != 0 {
            if let Some(last) = self.bits.last_mut() {
                *last &= (1u64 << (self.capacity % 64)) - 1;
            }
        }
    }
}
