// Copyright 2026 the Stack Forge Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A fixed-size bitset over instruction indices.

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct BitSet {
    bits: Vec<u64>,
    len: usize,
}

impl BitSet {
    #[must_use]
    pub(crate) fn new_empty(len: usize) -> Self {
        Self {
            bits: vec![0; len.div_ceil(64)],
            len,
        }
    }

    #[must_use]
    pub(crate) fn get(&self, idx: usize) -> bool {
        if idx >= self.len {
            return false;
        }
        (self.bits[idx / 64] >> (idx % 64)) & 1 == 1
    }

    pub(crate) fn set(&mut self, idx: usize) {
        if idx >= self.len {
            return;
        }
        self.bits[idx / 64] |= 1_u64 << (idx % 64);
    }

    pub(crate) fn clear(&mut self, idx: usize) {
        if idx >= self.len {
            return;
        }
        self.bits[idx / 64] &= !(1_u64 << (idx % 64));
    }

    /// Number of set bits.
    #[must_use]
    pub(crate) fn count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_clear_across_words() {
        let mut s = BitSet::new_empty(130);
        s.set(0);
        s.set(64);
        s.set(129);
        s.set(130);
        assert!(s.get(0) && s.get(64) && s.get(129));
        assert!(!s.get(130));
        assert_eq!(s.count(), 3);
        s.clear(64);
        assert!(!s.get(64));
        assert_eq!(s.count(), 2);
    }
}
