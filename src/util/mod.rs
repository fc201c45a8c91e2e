pub mod simba;
mod stats;

use std::iter::FusedIterator;

pub use stats::Stats;

/// Iterates over indices of the set bits of a lane mask, lowest first.
pub fn bit_iter(bits: u64) -> BitIter {
    BitIter { bits }
}

#[derive(Copy, Clone, Debug)]
pub struct BitIter {
    bits: u64,
}

impl Iterator for BitIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        (self.bits != 0).then(|| {
            let lowest = self.bits.trailing_zeros() as usize;
            self.bits &= self.bits - 1;
            lowest
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let count = self.len();
        (count, Some(count))
    }
}

impl ExactSizeIterator for BitIter {
    fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }
}

impl FusedIterator for BitIter {}
