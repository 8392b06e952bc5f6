//! Fixed-width per-instance bitset, one bit per chunk slot.
//!
//! Only bits below the owning chunk's instance count carry meaning. Bits at
//! or above the count are unspecified; use the `*_below` accessors when
//! reading a whole set.

use prism_chunk::CHUNK_CAPACITY;

/// 128 bits stored as two little-endian `u64` words (slot `i` lives in word `i / 64`).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceBits128 {
    pub words: [u64; 2],
}

static_assertions::const_assert_eq!(CHUNK_CAPACITY, 128);

impl InstanceBits128 {
    /// Number of addressable slots.
    pub const BITS: usize = 128;

    pub const fn empty() -> Self {
        Self { words: [0; 2] }
    }

    pub const fn from_u128(bits: u128) -> Self {
        Self {
            words: [bits as u64, (bits >> 64) as u64],
        }
    }

    pub const fn to_u128(self) -> u128 {
        (self.words[0] as u128) | ((self.words[1] as u128) << 64)
    }

    /// Read the bit for `slot`.
    pub fn get(&self, slot: usize) -> bool {
        debug_assert!(slot < Self::BITS, "slot {slot} out of range");
        self.words[slot >> 6] & (1 << (slot & 63)) != 0
    }

    /// Write the bit for `slot`.
    pub fn set(&mut self, slot: usize, value: bool) {
        debug_assert!(slot < Self::BITS, "slot {slot} out of range");
        let word = &mut self.words[slot >> 6];
        let bit = 1u64 << (slot & 63);
        if value {
            *word |= bit;
        } else {
            *word &= !bit;
        }
    }

    pub fn clear(&mut self) {
        self.words = [0; 2];
    }

    /// The meaningful bits for a chunk holding `count` instances.
    pub fn bits_below(&self, count: usize) -> u128 {
        debug_assert!(count <= Self::BITS);
        let mask = if count >= Self::BITS {
            u128::MAX
        } else {
            (1u128 << count) - 1
        };
        self.to_u128() & mask
    }

    /// Number of set bits among the first `count` slots.
    pub fn count_ones_below(&self, count: usize) -> u32 {
        self.bits_below(count).count_ones()
    }

    /// Indices of set bits among the first `count` slots, ascending.
    pub fn iter_ones_below(&self, count: usize) -> impl Iterator<Item = usize> {
        let mut remaining = self.bits_below(count);
        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            let index = remaining.trailing_zeros() as usize;
            remaining &= remaining - 1;
            Some(index)
        })
    }
}
