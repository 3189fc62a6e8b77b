//! # Bit Delay Ring
//!
//! The delay memory of the chip. Instead of storing audio samples, it
//! stores the one-bit output of the delta-sigma modulator, one bit per
//! modulator tick, packed 32 to a word.
//!
//! ## Why "read oldest, then write"?
//!
//! The ring has a fixed capacity of `N` bits and a single cursor. Every
//! tick the cursor slot holds the bit written exactly `N` ticks ago, so
//! reading it *before* overwriting it yields a pure `N`-tick delay:
//!
//! ```text
//! tick t:   old = ring[pos]     // bit written at tick t - N
//!           ring[pos] = new     // returned again at tick t + N
//!           pos = (pos + 1) % N
//! ```
//!
//! The delay time is therefore set by how fast the ring is clocked, not by
//! moving a read head. That is how the chip works, and it is why the
//! engine varies its internal clock rather than a read offset.

use std::collections::TryReserveError;

const BITS_PER_WORD: usize = 32;

/// A fixed-capacity circular store of single bits.
///
/// Storage is allocated by [`resize`](Self::resize) (once per engine
/// `prepare`) and never again. A ring without storage is inert: it reads
/// zeros and ignores writes.
#[derive(Debug, Clone, Default)]
pub struct BitDelayRing {
    words: Vec<u32>,
    /// Number of addressable bits. Zero means no storage.
    capacity: usize,
    write_pos: usize,
}

impl BitDelayRing {
    /// An empty, inert ring. Call [`resize`](Self::resize) before use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate zeroed, word-packed storage for `capacity_bits` bits (at
    /// least one) and move the cursor to the start.
    ///
    /// Any previous storage is released first. If the allocation fails the
    /// ring is left empty and inert.
    pub fn resize(&mut self, capacity_bits: usize) -> Result<(), TryReserveError> {
        self.words = Vec::new();
        self.capacity = 0;
        self.write_pos = 0;

        let capacity_bits = capacity_bits.max(1);
        let num_words = capacity_bits.div_ceil(BITS_PER_WORD);

        let mut words = Vec::new();
        words.try_reserve_exact(num_words)?;
        words.resize(num_words, 0);

        self.words = words;
        self.capacity = capacity_bits;
        Ok(())
    }

    /// Zero every bit and rewind the cursor. Storage is kept.
    pub fn reset(&mut self) {
        self.words.fill(0);
        self.write_pos = 0;
    }

    /// Number of bits (= ticks of delay) the ring holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `true` when no storage is allocated.
    pub fn is_empty(&self) -> bool {
        self.capacity == 0
    }

    /// The bit under the cursor: the one written `capacity` ticks ago and
    /// about to be overwritten.
    #[inline]
    pub fn read_oldest(&self) -> bool {
        match self.words.get(self.write_pos / BITS_PER_WORD) {
            Some(word) => (word >> (self.write_pos % BITS_PER_WORD)) & 1 != 0,
            None => false,
        }
    }

    /// Store `bit` under the cursor and advance, wrapping at capacity.
    ///
    /// Call [`read_oldest`](Self::read_oldest) first within the same tick,
    /// otherwise the oldest bit is lost.
    #[inline]
    pub fn write_bit(&mut self, bit: bool) {
        let mask = 1u32 << (self.write_pos % BITS_PER_WORD);
        let Some(word) = self.words.get_mut(self.write_pos / BITS_PER_WORD) else {
            return;
        };
        if bit {
            *word |= mask;
        } else {
            *word &= !mask;
        }

        self.write_pos += 1;
        if self.write_pos >= self.capacity {
            self.write_pos = 0;
        }
        nih_plug::nih_debug_assert!(self.write_pos < self.capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic pseudo-random bit pattern for test data.
    fn pattern(i: usize) -> bool {
        (i * 7 + i / 3) % 5 < 2
    }

    /// A bit written at tick t comes back from `read_oldest` at tick t + N,
    /// for a spread of capacities including ones that are not a multiple
    /// of the word size.
    #[test]
    fn test_fifo_law() {
        for capacity in [1, 2, 5, 31, 32, 33, 64, 70, 100] {
            let mut ring = BitDelayRing::new();
            ring.resize(capacity).unwrap();

            for i in 0..capacity {
                assert!(!ring.read_oldest(), "Fresh ring should read zeros");
                ring.write_bit(pattern(i));
            }

            for i in 0..capacity {
                let oldest = ring.read_oldest();
                assert_eq!(
                    oldest,
                    pattern(i),
                    "capacity {capacity}: bit {i} came back wrong"
                );
                ring.write_bit(!oldest);
            }

            // A third lap returns the inverted second lap.
            for i in 0..capacity {
                assert_eq!(ring.read_oldest(), !pattern(i));
                ring.write_bit(false);
            }
        }
    }

    #[test]
    fn test_resize_rounds_up_to_words() {
        let mut ring = BitDelayRing::new();
        ring.resize(33).unwrap();
        assert_eq!(ring.capacity(), 33);
        assert_eq!(ring.words.len(), 2);

        ring.resize(0).unwrap();
        assert_eq!(ring.capacity(), 1, "Capacity is floored at one bit");
    }

    #[test]
    fn test_reset_clears_bits_and_cursor() {
        let mut ring = BitDelayRing::new();
        ring.resize(40).unwrap();
        for _ in 0..25 {
            ring.write_bit(true);
        }
        ring.reset();

        assert_eq!(ring.write_pos, 0);
        assert_eq!(ring.capacity(), 40, "Reset must not reallocate");
        for _ in 0..40 {
            assert!(!ring.read_oldest());
            ring.write_bit(false);
        }
    }

    #[test]
    fn test_empty_ring_is_inert() {
        let mut ring = BitDelayRing::new();
        assert!(ring.is_empty());
        ring.write_bit(true);
        assert!(!ring.read_oldest());
        assert_eq!(ring.capacity(), 0);
    }

    /// An impossible allocation reports an error and leaves the ring
    /// inert instead of half-initialized.
    #[test]
    fn test_failed_allocation_leaves_ring_inert() {
        let mut ring = BitDelayRing::new();
        ring.resize(64).unwrap();

        assert!(ring.resize(usize::MAX).is_err());
        assert!(ring.is_empty());
        assert!(!ring.read_oldest());
        ring.write_bit(true);
        assert!(!ring.read_oldest());
    }
}
