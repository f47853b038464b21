//! Circular index buffer
//!
//! Hands out slot indices into a caller-owned array whose length is a power
//! of two. Read and write counters run freely and wrap; the slot index is the
//! counter masked by `capacity - 1`.

use crate::{Error, KResult};

/// Index bookkeeping for a power-of-two ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cib {
    read_count: usize,
    write_count: usize,
    mask: usize,
}

impl Cib {
    /// Create an index buffer for `capacity` slots
    ///
    /// Fails with `InvalidCapacity` unless `capacity` is a non-zero power of two.
    pub fn new(capacity: usize) -> KResult<Self> {
        if !capacity.is_power_of_two() {
            return Err(Error::InvalidCapacity);
        }
        Ok(Self {
            read_count: 0,
            write_count: 0,
            mask: capacity - 1,
        })
    }

    /// Number of occupied slots
    pub const fn avail(&self) -> usize {
        self.write_count.wrapping_sub(self.read_count)
    }

    /// Check if no slot is occupied
    pub const fn is_empty(&self) -> bool {
        self.avail() == 0
    }

    /// Check if every slot is occupied
    pub const fn is_full(&self) -> bool {
        self.avail() > self.mask
    }

    /// Total number of slots
    pub const fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Claim the oldest occupied slot for reading
    pub fn get(&mut self) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let index = self.read_count & self.mask;
        self.read_count = self.read_count.wrapping_add(1);
        Some(index)
    }

    /// Index of the oldest occupied slot without consuming it
    pub fn peek(&self) -> Option<usize> {
        if self.is_empty() {
            None
        } else {
            Some(self.read_count & self.mask)
        }
    }

    /// Claim the next free slot for writing
    pub fn put(&mut self) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        let index = self.write_count & self.mask;
        self.write_count = self.write_count.wrapping_add(1);
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cib_wraps() {
        let mut cib = Cib::new(2).unwrap();
        assert_eq!(cib.put(), Some(0));
        assert_eq!(cib.put(), Some(1));
        assert_eq!(cib.put(), None);
        assert!(cib.is_full());

        assert_eq!(cib.get(), Some(0));
        assert_eq!(cib.put(), Some(0));
        assert_eq!(cib.get(), Some(1));
        assert_eq!(cib.get(), Some(0));
        assert_eq!(cib.get(), None);
        assert!(cib.is_empty());
    }
}
