//! Thread priorities and the ready-level bitmap

use core::fmt;
use crate::config::{PRIORITY_IDLE, PRIORITY_LEVELS, PRIORITY_MAIN};
use crate::{Error, KResult};

/// Type-safe scheduler priority level
///
/// Lower numeric values are more urgent; `Priority(0)` preempts everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    /// Most urgent priority level
    pub const HIGHEST: Priority = Priority(0);

    /// Priority of the idle thread
    pub const IDLE: Priority = Priority(PRIORITY_IDLE);

    /// Default priority of the main thread
    pub const MAIN: Priority = Priority(PRIORITY_MAIN);

    /// Create a new priority level
    pub fn new(priority: u8) -> KResult<Self> {
        if priority as usize >= PRIORITY_LEVELS {
            Err(Error::InvalidPriority)
        } else {
            Ok(Priority(priority))
        }
    }

    /// Create priority without validation (const fn)
    pub const fn new_unchecked(priority: u8) -> Self {
        Priority(priority)
    }

    /// Get the raw priority value
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Index of this level in per-priority tables
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// True if `self` would preempt a thread running at `other`
    pub const fn is_more_urgent_than(self, other: Priority) -> bool {
        self.0 < other.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Priority({})", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Priority {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Priority({})", self.0);
    }
}

/// One machine word with bit `p` set iff priority level `p` has a ready thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityMask(usize);

impl PriorityMask {
    /// Empty priority mask
    pub const EMPTY: Self = Self(0);

    /// Create a new empty priority mask
    pub const fn new() -> Self {
        Self::EMPTY
    }

    /// Set a priority in the mask
    pub fn set(&mut self, priority: Priority) {
        self.0 |= 1usize << priority.0;
    }

    /// Clear a priority in the mask
    pub fn clear(&mut self, priority: Priority) {
        self.0 &= !(1usize << priority.0);
    }

    /// Check if a priority is set in the mask
    pub const fn is_set(&self, priority: Priority) -> bool {
        (self.0 & (1usize << priority.0)) != 0
    }

    /// Check if the mask is empty
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Most urgent level set in the mask
    ///
    /// Single bit scan on the least significant set bit.
    pub fn most_urgent(&self) -> Option<Priority> {
        if self.is_empty() {
            None
        } else {
            Some(Priority(self.0.trailing_zeros() as u8))
        }
    }

    /// Raw bitmap word
    pub const fn bits(&self) -> usize {
        self.0
    }
}

impl Default for PriorityMask {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PriorityMask {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "PriorityMask({=usize:b})", self.0);
    }
}
