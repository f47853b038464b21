//! Message records exchanged between threads

use core::fmt;
use crate::ThreadId;

/// Fixed-size message record
///
/// Copied by value on every delivery path. The kernel stamps `sender` when
/// the message is sent; whatever the caller put there is overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Msg {
    /// Thread that sent the message, or `ThreadId::ISR`
    pub sender: ThreadId,
    /// Application defined type tag
    pub kind: u16,
    /// Inline payload: an integer or a pointer-sized value
    pub content: usize,
}

impl Msg {
    /// Create a message with a type tag and no payload
    pub const fn new(kind: u16) -> Self {
        Self {
            sender: ThreadId(0),
            kind,
            content: 0,
        }
    }

    /// Create a message carrying an integer value
    pub const fn with_value(kind: u16, value: u32) -> Self {
        Self {
            sender: ThreadId(0),
            kind,
            content: value as usize,
        }
    }

    /// Create a message carrying a pointer
    ///
    /// The pointee is not copied; sender and receiver agree on its lifetime.
    pub fn with_ptr<T>(kind: u16, ptr: *const T) -> Self {
        Self {
            sender: ThreadId(0),
            kind,
            content: ptr as usize,
        }
    }

    /// Payload interpreted as an integer value
    pub const fn value(&self) -> u32 {
        self.content as u32
    }

    /// Payload interpreted as a pointer
    pub fn ptr<T>(&self) -> *const T {
        self.content as *const T
    }
}

impl fmt::Display for Msg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Msg(from {}, type {:#06x}, {:#x})", self.sender, self.kind, self.content)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Msg {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "Msg{{ sender: {}, kind: {=u16:#x}, content: {=usize:#x} }}",
            self.sender,
            self.kind,
            self.content
        );
    }
}
