//! Thread identifiers, state machine values and creation flags

use core::fmt;
use core::ops::BitOr;
use crate::config::MAX_THREADS;

/// Identifier of a live thread
///
/// Valid identifiers are `1..=MAX_THREADS`. Identifiers are reused only after
/// the owning thread exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ThreadId(pub u8);

impl ThreadId {
    /// First identifier handed out by the thread table
    pub const FIRST: ThreadId = ThreadId(1);

    /// Last identifier handed out by the thread table
    pub const LAST: ThreadId = ThreadId(MAX_THREADS as u8);

    /// Sender id stamped on messages that originate in interrupt context
    pub const ISR: ThreadId = ThreadId(u8::MAX);

    /// Thread table slot for this identifier, if it is a thread id at all
    pub const fn slot(self) -> Option<usize> {
        if self.0 >= Self::FIRST.0 && self.0 <= Self::LAST.0 {
            Some((self.0 - Self::FIRST.0) as usize)
        } else {
            None
        }
    }

    /// Identifier owning the given table slot
    pub const fn from_slot(slot: usize) -> ThreadId {
        ThreadId(slot as u8 + Self::FIRST.0)
    }

    /// Get the raw identifier value
    pub const fn raw(self) -> u8 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::ISR {
            write!(f, "isr")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ThreadId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "ThreadId({})", self.0);
    }
}

/// Thread state machine values
///
/// Variants are ordered; every state from `Pending` on is an on-runqueue
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ThreadStatus {
    /// Thread exited, slot released
    Stopped,
    /// Sleeping until `wakeup`
    Sleeping,
    /// Waiting for a message to arrive
    ReceiveBlocked,
    /// Waiting for the target to accept a message
    SendBlocked,
    /// Waiting for the target to reply
    ReplyBlocked,
    /// Ready, linked on its run queue
    Pending,
    /// Currently executing
    Running,
}

impl ThreadStatus {
    /// True for the states that keep a thread linked on its run queue
    pub const fn is_on_runqueue(self) -> bool {
        matches!(self, ThreadStatus::Pending | ThreadStatus::Running)
    }

    /// Short label used by diagnostics output
    pub const fn as_str(self) -> &'static str {
        match self {
            ThreadStatus::Stopped => "stopped",
            ThreadStatus::Sleeping => "sleeping",
            ThreadStatus::ReceiveBlocked => "bl rx",
            ThreadStatus::SendBlocked => "bl send",
            ThreadStatus::ReplyBlocked => "bl reply",
            ThreadStatus::Pending => "pending",
            ThreadStatus::Running => "running",
        }
    }
}

impl fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ThreadStatus {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{=str}", self.as_str());
    }
}

/// Flags accepted by thread creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CreateFlags(u8);

impl CreateFlags {
    /// No flags: create pending and yield if the new thread preempts
    pub const NONE: CreateFlags = CreateFlags(0);
    /// Create the thread in `Sleeping` state
    pub const SLEEPING: CreateFlags = CreateFlags(1 << 0);
    /// Do not reschedule after creation
    pub const WITHOUT_YIELD: CreateFlags = CreateFlags(1 << 1);
    /// Paint the stack for high-water mark measurement
    pub const STACKTEST: CreateFlags = CreateFlags(1 << 2);

    /// True if every flag in `other` is set
    pub const fn contains(self, other: CreateFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw flag bits
    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for CreateFlags {
    type Output = CreateFlags;

    fn bitor(self, rhs: CreateFlags) -> CreateFlags {
        CreateFlags(self.0 | rhs.0)
    }
}

/// Saved stack pointer of a switched-out thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StackPointer(pub usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_runqueue_class() {
        assert!(ThreadStatus::Pending.is_on_runqueue());
        assert!(ThreadStatus::Running.is_on_runqueue());
        assert!(!ThreadStatus::ReplyBlocked.is_on_runqueue());
        assert!(!ThreadStatus::Stopped.is_on_runqueue());
        assert!(ThreadStatus::Pending > ThreadStatus::ReplyBlocked);
    }

    #[test]
    fn test_slot_mapping() {
        assert_eq!(ThreadId::FIRST.slot(), Some(0));
        assert_eq!(ThreadId::LAST.slot(), Some(MAX_THREADS - 1));
        assert_eq!(ThreadId(0).slot(), None);
        assert_eq!(ThreadId::ISR.slot(), None);
        assert_eq!(ThreadId::from_slot(3), ThreadId(4));
    }

    #[test]
    fn test_create_flags() {
        let flags = CreateFlags::SLEEPING | CreateFlags::STACKTEST;
        assert!(flags.contains(CreateFlags::SLEEPING));
        assert!(flags.contains(CreateFlags::STACKTEST));
        assert!(!flags.contains(CreateFlags::WITHOUT_YIELD));
        assert!(CreateFlags::NONE.contains(CreateFlags::NONE));
    }
}
