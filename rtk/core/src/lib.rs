#![no_std]
#![forbid(unsafe_code)]

//! # rtk core
//!
//! Value types shared by the rtk kernel: thread identifiers, priorities and
//! the ready bitmap, the thread state machine values, message records, the
//! circular index buffer used by mailboxes, and the kernel error type.
//!
//! Nothing in this crate touches global state; the kernel crate owns all
//! mutable scheduler state behind a critical section.

use core::fmt;

pub mod cib;
pub mod config;
pub mod msg;
pub mod priorities;
pub mod thread;

pub use cib::*;
pub use msg::*;
pub use priorities::*;
pub use thread::*;

/// rtk version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type used throughout the kernel
pub type KResult<T> = Result<T, Error>;

/// Error types for kernel operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Priority is outside `[0, PRIORITY_LEVELS)`
    InvalidPriority,
    /// Every thread table slot is in use
    TableExhausted,
    /// Stack region is too small to hold a thread after alignment
    StackTooSmall,
    /// Target identifier does not name a live thread
    InvalidTarget,
    /// Sender and target are the same thread
    SelfSend,
    /// Reply issued against a thread that is not waiting for one
    NotWaitingForReply,
    /// Non-blocking operation could not complete right now
    NotReady,
    /// Mailbox capacity is not a power of two
    InvalidCapacity,
    /// Thread is not in the state the operation expects
    NotFound,
    /// Operation needs a calling thread but runs in interrupt context
    InvalidContext,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidPriority => write!(f, "Invalid priority level"),
            Error::TableExhausted => write!(f, "Thread table exhausted"),
            Error::StackTooSmall => write!(f, "Stack too small"),
            Error::InvalidTarget => write!(f, "Invalid target thread"),
            Error::SelfSend => write!(f, "Thread cannot send to itself"),
            Error::NotWaitingForReply => write!(f, "Thread is not waiting for a reply"),
            Error::NotReady => write!(f, "Operation would block"),
            Error::InvalidCapacity => write!(f, "Mailbox capacity must be a power of two"),
            Error::NotFound => write!(f, "Thread not found in expected state"),
            Error::InvalidContext => write!(f, "Operation not allowed in interrupt context"),
        }
    }
}

#[cfg(feature = "std")]
extern crate std;

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Error::InvalidPriority => defmt::write!(fmt, "InvalidPriority"),
            Error::TableExhausted => defmt::write!(fmt, "TableExhausted"),
            Error::StackTooSmall => defmt::write!(fmt, "StackTooSmall"),
            Error::InvalidTarget => defmt::write!(fmt, "InvalidTarget"),
            Error::SelfSend => defmt::write!(fmt, "SelfSend"),
            Error::NotWaitingForReply => defmt::write!(fmt, "NotWaitingForReply"),
            Error::NotReady => defmt::write!(fmt, "NotReady"),
            Error::InvalidCapacity => defmt::write!(fmt, "InvalidCapacity"),
            Error::NotFound => defmt::write!(fmt, "NotFound"),
            Error::InvalidContext => defmt::write!(fmt, "InvalidContext"),
        }
    }
}
