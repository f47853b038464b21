#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]

//! # rtk kernel
//!
//! Preemptive, fixed-priority scheduler with round robin among equal
//! priorities and synchronous message passing between threads.
//!
//! Key features:
//! - O(1) ready-level lookup through a priority bitmap
//! - Circular per-level run queues; a preempted or yielding thread goes to
//!   the back of its level
//! - Blocking send, receive and send-receive-reply rendezvous
//! - Optional per-thread power-of-two mailboxes
//! - Interrupt-safe non-blocking send with deferred rescheduling
//!
//! The kernel never touches registers; a [`Port`] builds initial contexts
//! and performs the actual switch. All kernel state is guarded by one
//! `critical_section::Mutex`.
//!
//! ```ignore
//! static KERNEL: Kernel<'static, MyPort> = ...;
//!
//! fn server(_: usize) {
//!     loop {
//!         let request = nb::block!(KERNEL.receive()).unwrap();
//!         KERNEL.reply(&request, Msg::with_value(REPLY, request.value() + 1)).unwrap();
//!     }
//! }
//! ```

mod msg;
pub mod port;
pub mod runqueue;
mod sched;
mod tcb;
mod thread;

#[cfg(test)]
mod tests;

pub use port::{Port, ThreadEntry};
pub use runqueue::RunQueue;
pub use sched::{Kernel, Switch};
pub use thread::{CreateError, ThreadInfo};

pub use rtk_core::{
    config, CreateFlags, Error, KResult, Msg, Priority, StackPointer, ThreadId, ThreadStatus,
};
