//! Architecture port interface
//!
//! The kernel decides which thread runs; a port performs the register-level
//! work. A port implementation typically owns a `'static` reference to the
//! [`Kernel`](crate::Kernel) so that its yield trap and interrupt epilogue can
//! call [`Kernel::save_context`](crate::Kernel::save_context) and
//! [`Kernel::schedule`](crate::Kernel::schedule).
//!
//! Interrupt masking is not part of this trait: the kernel takes its critical
//! sections through the `critical-section` crate, whose implementation the
//! target provides.

use rtk_core::StackPointer;

use crate::sched::Switch;

/// Thread entry point, called with the `arg` given at creation
///
/// When the entry returns, the port must route the thread into
/// [`Kernel::exit`](crate::Kernel::exit).
pub type ThreadEntry = fn(usize);

/// Context provider and execution-context predicate
pub trait Port {
    /// Build the initial register image for a new thread inside `stack`
    ///
    /// `stack` is word aligned. Returns the stack pointer the first switch
    /// into the thread must load.
    fn build_initial_context(&self, entry: ThreadEntry, arg: usize, stack: &mut [u8]) -> StackPointer;

    /// Trigger the architecture yield (e.g. pend a software trap)
    ///
    /// The trap handler saves the current context, calls `schedule` and
    /// restores the context of the thread it returns.
    fn yield_higher(&self);

    /// Load the context of `switch.next` without saving the current one
    ///
    /// The kernel has already made the scheduling decision. Used when the
    /// running thread exits and once at kernel start.
    fn switch_on_exit(&self, switch: Switch) -> !;

    /// True while executing an interrupt handler
    fn in_isr(&self) -> bool;

    /// Called repeatedly while no thread is ready to run
    fn idle(&self) {
        core::hint::spin_loop();
    }
}
