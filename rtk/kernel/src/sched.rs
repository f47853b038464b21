//! Scheduler state and the scheduling decision
//!
//! All mutable kernel state lives in one [`State`] behind a
//! `critical_section::Mutex`. Every status change goes through
//! [`State::set_status`], which keeps run-queue membership in step with the
//! thread status: a thread is linked iff its status is `Pending` or `Running`.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;
use heapless::Deque;
use log::{error, trace, warn};
use rtk_core::config::MAX_THREADS;
use rtk_core::{Priority, StackPointer, ThreadId, ThreadStatus};

use crate::port::Port;
use crate::runqueue::RunQueue;
use crate::tcb::ThreadTable;

/// Outcome of a scheduling decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch {
    /// Thread that was active before the decision
    pub previous: Option<ThreadId>,
    /// Thread that runs next
    pub next: ThreadId,
    /// Saved stack pointer of `next`
    pub stack_pointer: StackPointer,
}

impl Switch {
    /// True if the port has to perform a context switch
    pub fn is_switch(&self) -> bool {
        self.previous != Some(self.next)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Switch {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "Switch{{ previous: {}, next: {}, sp: {=usize:#x} }}",
            self.previous,
            self.next,
            self.stack_pointer.0
        );
    }
}

pub(crate) struct State<'s> {
    pub(crate) threads: ThreadTable<'s>,
    pub(crate) runqueue: RunQueue,
    pub(crate) active: Option<ThreadId>,
    /// Stack regions of exited threads, handed back by `reclaim_stack`
    pub(crate) released: Deque<&'s mut [u8], MAX_THREADS>,
}

impl<'s> State<'s> {
    const fn new() -> Self {
        Self {
            threads: ThreadTable::new(),
            runqueue: RunQueue::new(),
            active: None,
            released: Deque::new(),
        }
    }

    /// Single choke point for thread status changes
    pub(crate) fn set_status(&mut self, id: ThreadId, status: ThreadStatus) {
        let Some(tcb) = self.threads.get_mut(id) else {
            return;
        };
        match (tcb.status.is_on_runqueue(), status.is_on_runqueue()) {
            (false, true) => self.runqueue.enqueue(id, tcb.priority),
            (true, false) => self.runqueue.dequeue(id, tcb.priority),
            _ => {}
        }
        tcb.status = status;
    }

    /// Park the stack of an exited thread for `reclaim_stack`
    ///
    /// A full list drops its oldest region to make room.
    pub(crate) fn release_stack(&mut self, stack: &'s mut [u8]) {
        if self.released.is_full() {
            if let Some(oldest) = self.released.pop_front() {
                warn!(
                    "released stacks full, dropping {} byte region at {:#x}",
                    oldest.len(),
                    oldest.as_ptr() as usize
                );
            }
        }
        if let Err(stack) = self.released.push_back(stack) {
            warn!("dropping {} byte stack region", stack.len());
        }
    }

    /// Check if a thread at `priority` should take the CPU from the active one
    ///
    /// True when the active thread is no longer on a run queue, or when
    /// `priority` is strictly more urgent than the active thread's.
    pub(crate) fn preempts(&self, priority: Priority) -> bool {
        match self.active.and_then(|id| self.threads.get(id)) {
            Some(active) => {
                !active.status.is_on_runqueue() || priority.is_more_urgent_than(active.priority)
            }
            None => true,
        }
    }

    fn run(&mut self) -> Option<Switch> {
        let previous = self.active;
        if let Some(id) = previous {
            if let Some(tcb) = self.threads.get(id) {
                if !tcb.stack_guard_intact() {
                    warn!("thread {} '{}' overflowed its stack", id, tcb.name);
                }
                if tcb.status == ThreadStatus::Running {
                    let priority = tcb.priority;
                    self.set_status(id, ThreadStatus::Pending);
                    self.runqueue.requeue(id, priority);
                }
            }
        }

        let next = self.runqueue.pick_highest_ready()?;
        self.set_status(next, ThreadStatus::Running);
        self.active = Some(next);

        let stack_pointer = self
            .threads
            .get(next)
            .map(|tcb| tcb.stack_pointer)
            .unwrap_or_default();
        if previous != Some(next) {
            trace!("schedule: {:?} -> {}", previous.map(ThreadId::raw), next);
        }
        Some(Switch {
            previous,
            next,
            stack_pointer,
        })
    }
}

/// Kernel instance: thread table, run queues and the port it drives
///
/// `'s` is the lifetime of the stack and mailbox regions handed to the
/// kernel; on target these are `'static` buffers.
pub struct Kernel<'s, P: Port> {
    pub(crate) port: P,
    pub(crate) state: Mutex<RefCell<State<'s>>>,
    switch_request: AtomicBool,
}

impl<'s, P: Port> Kernel<'s, P> {
    /// Create a kernel with an empty thread table
    pub const fn new(port: P) -> Self {
        Self {
            port,
            state: Mutex::new(RefCell::new(State::new())),
            switch_request: AtomicBool::new(false),
        }
    }

    /// Port this kernel drives
    pub fn port(&self) -> &P {
        &self.port
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut State<'s>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.state.borrow_ref_mut(cs)))
    }

    /// Request a context switch when `needed`
    ///
    /// In interrupt context the request is deferred to the interrupt exit;
    /// in thread context the port yields immediately.
    pub(crate) fn reschedule(&self, needed: bool) {
        if !needed {
            return;
        }
        if self.port.in_isr() {
            self.switch_request.store(true, Ordering::Release);
        } else {
            self.port.yield_higher();
        }
    }

    /// Yield to the most urgent ready thread
    ///
    /// The caller goes to the back of its level, so equal-priority peers get
    /// their turn.
    pub fn yield_now(&self) {
        self.reschedule(true);
    }

    /// Consume the deferred switch request set from interrupt context
    ///
    /// The port calls this on interrupt exit and yields if it returns true.
    pub fn take_switch_request(&self) -> bool {
        self.switch_request.swap(false, Ordering::AcqRel)
    }

    /// Record the stack pointer of the active thread before a switch
    pub fn save_context(&self, stack_pointer: StackPointer) {
        self.with_state(|state| {
            if let Some(tcb) = state.active.and_then(|id| state.threads.get_mut(id)) {
                tcb.stack_pointer = stack_pointer;
            }
        });
    }

    /// Select the next thread to run
    ///
    /// Checks the stack guard of the active thread and, if it is still
    /// `Running`, demotes it to `Pending` at the back of its level. Then
    /// picks the head of the most urgent level. Spins on [`Port::idle`] if no thread is ready, which is a
    /// fatal condition since the idle thread should always be.
    pub fn schedule(&self) -> Switch {
        let mut reported = false;
        loop {
            if let Some(switch) = self.with_state(State::run) {
                self.switch_request.store(false, Ordering::Release);
                return switch;
            }
            if !reported {
                error!("schedule: no runnable thread");
                reported = true;
            }
            self.port.idle();
        }
    }

    /// Identifier of the active thread
    pub fn active_id(&self) -> Option<ThreadId> {
        self.with_state(|state| state.active)
    }
}
