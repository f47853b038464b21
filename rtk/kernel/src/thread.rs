//! Thread lifecycle: creation, exit, sleep and wakeup, boot

use core::fmt;

use log::{debug, info};
use rtk_core::config::{PRIORITY_IDLE, PRIORITY_MAIN, WORD_SIZE};
use rtk_core::{CreateFlags, Error, KResult, Priority, ThreadId, ThreadStatus};

use crate::port::{Port, ThreadEntry};
use crate::sched::Kernel;
use crate::tcb::{stack, Tcb};

/// Snapshot of one thread for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub name: &'static str,
    pub priority: Priority,
    pub status: ThreadStatus,
    /// Lowest address of the usable stack region
    pub stack_base: usize,
    /// Usable stack size in bytes after alignment
    pub stack_size: usize,
    /// Untouched bytes at the low end of a painted stack
    pub stack_free: usize,
    /// Messages queued in the mailbox, if the thread has one
    pub queued: Option<usize>,
    /// Senders blocked on this thread
    pub waiters: usize,
}

#[cfg(feature = "defmt")]
impl defmt::Format for ThreadInfo {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "{} {=str} {} {} stack {=usize}/{=usize} free",
            self.id,
            self.name,
            self.priority,
            self.status,
            self.stack_free,
            self.stack_size
        );
    }
}

/// Failed [`Kernel::create`], handing the stack region back to the caller
#[derive(Debug)]
pub struct CreateError<'s> {
    pub error: Error,
    /// Region passed to `create`, word aligned if the failure came after
    /// alignment
    pub stack: &'s mut [u8],
}

impl<'s> CreateError<'s> {
    fn new(error: Error, stack: &'s mut [u8]) -> Self {
        Self { error, stack }
    }
}

impl fmt::Display for CreateError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} byte stack returned)", self.error, self.stack.len())
    }
}

impl From<CreateError<'_>> for Error {
    fn from(err: CreateError<'_>) -> Self {
        err.error
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for CreateError<'_> {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{} ({=usize} byte stack returned)", self.error, self.stack.len());
    }
}

impl<'s, P: Port> Kernel<'s, P> {
    /// Create a thread on a caller-provided stack region
    ///
    /// The region is trimmed to word alignment. With `STACKTEST` every word
    /// is painted for later measurement; otherwise only the guard word at
    /// the low end is written. The new thread takes the lowest free id and
    /// starts `Sleeping` if asked to, `Pending` otherwise. Unless
    /// `WITHOUT_YIELD` is given, the caller yields when the new thread
    /// preempts it.
    ///
    /// On failure nothing is registered and the region comes back in the
    /// [`CreateError`].
    pub fn create(
        &self,
        stack: &'s mut [u8],
        priority: u8,
        flags: CreateFlags,
        entry: ThreadEntry,
        arg: usize,
        name: &'static str,
    ) -> Result<ThreadId, CreateError<'s>> {
        let priority = match Priority::new(priority) {
            Ok(priority) => priority,
            Err(error) => return Err(CreateError::new(error, stack)),
        };
        if stack::align(stack).len() < 2 * WORD_SIZE {
            return Err(CreateError::new(Error::StackTooSmall, stack));
        }
        let stack = stack::align(stack);
        if flags.contains(CreateFlags::STACKTEST) {
            stack::paint(stack);
        } else {
            stack::write_guard(stack);
        }

        let (id, preempts) =
            self.with_state(|state| -> Result<(ThreadId, bool), CreateError<'s>> {
                let Some(id) = state.threads.free_id() else {
                    return Err(CreateError::new(Error::TableExhausted, stack));
                };
                let stack_pointer = self.port.build_initial_context(entry, arg, stack);
                state
                    .threads
                    .insert(Tcb::new(id, priority, name, stack, stack_pointer));

                if flags.contains(CreateFlags::SLEEPING) {
                    state.set_status(id, ThreadStatus::Sleeping);
                    Ok((id, false))
                } else {
                    state.set_status(id, ThreadStatus::Pending);
                    let preempts =
                        !flags.contains(CreateFlags::WITHOUT_YIELD) && state.preempts(priority);
                    Ok((id, preempts))
                }
            })?;

        debug!("thread {} '{}' created at {}", id, name, priority);
        self.reschedule(preempts);
        Ok(id)
    }

    /// Terminate the calling thread
    ///
    /// Frees its table slot, unlinks it and switches to the next scheduled
    /// thread without saving its context. The stack region becomes available
    /// via [`reclaim_stack`](Self::reclaim_stack).
    pub fn exit(&self) -> ! {
        self.retire_active();
        let switch = self.schedule();
        self.port.switch_on_exit(switch)
    }

    pub(crate) fn retire_active(&self) -> Option<ThreadId> {
        let id = self.with_state(|state| {
            let id = state.active.take()?;
            state.set_status(id, ThreadStatus::Stopped);
            if let Some(tcb) = state.threads.remove(id) {
                state.release_stack(tcb.stack);
            }
            Some(id)
        })?;
        debug!("thread {} exited", id);
        Some(id)
    }

    /// Take back the stack region of an exited thread, oldest exit first
    ///
    /// Up to `MAX_THREADS` regions are held; beyond that the oldest one is
    /// dropped with a warning.
    pub fn reclaim_stack(&self) -> Option<&'s mut [u8]> {
        self.with_state(|state| state.released.pop_front())
    }

    /// Put the calling thread to sleep until [`wakeup`](Self::wakeup)
    ///
    /// Has no effect in interrupt context.
    pub fn sleep(&self) {
        if self.port.in_isr() {
            return;
        }
        let slept = self.with_state(|state| match state.active {
            Some(id) => {
                state.set_status(id, ThreadStatus::Sleeping);
                true
            }
            None => false,
        });
        if slept {
            self.port.yield_higher();
        }
    }

    /// Make a sleeping thread `Pending`
    ///
    /// Fails with `NotFound` if `id` is not a sleeping thread. Reschedules
    /// when the woken thread preempts the active one.
    pub fn wakeup(&self, id: ThreadId) -> KResult<()> {
        let preempts = self.with_state(|state| {
            let priority = match state.threads.get(id) {
                Some(tcb) if tcb.status == ThreadStatus::Sleeping => tcb.priority,
                _ => return Err(Error::NotFound),
            };
            state.set_status(id, ThreadStatus::Pending);
            Ok(state.preempts(priority))
        })?;
        debug!("thread {} woken", id);
        self.reschedule(preempts);
        Ok(())
    }

    /// Status of `id`, or `None` if no such thread exists
    pub fn status(&self, id: ThreadId) -> Option<ThreadStatus> {
        self.with_state(|state| state.threads.get(id).map(|tcb| tcb.status))
    }

    pub fn priority_of(&self, id: ThreadId) -> Option<Priority> {
        self.with_state(|state| state.threads.get(id).map(|tcb| tcb.priority))
    }

    pub fn name(&self, id: ThreadId) -> Option<&'static str> {
        self.with_state(|state| state.threads.get(id).map(|tcb| tcb.name))
    }

    /// Untouched stack bytes of a thread created with `STACKTEST`
    pub fn stack_free(&self, id: ThreadId) -> Option<usize> {
        self.with_state(|state| {
            state
                .threads
                .get(id)
                .map(|tcb| stack::measure_free(tcb.stack))
        })
    }

    /// Number of live threads
    pub fn thread_count(&self) -> usize {
        self.with_state(|state| state.threads.len())
    }

    /// Visit every live thread in id order
    ///
    /// `f` runs inside the critical section; keep it short.
    pub fn for_each_thread(&self, mut f: impl FnMut(&ThreadInfo)) {
        self.with_state(|state| {
            for tcb in state.threads.iter() {
                f(&ThreadInfo {
                    id: tcb.id,
                    name: tcb.name,
                    priority: tcb.priority,
                    status: tcb.status,
                    stack_base: tcb.stack_base(),
                    stack_size: tcb.stack.len(),
                    stack_free: stack::measure_free(tcb.stack),
                    queued: tcb.mailbox.as_ref().map(|mailbox| mailbox.len()),
                    waiters: tcb.waiters.len(),
                });
            }
        });
    }

    /// Create the idle and main threads
    ///
    /// Both are created painted and without yielding; nothing runs until
    /// [`start`](Self::start). Returns `(idle, main)`.
    pub fn boot(
        &self,
        idle_stack: &'s mut [u8],
        idle_entry: ThreadEntry,
        main_stack: &'s mut [u8],
        main_entry: ThreadEntry,
    ) -> Result<(ThreadId, ThreadId), CreateError<'s>> {
        let flags = CreateFlags::WITHOUT_YIELD | CreateFlags::STACKTEST;
        let idle = self.create(idle_stack, PRIORITY_IDLE, flags, idle_entry, 0, "idle")?;
        let main = self.create(main_stack, PRIORITY_MAIN, flags, main_entry, 0, "main")?;
        Ok((idle, main))
    }

    /// Schedule the first thread and switch into it
    pub fn start(&self) -> ! {
        info!("kernel started with {} threads", self.thread_count());
        let switch = self.schedule();
        self.port.switch_on_exit(switch)
    }
}
