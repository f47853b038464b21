mod scenarios;

use std::cell::Cell;

use rtk_core::config::WORD_SIZE;
use rtk_core::{CreateFlags, Msg, StackPointer, ThreadId, ThreadStatus};

use crate::port::{Port, ThreadEntry};
use crate::sched::{Kernel, Switch};

/// Port that records switch requests instead of switching
#[derive(Default)]
pub(crate) struct HostPort {
    yields: Cell<usize>,
    isr: Cell<bool>,
}

impl HostPort {
    pub(crate) fn yields(&self) -> usize {
        self.yields.get()
    }

    pub(crate) fn set_isr(&self, isr: bool) {
        self.isr.set(isr);
    }
}

impl Port for HostPort {
    fn build_initial_context(&self, entry: ThreadEntry, arg: usize, stack: &mut [u8]) -> StackPointer {
        let frame = stack.len() - 2 * WORD_SIZE;
        let words = &mut stack[frame..];
        words[..WORD_SIZE].copy_from_slice(&(entry as usize).to_ne_bytes());
        words[WORD_SIZE..].copy_from_slice(&arg.to_ne_bytes());
        StackPointer(words.as_ptr() as usize)
    }

    fn yield_higher(&self) {
        self.yields.set(self.yields.get() + 1);
    }

    fn switch_on_exit(&self, switch: Switch) -> ! {
        panic!("switch_on_exit into {}", switch.next);
    }

    fn in_isr(&self) -> bool {
        self.isr.get()
    }

    fn idle(&self) {
        panic!("no runnable thread");
    }
}

pub(crate) type HostKernel = Kernel<'static, HostPort>;

pub(crate) fn kernel() -> HostKernel {
    Kernel::new(HostPort::default())
}

pub(crate) fn stack() -> &'static mut [u8] {
    Box::leak(vec![0u8; 512].into_boxed_slice())
}

pub(crate) fn slots(capacity: usize) -> &'static mut [Msg] {
    Box::leak(vec![Msg::default(); capacity].into_boxed_slice())
}

pub(crate) fn entry(_arg: usize) {}

/// Create a pending thread without rescheduling
pub(crate) fn spawn(kernel: &HostKernel, priority: u8, name: &'static str) -> ThreadId {
    kernel
        .create(stack(), priority, CreateFlags::WITHOUT_YIELD, entry, 0, name)
        .unwrap()
}

/// Run the scheduler once and return the thread it picked
pub(crate) fn run_next(kernel: &HostKernel) -> ThreadId {
    kernel.schedule().next
}

/// Run the scheduler once and check that it picks `id`
pub(crate) fn expect_next(kernel: &HostKernel, id: ThreadId) {
    assert_eq!(run_next(kernel), id);
    assert_eq!(kernel.status(id), Some(ThreadStatus::Running));
}

/// Every live thread is linked iff it is pending or running, at its own level
pub(crate) fn assert_runqueue_consistent(kernel: &HostKernel) {
    kernel.with_state(|state| {
        for tcb in state.threads.iter() {
            let linked = state.runqueue.iter(tcb.priority).any(|id| id == tcb.id);
            assert_eq!(
                linked,
                tcb.status.is_on_runqueue(),
                "thread {} is {} but linked={}",
                tcb.id,
                tcb.status,
                linked
            );
            assert_eq!(state.runqueue.contains(tcb.id), linked);
        }
    });
}
