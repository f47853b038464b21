//! Synchronous message passing
//!
//! Delivery takes one of three paths, tried in order:
//!
//! 1. the target is receive-blocked: the message is handed over directly and
//!    the target becomes `Pending`;
//! 2. the target's mailbox has room: the message is queued;
//! 3. otherwise the sender parks its message, joins the target's waiter list
//!    and blocks (or the call fails with `NotReady` when it may not block).
//!
//! Blocking calls return [`nb::Result`]. `WouldBlock` means the calling
//! thread has been blocked and a switch requested; calling again once the
//! thread runs collects the outcome. On target wrap the call in
//! `nb::block!`.

use log::{trace, warn};
use rtk_core::{Error, KResult, Msg, Priority, ThreadId, ThreadStatus};

use crate::port::Port;
use crate::sched::{Kernel, State};
use crate::tcb::{Mailbox, WaitData};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Suspend {
    Allowed,
    Forbidden,
}

enum Delivery {
    /// Handed to a receive-blocked target running at the given priority
    Handoff(Priority),
    Queued,
    Parked,
}

enum Resume {
    Fresh,
    Waiting,
    Done(Option<Msg>),
    /// A delivered message is pending that this call does not return
    Unclaimed,
}

/// Collect the outcome of an earlier blocking call
///
/// A pending message is only consumed by calls that return one
/// (`takes_msg`); otherwise it stays in place.
fn resume(state: &mut State<'_>, me: ThreadId, takes_msg: bool) -> Resume {
    let Some(tcb) = state.threads.get_mut(me) else {
        return Resume::Fresh;
    };
    match tcb.wait {
        WaitData::Empty => Resume::Fresh,
        WaitData::Complete(Some(_)) if !takes_msg => Resume::Unclaimed,
        WaitData::Complete(outcome) => {
            tcb.wait = WaitData::Empty;
            Resume::Done(outcome)
        }
        _ => Resume::Waiting,
    }
}

fn deliver(
    state: &mut State<'_>,
    caller: Option<ThreadId>,
    target: ThreadId,
    mut msg: Msg,
    suspend: Suspend,
) -> KResult<Delivery> {
    if caller == Some(target) {
        return Err(Error::SelfSend);
    }
    msg.sender = caller.unwrap_or(ThreadId::ISR);

    let tcb = state.threads.get_mut(target).ok_or(Error::InvalidTarget)?;
    if tcb.status == ThreadStatus::ReceiveBlocked {
        tcb.wait = WaitData::Complete(Some(msg));
        let priority = tcb.priority;
        state.set_status(target, ThreadStatus::Pending);
        trace!("msg: {} handed to {}", msg, target);
        return Ok(Delivery::Handoff(priority));
    }
    if let Some(mailbox) = tcb.mailbox.as_mut() {
        if mailbox.push(msg).is_ok() {
            trace!("msg: {} queued for {}", msg, target);
            return Ok(Delivery::Queued);
        }
    }

    let me = match (caller, suspend) {
        (Some(me), Suspend::Allowed) => me,
        _ => return Err(Error::NotReady),
    };
    let (priority, status) = state
        .threads
        .get(me)
        .map(|tcb| (tcb.priority, tcb.status))
        .ok_or(Error::InvalidContext)?;
    if let Some(tcb) = state.threads.get_mut(target) {
        tcb.waiters.insert(me, priority);
    }
    if let Some(tcb) = state.threads.get_mut(me) {
        tcb.wait = WaitData::Send(msg);
    }
    // A send_receive caller stays reply-blocked while parked
    if status != ThreadStatus::ReplyBlocked {
        state.set_status(me, ThreadStatus::SendBlocked);
    }
    trace!("msg: {} blocked sending to {}", me, target);
    Ok(Delivery::Parked)
}

/// Take the parked message of a waiting sender and release it
///
/// A plain sender becomes `Pending`; a `send_receive` sender keeps waiting
/// for the reply. Returns the priority of the thread made ready, if any.
fn release_sender(state: &mut State<'_>, sender: ThreadId) -> Option<(Msg, Option<Priority>)> {
    let tcb = state.threads.get_mut(sender)?;
    let WaitData::Send(msg) = tcb.wait else {
        return None;
    };
    if tcb.status == ThreadStatus::ReplyBlocked {
        tcb.wait = WaitData::Reply;
        return Some((msg, None));
    }
    tcb.wait = WaitData::Complete(None);
    let priority = tcb.priority;
    state.set_status(sender, ThreadStatus::Pending);
    Some((msg, Some(priority)))
}

fn next_parked(state: &mut State<'_>, me: ThreadId) -> Option<(Msg, Option<Priority>)> {
    loop {
        let sender = state.threads.get_mut(me)?.waiters.pop_front()?;
        if let Some(parked) = release_sender(state, sender) {
            return Some(parked);
        }
    }
}

fn take_message(
    state: &mut State<'_>,
    me: ThreadId,
    suspend: Suspend,
) -> (nb::Result<Msg, Error>, bool) {
    let queued = state
        .threads
        .get_mut(me)
        .and_then(|tcb| tcb.mailbox.as_mut())
        .and_then(|mailbox| mailbox.pop());

    match (queued, next_parked(state, me)) {
        (Some(first), Some((parked, woken))) => {
            // the waiter's message takes the slot just vacated
            let accepted = state
                .threads
                .get_mut(me)
                .and_then(|tcb| tcb.mailbox.as_mut())
                .is_some_and(|mailbox| mailbox.push(parked).is_ok());
            debug_assert!(accepted);
            let preempts = woken.is_some_and(|priority| state.preempts(priority));
            (Ok(first), preempts)
        }
        (None, Some((parked, woken))) => {
            let preempts = woken.is_some_and(|priority| state.preempts(priority));
            (Ok(parked), preempts)
        }
        (Some(first), None) => (Ok(first), false),
        (None, None) if suspend == Suspend::Forbidden => (Err(Error::NotReady.into()), false),
        (None, None) => {
            if let Some(tcb) = state.threads.get_mut(me) {
                tcb.wait = WaitData::Receive;
            }
            state.set_status(me, ThreadStatus::ReceiveBlocked);
            trace!("msg: {} blocked receiving", me);
            (Err(nb::Error::WouldBlock), true)
        }
    }
}

impl<'s, P: Port> Kernel<'s, P> {
    /// Give the calling thread a mailbox backed by `slots`
    ///
    /// `slots.len()` must be a non-zero power of two. Replaces any previous
    /// mailbox.
    pub fn init_mailbox(&self, slots: &'s mut [Msg]) -> KResult<()> {
        if self.port.in_isr() {
            return Err(Error::InvalidContext);
        }
        let mailbox = Mailbox::new(slots)?;
        self.with_state(|state| -> KResult<()> {
            let tcb = state
                .active
                .and_then(|id| state.threads.get_mut(id))
                .ok_or(Error::InvalidContext)?;
            tcb.mailbox = Some(mailbox);
            Ok(())
        })
    }

    /// Send `msg` to `target`, blocking while it can be neither handed over
    /// nor queued
    ///
    /// In interrupt context this never blocks and behaves like
    /// [`try_send`](Self::try_send). Fails with `NotReady` while a message
    /// handed over to an earlier `receive` has not been collected.
    pub fn send(&self, target: ThreadId, msg: Msg) -> nb::Result<(), Error> {
        if self.port.in_isr() {
            return self.try_send(target, msg).map_err(nb::Error::Other);
        }
        let (result, switch) = self.with_state(|state| -> (nb::Result<(), Error>, bool) {
            let Some(me) = state.active else {
                return (Err(Error::InvalidContext.into()), false);
            };
            match resume(state, me, false) {
                Resume::Done(None) => return (Ok(()), false),
                Resume::Waiting => return (Err(nb::Error::WouldBlock), true),
                Resume::Unclaimed => {
                    warn!("msg: {} sends with a received message uncollected", me);
                    return (Err(Error::NotReady.into()), false);
                }
                _ => {}
            }
            match deliver(state, Some(me), target, msg, Suspend::Allowed) {
                Ok(Delivery::Handoff(priority)) => (Ok(()), state.preempts(priority)),
                Ok(Delivery::Queued) => (Ok(()), false),
                Ok(Delivery::Parked) => (Err(nb::Error::WouldBlock), true),
                Err(e) => (Err(e.into()), false),
            }
        });
        self.reschedule(switch);
        result
    }

    /// Send without blocking
    ///
    /// Fails with `NotReady` if `target` is not receive-blocked and its
    /// mailbox is missing or full. Safe to call from interrupt context, where
    /// the sender is stamped as [`ThreadId::ISR`].
    pub fn try_send(&self, target: ThreadId, msg: Msg) -> KResult<()> {
        let in_isr = self.port.in_isr();
        let preempts = self.with_state(|state| -> KResult<bool> {
            let caller = if in_isr {
                None
            } else {
                Some(state.active.ok_or(Error::InvalidContext)?)
            };
            match deliver(state, caller, target, msg, Suspend::Forbidden)? {
                Delivery::Handoff(priority) => Ok(state.preempts(priority)),
                Delivery::Queued | Delivery::Parked => Ok(false),
            }
        })?;
        self.reschedule(preempts);
        Ok(())
    }

    /// Send `msg` and wait for the reply
    ///
    /// The caller becomes reply-blocked before delivery. It stays blocked
    /// while its message sits in the target's mailbox or waiter list, and
    /// resumes only once the target calls [`reply`](Self::reply).
    pub fn send_receive(&self, target: ThreadId, msg: Msg) -> nb::Result<Msg, Error> {
        if self.port.in_isr() {
            return Err(Error::InvalidContext.into());
        }
        let result = self.with_state(|state| -> nb::Result<Msg, Error> {
            let me = state.active.ok_or(Error::InvalidContext)?;
            match resume(state, me, true) {
                Resume::Done(Some(reply)) => return Ok(reply),
                Resume::Waiting => return Err(nb::Error::WouldBlock),
                _ => {}
            }
            if target == me {
                return Err(Error::SelfSend.into());
            }
            if !state.threads.contains(target) {
                return Err(Error::InvalidTarget.into());
            }

            state.set_status(me, ThreadStatus::ReplyBlocked);
            if let Some(tcb) = state.threads.get_mut(me) {
                tcb.wait = WaitData::Reply;
            }
            deliver(state, Some(me), target, msg, Suspend::Allowed)?;
            Err(nb::Error::WouldBlock)
        });
        if matches!(result, Err(nb::Error::WouldBlock)) {
            self.port.yield_higher();
        }
        result
    }

    /// Receive the next message, blocking while none is available
    ///
    /// Mailbox messages come first, in FIFO order. A waiting sender's message
    /// then moves into the freed mailbox slot, or is returned directly when
    /// the mailbox was empty.
    pub fn receive(&self) -> nb::Result<Msg, Error> {
        self.receive_inner(Suspend::Allowed)
    }

    /// Receive without blocking; `NotReady` when nothing is available
    pub fn try_receive(&self) -> KResult<Msg> {
        self.receive_inner(Suspend::Forbidden).map_err(|e| match e {
            nb::Error::Other(e) => e,
            nb::Error::WouldBlock => Error::NotReady,
        })
    }

    fn receive_inner(&self, suspend: Suspend) -> nb::Result<Msg, Error> {
        if self.port.in_isr() {
            return Err(Error::InvalidContext.into());
        }
        let (result, switch) = self.with_state(|state| -> (nb::Result<Msg, Error>, bool) {
            let Some(me) = state.active else {
                return (Err(Error::InvalidContext.into()), false);
            };
            if suspend == Suspend::Allowed {
                match resume(state, me, true) {
                    Resume::Done(Some(msg)) => return (Ok(msg), false),
                    Resume::Waiting => return (Err(nb::Error::WouldBlock), true),
                    _ => {}
                }
            }
            take_message(state, me, suspend)
        });
        self.reschedule(switch);
        result
    }

    /// Answer a message received from a `send_receive` caller
    ///
    /// Fails with `InvalidTarget` if the original sender is gone and with
    /// `NotWaitingForReply` if it is not waiting for a reply. Usable from
    /// interrupt context.
    pub fn reply(&self, original: &Msg, reply: Msg) -> KResult<()> {
        let in_isr = self.port.in_isr();
        let target = original.sender;
        let preempts = self.with_state(|state| -> KResult<bool> {
            let replier = match state.active {
                Some(id) if !in_isr => id,
                _ => ThreadId::ISR,
            };
            let tcb = state.threads.get_mut(target).ok_or(Error::InvalidTarget)?;
            if tcb.status != ThreadStatus::ReplyBlocked || tcb.wait != WaitData::Reply {
                return Err(Error::NotWaitingForReply);
            }
            tcb.wait = WaitData::Complete(Some(Msg {
                sender: replier,
                ..reply
            }));
            let priority = tcb.priority;
            state.set_status(target, ThreadStatus::Pending);
            Ok(state.preempts(priority))
        })?;
        trace!("msg: reply delivered to {}", target);
        self.reschedule(preempts);
        Ok(())
    }

    /// Queue `msg` in the calling thread's own mailbox
    ///
    /// Fails with `NotReady` if the mailbox is missing or full.
    pub fn send_to_self(&self, msg: Msg) -> KResult<()> {
        if self.port.in_isr() {
            return Err(Error::InvalidContext);
        }
        self.with_state(|state| -> KResult<()> {
            let me = state.active.ok_or(Error::InvalidContext)?;
            let mailbox = state
                .threads
                .get_mut(me)
                .and_then(|tcb| tcb.mailbox.as_mut())
                .ok_or(Error::NotReady)?;
            mailbox
                .push(Msg { sender: me, ..msg })
                .map_err(|_| Error::NotReady)
        })
    }

    /// Messages queued in the mailbox of `id`
    ///
    /// `None` if the thread does not exist or has no mailbox.
    pub fn mailbox_len(&self, id: ThreadId) -> Option<usize> {
        self.with_state(|state| {
            state
                .threads
                .get(id)
                .and_then(|tcb| tcb.mailbox.as_ref())
                .map(Mailbox::len)
        })
    }

    pub fn mailbox_capacity(&self, id: ThreadId) -> Option<usize> {
        self.with_state(|state| {
            state
                .threads
                .get(id)
                .and_then(|tcb| tcb.mailbox.as_ref())
                .map(Mailbox::capacity)
        })
    }
}
