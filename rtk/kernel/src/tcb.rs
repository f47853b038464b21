//! Thread control blocks and the thread table

use heapless::Vec;
use rtk_core::config::{MAX_THREADS, WORD_SIZE};
use rtk_core::{Cib, KResult, Msg, Priority, StackPointer, ThreadId, ThreadStatus};

/// Per-thread rendezvous slot
///
/// Blocking operations record what they wait for here; the thread that
/// unblocks them leaves the outcome as `Complete`, which the blocked thread
/// collects when it resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitData {
    Empty,
    Receive,
    /// Parked outgoing message of a send-blocked (or reply-blocked) sender
    Send(Msg),
    Reply,
    /// Received message or reply; `None` when a parked send was accepted
    Complete(Option<Msg>),
}

/// Bounded FIFO of queued messages owned by one thread
pub(crate) struct Mailbox<'s> {
    cib: Cib,
    slots: &'s mut [Msg],
}

impl<'s> Mailbox<'s> {
    pub(crate) fn new(slots: &'s mut [Msg]) -> KResult<Self> {
        Ok(Self {
            cib: Cib::new(slots.len())?,
            slots,
        })
    }

    pub(crate) fn push(&mut self, msg: Msg) -> Result<(), Msg> {
        match self.cib.put() {
            Some(index) => {
                self.slots[index] = msg;
                Ok(())
            }
            None => Err(msg),
        }
    }

    pub(crate) fn pop(&mut self) -> Option<Msg> {
        self.cib.get().map(|index| self.slots[index])
    }

    pub(crate) fn len(&self) -> usize {
        self.cib.avail()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.cib.capacity()
    }
}

/// Senders waiting on a thread, most urgent first, FIFO within a level
#[derive(Debug, Default)]
pub(crate) struct Waiters(Vec<(Priority, ThreadId), MAX_THREADS>);

impl Waiters {
    pub(crate) fn insert(&mut self, id: ThreadId, priority: Priority) {
        let at = self
            .0
            .iter()
            .position(|(queued, _)| priority.is_more_urgent_than(*queued))
            .unwrap_or(self.0.len());
        if self.0.push((priority, id)).is_ok() {
            self.0[at..].rotate_right(1);
        }
    }

    pub(crate) fn pop_front(&mut self) -> Option<ThreadId> {
        if self.0.is_empty() {
            return None;
        }
        self.0.rotate_left(1);
        self.0.pop().map(|(_, id)| id)
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.0.iter().map(|(_, id)| *id)
    }
}

/// Thread control block
pub(crate) struct Tcb<'s> {
    pub(crate) id: ThreadId,
    pub(crate) priority: Priority,
    pub(crate) status: ThreadStatus,
    pub(crate) stack_pointer: StackPointer,
    /// Word aligned stack region; the lowest word is the guard word
    pub(crate) stack: &'s mut [u8],
    pub(crate) mailbox: Option<Mailbox<'s>>,
    pub(crate) wait: WaitData,
    pub(crate) waiters: Waiters,
    pub(crate) name: &'static str,
}

impl<'s> Tcb<'s> {
    pub(crate) fn new(
        id: ThreadId,
        priority: Priority,
        name: &'static str,
        stack: &'s mut [u8],
        stack_pointer: StackPointer,
    ) -> Self {
        Self {
            id,
            priority,
            status: ThreadStatus::Stopped,
            stack_pointer,
            stack,
            mailbox: None,
            wait: WaitData::Empty,
            waiters: Waiters::default(),
            name,
        }
    }

    pub(crate) fn stack_base(&self) -> usize {
        self.stack.as_ptr() as usize
    }

    pub(crate) fn stack_guard_intact(&self) -> bool {
        stack::guard_intact(self.stack)
    }
}

/// Fixed table of thread slots; slot `n` holds thread id `n + 1`
pub(crate) struct ThreadTable<'s> {
    slots: [Option<Tcb<'s>>; MAX_THREADS],
}

impl<'s> ThreadTable<'s> {
    const EMPTY: Option<Tcb<'s>> = None;

    pub(crate) const fn new() -> Self {
        Self {
            slots: [Self::EMPTY; MAX_THREADS],
        }
    }

    pub(crate) fn get(&self, id: ThreadId) -> Option<&Tcb<'s>> {
        self.slots.get(id.slot()?)?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: ThreadId) -> Option<&mut Tcb<'s>> {
        self.slots.get_mut(id.slot()?)?.as_mut()
    }

    pub(crate) fn contains(&self, id: ThreadId) -> bool {
        self.get(id).is_some()
    }

    /// Lowest free identifier
    pub(crate) fn free_id(&self) -> Option<ThreadId> {
        self.slots
            .iter()
            .position(Option::is_none)
            .map(ThreadId::from_slot)
    }

    pub(crate) fn insert(&mut self, tcb: Tcb<'s>) {
        if let Some(slot) = tcb.id.slot() {
            self.slots[slot] = Some(tcb);
        }
    }

    pub(crate) fn remove(&mut self, id: ThreadId) -> Option<Tcb<'s>> {
        self.slots.get_mut(id.slot()?)?.take()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Tcb<'s>> {
        self.slots.iter().flatten()
    }

    pub(crate) fn len(&self) -> usize {
        self.iter().count()
    }
}

/// Stack region preparation and high-water measurement
///
/// A word "matches" when it holds its own address. Painting writes that
/// pattern over the whole region; the guard is the same pattern in the
/// lowest word only.
pub(crate) mod stack {
    use super::WORD_SIZE;

    fn read_word(chunk: &[u8]) -> usize {
        let mut bytes = [0u8; WORD_SIZE];
        bytes.copy_from_slice(chunk);
        usize::from_ne_bytes(bytes)
    }

    fn mark_word(chunk: &mut [u8]) {
        let address = chunk.as_ptr() as usize;
        chunk.copy_from_slice(&address.to_ne_bytes());
    }

    fn word_matches(chunk: &[u8]) -> bool {
        read_word(chunk) == chunk.as_ptr() as usize
    }

    /// Trim `stack` to a word aligned start and a whole number of words
    pub(crate) fn align(stack: &mut [u8]) -> &mut [u8] {
        let offset = stack.as_ptr().align_offset(WORD_SIZE).min(stack.len());
        let (_, rest) = stack.split_at_mut(offset);
        let usable = rest.len() - rest.len() % WORD_SIZE;
        let (aligned, _) = rest.split_at_mut(usable);
        aligned
    }

    pub(crate) fn paint(stack: &mut [u8]) {
        stack.chunks_exact_mut(WORD_SIZE).for_each(mark_word);
    }

    pub(crate) fn write_guard(stack: &mut [u8]) {
        if let Some(chunk) = stack.chunks_exact_mut(WORD_SIZE).next() {
            mark_word(chunk);
        }
    }

    pub(crate) fn guard_intact(stack: &[u8]) -> bool {
        stack.chunks_exact(WORD_SIZE).next().is_some_and(word_matches)
    }

    /// Bytes from the low end that still carry the paint pattern
    pub(crate) fn measure_free(stack: &[u8]) -> usize {
        stack
            .chunks_exact(WORD_SIZE)
            .take_while(|chunk| word_matches(chunk))
            .count()
            * WORD_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec;

    #[test]
    fn test_mailbox_fifo() {
        let mut slots = [Msg::default(); 2];
        let mut mailbox = Mailbox::new(&mut slots).unwrap();
        assert_eq!(mailbox.capacity(), 2);

        assert!(mailbox.push(Msg::with_value(1, 10)).is_ok());
        assert!(mailbox.push(Msg::with_value(1, 20)).is_ok());
        assert_eq!(mailbox.push(Msg::with_value(1, 30)), Err(Msg::with_value(1, 30)));
        assert_eq!(mailbox.len(), 2);

        assert_eq!(mailbox.pop().map(|m| m.value()), Some(10));
        assert_eq!(mailbox.pop().map(|m| m.value()), Some(20));
        assert_eq!(mailbox.pop(), None);
    }

    #[test]
    fn test_waiters_priority_then_fifo() {
        let p = |raw| Priority::new(raw).unwrap();
        let mut waiters = Waiters::default();
        waiters.insert(ThreadId(1), p(5));
        waiters.insert(ThreadId(2), p(3));
        waiters.insert(ThreadId(3), p(5));
        waiters.insert(ThreadId(4), p(3));
        waiters.insert(ThreadId(5), p(7));

        let order: vec::Vec<u8> = waiters.iter().map(ThreadId::raw).collect();
        assert_eq!(order, [2, 4, 1, 3, 5]);

        assert_eq!(waiters.pop_front(), Some(ThreadId(2)));
        assert_eq!(waiters.pop_front(), Some(ThreadId(4)));
        assert_eq!(waiters.len(), 3);
    }

    #[test]
    fn test_stack_align_and_paint() {
        let mut buffer = vec![0u8; 16 * WORD_SIZE + 3];
        let region = stack::align(&mut buffer[1..]);
        assert_eq!(region.as_ptr() as usize % WORD_SIZE, 0);
        assert_eq!(region.len() % WORD_SIZE, 0);

        stack::paint(region);
        assert_eq!(stack::measure_free(region), region.len());

        let top = region.len() - WORD_SIZE;
        region[top..].fill(0);
        assert_eq!(stack::measure_free(region), region.len() - WORD_SIZE);
        assert!(stack::guard_intact(region));
    }

    #[test]
    fn test_stack_guard_overwritten() {
        let mut buffer = vec![0u8; 8 * WORD_SIZE];
        let region = stack::align(&mut buffer);
        stack::write_guard(region);
        assert!(stack::guard_intact(region));
        assert_eq!(stack::measure_free(region), WORD_SIZE);

        region[0] ^= 0xff;
        assert!(!stack::guard_intact(region));
    }
}
