//! Per-priority circular run queues
//!
//! Each priority level keeps a circular singly linked list of thread ids. The
//! list is addressed through its tail, so the head is `next[tail]` and
//! rotating the list is a single tail update. Links live in a flat array
//! indexed by thread table slot; a thread is linked iff its link is `Some`.
//!
//! A [`PriorityMask`] mirrors which levels are non-empty.

use rtk_core::config::{MAX_THREADS, PRIORITY_LEVELS};
use rtk_core::{Priority, PriorityMask, ThreadId};

/// Ready threads grouped by priority level
#[derive(Debug, Clone)]
pub struct RunQueue {
    tails: [Option<ThreadId>; PRIORITY_LEVELS],
    next: [Option<ThreadId>; MAX_THREADS],
    mask: PriorityMask,
}

impl RunQueue {
    /// Create an empty run queue
    pub const fn new() -> Self {
        Self {
            tails: [None; PRIORITY_LEVELS],
            next: [None; MAX_THREADS],
            mask: PriorityMask::EMPTY,
        }
    }

    fn link(&self, id: ThreadId) -> Option<ThreadId> {
        id.slot().and_then(|slot| self.next[slot])
    }

    fn set_link(&mut self, id: ThreadId, next: Option<ThreadId>) {
        if let Some(slot) = id.slot() {
            self.next[slot] = next;
        }
    }

    /// Check if `id` is linked on any level
    pub fn contains(&self, id: ThreadId) -> bool {
        self.link(id).is_some()
    }

    /// Bitmap of non-empty levels
    pub fn mask(&self) -> PriorityMask {
        self.mask
    }

    /// Check if no thread is ready at any level
    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    /// First thread that would be picked at `priority`
    pub fn head(&self, priority: Priority) -> Option<ThreadId> {
        self.tails[priority.index()].and_then(|tail| self.link(tail))
    }

    /// Append `id` at the tail of its level
    ///
    /// Linking an already linked thread is a no-op.
    pub fn enqueue(&mut self, id: ThreadId, priority: Priority) {
        if id.slot().is_none() || self.contains(id) {
            return;
        }
        let level = priority.index();
        match self.tails[level] {
            None => self.set_link(id, Some(id)),
            Some(tail) => {
                let head = self.link(tail);
                self.set_link(id, head);
                self.set_link(tail, Some(id));
            }
        }
        self.tails[level] = Some(id);
        self.mask.set(priority);
    }

    /// Unlink `id` from its level
    ///
    /// Unlinking a thread that is not linked is a no-op.
    pub fn dequeue(&mut self, id: ThreadId, priority: Priority) {
        let Some(after) = self.link(id) else {
            return;
        };
        let level = priority.index();
        let Some(tail) = self.tails[level] else {
            return;
        };

        if after == id {
            self.tails[level] = None;
            self.mask.clear(priority);
        } else {
            let mut prev = tail;
            for _ in 0..MAX_THREADS {
                match self.link(prev) {
                    Some(next) if next == id => break,
                    Some(next) => prev = next,
                    None => return,
                }
            }
            self.set_link(prev, Some(after));
            if tail == id {
                self.tails[level] = Some(prev);
            }
        }
        self.set_link(id, None);
    }

    /// Move a linked `id` to the tail of its level
    ///
    /// Rotating the head is a single tail update; any other position is
    /// unlinked and appended. Unlinked threads are left alone.
    pub fn requeue(&mut self, id: ThreadId, priority: Priority) {
        if self.head(priority) == Some(id) {
            self.tails[priority.index()] = Some(id);
        } else if self.contains(id) {
            self.dequeue(id, priority);
            self.enqueue(id, priority);
        }
    }

    /// Head of the most urgent non-empty level
    ///
    /// The picked thread stays linked where it is; the scheduler moves it to
    /// the tail when it gives up the CPU.
    pub fn pick_highest_ready(&self) -> Option<ThreadId> {
        self.head(self.mask.most_urgent()?)
    }

    /// Threads linked at `priority`, head first
    pub fn iter(&self, priority: Priority) -> impl Iterator<Item = ThreadId> + '_ {
        let tail = self.tails[priority.index()];
        let mut cursor = tail;
        let mut done = tail.is_none();
        core::iter::from_fn(move || {
            if done {
                return None;
            }
            let current = self.link(cursor?)?;
            done = Some(current) == tail;
            cursor = Some(current);
            Some(current)
        })
    }

    /// Number of threads linked at `priority`
    pub fn len(&self, priority: Priority) -> usize {
        self.iter(priority).count()
    }
}

impl Default for RunQueue {
    fn default() -> Self {
        Self::new()
    }
}
