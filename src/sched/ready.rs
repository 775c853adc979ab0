//! Priority ordered ready list.

extern crate alloc;

use alloc::collections::VecDeque;

use super::Priority;
use crate::thread::ThreadId;

/// Ready threads, highest priority first, FIFO within a priority.
///
/// The running thread is never in the list.
#[derive(Debug, Default)]
pub(crate) struct ReadyList {
    queue: VecDeque<(Priority, ThreadId)>,
}

impl ReadyList {
    pub(crate) fn new() -> Self {
        Self { queue: VecDeque::new() }
    }

    /// Insert behind every thread of equal or higher priority.
    pub(crate) fn insert_behind(&mut self, prio: Priority, id: ThreadId) {
        debug_assert!(!self.contains(id), "thread {} already ready", id);
        let index = self.queue.partition_point(|&(p, _)| p >= prio);
        self.queue.insert(index, (prio, id));
    }

    /// Insert ahead of threads of equal priority, used for preempted threads.
    pub(crate) fn insert_ahead(&mut self, prio: Priority, id: ThreadId) {
        debug_assert!(!self.contains(id), "thread {} already ready", id);
        let index = self.queue.partition_point(|&(p, _)| p > prio);
        self.queue.insert(index, (prio, id));
    }

    /// Take the highest priority thread.
    pub(crate) fn pop(&mut self) -> Option<ThreadId> {
        self.queue.pop_front().map(|(_, id)| id)
    }

    pub(crate) fn head_priority(&self) -> Option<Priority> {
        self.queue.front().map(|&(p, _)| p)
    }

    pub(crate) fn remove(&mut self, id: ThreadId) -> bool {
        match self.queue.iter().position(|&(_, t)| t == id) {
            Some(index) => {
                self.queue.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn contains(&self, id: ThreadId) -> bool {
        self.queue.iter().any(|&(_, t)| t == id)
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(n: usize) -> ThreadId {
        ThreadId::from_raw(n)
    }

    #[test]
    fn test_priority_order() {
        let mut ready = ReadyList::new();
        ready.insert_behind(10, tid(1));
        ready.insert_behind(30, tid(2));
        ready.insert_behind(20, tid(3));
        assert_eq!(ready.head_priority(), Some(30));
        assert_eq!(ready.pop(), Some(tid(2)));
        assert_eq!(ready.pop(), Some(tid(3)));
        assert_eq!(ready.pop(), Some(tid(1)));
        assert_eq!(ready.pop(), None);
    }

    #[test]
    fn test_equal_priority_placement() {
        let mut ready = ReadyList::new();
        ready.insert_behind(10, tid(1));
        ready.insert_behind(10, tid(2));
        ready.insert_ahead(10, tid(3));
        ready.insert_behind(10, tid(4));
        assert_eq!(ready.len(), 4);

        let order: alloc::vec::Vec<_> = core::iter::from_fn(|| ready.pop()).collect();
        assert_eq!(order, [tid(3), tid(1), tid(2), tid(4)]);
    }

    #[test]
    fn test_remove() {
        let mut ready = ReadyList::new();
        ready.insert_behind(5, tid(1));
        ready.insert_behind(5, tid(2));
        assert!(ready.remove(tid(1)));
        assert!(!ready.remove(tid(1)));
        assert!(!ready.contains(tid(1)));
        assert_eq!(ready.pop(), Some(tid(2)));
    }
}
