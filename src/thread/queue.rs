//! Threads queues, the FIFO wait lists the other primitives are built on.

use crate::errors::Msg;
use crate::kernel::{ObjectKey, SysLock};
use crate::thread::{ThreadState, WaitObject};
use crate::time::Interval;

/// FIFO queue of blocked threads.
#[derive(Debug)]
pub struct ThreadsQueue {
    key: ObjectKey,
}

impl ThreadsQueue {
    pub fn new() -> Self {
        Self { key: ObjectKey::new() }
    }

    pub fn is_empty_i(&self, sys: &SysLock<'_>) -> bool {
        !sys.core_ref().queues.contains_key(&self.key)
    }

    /// Number of threads in the queue.
    pub fn len_i(&self, sys: &SysLock<'_>) -> usize {
        sys.core_ref().queues.get(&self.key).map_or(0, |q| q.len())
    }

    /// Block the calling thread at the tail of the queue.
    ///
    /// Returns the message passed to the dequeue operation that woke it, or
    /// [`Msg::TIMEOUT`]. With [`Interval::IMMEDIATE`] the thread is not
    /// enqueued and [`Msg::TIMEOUT`] is returned at once.
    pub fn enqueue_timeout_s(&self, sys: &mut SysLock<'_>, timeout: Interval) -> Msg {
        if timeout == Interval::IMMEDIATE {
            return Msg::TIMEOUT;
        }
        let core = sys.core();
        let me = core.current_id();
        core.queues.entry(self.key).or_default().push_back(me);
        core.tcb_mut(me).wait = WaitObject::Queue(self.key);
        sys.go_sleep_timeout_s(ThreadState::Queued, timeout)
    }

    /// Wake the oldest waiter with `msg`, if any.
    pub fn dequeue_next_i(&self, sys: &mut SysLock<'_>, msg: Msg) {
        let core = sys.core();
        let Some(queue) = core.queues.get_mut(&self.key) else {
            return;
        };
        let next = queue.pop_front();
        if queue.is_empty() {
            core.queues.remove(&self.key);
        }
        if let Some(id) = next {
            debug_assert!(core.tcb(id).state == ThreadState::Queued, "thread {} not queued", id);
            core.wake_i(id, msg);
        }
    }

    /// Wake every waiter with `msg`, in queue order.
    pub fn dequeue_all_i(&self, sys: &mut SysLock<'_>, msg: Msg) {
        let core = sys.core();
        if let Some(queue) = core.queues.remove(&self.key) {
            for id in queue {
                core.wake_i(id, msg);
            }
        }
    }
}

impl Default for ThreadsQueue {
    fn default() -> Self {
        Self::new()
    }
}
