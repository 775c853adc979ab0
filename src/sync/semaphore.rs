//! Counting semaphore.

use portable_atomic::{AtomicU32, Ordering};

use crate::errors::Msg;
use crate::kernel::{Kernel, SysLock};
use crate::thread::ThreadsQueue;
use crate::time::Interval;

/// Counting semaphore.
///
/// A signal with threads waiting hands the unit directly to the oldest
/// waiter, the counter only grows when nobody waits. The counter is only
/// touched under the kernel lock.
pub struct Semaphore {
    kernel: &'static Kernel,
    count: AtomicU32,
    queue: ThreadsQueue,
}

impl Semaphore {
    pub fn new(kernel: &'static Kernel, count: u32) -> Self {
        Self {
            kernel,
            count: AtomicU32::new(count),
            queue: ThreadsQueue::new(),
        }
    }

    /// Available units.
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    /// Take a unit, waiting up to `timeout` for one.
    ///
    /// Returns [`Msg::OK`], [`Msg::TIMEOUT`] or [`Msg::RESET`].
    pub fn wait_timeout_s(&self, sys: &mut SysLock<'_>, timeout: Interval) -> Msg {
        let count = self.count.load(Ordering::Relaxed);
        if count > 0 {
            self.count.store(count - 1, Ordering::Relaxed);
            return Msg::OK;
        }
        self.queue.enqueue_timeout_s(sys, timeout)
    }

    pub fn wait_timeout(&self, timeout: Interval) -> Msg {
        let mut sys = self.kernel.lock();
        self.wait_timeout_s(&mut sys, timeout)
    }

    pub fn wait(&self) -> Msg {
        self.wait_timeout(Interval::INFINITE)
    }

    pub fn signal_i(&self, sys: &mut SysLock<'_>) {
        if self.queue.is_empty_i(sys) {
            self.count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.queue.dequeue_next_i(sys, Msg::OK);
        }
    }

    pub fn signal(&self) {
        let mut sys = self.kernel.lock();
        self.signal_i(&mut sys);
        sys.reschedule_s();
    }

    /// Set the counter to `count` and wake every waiter with [`Msg::RESET`].
    pub fn reset_i(&self, sys: &mut SysLock<'_>, count: u32) {
        self.count.store(count, Ordering::Relaxed);
        self.queue.dequeue_all_i(sys, Msg::RESET);
    }

    pub fn reset(&self, count: u32) {
        let mut sys = self.kernel.lock();
        self.reset_i(&mut sys, count);
        sys.reschedule_s();
    }
}
