//! Per-thread timeouts.

extern crate alloc;

use alloc::vec::Vec;

use crate::thread::ThreadId;
use crate::time::SysTime;

/// Armed timeouts, at most one per thread.
#[derive(Debug, Default)]
pub(crate) struct TimerList {
    entries: Vec<(ThreadId, SysTime)>,
}

impl TimerList {
    pub(crate) fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub(crate) fn arm(&mut self, id: ThreadId, deadline: SysTime) {
        debug_assert!(!self.is_armed(id), "timer of thread {} already armed", id);
        self.entries.push((id, deadline));
    }

    /// Cancel the timeout of `id`, `false` if it had already fired.
    pub(crate) fn disarm(&mut self, id: ThreadId) -> bool {
        match self.entries.iter().position(|&(t, _)| t == id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_armed(&self, id: ThreadId) -> bool {
        self.entries.iter().any(|&(t, _)| t == id)
    }

    /// Closest deadline as seen from `now`, wrap-around safe.
    pub(crate) fn next_deadline(&self, now: SysTime) -> Option<SysTime> {
        self.entries
            .iter()
            .map(|&(_, deadline)| deadline)
            .min_by_key(|deadline| deadline.diff(now))
    }

    /// Remove and return the threads whose deadline is `now`, in arming order.
    pub(crate) fn take_expired(&mut self, now: SysTime) -> Vec<ThreadId> {
        let mut expired = Vec::new();
        self.entries.retain(|&(id, deadline)| {
            if deadline == now {
                expired.push(id);
                false
            } else {
                true
            }
        });
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(n: usize) -> ThreadId {
        ThreadId::from_raw(n)
    }

    #[test]
    fn test_next_deadline_across_wrap() {
        let now = SysTime::from_ticks(u32::MAX - 1);
        let mut timers = TimerList::new();
        timers.arm(tid(1), SysTime::from_ticks(5));
        timers.arm(tid(2), SysTime::from_ticks(u32::MAX));
        assert_eq!(timers.next_deadline(now), Some(SysTime::from_ticks(u32::MAX)));
    }

    #[test]
    fn test_take_expired() {
        let mut timers = TimerList::new();
        timers.arm(tid(1), SysTime::from_ticks(3));
        timers.arm(tid(2), SysTime::from_ticks(4));
        timers.arm(tid(3), SysTime::from_ticks(3));
        assert!(timers.take_expired(SysTime::from_ticks(2)).is_empty());
        assert_eq!(timers.take_expired(SysTime::from_ticks(3)), [tid(1), tid(3)]);
        assert!(timers.disarm(tid(2)));
        assert!(!timers.disarm(tid(2)));
        assert_eq!(timers.next_deadline(SysTime::from_ticks(4)), None);
    }
}
