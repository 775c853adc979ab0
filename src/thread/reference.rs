//! Thread references.
//!
//! A reference is a cell that holds at most one suspended thread. Drivers
//! use it to park the thread that started an operation and resume it, with
//! a result message, from the interrupt that completes it.

use crate::errors::Msg;
use crate::kernel::{Kernel, ObjectKey, SysLock};
use crate::thread::{ThreadState, WaitObject};
use crate::time::Interval;

/// Suspend/resume cell, empty or occupied by one thread.
#[derive(Debug)]
pub struct ThreadReference {
    key: ObjectKey,
}

impl ThreadReference {
    pub fn new() -> Self {
        Self { key: ObjectKey::new() }
    }

    /// `true` if a thread is suspended on the reference.
    pub fn is_occupied_i(&self, sys: &SysLock<'_>) -> bool {
        sys.core_ref().references.contains_key(&self.key)
    }

    fn park(&self, sys: &mut SysLock<'_>) {
        let core = sys.core();
        let me = core.current_id();
        debug_assert!(!core.references.contains_key(&self.key), "thread reference already occupied");
        core.references.insert(self.key, me);
        core.tcb_mut(me).wait = WaitObject::Reference(self.key);
    }

    /// Suspend the calling thread until resumed, returns the resume message.
    pub fn suspend_s(&self, sys: &mut SysLock<'_>) -> Msg {
        self.park(sys);
        sys.go_sleep_s(ThreadState::Suspended)
    }

    /// Suspend the calling thread until resumed or `timeout` expires.
    ///
    /// [`Interval::IMMEDIATE`] returns [`Msg::TIMEOUT`] without suspending.
    pub fn suspend_timeout_s(&self, sys: &mut SysLock<'_>, timeout: Interval) -> Msg {
        if timeout == Interval::IMMEDIATE {
            return Msg::TIMEOUT;
        }
        self.park(sys);
        sys.go_sleep_timeout_s(ThreadState::Suspended, timeout)
    }

    /// Resume the suspended thread, if any, without rescheduling.
    pub fn resume_i(&self, sys: &mut SysLock<'_>, msg: Msg) {
        let core = sys.core();
        if let Some(id) = core.references.remove(&self.key) {
            debug_assert!(core.tcb(id).state == ThreadState::Suspended, "thread {} not suspended", id);
            core.wake_i(id, msg);
        }
    }

    /// Resume the suspended thread, if any, switching to it if it has
    /// higher priority.
    pub fn resume_s(&self, sys: &mut SysLock<'_>, msg: Msg) {
        let core = sys.core();
        if let Some(id) = core.references.remove(&self.key) {
            debug_assert!(core.tcb(id).state == ThreadState::Suspended, "thread {} not suspended", id);
            sys.wakeup_s(id, msg);
        }
    }

    pub fn resume(&self, kernel: &Kernel, msg: Msg) {
        let mut sys = kernel.lock();
        self.resume_s(&mut sys, msg);
    }
}

impl Default for ThreadReference {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use super::*;
    use crate::sched::priority;
    use crate::tests::helpers::{boot, leak, static_area};
    use crate::time::SysTime;

    #[test]
    fn test_resume_from_isr() {
        let kernel = boot();
        let reference: &'static ThreadReference = leak(ThreadReference::new());
        let received = Arc::new(spin::Mutex::new(None));

        let r = received.clone();
        kernel.create_static(static_area(), priority::HIGH, move || {
            let mut sys = kernel.lock();
            let msg = reference.suspend_s(&mut sys);
            drop(sys);
            *r.lock() = Some(msg);
            Msg::OK
        });
        assert!(reference.is_occupied_i(&kernel.lock()));

        kernel.isr(|sys| {
            reference.resume_i(sys, Msg::new(7));
            // Nothing runs before the epilogue.
            assert!(received.lock().is_none());
        });
        assert_eq!(*received.lock(), Some(Msg::new(7)));
        assert!(!reference.is_occupied_i(&kernel.lock()));
    }

    #[test]
    fn test_suspend_timeout() {
        let kernel = boot();
        let reference = ThreadReference::new();

        let mut sys = kernel.lock();
        assert_eq!(reference.suspend_timeout_s(&mut sys, Interval::IMMEDIATE), Msg::TIMEOUT);
        assert_eq!(sys.now(), SysTime::from_ticks(0));
        assert!(!reference.is_occupied_i(&sys));

        assert_eq!(reference.suspend_timeout_s(&mut sys, Interval::from_ticks(5)), Msg::TIMEOUT);
        assert_eq!(sys.now(), SysTime::from_ticks(5));
        // The timeout emptied the cell.
        assert!(!reference.is_occupied_i(&sys));
        drop(sys);
    }

    #[test]
    fn test_resume_empty_reference_is_noop() {
        let kernel = boot();
        let reference = ThreadReference::new();
        reference.resume(kernel, Msg::OK);
        kernel.isr(|sys| reference.resume_i(sys, Msg::OK));
    }

    #[test]
    #[should_panic(expected = "already occupied")]
    fn test_double_suspend_is_rejected() {
        let kernel = boot();
        let reference: &'static ThreadReference = leak(ThreadReference::new());
        kernel.create_static(static_area(), priority::HIGH, move || {
            let mut sys = kernel.lock();
            reference.suspend_s(&mut sys)
        });
        let mut sys = kernel.lock();
        reference.suspend_s(&mut sys);
    }
}
