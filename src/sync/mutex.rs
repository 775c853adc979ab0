//! Mutex with priority inheritance.
//!
//! While a thread waits for a mutex, the owner runs at least at the waiter's
//! priority. The boost follows the chain of owners blocked on other mutexes.
//! Mutexes must be unlocked in reverse locking order.

extern crate alloc;

use alloc::collections::VecDeque;

use crate::errors::Msg;
use crate::kernel::{Core, Kernel, ObjectKey, SysLock};
use crate::thread::{ThreadId, ThreadState, WaitObject};

/// State of a locked mutex, kept in the kernel core.
#[derive(Debug, Default)]
pub(crate) struct MutexCore {
    owner: Option<ThreadId>,
    /// Waiters, highest priority first.
    waiters: VecDeque<ThreadId>,
}

impl Core {
    fn mutex_owner(&self, key: ObjectKey) -> Option<ThreadId> {
        self.mutexes.get(&key).and_then(|m| m.owner)
    }

    fn mutex_enqueue(&mut self, key: ObjectKey, id: ThreadId) {
        let prio = self.tcb(id).prio;
        let index = match self.mutexes.get(&key) {
            Some(m) => m
                .waiters
                .iter()
                .position(|&w| self.tcb(w).prio < prio)
                .unwrap_or(m.waiters.len()),
            None => 0,
        };
        self.mutexes.entry(key).or_default().waiters.insert(index, id);
    }

    fn mutex_requeue(&mut self, key: ObjectKey, id: ThreadId) {
        if let Some(m) = self.mutexes.get_mut(&key) {
            m.waiters.retain(|&w| w != id);
        }
        self.mutex_enqueue(key, id);
    }

    /// Raise the owner chain starting at `holder` to `prio`.
    fn mutex_boost(&mut self, mut holder: ThreadId, prio: u8) {
        loop {
            let tcb = self.tcb_mut(holder);
            if tcb.prio >= prio {
                return;
            }
            tcb.prio = prio;
            match (tcb.state, tcb.wait) {
                (ThreadState::WtMutex, WaitObject::Mutex(key)) => {
                    self.mutex_requeue(key, holder);
                    match self.mutex_owner(key) {
                        Some(owner) => holder = owner,
                        None => return,
                    }
                }
                (ThreadState::Ready, _) => {
                    self.ready.remove(holder);
                    self.ready.insert_behind(prio, holder);
                    return;
                }
                _ => return,
            }
        }
    }
}

/// Mutual exclusion lock with priority inheritance.
pub struct Mutex {
    kernel: &'static Kernel,
    key: ObjectKey,
}

impl Mutex {
    pub fn new(kernel: &'static Kernel) -> Self {
        Self {
            kernel,
            key: ObjectKey::new(),
        }
    }

    /// Current owner.
    pub fn owner(&self) -> Option<ThreadId> {
        self.kernel.lock().core_ref().mutex_owner(self.key)
    }

    fn acquire(&self, core: &mut Core, me: ThreadId) {
        core.mutexes.entry(self.key).or_default().owner = Some(me);
        core.tcb_mut(me).owned_mutexes.push(self.key);
    }

    /// Lock, waiting as long as needed.
    pub fn lock_s(&self, sys: &mut SysLock<'_>) {
        let core = sys.core();
        let me = core.current_id();
        let Some(owner) = core.mutex_owner(self.key) else {
            self.acquire(core, me);
            return;
        };
        debug_assert!(owner != me, "mutex locked twice by thread {}", me);

        let prio = core.tcb(me).prio;
        core.mutex_boost(owner, prio);
        core.mutex_enqueue(self.key, me);
        core.tcb_mut(me).wait = WaitObject::Mutex(self.key);
        sys.go_sleep_s(ThreadState::WtMutex);
        debug_assert!(sys.core_ref().mutex_owner(self.key) == Some(me), "mutex not handed over");
    }

    pub fn lock(&self) {
        let mut sys = self.kernel.lock();
        self.lock_s(&mut sys);
    }

    /// Lock if free, never waits.
    pub fn try_lock_s(&self, sys: &mut SysLock<'_>) -> bool {
        let core = sys.core();
        if core.mutex_owner(self.key).is_some() {
            return false;
        }
        let me = core.current_id();
        self.acquire(core, me);
        true
    }

    pub fn try_lock(&self) -> bool {
        let mut sys = self.kernel.lock();
        self.try_lock_s(&mut sys)
    }

    /// Unlock and hand the mutex to the highest priority waiter, without
    /// rescheduling.
    ///
    /// The caller drops back to the highest of its real priority and the
    /// priorities of the waiters on the mutexes it still owns.
    pub fn unlock_s(&self, sys: &mut SysLock<'_>) {
        let core = sys.core();
        let me = core.current_id();
        let tcb = core.tcb_mut(me);
        debug_assert!(
            tcb.owned_mutexes.last() == Some(&self.key),
            "mutex is not the last one locked by thread {}",
            me
        );
        if let Some(index) = tcb.owned_mutexes.iter().rposition(|&k| k == self.key) {
            tcb.owned_mutexes.remove(index);
        }

        let tcb = core.tcb(me);
        let prio = tcb
            .owned_mutexes
            .iter()
            .filter_map(|key| core.mutexes.get(key))
            .filter_map(|m| m.waiters.front())
            .map(|&w| core.tcb(w).prio)
            .fold(tcb.real_prio, u8::max);
        core.tcb_mut(me).prio = prio;

        let next = core.mutexes.get_mut(&self.key).and_then(|m| m.waiters.pop_front());
        match next {
            Some(next) => {
                self.acquire(core, next);
                core.wake_i(next, Msg::OK);
            }
            None => {
                core.mutexes.remove(&self.key);
            }
        }
    }

    pub fn unlock(&self) {
        let mut sys = self.kernel.lock();
        self.unlock_s(&mut sys);
        sys.reschedule_s();
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;
    use alloc::vec::Vec;

    use super::*;
    use crate::sched::priority;
    use crate::tests::helpers::{boot, leak, static_area};

    #[test]
    fn test_lock_unlock() {
        let kernel = boot();
        let mutex = Mutex::new(kernel);
        assert_eq!(mutex.owner(), None);
        mutex.lock();
        assert_eq!(mutex.owner(), Some(kernel.current()));
        assert!(!mutex.try_lock());
        mutex.unlock();
        assert!(mutex.try_lock());
        mutex.unlock();
        assert_eq!(mutex.owner(), None);
    }

    #[test]
    fn test_owner_inherits_waiter_priority() {
        let kernel = boot();
        let main = kernel.current();
        let mutex: &'static Mutex = leak(Mutex::new(kernel));
        let log = Arc::new(spin::Mutex::new(Vec::new()));

        mutex.lock();
        let l = log.clone();
        kernel.create_static(static_area(), 200, move || {
            mutex.lock();
            l.lock().push("high");
            mutex.unlock();
            Msg::OK
        });
        assert_eq!(kernel.priority(main), Some(200));

        // Boosted: lowering the real priority keeps the boost.
        assert_eq!(kernel.set_priority(100), priority::NORMAL);
        assert_eq!(kernel.priority(main), Some(200));
        assert_eq!(kernel.real_priority(main), Some(100));

        mutex.unlock();
        assert_eq!(*log.lock(), ["high"]);
        assert_eq!(kernel.priority(main), Some(100));
        kernel.set_priority(priority::NORMAL);
    }

    #[test]
    fn test_boost_follows_owner_chain() {
        let kernel = boot();
        let main = kernel.current();
        let m1: &'static Mutex = leak(Mutex::new(kernel));
        let m2: &'static Mutex = leak(Mutex::new(kernel));
        let log = Arc::new(spin::Mutex::new(Vec::new()));

        m1.lock();
        let l = log.clone();
        let mid = kernel.create_static(static_area(), 150, move || {
            m2.lock();
            m1.lock();
            l.lock().push("mid");
            m1.unlock();
            m2.unlock();
            Msg::OK
        });
        assert_eq!(kernel.priority(main), Some(150));

        let l = log.clone();
        kernel.create_static(static_area(), 200, move || {
            m2.lock();
            l.lock().push("high");
            m2.unlock();
            Msg::OK
        });
        assert_eq!(kernel.priority(mid), Some(200));
        assert_eq!(kernel.priority(main), Some(200));
        assert_eq!(kernel.real_priority(main), Some(priority::NORMAL));

        m1.unlock();
        assert_eq!(*log.lock(), ["mid", "high"]);
        assert_eq!(kernel.priority(main), Some(priority::NORMAL));
        assert!(kernel.is_terminated(mid));
    }

    #[test]
    fn test_waiters_served_by_priority() {
        let kernel = boot();
        let mutex: &'static Mutex = leak(Mutex::new(kernel));
        let log = Arc::new(spin::Mutex::new(Vec::new()));

        mutex.lock();
        for prio in [140, 150, 160] {
            let l = log.clone();
            kernel.create_static(static_area(), prio, move || {
                mutex.lock();
                l.lock().push(prio);
                mutex.unlock();
                Msg::OK
            });
        }
        mutex.unlock();
        assert_eq!(*log.lock(), [160, 150, 140]);
    }
}
