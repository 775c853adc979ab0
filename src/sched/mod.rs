//! Priority scheduler.
//!
//! Strict priority preemptive scheduling: the running thread is always the
//! highest priority ready thread, threads of equal priority run in FIFO
//! order. Time is tickless; when nothing is ready the scheduler idles by
//! advancing the system time straight to the closest timeout.

pub mod ready;
pub mod timer;

pub(crate) use ready::ReadyList;
pub(crate) use timer::TimerList;

use crate::errors::Msg;
use crate::kernel::{Core, SysLock};
use crate::thread::{ThreadId, ThreadState, WaitObject};
use crate::time::Interval;

/// Thread priority, higher values are more urgent.
pub type Priority = u8;

/// Well known priority levels.
pub mod priority {
    use super::Priority;

    /// Idle priority - only runs when nothing else is ready
    pub const IDLE: Priority = 0;

    /// Lowest priority usable by application threads
    pub const LOW: Priority = 1;

    /// Normal priority - default for most threads
    pub const NORMAL: Priority = 128;

    /// Highest priority
    pub const HIGH: Priority = 255;
}

impl Core {
    /// Make `id` ready, behind threads of equal priority.
    pub(crate) fn ready_i(&mut self, id: ThreadId) {
        let tcb = self.tcb_mut(id);
        debug_assert!(
            !matches!(tcb.state, ThreadState::Ready | ThreadState::Final),
            "invalid state {:?} for thread {}",
            tcb.state,
            id
        );
        tcb.state = ThreadState::Ready;
        let prio = tcb.prio;
        self.ready.insert_behind(prio, id);
    }

    /// Make `id` ready, ahead of threads of equal priority.
    pub(crate) fn ready_ahead_i(&mut self, id: ThreadId) {
        let tcb = self.tcb_mut(id);
        tcb.state = ThreadState::Ready;
        let prio = tcb.prio;
        self.ready.insert_ahead(prio, id);
    }

    /// Deliver `msg` to a blocked thread and make it ready.
    pub(crate) fn wake_i(&mut self, id: ThreadId, msg: Msg) {
        let tcb = self.tcb_mut(id);
        tcb.wakeup_msg = msg;
        tcb.wait = WaitObject::None;
        self.ready_i(id);
    }

    /// Timeout expiry: unlink the thread from whatever it waits on.
    fn timeout_i(&mut self, id: ThreadId) {
        match self.tcb(id).wait {
            WaitObject::Reference(key) => {
                if self.references.get(&key) == Some(&id) {
                    self.references.remove(&key);
                }
            }
            WaitObject::Queue(key) => {
                if let Some(queue) = self.queues.get_mut(&key) {
                    queue.retain(|&t| t != id);
                    if queue.is_empty() {
                        self.queues.remove(&key);
                    }
                }
            }
            WaitObject::Mutex(_) | WaitObject::None => {}
        }
        log::trace!("thread {} timed out in state {:?}", id, self.tcb(id).state);
        self.wake_i(id, Msg::TIMEOUT);
    }

    pub(crate) fn fire_timers(&mut self) {
        for id in self.timers.take_expired(self.now) {
            self.timeout_i(id);
        }
    }

    /// Select the next thread, idling until a timeout if nothing is ready.
    pub(crate) fn pick_next(&mut self) -> ThreadId {
        loop {
            if let Some(id) = self.ready.pop() {
                return id;
            }
            match self.timers.next_deadline(self.now) {
                Some(deadline) => {
                    self.now = deadline;
                    self.fire_timers();
                }
                None => {
                    log::error!("no ready thread and no armed timeout");
                    panic!("deadlock: every thread is blocked without timeout");
                }
            }
        }
    }

    fn current_priority(&self) -> Priority {
        self.tcb(self.current_id()).prio
    }

    /// `true` if a ready thread has higher priority than the running one.
    pub(crate) fn is_preemption_required(&self) -> bool {
        matches!(self.ready.head_priority(), Some(p) if p > self.current_priority())
    }
}

impl SysLock<'_> {
    /// Hand the CPU to `next`, already removed from the ready list.
    ///
    /// Returns when `me` runs again.
    fn switch_to(&mut self, me: ThreadId, next: ThreadId) {
        let core = self.core();
        let tcb = core.tcb_mut(next);
        tcb.state = ThreadState::Current;
        tcb.switches += 1;
        core.current = Some(next);

        let kernel = self.kernel();
        self.unlock_for_switch();
        kernel.port().switch(me, next);
        self.relock();
        self.core().reap();
    }

    /// Final switch of an exiting thread.
    pub(crate) fn switch_away_s(&mut self, me: ThreadId) -> ! {
        let core = self.core();
        let next = core.pick_next();
        let tcb = core.tcb_mut(next);
        tcb.state = ThreadState::Current;
        tcb.switches += 1;
        core.current = Some(next);

        let kernel = self.kernel();
        self.unlock_for_switch();
        kernel.port().exit(me, next)
    }

    /// Put the running thread in `state` and run the next ready thread.
    ///
    /// Returns the wake-up message once the thread is resumed.
    pub(crate) fn go_sleep_s(&mut self, state: ThreadState) -> Msg {
        self.check_class_s();
        let core = self.core();
        let me = core.current_id();
        core.tcb_mut(me).state = state;

        let next = core.pick_next();
        if next == me {
            // Woken by a timeout while idling.
            core.tcb_mut(me).state = ThreadState::Current;
        } else {
            self.switch_to(me, next);
        }
        self.core().tcb(me).wakeup_msg
    }

    /// Like [`Self::go_sleep_s`] with a timeout, [`Msg::TIMEOUT`] on expiry.
    pub(crate) fn go_sleep_timeout_s(&mut self, state: ThreadState, timeout: Interval) -> Msg {
        debug_assert!(timeout != Interval::IMMEDIATE, "immediate timeout must be handled by the caller");
        if timeout == Interval::INFINITE {
            return self.go_sleep_s(state);
        }

        let core = self.core();
        let me = core.current_id();
        let deadline = core.now + timeout;
        core.timers.arm(me, deadline);
        let msg = self.go_sleep_s(state);
        self.core().timers.disarm(me);
        msg
    }

    /// Wake a blocked thread with `msg`, switching to it if it has higher
    /// priority than the caller.
    pub(crate) fn wakeup_s(&mut self, id: ThreadId, msg: Msg) {
        self.check_class_s();
        let core = self.core();
        let me = core.current_id();
        let tcb = core.tcb_mut(id);
        tcb.wakeup_msg = msg;
        tcb.wait = WaitObject::None;
        let prio = tcb.prio;

        if prio <= core.current_priority() {
            core.ready_i(id);
        } else {
            core.ready_ahead_i(me);
            self.switch_to(me, id);
        }
    }

    /// Preempt the caller if a higher priority thread is ready.
    pub fn reschedule_s(&mut self) {
        self.check_class_s();
        let core = self.core();
        if !core.is_preemption_required() {
            return;
        }
        let me = core.current_id();
        core.ready_ahead_i(me);
        if let Some(next) = core.ready.pop() {
            self.switch_to(me, next);
        }
    }

    /// Give the CPU to the next ready thread of equal or higher priority.
    pub(crate) fn yield_s(&mut self) {
        self.check_class_s();
        let core = self.core();
        let me = core.current_id();
        let can_yield = matches!(core.ready.head_priority(), Some(p) if p >= core.current_priority());
        if !can_yield {
            return;
        }
        core.ready_i(me);
        if let Some(next) = core.ready.pop() {
            self.switch_to(me, next);
        }
    }

    /// One system tick: advance time and fire the expired timeouts.
    ///
    /// Preemption is left to the interrupt epilogue.
    pub fn timer_tick_i(&mut self) {
        let core = self.core();
        core.now = core.now.next();
        core.fire_timers();
    }

    /// `true` if a ready thread should preempt the running one.
    pub fn is_preemption_required(&self) -> bool {
        self.core_ref().is_preemption_required()
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;
    use alloc::vec::Vec;

    use super::priority;
    use crate::errors::Msg;
    use crate::tests::helpers::{boot, static_area};
    use crate::time::{Interval, SysTime};

    #[test]
    fn test_higher_priority_thread_runs_first() {
        let kernel = boot();
        let log = Arc::new(spin::Mutex::new(Vec::new()));

        let l = log.clone();
        kernel.create_static(static_area(), priority::NORMAL + 1, move || {
            l.lock().push("high");
            Msg::OK
        });
        log.lock().push("main");
        assert_eq!(*log.lock(), ["high", "main"]);
    }

    #[test]
    fn test_equal_priority_waits_for_yield() {
        let kernel = boot();
        let log = Arc::new(spin::Mutex::new(Vec::new()));

        let l = log.clone();
        kernel.create_static(static_area(), priority::NORMAL, move || {
            l.lock().push("peer");
            Msg::OK
        });
        log.lock().push("main");
        kernel.yield_now();
        log.lock().push("main again");
        assert_eq!(*log.lock(), ["main", "peer", "main again"]);
    }

    #[test]
    fn test_idle_jumps_to_next_timeout() {
        let kernel = boot();
        kernel.sleep(Interval::from_ticks(25));
        assert_eq!(kernel.now(), SysTime::from_ticks(25));
    }

    #[test]
    fn test_tick_wakes_sleeper_and_preempts() {
        let kernel = boot();
        let log = Arc::new(spin::Mutex::new(Vec::new()));

        let l = log.clone();
        kernel.create_static(static_area(), priority::HIGH, move || {
            kernel.sleep(Interval::from_ticks(2));
            let now = kernel.now().ticks();
            l.lock().push(now);
            Msg::OK
        });

        kernel.system_tick();
        assert!(log.lock().is_empty());
        kernel.system_tick();
        assert_eq!(*log.lock(), [2]);
    }
}
