//! Kernel object and the global kernel lock.
//!
//! All scheduling state lives in one [`Core`] behind a single spin lock. Code
//! holding the lock is represented by a [`SysLock`] token, which also records
//! the calling class:
//!
//! - thread class: the holder may block or reschedule ("S" functions),
//! - ISR class: the holder must not switch context ("I" functions only).
//!
//! Unsuffixed functions take the lock themselves and are callable from
//! thread context only.

extern crate alloc;

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;
use portable_atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::mem::Allocation;
use crate::port::Port;
use crate::sched::{priority, ReadyList, TimerList};
use crate::sync::mutex::MutexCore;
use crate::thread::{Tcb, ThreadId, ThreadState};
use crate::time::SysTime;

/// Identity of a kernel object whose wait state is kept in the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct ObjectKey(u32);

impl ObjectKey {
    pub(crate) fn new() -> Self {
        static NEXT_KEY: AtomicU32 = AtomicU32::new(1);
        Self(NEXT_KEY.fetch_add(1, Ordering::Relaxed))
    }
}

/// Scheduling state, only reachable through a [`SysLock`].
pub(crate) struct Core {
    /// Virtual system time.
    pub(crate) now: SysTime,
    /// Running thread, `None` before [`Kernel::init`].
    pub(crate) current: Option<ThreadId>,
    pub(crate) threads: BTreeMap<ThreadId, Tcb>,
    pub(crate) ready: ReadyList,
    pub(crate) timers: TimerList,
    /// Threads-queue contents, FIFO.
    pub(crate) queues: BTreeMap<ObjectKey, VecDeque<ThreadId>>,
    /// Occupied thread references.
    pub(crate) references: BTreeMap<ObjectKey, ThreadId>,
    /// Owned or contended mutexes.
    pub(crate) mutexes: BTreeMap<ObjectKey, MutexCore>,
    #[cfg(feature = "registry")]
    pub(crate) registry: Vec<ThreadId>,
    /// Exited threads nobody references, reclaimed after the next switch.
    pub(crate) zombies: Vec<ThreadId>,
}

impl Core {
    fn new() -> Self {
        Self {
            now: SysTime::default(),
            current: None,
            threads: BTreeMap::new(),
            ready: ReadyList::new(),
            timers: TimerList::new(),
            queues: BTreeMap::new(),
            references: BTreeMap::new(),
            mutexes: BTreeMap::new(),
            #[cfg(feature = "registry")]
            registry: Vec::new(),
            zombies: Vec::new(),
        }
    }

    pub(crate) fn tcb(&self, id: ThreadId) -> &Tcb {
        match self.threads.get(&id) {
            Some(tcb) => tcb,
            None => panic!("stale thread reference {}", id),
        }
    }

    pub(crate) fn tcb_mut(&mut self, id: ThreadId) -> &mut Tcb {
        match self.threads.get_mut(&id) {
            Some(tcb) => tcb,
            None => panic!("stale thread reference {}", id),
        }
    }

    pub(crate) fn current_id(&self) -> ThreadId {
        match self.current {
            Some(id) => id,
            None => panic!("kernel not initialized"),
        }
    }

    /// Drop exited, unreferenced threads and give back their memory.
    pub(crate) fn reap(&mut self) {
        if self.zombies.is_empty() {
            return;
        }
        for id in core::mem::take(&mut self.zombies) {
            if let Some(tcb) = self.threads.remove(&id) {
                if let Some(area) = tcb.area {
                    tcb.memory.reclaim(area);
                }
                log::trace!("thread {} reclaimed", id);
            }
        }
    }
}

/// Calling class of the lock holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockClass {
    /// Thread context, may block.
    Thread,
    /// Interrupt context, must not block or switch.
    Isr,
}

/// Proof that the kernel lock is held.
///
/// Dropping the token releases the lock.
pub struct SysLock<'k> {
    kernel: &'k Kernel,
    guard: Option<spin::MutexGuard<'k, Core>>,
    class: LockClass,
}

impl<'k> SysLock<'k> {
    fn acquire(kernel: &'k Kernel, class: LockClass) -> Self {
        debug_assert!(!kernel.core.is_locked(), "kernel lock is not recursive");
        Self {
            kernel,
            guard: Some(kernel.core.lock()),
            class,
        }
    }

    pub(crate) fn core(&mut self) -> &mut Core {
        match self.guard.as_mut() {
            Some(core) => core,
            None => unreachable!("kernel lock released during a switch"),
        }
    }

    pub(crate) fn core_ref(&self) -> &Core {
        match self.guard.as_ref() {
            Some(core) => core,
            None => unreachable!("kernel lock released during a switch"),
        }
    }

    /// Release the lock around a port call; the caller must [`Self::relock`].
    pub(crate) fn unlock_for_switch(&mut self) {
        self.guard = None;
    }

    pub(crate) fn relock(&mut self) {
        self.guard = Some(self.kernel.core.lock());
    }

    /// Kernel this token belongs to.
    pub fn kernel(&self) -> &'k Kernel {
        self.kernel
    }

    /// Calling class.
    pub fn class(&self) -> LockClass {
        self.class
    }

    /// Current system time.
    pub fn now(&self) -> SysTime {
        self.core_ref().now
    }

    /// Running thread.
    pub fn current(&self) -> ThreadId {
        self.core_ref().current_id()
    }

    pub(crate) fn check_class_s(&self) {
        debug_assert!(self.class == LockClass::Thread, "S-class function called from ISR context");
    }
}

/// Kernel instance.
///
/// A kernel must live for `'static`, ports run threads that outlive any
/// stack frame.
///
/// ```ignore
/// use chthreads::{Kernel, port::HostPort};
/// use spin::Lazy;
///
/// static KERNEL: Lazy<Kernel> = Lazy::new(|| Kernel::new(HostPort::new()));
///
/// fn main() {
///     KERNEL.init();
/// }
/// ```
pub struct Kernel {
    port: Box<dyn Port>,
    core: spin::Mutex<Core>,
    next_thread_id: AtomicUsize,
}

impl Kernel {
    /// Create a kernel running on `port`.
    pub fn new<P: Port + 'static>(port: P) -> Self {
        Self {
            port: Box::new(port),
            core: spin::Mutex::new(Core::new()),
            next_thread_id: AtomicUsize::new(1),
        }
    }

    /// Turn the caller into the `main` thread and start scheduling.
    ///
    /// The main thread runs at [`priority::NORMAL`] and must never exit.
    pub fn init(&self) -> ThreadId {
        let id = self.alloc_thread_id();
        let mut sys = self.lock();
        let core = sys.core();
        debug_assert!(core.current.is_none(), "kernel already initialized");

        let mut tcb = Tcb::new(id, "main", priority::NORMAL, None, Allocation::Static, core.now);
        tcb.state = ThreadState::Current;
        core.threads.insert(id, tcb);
        core.current = Some(id);
        core.registry_insert(id);
        drop(sys);

        self.port.adopt(id);
        log::debug!("kernel started on port {}, main thread {}", self.port.name(), id);
        id
    }

    /// Enter the kernel critical zone from thread context.
    pub fn lock(&self) -> SysLock<'_> {
        SysLock::acquire(self, LockClass::Thread)
    }

    /// Run `handler` as an interrupt service routine.
    ///
    /// The handler holds the lock in ISR class. Once it returns, the
    /// interrupted thread is preempted if a higher priority thread became
    /// ready, as an interrupt epilogue would do.
    ///
    /// The interrupt is taken on the running thread: the caller must be that
    /// thread's context, never a foreign one.
    pub fn isr<R>(&self, handler: impl FnOnce(&mut SysLock<'_>) -> R) -> R {
        debug_assert!(
            self.port.is_running(self.current()),
            "isr called outside the running thread context"
        );
        let mut sys = SysLock::acquire(self, LockClass::Isr);
        let result = handler(&mut sys);
        sys.class = LockClass::Thread;
        sys.reschedule_s();
        result
    }

    /// System tick interrupt: advance time by one tick and fire timeouts.
    pub fn system_tick(&self) {
        self.isr(|sys| sys.timer_tick_i());
    }

    /// Current system time.
    pub fn now(&self) -> SysTime {
        self.lock().now()
    }

    /// Identifier of the calling thread.
    pub fn current(&self) -> ThreadId {
        self.lock().current()
    }

    /// Name of the port the kernel runs on.
    pub fn port_name(&self) -> &'static str {
        self.port.name()
    }

    pub(crate) fn port(&self) -> &dyn Port {
        &*self.port
    }

    pub(crate) fn alloc_thread_id(&self) -> ThreadId {
        ThreadId::from_raw(self.next_thread_id.fetch_add(1, Ordering::Relaxed))
    }

    /// First code run by every new thread context.
    pub(crate) fn thread_prologue(&self) {
        self.lock().core().reap();
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use crate::errors::Msg;
    use crate::sched::priority;
    use crate::tests::helpers::{boot, static_area};
    use crate::time::{Interval, SysTime};

    #[test]
    fn test_init_makes_caller_main() {
        let kernel = boot();
        let main = kernel.current();
        assert_eq!(kernel.name(main), Some("main"));
        assert_eq!(kernel.priority(main), Some(crate::sched::priority::NORMAL));
        assert_eq!(kernel.port_name(), "host");
    }

    #[test]
    fn test_system_tick_advances_time() {
        let kernel = boot();
        assert_eq!(kernel.now(), SysTime::from_ticks(0));
        kernel.system_tick();
        kernel.system_tick();
        assert_eq!(kernel.now(), SysTime::from_ticks(2));
        assert_eq!(kernel.now().diff(SysTime::from_ticks(0)), Interval::from_ticks(2));
    }

    #[test]
    fn test_isr_class() {
        let kernel = boot();
        let class = kernel.isr(|sys| sys.class());
        assert_eq!(class, super::LockClass::Isr);
        assert_eq!(kernel.lock().class(), super::LockClass::Thread);
    }

    #[test]
    fn test_isr_on_spawned_thread() {
        let kernel = boot();
        let worker = kernel.create_static(static_area(), priority::HIGH, move || {
            Msg::new(kernel.isr(|sys| sys.now().ticks() as i32 + 1))
        });
        assert_eq!(kernel.wait(worker), Msg::new(1));
    }

    #[test]
    #[cfg(debug_assertions)]
    fn test_isr_rejects_foreign_context() {
        let kernel = boot();
        let foreign = std::thread::spawn(move || kernel.isr(|_| ()));
        assert!(foreign.join().is_err());
        // The kernel is left untouched.
        assert_eq!(kernel.lock().class(), super::LockClass::Thread);
        kernel.system_tick();
        assert_eq!(kernel.now(), SysTime::from_ticks(1));
    }
}
