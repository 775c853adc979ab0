//! Threads: control blocks and lifecycle.
//!
//! A thread goes through `WtStart` (created suspended), `Ready`/`Current`
//! while runnable, any number of blocked states, and finally `Final` once it
//! exited. Its control block outlives the exit as long as references exist,
//! so the exit code can be collected with [`Kernel::wait`]. The creator holds
//! the first reference.

extern crate alloc;

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::vec::Vec;

pub mod builder;
pub mod message;
pub mod queue;
pub mod reference;
pub mod registry;

pub use builder::ThreadBuilder;
pub use queue::ThreadsQueue;
pub use reference::ThreadReference;

use crate::errors::{Msg, SpawnError};
use crate::kernel::{Kernel, ObjectKey, SysLock};
use crate::mem::{working_area_size, Allocation, Heap, MemoryPool, WorkingArea, MIN_STACK_SIZE};
use crate::port::ThreadBody;
use crate::sched::Priority;
use crate::time::{Interval, SysTime};

/// Maximum number of references to a thread.
pub const REFS_MAX: u8 = u8::MAX;

/// Terminate request flag.
pub(crate) const FLAG_TERMINATE: u8 = 1 << 2;

/// Thread identifier, unique for the lifetime of a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(core::num::NonZeroUsize);

impl core::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ThreadId {
    /// Zero maps to 1.
    pub(crate) fn from_raw(id: usize) -> Self {
        Self(core::num::NonZeroUsize::new(id).unwrap_or(core::num::NonZeroUsize::MIN))
    }

    /// Get the raw ID value.
    pub fn get(self) -> usize {
        self.0.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Created, not started yet
    WtStart,
    /// In the ready list
    Ready,
    /// Running
    Current,
    /// Waiting on a thread reference
    Suspended,
    /// Waiting in a threads queue
    Queued,
    /// Waiting for a mutex
    WtMutex,
    /// Sleeping
    Sleeping,
    /// Waiting for another thread to exit
    WtExit,
    /// Message sent, waiting for the receiver to pick it up
    SndMsgQ,
    /// Message picked up, waiting for the answer
    SndMsg,
    /// Waiting for a message
    WtMsg,
    /// Exited
    Final,
}

/// Object a blocked thread is linked into, unlinked on timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitObject {
    None,
    Reference(ObjectKey),
    Queue(ObjectKey),
    Mutex(ObjectKey),
}

/// Thread control block.
pub(crate) struct Tcb {
    pub(crate) id: ThreadId,
    pub(crate) name: &'static str,
    /// Effective priority, may be raised by priority inheritance.
    pub(crate) prio: Priority,
    /// Priority requested by the thread itself.
    pub(crate) real_prio: Priority,
    pub(crate) state: ThreadState,
    pub(crate) flags: u8,
    pub(crate) memory: Allocation,
    /// `None` for the main thread, which runs on the caller's stack.
    pub(crate) area: Option<WorkingArea>,
    pub(crate) refs: u8,
    pub(crate) wait: WaitObject,
    pub(crate) wakeup_msg: Msg,
    pub(crate) exit_code: Msg,
    /// Threads waiting for this one to exit.
    pub(crate) waiting: VecDeque<ThreadId>,
    /// Senders waiting for this thread to pick up their message.
    pub(crate) msg_queue: VecDeque<ThreadId>,
    pub(crate) sent_msg: Msg,
    /// Owned mutexes, most recently locked last.
    pub(crate) owned_mutexes: Vec<ObjectKey>,
    pub(crate) switches: u64,
    pub(crate) created_at: SysTime,
}

impl Tcb {
    pub(crate) fn new(
        id: ThreadId,
        name: &'static str,
        prio: Priority,
        area: Option<WorkingArea>,
        memory: Allocation,
        created_at: SysTime,
    ) -> Self {
        Self {
            id,
            name,
            prio,
            real_prio: prio,
            state: ThreadState::WtStart,
            flags: 0,
            memory,
            area,
            refs: 1,
            wait: WaitObject::None,
            wakeup_msg: Msg::OK,
            exit_code: Msg::OK,
            waiting: VecDeque::new(),
            msg_queue: VecDeque::new(),
            sent_msg: Msg::OK,
            owned_mutexes: Vec::new(),
            switches: 0,
            created_at,
        }
    }
}

/// Thread entry function; its return value is the exit code.
pub type ThreadFunction = Box<dyn FnOnce() -> Msg + Send + 'static>;

/// Everything needed to create a thread on a caller provided working area.
pub struct ThreadDescriptor {
    pub name: &'static str,
    pub area: WorkingArea,
    pub priority: Priority,
    pub entry: ThreadFunction,
}

impl ThreadDescriptor {
    pub fn new<F>(name: &'static str, area: WorkingArea, priority: Priority, entry: F) -> Self
    where
        F: FnOnce() -> Msg + Send + 'static,
    {
        Self {
            name,
            area,
            priority,
            entry: Box::new(entry),
        }
    }
}

impl Kernel {
    fn check_lock(&self, sys: &SysLock<'_>) {
        debug_assert!(core::ptr::eq(sys.kernel(), self), "lock of another kernel");
    }

    /// Create a thread in the `WtStart` state.
    ///
    /// The working area must be aligned and large enough, and not in use by
    /// another registered thread.
    pub fn create_suspended_i(&'static self, sys: &mut SysLock<'_>, desc: ThreadDescriptor) -> ThreadId {
        self.check_lock(sys);
        debug_assert!(desc.area.is_valid_for_thread(), "invalid working area");
        #[cfg(feature = "registry")]
        debug_assert!(
            sys.core_ref().registry_find_area(desc.area.base()).is_none(),
            "working area in use"
        );
        self.spawn_i(sys, desc, Allocation::Static)
    }

    fn spawn_i(&'static self, sys: &mut SysLock<'_>, desc: ThreadDescriptor, memory: Allocation) -> ThreadId {
        let id = self.alloc_thread_id();
        let core = sys.core();
        let tcb = Tcb::new(id, desc.name, desc.priority, Some(desc.area), memory, core.now);
        core.threads.insert(id, tcb);
        core.registry_insert(id);

        let kernel: &'static Kernel = self;
        let entry = desc.entry;
        let body: ThreadBody = Box::new(move || {
            kernel.thread_prologue();
            let code = entry();
            kernel.exit(code)
        });
        self.port().spawn(id, desc.name, desc.area, body);

        log::trace!(
            "thread {} ({}) created, prio {}, {:?} area of {} bytes",
            id,
            desc.name,
            desc.priority,
            memory,
            desc.area.size()
        );
        id
    }

    /// Create a thread in the `WtStart` state.
    pub fn create_suspended(&'static self, desc: ThreadDescriptor) -> ThreadId {
        let mut sys = self.lock();
        self.create_suspended_i(&mut sys, desc)
    }

    /// Create and start a thread.
    pub fn create(&'static self, desc: ThreadDescriptor) -> ThreadId {
        let mut sys = self.lock();
        let id = self.create_suspended_i(&mut sys, desc);
        sys.wakeup_s(id, Msg::OK);
        id
    }

    /// Create and start an unnamed thread on a static working area.
    pub fn create_static<F>(&'static self, area: WorkingArea, priority: Priority, entry: F) -> ThreadId
    where
        F: FnOnce() -> Msg + Send + 'static,
    {
        self.create(ThreadDescriptor::new("noname", area, priority, entry))
    }

    /// Create and start a thread whose working area of `size` bytes is
    /// allocated from `heap`, and returned to it when the thread is released.
    pub fn create_from_heap<F>(
        &'static self,
        heap: &'static Heap,
        size: usize,
        name: &'static str,
        priority: Priority,
        entry: F,
    ) -> Result<ThreadId, SpawnError>
    where
        F: FnOnce() -> Msg + Send + 'static,
    {
        if size < working_area_size(MIN_STACK_SIZE) {
            return Err(SpawnError::InvalidStackSize(size));
        }
        let area = heap.alloc(size).ok_or(SpawnError::OutOfMemory)?;

        let mut sys = self.lock();
        let desc = ThreadDescriptor::new(name, area, priority, entry);
        let id = self.spawn_i(&mut sys, desc, Allocation::Heap(heap));
        sys.wakeup_s(id, Msg::OK);
        Ok(id)
    }

    /// Create and start a thread on an object taken from `pool`.
    pub fn create_from_pool<F>(
        &'static self,
        pool: &'static MemoryPool,
        name: &'static str,
        priority: Priority,
        entry: F,
    ) -> Result<ThreadId, SpawnError>
    where
        F: FnOnce() -> Msg + Send + 'static,
    {
        if pool.object_size() < working_area_size(MIN_STACK_SIZE) {
            return Err(SpawnError::InvalidStackSize(pool.object_size()));
        }
        let area = pool.alloc().ok_or(SpawnError::PoolExhausted)?;

        let mut sys = self.lock();
        let desc = ThreadDescriptor::new(name, area, priority, entry);
        let id = self.spawn_i(&mut sys, desc, Allocation::Pool(pool));
        sys.wakeup_s(id, Msg::OK);
        Ok(id)
    }

    /// Make a thread created with [`Kernel::create_suspended`] ready.
    pub fn start_i(&self, sys: &mut SysLock<'_>, id: ThreadId) -> ThreadId {
        self.check_lock(sys);
        let core = sys.core();
        debug_assert!(core.tcb(id).state == ThreadState::WtStart, "thread {} already started", id);
        core.wake_i(id, Msg::OK);
        log::trace!("thread {} started", id);
        id
    }

    /// Start a thread created with [`Kernel::create_suspended`].
    pub fn start(&self, id: ThreadId) -> ThreadId {
        let mut sys = self.lock();
        debug_assert!(sys.core_ref().tcb(id).state == ThreadState::WtStart, "thread {} already started", id);
        log::trace!("thread {} started", id);
        sys.wakeup_s(id, Msg::OK);
        id
    }

    /// Terminate the calling thread with `code`.
    ///
    /// Threads waiting in [`Kernel::wait`] are woken. The control block stays
    /// around until the last reference is released. Returning from the entry
    /// function is equivalent.
    pub fn exit_s(&self, sys: &mut SysLock<'_>, code: Msg) -> ! {
        self.check_lock(sys);
        sys.check_class_s();
        let core = sys.core();
        let me = core.current_id();
        let tcb = core.tcb_mut(me);
        debug_assert!(tcb.owned_mutexes.is_empty(), "thread {} exits owning mutexes", me);
        tcb.exit_code = code;
        let joiners = core::mem::take(&mut tcb.waiting);
        log::trace!("thread {} ({}) exits with {}", me, tcb.name, code.value());

        for joiner in joiners {
            core.wake_i(joiner, Msg::OK);
        }

        let tcb = core.tcb_mut(me);
        tcb.state = ThreadState::Final;
        if tcb.refs == 0 {
            // Detached, nobody will collect the exit code.
            core.registry_remove(me);
            core.zombies.push(me);
        }
        sys.switch_away_s(me)
    }

    /// Terminate the calling thread with `code`.
    pub fn exit(&self, code: Msg) -> ! {
        let mut sys = self.lock();
        self.exit_s(&mut sys, code)
    }

    /// Ask thread `id` to terminate.
    ///
    /// The request is only a flag, the thread has to poll
    /// [`Kernel::should_terminate`] and exit on its own.
    pub fn terminate(&self, id: ThreadId) {
        self.lock().core().tcb_mut(id).flags |= FLAG_TERMINATE;
    }

    /// `true` if termination of the calling thread was requested.
    pub fn should_terminate(&self) -> bool {
        let sys = self.lock();
        let core = sys.core_ref();
        core.tcb(core.current_id()).flags & FLAG_TERMINATE != 0
    }

    /// Wait for thread `id` to exit and return its exit code.
    ///
    /// The caller must hold a reference to `id`, which is released.
    pub fn wait(&self, id: ThreadId) -> Msg {
        let mut sys = self.lock();
        let core = sys.core();
        let me = core.current_id();
        debug_assert!(id != me, "thread {} waiting for itself", me);
        debug_assert!(core.tcb(id).refs > 0, "thread {} not referenced", id);

        if core.tcb(id).state != ThreadState::Final {
            core.tcb_mut(id).waiting.push_back(me);
            sys.go_sleep_s(ThreadState::WtExit);
        }
        let code = sys.core().tcb(id).exit_code;
        drop(sys);

        self.release(id);
        code
    }

    /// Take a new reference to thread `id`.
    pub fn add_ref(&self, id: ThreadId) -> ThreadId {
        let mut sys = self.lock();
        let tcb = sys.core().tcb_mut(id);
        debug_assert!(tcb.refs < REFS_MAX, "too many references to thread {}", id);
        tcb.refs = tcb.refs.saturating_add(1);
        id
    }

    /// Release a reference to thread `id`.
    ///
    /// Dropping the last reference of an exited thread frees it: heap and
    /// pool working areas are returned to their allocator, static ones are
    /// only removed from the registry. A running thread losing its last
    /// reference is detached and freed after its exit.
    pub fn release(&self, id: ThreadId) {
        let mut sys = self.lock();
        let core = sys.core();
        let tcb = core.tcb_mut(id);
        debug_assert!(tcb.refs > 0, "thread {} not referenced", id);
        tcb.refs = tcb.refs.saturating_sub(1);
        if tcb.refs > 0 || tcb.state != ThreadState::Final {
            return;
        }

        core.registry_remove(id);
        let Some(tcb) = core.threads.remove(&id) else {
            return;
        };
        drop(sys);

        if let Some(area) = tcb.area {
            tcb.memory.reclaim(area);
        }
        log::trace!("thread {} ({}) freed", id, tcb.name);
    }

    /// Change the priority of the calling thread, returns the old one.
    ///
    /// A priority raised by inheritance is not lowered until the mutexes
    /// causing it are released.
    pub fn set_priority(&self, new: Priority) -> Priority {
        let mut sys = self.lock();
        let core = sys.core();
        let me = core.current_id();
        let tcb = core.tcb_mut(me);
        let old = tcb.real_prio;
        if tcb.prio == tcb.real_prio || new > tcb.prio {
            tcb.prio = new;
        }
        tcb.real_prio = new;
        sys.reschedule_s();
        old
    }

    /// Suspend the calling thread for `interval`.
    pub fn sleep_s(&self, sys: &mut SysLock<'_>, interval: Interval) {
        self.check_lock(sys);
        debug_assert!(interval != Interval::IMMEDIATE, "invalid sleep interval");
        sys.go_sleep_timeout_s(ThreadState::Sleeping, interval);
    }

    /// Suspend the calling thread for `interval`.
    pub fn sleep(&self, interval: Interval) {
        let mut sys = self.lock();
        self.sleep_s(&mut sys, interval);
    }

    /// Suspend the calling thread until `time`; returns at once if it is
    /// already reached.
    pub fn sleep_until(&self, time: SysTime) {
        let mut sys = self.lock();
        let interval = time.diff(sys.now());
        if interval > Interval::IMMEDIATE {
            self.sleep_s(&mut sys, interval);
        }
    }

    /// Let the next ready thread of equal priority run.
    pub fn yield_now(&self) {
        self.lock().yield_s();
    }

    /// Effective priority of `id`, `None` once the thread is freed.
    pub fn priority(&self, id: ThreadId) -> Option<Priority> {
        self.lock().core_ref().threads.get(&id).map(|t| t.prio)
    }

    /// Priority requested by `id`, ignoring inheritance.
    pub fn real_priority(&self, id: ThreadId) -> Option<Priority> {
        self.lock().core_ref().threads.get(&id).map(|t| t.real_prio)
    }

    pub fn thread_state(&self, id: ThreadId) -> Option<ThreadState> {
        self.lock().core_ref().threads.get(&id).map(|t| t.state)
    }

    pub fn ref_count(&self, id: ThreadId) -> Option<u8> {
        self.lock().core_ref().threads.get(&id).map(|t| t.refs)
    }

    pub fn name(&self, id: ThreadId) -> Option<&'static str> {
        self.lock().core_ref().threads.get(&id).map(|t| t.name)
    }

    /// Number of times `id` was switched in.
    pub fn context_switches(&self, id: ThreadId) -> Option<u64> {
        self.lock().core_ref().threads.get(&id).map(|t| t.switches)
    }

    /// Creation time of `id`.
    pub fn created_at(&self, id: ThreadId) -> Option<SysTime> {
        self.lock().core_ref().threads.get(&id).map(|t| t.created_at)
    }

    /// Working area of `id`, `None` for the main thread.
    pub fn working_area(&self, id: ThreadId) -> Option<WorkingArea> {
        self.lock().core_ref().threads.get(&id).and_then(|t| t.area)
    }

    /// `true` if `id` exited or was already freed.
    pub fn is_terminated(&self, id: ThreadId) -> bool {
        self.thread_state(id).map_or(true, |s| s == ThreadState::Final)
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;
    use alloc::vec::Vec;

    use super::*;
    use crate::mem::HeapStatus;
    use crate::sched::priority;
    use crate::tests::helpers::{boot, leak, static_area};

    #[test]
    fn test_create_runs_higher_priority_thread() {
        let kernel = boot();
        let id = kernel.create_static(static_area(), priority::NORMAL + 1, || Msg::new(5));
        assert_eq!(kernel.thread_state(id), Some(ThreadState::Final));
        assert_eq!(kernel.ref_count(id), Some(1));
        assert_eq!(kernel.wait(id), Msg::new(5));
        assert_eq!(kernel.thread_state(id), None);
    }

    #[test]
    fn test_suspended_thread_waits_for_start() {
        let kernel = boot();
        let ran = Arc::new(spin::Mutex::new(false));
        let r = ran.clone();
        let desc = ThreadDescriptor::new("worker", static_area(), priority::HIGH, move || {
            *r.lock() = true;
            Msg::OK
        });
        let id = kernel.create_suspended(desc);
        assert_eq!(kernel.thread_state(id), Some(ThreadState::WtStart));
        assert_eq!(kernel.name(id), Some("worker"));
        assert!(!*ran.lock());

        kernel.start(id);
        assert!(*ran.lock());
        assert!(kernel.is_terminated(id));
    }

    #[test]
    fn test_start_i_defers_switch_to_epilogue() {
        let kernel = boot();
        let id = kernel.create_suspended(ThreadDescriptor::new("isr-started", static_area(), priority::HIGH, || {
            Msg::OK
        }));
        kernel.isr(|sys| {
            kernel.start_i(sys, id);
            assert_eq!(sys.core_ref().tcb(id).state, ThreadState::Ready);
        });
        assert_eq!(kernel.thread_state(id), Some(ThreadState::Final));
    }

    #[test]
    fn test_wait_blocks_until_exit() {
        let kernel = boot();
        let id = kernel.create_static(static_area(), priority::LOW, || Msg::new(42));
        assert_eq!(kernel.thread_state(id), Some(ThreadState::Ready));
        assert_eq!(kernel.wait(id), Msg::new(42));
        assert!(kernel.is_terminated(id));
    }

    #[test]
    fn test_multiple_joiners() {
        let kernel = boot();
        let target = kernel.create_static(static_area(), priority::LOW, || Msg::new(9));
        let results = Arc::new(spin::Mutex::new(Vec::new()));
        for _ in 0..2 {
            let results = results.clone();
            kernel.add_ref(target);
            kernel.create_static(static_area(), priority::HIGH, move || {
                let code = kernel.wait(target);
                results.lock().push(code);
                Msg::OK
            });
        }
        assert_eq!(kernel.ref_count(target), Some(3));
        assert_eq!(kernel.wait(target), Msg::new(9));
        assert_eq!(*results.lock(), [Msg::new(9), Msg::new(9)]);
        assert_eq!(kernel.thread_state(target), None);
    }

    #[test]
    fn test_release_returns_heap_memory() {
        let kernel = boot();
        let heap: &'static Heap = leak(Heap::new(8192));
        let initial = heap.status();

        let id = kernel
            .create_from_heap(heap, 2048, "heap", priority::HIGH, || Msg::new(3))
            .unwrap();
        assert_eq!(heap.allocations(), 1);
        assert_eq!(kernel.thread_state(id), Some(ThreadState::Final));
        assert_eq!(heap.frees(), 0);

        assert_eq!(kernel.wait(id), Msg::new(3));
        assert_eq!(heap.frees(), 1);
        assert_eq!(heap.status(), initial);
    }

    #[test]
    fn test_release_returns_pool_object() {
        let kernel = boot();
        let pool: &'static MemoryPool = leak(MemoryPool::new(2048, 2));

        let id = kernel.create_from_pool(pool, "pooled", priority::HIGH, || Msg::OK).unwrap();
        assert_eq!(pool.free_count(), 1);
        kernel.release(id);
        assert_eq!(pool.free_count(), 2);
        assert_eq!(pool.stats().freed, 1);
        assert_eq!(kernel.thread_state(id), None);
    }

    #[test]
    fn test_static_thread_only_deregistered() {
        let kernel = boot();
        let area = static_area();
        let id = kernel.create_static(area, priority::HIGH, || Msg::OK);
        assert_eq!(kernel.working_area(id), Some(area));
        kernel.release(id);
        assert_eq!(kernel.thread_state(id), None);
        // The area can host a new thread.
        let again = kernel.create_static(area, priority::HIGH, || Msg::OK);
        assert_eq!(kernel.wait(again), Msg::OK);
    }

    #[test]
    fn test_detached_thread_freed_after_exit() {
        let kernel = boot();
        let heap: &'static Heap = leak(Heap::new(8192));
        let id = kernel
            .create_from_heap(heap, 2048, "detached", priority::LOW, || Msg::OK)
            .unwrap();
        kernel.release(id);
        assert_eq!(kernel.thread_state(id), Some(ThreadState::Ready));
        assert_eq!(heap.frees(), 0);

        kernel.sleep(Interval::from_ticks(1));
        assert_eq!(kernel.thread_state(id), None);
        assert_eq!(heap.frees(), 1);
        assert_eq!(
            heap.status(),
            HeapStatus { free_bytes: 8192, largest_block: 8192, fragments: 1 }
        );
    }

    #[test]
    fn test_create_from_heap_failures() {
        let kernel = boot();
        let heap: &'static Heap = leak(Heap::new(1024));
        assert_eq!(
            kernel.create_from_heap(heap, 16, "tiny", priority::NORMAL, || Msg::OK),
            Err(SpawnError::InvalidStackSize(16))
        );
        assert_eq!(
            kernel.create_from_heap(heap, 4096, "huge", priority::NORMAL, || Msg::OK),
            Err(SpawnError::OutOfMemory)
        );

        let pool: &'static MemoryPool = leak(MemoryPool::new(1024, 1));
        let first = kernel.create_from_pool(pool, "a", priority::LOW, || Msg::OK).unwrap();
        assert_eq!(
            kernel.create_from_pool(pool, "b", priority::LOW, || Msg::OK),
            Err(SpawnError::PoolExhausted)
        );
        assert_eq!(kernel.wait(first), Msg::OK);
    }

    #[test]
    fn test_set_priority_returns_old_and_preempts() {
        let kernel = boot();
        let order = Arc::new(spin::Mutex::new(Vec::new()));
        let o = order.clone();
        kernel.create_static(static_area(), priority::NORMAL + 10, move || {
            o.lock().push("worker");
            Msg::OK
        });
        // Worker already ran; create one more below us and raise it past us.
        let o = order.clone();
        let low = kernel.create_static(static_area(), priority::NORMAL - 1, move || {
            o.lock().push("low");
            Msg::OK
        });
        assert_eq!(kernel.set_priority(priority::NORMAL - 2), priority::NORMAL);
        assert_eq!(*order.lock(), ["worker", "low"]);
        assert_eq!(kernel.set_priority(priority::NORMAL), priority::NORMAL - 2);
        assert!(kernel.is_terminated(low));
    }

    #[test]
    fn test_terminate_request() {
        let kernel = boot();
        let id = kernel.create_static(static_area(), priority::NORMAL, move || {
            let mut loops = 0;
            while !kernel.should_terminate() {
                loops += 1;
                kernel.sleep(Interval::from_ticks(1));
            }
            Msg::new(loops)
        });
        kernel.sleep(Interval::from_ticks(3));
        kernel.terminate(id);
        let code = kernel.wait(id);
        assert!(code.value() >= 3);
    }

    #[test]
    fn test_sleep_until() {
        let kernel = boot();
        kernel.sleep_until(SysTime::from_ticks(40));
        assert_eq!(kernel.now(), SysTime::from_ticks(40));
        // Already reached: no wait.
        kernel.sleep_until(SysTime::from_ticks(40));
        assert_eq!(kernel.now(), SysTime::from_ticks(40));
    }

    #[test]
    #[should_panic(expected = "waiting for itself")]
    fn test_self_join_is_rejected() {
        let kernel = boot();
        kernel.wait(kernel.current());
    }
}
