//! Thread registry.
//!
//! With the `registry` feature every live thread is listed in creation
//! order. The registry backs the working area double-use guard, lookup by
//! name and a reference counted walk over all threads. Without the feature
//! the hooks below compile to nothing.

use crate::kernel::Core;
use crate::thread::ThreadId;

#[cfg(feature = "registry")]
use crate::kernel::Kernel;

impl Core {
    pub(crate) fn registry_insert(&mut self, id: ThreadId) {
        #[cfg(feature = "registry")]
        {
            self.registry.push(id);
            log::trace!("registry: thread {} added", id);
        }
        #[cfg(not(feature = "registry"))]
        let _ = id;
    }

    pub(crate) fn registry_remove(&mut self, id: ThreadId) {
        #[cfg(feature = "registry")]
        {
            self.registry.retain(|&t| t != id);
            log::trace!("registry: thread {} removed", id);
        }
        #[cfg(not(feature = "registry"))]
        let _ = id;
    }

    /// Registered thread running on the working area starting at `base`.
    #[cfg(feature = "registry")]
    pub(crate) fn registry_find_area(&self, base: usize) -> Option<ThreadId> {
        self.registry
            .iter()
            .copied()
            .find(|&id| self.tcb(id).area.map_or(false, |a| a.base() == base))
    }
}

#[cfg(feature = "registry")]
impl Kernel {
    /// Start a registry walk.
    ///
    /// The returned thread carries a new reference, released by
    /// [`Kernel::next_thread`].
    pub fn first_thread(&self) -> Option<ThreadId> {
        let mut sys = self.lock();
        let core = sys.core();
        let first = core.registry.first().copied()?;
        let tcb = core.tcb_mut(first);
        tcb.refs = tcb.refs.saturating_add(1);
        Some(first)
    }

    /// Continue a registry walk: reference the thread after `id`, then
    /// release `id`.
    pub fn next_thread(&self, id: ThreadId) -> Option<ThreadId> {
        let mut sys = self.lock();
        let core = sys.core();
        let next = core
            .registry
            .iter()
            .position(|&t| t == id)
            .and_then(|index| core.registry.get(index + 1).copied());
        if let Some(next) = next {
            let tcb = core.tcb_mut(next);
            debug_assert!(tcb.refs < super::REFS_MAX, "too many references to thread {}", next);
            tcb.refs = tcb.refs.saturating_add(1);
        }
        drop(sys);

        self.release(id);
        next
    }

    /// Find a registered thread by name; the result carries a reference.
    pub fn find_by_name(&self, name: &str) -> Option<ThreadId> {
        let mut sys = self.lock();
        let core = sys.core();
        let found = core.registry.iter().copied().find(|&id| core.tcb(id).name == name)?;
        let tcb = core.tcb_mut(found);
        tcb.refs = tcb.refs.saturating_add(1);
        Some(found)
    }

    /// Find the thread running on the working area starting at `base`; the
    /// result carries a reference.
    pub fn find_by_working_area(&self, base: usize) -> Option<ThreadId> {
        let mut sys = self.lock();
        let core = sys.core();
        let found = core.registry_find_area(base)?;
        let tcb = core.tcb_mut(found);
        tcb.refs = tcb.refs.saturating_add(1);
        Some(found)
    }

    /// Number of registered threads.
    pub fn thread_count(&self) -> usize {
        self.lock().core_ref().registry.len()
    }
}

#[cfg(all(test, feature = "registry"))]
mod tests {
    use alloc::vec::Vec;

    use crate::errors::Msg;
    use crate::sched::priority;
    use crate::tests::helpers::{boot, static_area};
    use crate::thread::{ThreadDescriptor, ThreadState};

    #[test]
    fn test_walk_in_creation_order() {
        let kernel = boot();
        let a = kernel.create_suspended(ThreadDescriptor::new("a", static_area(), priority::LOW, || Msg::OK));
        let b = kernel.create_suspended(ThreadDescriptor::new("b", static_area(), priority::LOW, || Msg::OK));

        let mut names = Vec::new();
        let mut cursor = kernel.first_thread();
        while let Some(id) = cursor {
            names.push(kernel.name(id).unwrap_or("?"));
            cursor = kernel.next_thread(id);
        }
        assert_eq!(names, ["main", "a", "b"]);
        // The walk left the reference counts untouched.
        assert_eq!(kernel.ref_count(a), Some(1));
        assert_eq!(kernel.ref_count(b), Some(1));
    }

    #[test]
    fn test_walk_frees_exited_thread() {
        let kernel = boot();
        let id = kernel.create_static(static_area(), priority::HIGH, || Msg::OK);
        let found = kernel.find_by_name("noname");
        assert_eq!(found, Some(id));
        kernel.release(id);
        assert_eq!(kernel.thread_state(id), Some(ThreadState::Final));

        // Releasing the lookup reference frees the thread.
        assert_eq!(kernel.next_thread(id), None);
        assert_eq!(kernel.thread_state(id), None);
        assert_eq!(kernel.thread_count(), 1);
    }

    #[test]
    fn test_find_by_working_area() {
        let kernel = boot();
        let area = static_area();
        let id = kernel.create_suspended(ThreadDescriptor::new("wa", area, priority::LOW, || Msg::OK));
        assert_eq!(kernel.find_by_working_area(area.base()), Some(id));
        assert_eq!(kernel.ref_count(id), Some(2));
        assert_eq!(kernel.find_by_working_area(area.base() + 16), None);
        assert_eq!(kernel.find_by_name("missing"), None);
    }

    #[test]
    #[should_panic(expected = "working area in use")]
    fn test_working_area_double_use() {
        let kernel = boot();
        let area = static_area();
        kernel.create_suspended(ThreadDescriptor::new("first", area, priority::LOW, || Msg::OK));
        kernel.create_suspended(ThreadDescriptor::new("second", area, priority::LOW, || Msg::OK));
    }
}
