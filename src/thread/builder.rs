use super::{ThreadDescriptor, ThreadId};
use crate::errors::{Msg, SpawnError};
use crate::kernel::Kernel;
use crate::mem::{Heap, MemoryPool, WorkingArea};
use crate::sched::{priority, Priority};

/// Thread factory with a name and priority.
///
/// ```ignore
/// let id = ThreadBuilder::new()
///     .name("blinker")
///     .priority(priority::NORMAL + 1)
///     .spawn_from_heap(kernel, heap, 1024, || Msg::OK)?;
/// ```
pub struct ThreadBuilder {
    name: &'static str,
    priority: Priority,
}

impl ThreadBuilder {
    pub fn new() -> Self {
        Self {
            name: "noname",
            priority: priority::NORMAL,
        }
    }

    pub fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn descriptor<F>(self, area: WorkingArea, f: F) -> ThreadDescriptor
    where
        F: FnOnce() -> Msg + Send + 'static,
    {
        ThreadDescriptor::new(self.name, area, self.priority, f)
    }

    /// Create and start the thread on a static working area.
    pub fn spawn<F>(self, kernel: &'static Kernel, area: WorkingArea, f: F) -> ThreadId
    where
        F: FnOnce() -> Msg + Send + 'static,
    {
        kernel.create(self.descriptor(area, f))
    }

    /// Create the thread without starting it.
    pub fn spawn_suspended<F>(self, kernel: &'static Kernel, area: WorkingArea, f: F) -> ThreadId
    where
        F: FnOnce() -> Msg + Send + 'static,
    {
        kernel.create_suspended(self.descriptor(area, f))
    }

    pub fn spawn_from_heap<F>(
        self,
        kernel: &'static Kernel,
        heap: &'static Heap,
        size: usize,
        f: F,
    ) -> Result<ThreadId, SpawnError>
    where
        F: FnOnce() -> Msg + Send + 'static,
    {
        kernel.create_from_heap(heap, size, self.name, self.priority, f)
    }

    pub fn spawn_from_pool<F>(
        self,
        kernel: &'static Kernel,
        pool: &'static MemoryPool,
        f: F,
    ) -> Result<ThreadId, SpawnError>
    where
        F: FnOnce() -> Msg + Send + 'static,
    {
        kernel.create_from_pool(pool, self.name, self.priority, f)
    }
}

impl Default for ThreadBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::helpers::{boot, leak, static_area};
    use crate::thread::ThreadState;

    #[test]
    fn test_builder_settings() {
        let kernel = boot();
        let id = ThreadBuilder::new()
            .name("worker")
            .priority(priority::LOW)
            .spawn_suspended(kernel, static_area(), || Msg::OK);
        assert_eq!(kernel.name(id), Some("worker"));
        assert_eq!(kernel.priority(id), Some(priority::LOW));
        assert_eq!(kernel.thread_state(id), Some(ThreadState::WtStart));
    }

    #[test]
    fn test_builder_dynamic() {
        let kernel = boot();
        let heap: &'static Heap = leak(Heap::new(4096));
        let id = ThreadBuilder::new()
            .name("dyn")
            .priority(priority::HIGH)
            .spawn_from_heap(kernel, heap, 1024, || Msg::new(1))
            .unwrap();
        assert_eq!(kernel.wait(id), Msg::new(1));
        assert_eq!(heap.frees(), 1);
    }
}
