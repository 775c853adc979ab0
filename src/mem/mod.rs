//! Memory for thread working areas.
//!
//! A working area is the memory region a thread runs on: its stack plus the
//! space reserved for its control block. Areas come from three sources, and
//! the source decides what happens when the thread is finally released:
//!
//! - static areas ([`StaticWorkingArea`]) are never freed,
//! - heap areas ([`Heap`]) go back to the heap,
//! - pool areas ([`MemoryPool`]) go back to their pool.

pub mod heap;
pub mod pool;

pub use heap::{Heap, HeapStatus};
pub use pool::{MemoryPool, PoolStats};

use crate::thread::Tcb;

/// Required alignment of a working area base and size.
pub const WORKING_AREA_ALIGN: usize = 16;

/// Smallest stack a port can run a thread on.
pub const MIN_STACK_SIZE: usize = 128;

/// Space reserved at the high end of every working area for the TCB.
pub const TCB_RESERVE: usize = align_up(core::mem::size_of::<Tcb>());

/// Working area size needed for a thread with `stack` bytes of stack.
pub const fn working_area_size(stack: usize) -> usize {
    align_up(TCB_RESERVE + stack)
}

/// Round `size` up to [`WORKING_AREA_ALIGN`].
pub const fn align_up(size: usize) -> usize {
    (size + WORKING_AREA_ALIGN - 1) & !(WORKING_AREA_ALIGN - 1)
}

/// Descriptor of the memory region a thread runs on.
///
/// The descriptor only records the bounds; the kernel never dereferences
/// them; the port does, when it lays out the initial stack frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkingArea {
    base: usize,
    end: usize,
}

impl WorkingArea {
    /// Describe the region `[base, base + size)`.
    pub const fn new(base: usize, size: usize) -> Self {
        Self { base, end: base + size }
    }

    /// Describe a statically allocated area.
    pub fn from_static<const N: usize>(area: &'static StaticWorkingArea<N>) -> Self {
        Self::new(area.0.as_ptr() as usize, N)
    }

    /// Lowest address of the region.
    pub const fn base(&self) -> usize {
        self.base
    }

    /// One past the highest address of the region.
    pub const fn end(&self) -> usize {
        self.end
    }

    /// Size in bytes.
    pub const fn size(&self) -> usize {
        self.end - self.base
    }

    /// Range left for the stack once the TCB is carved from the high end.
    pub const fn stack_bounds(&self) -> (usize, usize) {
        (self.base, self.end - TCB_RESERVE)
    }

    /// `true` if the area satisfies alignment and minimum size requirements.
    pub const fn is_valid_for_thread(&self) -> bool {
        self.base % WORKING_AREA_ALIGN == 0
            && self.end % WORKING_AREA_ALIGN == 0
            && self.end > self.base
            && self.size() >= working_area_size(MIN_STACK_SIZE)
    }
}

/// Statically allocated, suitably aligned working area of `N` bytes.
///
/// ```ignore
/// static WA_BLINKER: StaticWorkingArea<2048> = StaticWorkingArea::new();
/// ```
#[repr(C, align(16))]
pub struct StaticWorkingArea<const N: usize>([u8; N]);

impl<const N: usize> StaticWorkingArea<N> {
    pub const fn new() -> Self {
        Self([0; N])
    }
}

impl<const N: usize> Default for StaticWorkingArea<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Origin of a thread's working area, decides how it is reclaimed.
#[derive(Clone, Copy)]
pub enum Allocation {
    /// Caller owned memory, never freed.
    Static,
    /// Allocated from a heap.
    Heap(&'static Heap),
    /// Allocated from a memory pool.
    Pool(&'static MemoryPool),
}

impl Allocation {
    /// Return `area` to the allocator it came from.
    pub(crate) fn reclaim(self, area: WorkingArea) {
        match self {
            Allocation::Static => {}
            Allocation::Heap(heap) => heap.free(area),
            Allocation::Pool(pool) => pool.free(area),
        }
    }
}

impl core::fmt::Debug for Allocation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Allocation::Static => write!(f, "Static"),
            Allocation::Heap(_) => write!(f, "Heap"),
            Allocation::Pool(_) => write!(f, "Pool"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static WA: StaticWorkingArea<2048> = StaticWorkingArea::new();

    #[test]
    fn test_static_area_is_valid() {
        let area = WorkingArea::from_static(&WA);
        assert_eq!(area.size(), 2048);
        assert!(area.is_valid_for_thread());
        let (low, high) = area.stack_bounds();
        assert_eq!(low, area.base());
        assert_eq!(high, area.end() - TCB_RESERVE);
    }

    #[test]
    fn test_invalid_areas() {
        assert!(!WorkingArea::new(0x1001, 4096).is_valid_for_thread());
        assert!(!WorkingArea::new(0x1000, 16).is_valid_for_thread());
        assert!(WorkingArea::new(0x1000, working_area_size(MIN_STACK_SIZE)).is_valid_for_thread());
    }
}
