//! First-fit heap for dynamically created threads.
//!
//! The heap manages a private region with an address ordered free list.
//! Adjacent free blocks are merged when a block is returned.

extern crate alloc;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;
use portable_atomic::{AtomicUsize, Ordering};
use spin::Mutex;

use super::{align_up, WorkingArea};

/// Heap fragmentation report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStatus {
    /// Total free bytes
    pub free_bytes: usize,
    /// Largest allocatable block
    pub largest_block: usize,
    /// Number of free fragments
    pub fragments: usize,
}

struct HeapState {
    /// Free blocks as (offset, size), sorted by offset.
    free: Vec<(usize, usize)>,
    /// Allocated blocks by offset.
    used: BTreeMap<usize, usize>,
}

pub struct Heap {
    _region: Box<[u8]>,
    base: usize,
    size: usize,
    state: Mutex<HeapState>,
    allocations: AtomicUsize,
    frees: AtomicUsize,
}

impl Heap {
    /// Create a heap managing `size` bytes.
    pub fn new(size: usize) -> Self {
        let size = align_up(size);
        let region = vec![0u8; size + super::WORKING_AREA_ALIGN].into_boxed_slice();
        let base = align_up(region.as_ptr() as usize);
        Self {
            _region: region,
            base,
            size,
            state: Mutex::new(HeapState {
                free: vec![(0, size)],
                used: BTreeMap::new(),
            }),
            allocations: AtomicUsize::new(0),
            frees: AtomicUsize::new(0),
        }
    }

    /// Allocate a block of at least `size` bytes.
    ///
    /// Returns `None` when no free block is large enough.
    pub fn alloc(&self, size: usize) -> Option<WorkingArea> {
        debug_assert!(size > 0, "zero sized allocation");
        let size = align_up(size);
        let mut state = self.state.lock();

        let Some(index) = state.free.iter().position(|&(_, free)| free >= size) else {
            log::warn!("heap: no block of {} bytes available", size);
            return None;
        };

        let (offset, free) = state.free[index];
        if free == size {
            state.free.remove(index);
        } else {
            state.free[index] = (offset + size, free - size);
        }
        state.used.insert(offset, size);
        self.allocations.fetch_add(1, Ordering::AcqRel);

        Some(WorkingArea::new(self.base + offset, size))
    }

    /// Return a block obtained from [`Heap::alloc`].
    pub fn free(&self, area: WorkingArea) {
        debug_assert!(
            area.base() >= self.base && area.end() <= self.base + self.size,
            "block not from this heap"
        );
        let offset = area.base().wrapping_sub(self.base);
        let mut state = self.state.lock();

        let Some(size) = state.used.remove(&offset) else {
            debug_assert!(false, "freeing a block that is not allocated");
            return;
        };
        debug_assert_eq!(size, area.size(), "block size mismatch");

        let index = state.free.partition_point(|&(off, _)| off < offset);
        state.free.insert(index, (offset, size));

        // Merge with the following block, then with the preceding one.
        if index + 1 < state.free.len() {
            let (next_off, next_size) = state.free[index + 1];
            if offset + size == next_off {
                state.free[index].1 += next_size;
                state.free.remove(index + 1);
            }
        }
        if index > 0 {
            let (prev_off, prev_size) = state.free[index - 1];
            if prev_off + prev_size == offset {
                state.free[index - 1].1 += state.free[index].1;
                state.free.remove(index);
            }
        }

        self.frees.fetch_add(1, Ordering::AcqRel);
    }

    /// Current fragmentation status.
    pub fn status(&self) -> HeapStatus {
        let state = self.state.lock();
        HeapStatus {
            free_bytes: state.free.iter().map(|&(_, s)| s).sum(),
            largest_block: state.free.iter().map(|&(_, s)| s).max().unwrap_or(0),
            fragments: state.free.len(),
        }
    }

    /// Total managed size.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of successful allocations so far.
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::Acquire)
    }

    /// Number of blocks returned so far.
    pub fn frees(&self) -> usize {
        self.frees.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_fit_and_coalescing() {
        let heap = Heap::new(1024);
        let a = heap.alloc(100).unwrap();
        let b = heap.alloc(200).unwrap();
        let c = heap.alloc(300).unwrap();
        assert_eq!(a.size(), 112);
        assert_eq!(b.base(), a.end());
        assert_eq!(heap.allocations(), 3);

        heap.free(b);
        assert_eq!(heap.status().fragments, 2);

        // First fit reuses the hole left by `b`.
        let d = heap.alloc(64).unwrap();
        assert_eq!(d.base(), b.base());

        heap.free(a);
        heap.free(d);
        heap.free(c);
        let status = heap.status();
        assert_eq!(status.fragments, 1);
        assert_eq!(status.free_bytes, 1024);
        assert_eq!(status.largest_block, 1024);
        assert_eq!(heap.frees(), 4);
    }

    #[test]
    fn test_exhaustion() {
        let heap = Heap::new(256);
        assert!(heap.alloc(512).is_none());
        let all = heap.alloc(256).unwrap();
        assert!(heap.alloc(16).is_none());
        heap.free(all);
        assert!(heap.alloc(16).is_some());
    }
}
