//! Fixed-size object pool for thread working areas.
//!
//! All objects in a pool have the same size, so allocation and release are
//! constant time and never fragment.

extern crate alloc;

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use portable_atomic::{AtomicUsize, Ordering};
use spin::Mutex;

use super::{align_up, WorkingArea};

/// Snapshot of pool usage counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Number of objects handed out
    pub allocated: usize,
    /// Number of objects returned
    pub freed: usize,
    /// Number of objects currently in use
    pub in_use: usize,
}

#[derive(Debug, Default)]
struct PoolCounters {
    allocated: AtomicUsize,
    freed: AtomicUsize,
    in_use: AtomicUsize,
}

/// Pool of equally sized working areas.
pub struct MemoryPool {
    _region: Box<[u8]>,
    base: usize,
    object_size: usize,
    capacity: usize,
    /// Indices of free objects; the most recently freed is reused first.
    free_objects: Mutex<Vec<usize>>,
    stats: PoolCounters,
}

impl MemoryPool {
    /// Create a pool of `count` objects of `object_size` bytes each.
    pub fn new(object_size: usize, count: usize) -> Self {
        debug_assert!(object_size > 0 && count > 0, "empty pool");
        let object_size = align_up(object_size);
        let region = vec![0u8; object_size * count + super::WORKING_AREA_ALIGN].into_boxed_slice();
        let base = align_up(region.as_ptr() as usize);
        Self {
            _region: region,
            base,
            object_size,
            capacity: count,
            free_objects: Mutex::new((0..count).rev().collect()),
            stats: PoolCounters::default(),
        }
    }

    /// Take an object from the pool, `None` if the pool is empty.
    pub fn alloc(&self) -> Option<WorkingArea> {
        let Some(index) = self.free_objects.lock().pop() else {
            log::warn!("pool: no free object of {} bytes", self.object_size);
            return None;
        };
        self.stats.allocated.fetch_add(1, Ordering::AcqRel);
        self.stats.in_use.fetch_add(1, Ordering::AcqRel);
        Some(WorkingArea::new(self.base + index * self.object_size, self.object_size))
    }

    /// Return an object to the pool.
    pub fn free(&self, area: WorkingArea) {
        let offset = area.base().wrapping_sub(self.base);
        debug_assert!(
            offset % self.object_size == 0 && offset / self.object_size < self.capacity,
            "object not from this pool"
        );
        let index = offset / self.object_size;
        let mut free = self.free_objects.lock();
        debug_assert!(!free.contains(&index), "object freed twice");
        free.push(index);
        self.stats.in_use.fetch_sub(1, Ordering::AcqRel);
        self.stats.freed.fetch_add(1, Ordering::AcqRel);
    }

    /// Size of each object.
    pub fn object_size(&self) -> usize {
        self.object_size
    }

    /// Number of objects currently available.
    pub fn free_count(&self) -> usize {
        self.free_objects.lock().len()
    }

    /// Usage counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.stats.allocated.load(Ordering::Acquire),
            freed: self.stats.freed.load(Ordering::Acquire),
            in_use: self.stats.in_use.load(Ordering::Acquire),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_alloc_free() {
        let pool = MemoryPool::new(1000, 2);
        assert_eq!(pool.object_size(), 1008);

        let a = pool.alloc().unwrap();
        let b = pool.alloc().unwrap();
        assert_ne!(a, b);
        assert!(pool.alloc().is_none());
        assert_eq!(pool.stats().in_use, 2);

        pool.free(a);
        assert_eq!(pool.free_count(), 1);
        assert_eq!(pool.alloc(), Some(a));

        pool.free(a);
        pool.free(b);
        assert_eq!(
            pool.stats(),
            PoolStats { allocated: 3, freed: 3, in_use: 0 }
        );
    }
}
