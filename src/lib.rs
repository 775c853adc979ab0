#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

//! Thread lifecycle core and I/O buffers queues for a small single-CPU
//! real-time kernel.
//!
//! The kernel schedules threads by fixed priority, round-robin among equal
//! priorities, with preemption on every wake-up of a higher priority thread.
//! Threads are created on static, heap or pool working areas, are reference
//! counted, and can be waited for until they exit.
//!
//! # Features
//!
//! - `registry`: keep a registry of live threads (default)
//! - `std-shim`: enable the hosted port outside of tests
//!
//! # Quick Start
//!
//! ```ignore
//! use chthreads::{Kernel, Msg, port::HostPort, mem::{StaticWorkingArea, WorkingArea}};
//! use spin::Lazy;
//!
//! static KERNEL: Lazy<Kernel> = Lazy::new(|| Kernel::new(HostPort::new()));
//! static WA_WORKER: StaticWorkingArea<2048> = StaticWorkingArea::new();
//!
//! fn main() {
//!     KERNEL.init();
//!
//!     let worker = KERNEL.create_static(WorkingArea::from_static(&WA_WORKER), 130, || {
//!         Msg::new(42)
//!     });
//!     assert_eq!(KERNEL.wait(worker), Msg::new(42));
//! }
//! ```
//!
//! # Calling classes
//!
//! Functions ending in `_i` may be called from interrupt handlers and never
//! block or reschedule. Functions ending in `_s` run under the kernel lock
//! from thread context and may block. Both take a [`SysLock`] token.
//! Unsuffixed functions take the lock themselves.

pub mod buffers;
pub mod errors;
pub mod kernel;
pub mod mem;
pub mod port;
pub mod sched;
pub mod sync;
pub mod thread;
pub mod time;

#[cfg(any(test, feature = "std-shim"))]
extern crate std;

extern crate alloc;

#[cfg(test)]
mod tests;

// ============================================================================
// Public API
// ============================================================================

// Kernel
pub use kernel::{Kernel, LockClass, SysLock};

// Scheduler
pub use sched::{priority, Priority};

// Threads
pub use thread::{
    ThreadBuilder, ThreadDescriptor, ThreadId, ThreadReference, ThreadState, ThreadsQueue,
};

// Memory management
pub use mem::{Heap, MemoryPool, StaticWorkingArea, WorkingArea};

// Synchronization
pub use sync::{Mutex, Semaphore};

// Buffers queues
pub use buffers::{InputBuffersQueue, OutputBuffersQueue};

// Time
pub use time::{Interval, SysTime};

// Errors
pub use errors::{KernelError, KernelResult, Msg, SpawnError, WaitError};
