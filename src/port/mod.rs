//! Port layer: execution contexts and context switching.
//!
//! The kernel decides *which* thread runs; the port provides the mechanism
//! that makes it run. A port must guarantee that exactly one kernel thread
//! executes at any time: the one most recently switched to.

extern crate alloc;

use alloc::boxed::Box;

use crate::mem::WorkingArea;
use crate::thread::ThreadId;

#[cfg(any(test, feature = "std-shim"))]
pub mod host;

#[cfg(any(test, feature = "std-shim"))]
pub use host::HostPort;

/// Code executed by a new thread context when it first runs.
pub type ThreadBody = Box<dyn FnOnce() + Send + 'static>;

/// Port abstraction trait.
///
/// [`Port::spawn`] runs inside the kernel lock and must not block; the other
/// methods are called with the lock released.
pub trait Port: Send + Sync {
    /// Short identification string.
    fn name(&self) -> &'static str;

    /// Adopt the calling context as thread `id`, which becomes the running
    /// thread. Used once, for the main thread.
    fn adopt(&self, id: ThreadId);

    /// Create the execution context of thread `id` on `area`.
    ///
    /// `body` must not start executing before the first switch to `id`.
    fn spawn(&self, id: ThreadId, name: &'static str, area: WorkingArea, body: ThreadBody);

    /// Hand the CPU from `from` (the caller) to `to`.
    ///
    /// Returns when `from` is switched to again.
    fn switch(&self, from: ThreadId, to: ThreadId);

    /// Final switch of a terminated thread. The context of `from` is
    /// abandoned and never resumed.
    fn exit(&self, from: ThreadId, to: ThreadId) -> !;

    /// `true` if the caller executes in the context of thread `id`.
    ///
    /// Ports that cannot tell report `true`.
    fn is_running(&self, id: ThreadId) -> bool {
        let _ = id;
        true
    }
}
