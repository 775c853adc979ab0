//! Output buffers queue: filled by a thread, drained by an ISR.

extern crate alloc;

use alloc::boxed::Box;
use portable_atomic::{AtomicUsize, Ordering};

use super::{remaining, Ring, SlotGuard};
use crate::errors::{Msg, WaitError};
use crate::kernel::{Kernel, SysLock};
use crate::thread::ThreadsQueue;
use crate::time::Interval;

/// Called under the kernel lock each time the thread side posts a buffer,
/// so the consumer can start a transfer.
pub type OutputNotify = Box<dyn Fn(&mut SysLock<'_>, &OutputBuffersQueue) + Send + Sync>;

/// Ring of buffers filled by a thread and drained by an interrupt handler.
pub struct OutputBuffersQueue {
    kernel: &'static Kernel,
    ring: Ring,
    waiting: ThreadsQueue,
    notify: Option<OutputNotify>,
    link: AtomicUsize,
}

impl OutputBuffersQueue {
    /// Create a queue of `n` buffers holding up to `size` bytes each.
    pub fn new(
        kernel: &'static Kernel,
        size: usize,
        n: usize,
        notify: Option<OutputNotify>,
        link: usize,
    ) -> Self {
        Self {
            kernel,
            ring: Ring::new(size, n, n),
            waiting: ThreadsQueue::new(),
            notify,
            link: AtomicUsize::new(link),
        }
    }

    pub fn size(&self) -> usize {
        self.ring.slots()
    }

    pub fn buffer_size(&self) -> usize {
        self.ring.capacity()
    }

    pub fn link(&self) -> usize {
        self.link.load(Ordering::Relaxed)
    }

    pub fn set_link(&self, link: usize) {
        self.link.store(link, Ordering::Relaxed);
    }

    /// `true` if nothing is waiting to be transmitted.
    pub fn is_empty_i(&self, _sys: &SysLock<'_>) -> bool {
        let state = self.ring.state();
        state.bcounter == state.slots()
    }

    /// `true` if the writer has no empty buffer left.
    pub fn is_full_i(&self, _sys: &SysLock<'_>) -> bool {
        self.ring.state().bcounter == 0
    }

    /// Empty buffers available to the writer.
    pub fn space_i(&self, _sys: &SysLock<'_>) -> usize {
        self.ring.state().bcounter
    }

    /// Drop every pending buffer and wake the waiting threads with
    /// [`WaitError::Reset`].
    pub fn reset_i(&self, sys: &mut SysLock<'_>) {
        self.ring.reset(self.ring.slots());
        self.waiting.dequeue_all_i(sys, Msg::RESET);
        log::debug!("output buffers queue reset");
    }

    /// Data of the oldest posted buffer, `None` if there is none.
    pub fn get_full_buffer_i<'a>(&'a self, _sys: &'a mut SysLock<'_>) -> Option<SlotGuard<'a>> {
        let slot = {
            let state = self.ring.state();
            if state.bcounter == state.slots() {
                return None;
            }
            state.brd.slot()
        };
        self.ring.try_data(slot)
    }

    /// Give the buffer obtained from [`Self::get_full_buffer_i`] back to the
    /// writer, waking one waiting thread.
    pub fn release_empty_buffer_i(&self, sys: &mut SysLock<'_>) {
        {
            let mut state = self.ring.state();
            debug_assert!(state.bcounter < state.slots(), "buffers queue empty");
            if state.bcounter == state.slots() {
                return;
            }
            state.bcounter += 1;
            state.brd.advance();
        }
        self.waiting.dequeue_next_i(sys, Msg::OK);
    }

    /// Wait for an empty buffer and make it the current buffer.
    pub fn get_empty_buffer_timeout_s(
        &self,
        sys: &mut SysLock<'_>,
        timeout: Interval,
    ) -> Result<(), WaitError> {
        sys.check_class_s();
        while self.ring.state().bcounter == 0 {
            self.waiting.enqueue_timeout_s(sys, timeout).into_result()?;
        }
        self.ring.checkout_payload();
        Ok(())
    }

    pub fn get_empty_buffer_timeout(&self, timeout: Interval) -> Result<(), WaitError> {
        let mut sys = self.kernel.lock();
        self.get_empty_buffer_timeout_s(&mut sys, timeout)
    }

    /// Publish the current buffer with `size` bytes of data.
    pub fn post_full_buffer_s(&self, sys: &mut SysLock<'_>, size: usize) {
        sys.check_class_s();
        if !self.ring.check_length(size) {
            return;
        }
        let slot = {
            let state = self.ring.state();
            debug_assert!(state.bcounter > 0, "buffers queue full");
            if state.bcounter == 0 {
                return;
            }
            state.bwr.slot()
        };
        self.ring.set_length(slot, size);
        {
            let mut state = self.ring.state();
            state.bcounter -= 1;
            state.bwr.advance();
            state.current = None;
        }
        if let Some(notify) = &self.notify {
            notify(sys, self);
        }
    }

    pub fn post_full_buffer(&self, size: usize) {
        let mut sys = self.kernel.lock();
        self.post_full_buffer_s(&mut sys, size);
    }

    /// Run `f` on the free part of the current buffer, `None` if no buffer
    /// is checked out.
    ///
    /// The consumer keeps draining other buffers meanwhile. `f` must not
    /// write to this queue.
    pub fn with_current_buffer<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Option<R> {
        self.ring.with_current(f)
    }

    /// Write one byte, waiting up to `timeout` for a buffer if needed.
    pub fn put_timeout(&self, byte: u8, timeout: Interval) -> Result<(), WaitError> {
        let mut sys = self.kernel.lock();
        if !self.ring.has_current() {
            self.get_empty_buffer_timeout_s(&mut sys, timeout)?;
        }
        let (_, full) = self.ring.write_chunk(&[byte]);
        if full {
            self.post_full_buffer_s(&mut sys, self.ring.capacity());
        }
        Ok(())
    }

    /// Write up to `buf.len()` bytes across as many buffers as needed.
    ///
    /// Filled buffers are posted as they complete, a partially filled one
    /// stays current until [`Self::flush`]. `timeout` bounds the whole
    /// transfer. Returns the number of bytes written.
    pub fn write_timeout(&self, buf: &[u8], timeout: Interval) -> usize {
        let mut sys = self.kernel.lock();
        let deadline = sys.now() + timeout;
        let mut done = 0;

        while done < buf.len() {
            if !self.ring.has_current() {
                let Some(next) = remaining(deadline, sys.now(), timeout) else {
                    break;
                };
                if self.get_empty_buffer_timeout_s(&mut sys, next).is_err() {
                    break;
                }
            }

            let (copied, full) = self.ring.write_chunk(&buf[done..]);
            done += copied;
            if full {
                self.post_full_buffer_s(&mut sys, self.ring.capacity());
            }

            drop(sys);
            sys = self.kernel.lock();
        }
        done
    }

    /// Post the partially filled current buffer if the queue is otherwise
    /// idle, from ISR context.
    ///
    /// Returns `true` if a buffer was posted. Nothing is posted while the
    /// writer is inside [`Self::with_current_buffer`]. The notification
    /// callback is not invoked, the caller is the consumer.
    pub fn try_flush_i(&self, _sys: &mut SysLock<'_>) -> bool {
        let (slot, filled) = {
            let state = self.ring.state();
            let filled = state.current.map_or(0, |span| span.ptr);
            if state.bcounter != state.slots() || filled == 0 {
                return false;
            }
            (state.bwr.slot(), filled)
        };
        if !self.ring.try_set_length(slot, filled) {
            return false;
        }
        let mut state = self.ring.state();
        state.bcounter -= 1;
        state.bwr.advance();
        state.current = None;
        true
    }

    /// Post the current buffer if it holds any data.
    pub fn flush(&self) {
        let mut sys = self.kernel.lock();
        let filled = self.ring.filled();
        if filled > 0 {
            self.post_full_buffer_s(&mut sys, filled);
        }
    }
}
