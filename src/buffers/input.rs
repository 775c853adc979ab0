//! Input buffers queue: filled by an ISR, consumed by a thread.

extern crate alloc;

use alloc::boxed::Box;
use portable_atomic::{AtomicUsize, Ordering};

use super::{remaining, Ring, SlotGuard};
use crate::errors::{Msg, WaitError};
use crate::kernel::{Kernel, SysLock};
use crate::thread::ThreadsQueue;
use crate::time::Interval;

/// Called under the kernel lock each time the thread side frees a buffer,
/// so the producer can restart a stalled transfer.
pub type InputNotify = Box<dyn Fn(&mut SysLock<'_>, &InputBuffersQueue) + Send + Sync>;

/// Ring of buffers filled by an interrupt handler and consumed by a thread.
///
/// The ISR side takes an empty slot with [`Self::get_empty_buffer_i`],
/// writes into it and publishes it with [`Self::post_full_buffer_i`]. The
/// thread side either checks out whole buffers or reads a byte stream with
/// [`Self::get_timeout`] and [`Self::read_timeout`].
pub struct InputBuffersQueue {
    kernel: &'static Kernel,
    ring: Ring,
    waiting: ThreadsQueue,
    notify: Option<InputNotify>,
    link: AtomicUsize,
}

impl InputBuffersQueue {
    /// Create a queue of `n` buffers holding up to `size` bytes each.
    ///
    /// `link` is an opaque word for the notification callback.
    pub fn new(
        kernel: &'static Kernel,
        size: usize,
        n: usize,
        notify: Option<InputNotify>,
        link: usize,
    ) -> Self {
        Self {
            kernel,
            ring: Ring::new(size, n, 0),
            waiting: ThreadsQueue::new(),
            notify,
            link: AtomicUsize::new(link),
        }
    }

    /// Number of buffers.
    pub fn size(&self) -> usize {
        self.ring.slots()
    }

    /// Payload capacity of one buffer.
    pub fn buffer_size(&self) -> usize {
        self.ring.capacity()
    }

    pub fn link(&self) -> usize {
        self.link.load(Ordering::Relaxed)
    }

    pub fn set_link(&self, link: usize) {
        self.link.store(link, Ordering::Relaxed);
    }

    /// `true` if no full buffer is waiting for the consumer.
    pub fn is_empty_i(&self, _sys: &SysLock<'_>) -> bool {
        self.ring.state().bcounter == 0
    }

    /// `true` if the producer has no empty buffer left.
    pub fn is_full_i(&self, _sys: &SysLock<'_>) -> bool {
        let state = self.ring.state();
        state.bcounter == state.slots()
    }

    /// Empty buffers available to the producer.
    pub fn space_i(&self, _sys: &SysLock<'_>) -> usize {
        let state = self.ring.state();
        state.slots() - state.bcounter
    }

    /// Discard every buffer and wake the waiting threads with
    /// [`WaitError::Reset`].
    pub fn reset_i(&self, sys: &mut SysLock<'_>) {
        self.ring.reset(0);
        self.waiting.dequeue_all_i(sys, Msg::RESET);
        log::debug!("input buffers queue reset");
    }

    /// Payload area of the next empty buffer, `None` if the queue is full.
    ///
    /// Calling it again before posting returns the same buffer.
    pub fn get_empty_buffer_i<'a>(&'a self, _sys: &'a mut SysLock<'_>) -> Option<SlotGuard<'a>> {
        let slot = {
            let state = self.ring.state();
            if state.bcounter == state.slots() {
                return None;
            }
            state.bwr.slot()
        };
        self.ring.try_slot(slot, 0..self.ring.capacity())
    }

    /// Publish the buffer obtained from [`Self::get_empty_buffer_i`] with
    /// `size` bytes of data, waking one waiting consumer.
    pub fn post_full_buffer_i(&self, sys: &mut SysLock<'_>, size: usize) {
        if !self.ring.check_length(size) {
            return;
        }
        let slot = {
            let state = self.ring.state();
            debug_assert!(state.bcounter < state.slots(), "buffers queue full");
            if state.bcounter == state.slots() {
                return;
            }
            state.bwr.slot()
        };
        // Held only if the queue was reset under the consumer's view.
        if !self.ring.try_set_length(slot, size) {
            return;
        }
        {
            let mut state = self.ring.state();
            state.bcounter += 1;
            state.bwr.advance();
        }
        self.waiting.dequeue_next_i(sys, Msg::OK);
    }

    /// Wait for a full buffer and make it the current buffer.
    pub fn get_full_buffer_timeout_s(
        &self,
        sys: &mut SysLock<'_>,
        timeout: Interval,
    ) -> Result<(), WaitError> {
        sys.check_class_s();
        while self.ring.state().bcounter == 0 {
            self.waiting.enqueue_timeout_s(sys, timeout).into_result()?;
        }
        self.ring.checkout_data();
        Ok(())
    }

    pub fn get_full_buffer_timeout(&self, timeout: Interval) -> Result<(), WaitError> {
        let mut sys = self.kernel.lock();
        self.get_full_buffer_timeout_s(&mut sys, timeout)
    }

    /// Hand the current buffer back to the producer.
    pub fn release_empty_buffer_s(&self, sys: &mut SysLock<'_>) {
        sys.check_class_s();
        {
            let mut state = self.ring.state();
            debug_assert!(state.bcounter > 0, "buffers queue empty");
            state.bcounter = state.bcounter.saturating_sub(1);
            state.brd.advance();
            state.current = None;
        }
        if let Some(notify) = &self.notify {
            notify(sys, self);
        }
    }

    pub fn release_empty_buffer(&self) {
        let mut sys = self.kernel.lock();
        self.release_empty_buffer_s(&mut sys);
    }

    /// Run `f` on the unread part of the current buffer, `None` if no
    /// buffer is checked out.
    ///
    /// The producer keeps filling other buffers meanwhile. `f` must not
    /// read from this queue.
    pub fn with_current_buffer<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        self.ring.with_current(|data| f(data))
    }

    /// Read one byte, waiting up to `timeout` for a buffer if needed.
    pub fn get_timeout(&self, timeout: Interval) -> Result<u8, WaitError> {
        let mut sys = self.kernel.lock();
        if !self.ring.has_current() {
            self.get_full_buffer_timeout_s(&mut sys, timeout)?;
        }
        let mut byte = [0u8; 1];
        let (_, exhausted) = self.ring.read_chunk(&mut byte);
        if exhausted {
            self.release_empty_buffer_s(&mut sys);
        }
        Ok(byte[0])
    }

    /// Read up to `buf.len()` bytes across as many buffers as needed.
    ///
    /// `timeout` bounds the whole transfer. Returns the number of bytes
    /// read, short if the deadline passes or the queue is reset.
    pub fn read_timeout(&self, buf: &mut [u8], timeout: Interval) -> usize {
        let mut sys = self.kernel.lock();
        let deadline = sys.now() + timeout;
        let mut done = 0;

        while done < buf.len() {
            if !self.ring.has_current() {
                let Some(next) = remaining(deadline, sys.now(), timeout) else {
                    break;
                };
                if self.get_full_buffer_timeout_s(&mut sys, next).is_err() {
                    break;
                }
            }

            let (copied, exhausted) = self.ring.read_chunk(&mut buf[done..]);
            done += copied;
            if exhausted {
                self.release_empty_buffer_s(&mut sys);
            }

            // Open a window for interrupts between chunks.
            drop(sys);
            sys = self.kernel.lock();
        }
        done
    }
}
