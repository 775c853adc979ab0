//! I/O buffers queues.
//!
//! A buffers queue is a ring of `n` fixed size slots moved between an
//! interrupt handler and a thread without copying. Each slot starts with a
//! `usize` holding the length of the data it carries, the payload follows.
//!
//! - [`InputBuffersQueue`]: an ISR fills slots, a thread consumes them.
//! - [`OutputBuffersQueue`]: a thread fills slots, an ISR consumes them.
//!
//! On the thread side a slot is checked out as the *current* buffer. On top
//! of that, `get`/`read` and `put`/`write` offer a byte stream view that
//! fetches and releases slots transparently.
//!
//! Counters and cursors sit behind a lock held only inside queue calls.
//! Every slot has its own lock. While a buffer is checked out it is counted
//! as owned by the thread side, so the ISR side never reaches that slot and
//! both sides can touch their slot at the same time.

extern crate alloc;

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::ops::{Deref, DerefMut, Range};

pub mod input;
pub mod output;

pub use input::{InputBuffersQueue, InputNotify};
pub use output::{OutputBuffersQueue, OutputNotify};

use crate::time::{Interval, SysTime};

/// Bytes copied per lock acquisition by the byte stream operations.
pub const CHUNK_SIZE: usize = 64;

/// Size of the length prefix of every slot.
pub(crate) const LEN_SIZE: usize = core::mem::size_of::<usize>();

/// Position in the ring, wraps after the last slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RingCursor {
    slot: usize,
    slots: usize,
}

impl RingCursor {
    fn new(slots: usize) -> Self {
        Self { slot: 0, slots }
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    pub(crate) fn advance(&mut self) {
        self.slot += 1;
        if self.slot >= self.slots {
            self.slot = 0;
        }
    }

    fn rewind(&mut self) {
        self.slot = 0;
    }
}

/// Checked-out part of a slot, `ptr..top` as payload offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    slot: usize,
    ptr: usize,
    top: usize,
}

/// Counters and cursors of a queue.
#[derive(Debug)]
pub(crate) struct RingState {
    bn: usize,
    /// Full slots (input) or empty slots (output).
    pub(crate) bcounter: usize,
    pub(crate) brd: RingCursor,
    pub(crate) bwr: RingCursor,
    pub(crate) current: Option<Span>,
}

impl RingState {
    pub(crate) fn slots(&self) -> usize {
        self.bn
    }
}

/// Slot storage of a queue.
pub(crate) struct Ring {
    /// Length prefix followed by the payload, one lock per slot.
    slots: Box<[spin::Mutex<Box<[u8]>>]>,
    capacity: usize,
    state: spin::Mutex<RingState>,
}

impl Ring {
    pub(crate) fn new(size: usize, n: usize, bcounter: usize) -> Self {
        debug_assert!(size >= 2, "buffer size too small");
        debug_assert!(n >= 1, "no buffers");
        let slots: Vec<_> = (0..n)
            .map(|_| spin::Mutex::new(vec![0u8; LEN_SIZE + size].into_boxed_slice()))
            .collect();
        Self {
            slots: slots.into_boxed_slice(),
            capacity: size,
            state: spin::Mutex::new(RingState {
                bn: n,
                bcounter,
                brd: RingCursor::new(n),
                bwr: RingCursor::new(n),
                current: None,
            }),
        }
    }

    /// Counters and cursors. Never hold the guard across a slot access.
    pub(crate) fn state(&self) -> spin::MutexGuard<'_, RingState> {
        self.state.lock()
    }

    pub(crate) fn reset(&self, bcounter: usize) {
        let mut state = self.state();
        state.bcounter = bcounter;
        state.brd.rewind();
        state.bwr.rewind();
        state.current = None;
    }

    pub(crate) fn slots(&self) -> usize {
        self.slots.len()
    }

    /// Payload capacity of a slot.
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    fn declared(&self, storage: &[u8]) -> usize {
        let mut raw = [0u8; LEN_SIZE];
        raw.copy_from_slice(&storage[..LEN_SIZE]);
        usize::from_ne_bytes(raw).min(self.capacity)
    }

    /// Declared data length of `slot`.
    pub(crate) fn length(&self, slot: usize) -> usize {
        self.declared(&self.slots[slot].lock())
    }

    pub(crate) fn set_length(&self, slot: usize, size: usize) {
        self.slots[slot].lock()[..LEN_SIZE].copy_from_slice(&size.to_ne_bytes());
    }

    /// [`Self::set_length`] from ISR context, `false` if the slot is held.
    pub(crate) fn try_set_length(&self, slot: usize, size: usize) -> bool {
        match self.slots[slot].try_lock() {
            Some(mut storage) => {
                storage[..LEN_SIZE].copy_from_slice(&size.to_ne_bytes());
                true
            }
            None => false,
        }
    }

    /// `true` if `size` is a valid declared length for a slot.
    pub(crate) fn check_length(&self, size: usize) -> bool {
        let valid = size > 0 && size <= self.capacity;
        debug_assert!(valid, "invalid buffer size {} (capacity {})", size, self.capacity);
        valid
    }

    /// Lock `slot` and expose the payload bytes in `range`.
    ///
    /// Returns `None` if the slot is held, which only happens when the queue
    /// was reset while a thread was working on its current buffer.
    pub(crate) fn try_slot(&self, slot: usize, range: Range<usize>) -> Option<SlotGuard<'_>> {
        let storage = self.slots[slot].try_lock()?;
        Some(SlotGuard::new(storage, range))
    }

    /// Lock `slot` and expose its declared data, `None` if the slot is held.
    pub(crate) fn try_data(&self, slot: usize) -> Option<SlotGuard<'_>> {
        let storage = self.slots[slot].try_lock()?;
        let len = self.declared(&storage);
        Some(SlotGuard::new(storage, 0..len))
    }

    /// Check out the data of the slot under the read cursor.
    pub(crate) fn checkout_data(&self) {
        let slot = self.state().brd.slot();
        let top = self.length(slot);
        self.state().current = Some(Span { slot, ptr: 0, top });
    }

    /// Check out the payload area of the slot under the write cursor.
    pub(crate) fn checkout_payload(&self) {
        let mut state = self.state();
        let slot = state.bwr.slot();
        state.current = Some(Span { slot, ptr: 0, top: self.capacity });
    }

    pub(crate) fn has_current(&self) -> bool {
        self.state().current.is_some()
    }

    /// Bytes written so far into the current output buffer.
    pub(crate) fn filled(&self) -> usize {
        self.state().current.map_or(0, |span| span.ptr)
    }

    /// Run `f` on the unconsumed part of the current buffer.
    pub(crate) fn with_current<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Option<R> {
        let span = self.state().current?;
        let mut storage = self.slots[span.slot].lock();
        Some(f(&mut storage[LEN_SIZE + span.ptr..LEN_SIZE + span.top]))
    }

    /// Move the cursor of the current buffer to `ptr`.
    fn advance_current(&self, span: Span, ptr: usize) {
        let mut state = self.state();
        if state.current == Some(span) {
            state.current = Some(Span { ptr, ..span });
        }
    }

    /// Copy up to one chunk out of the current buffer.
    ///
    /// Returns the bytes copied and whether the buffer is exhausted.
    pub(crate) fn read_chunk(&self, dst: &mut [u8]) -> (usize, bool) {
        let Some(span) = self.state().current else {
            return (0, false);
        };
        let size = (span.top - span.ptr).min(dst.len()).min(CHUNK_SIZE);
        {
            let storage = self.slots[span.slot].lock();
            let start = LEN_SIZE + span.ptr;
            dst[..size].copy_from_slice(&storage[start..start + size]);
        }
        let ptr = span.ptr + size;
        self.advance_current(span, ptr);
        (size, ptr >= span.top)
    }

    /// Copy up to one chunk into the current buffer.
    ///
    /// Returns the bytes copied and whether the buffer is full.
    pub(crate) fn write_chunk(&self, src: &[u8]) -> (usize, bool) {
        let Some(span) = self.state().current else {
            return (0, false);
        };
        let size = (span.top - span.ptr).min(src.len()).min(CHUNK_SIZE);
        {
            let mut storage = self.slots[span.slot].lock();
            let start = LEN_SIZE + span.ptr;
            storage[start..start + size].copy_from_slice(&src[..size]);
        }
        let ptr = span.ptr + size;
        self.advance_current(span, ptr);
        (size, ptr >= span.top)
    }
}

/// Access to the payload of a slot, from ISR context.
///
/// Only the slot is locked while the guard exists, the rest of the queue
/// stays usable.
pub struct SlotGuard<'a> {
    storage: spin::MutexGuard<'a, Box<[u8]>>,
    range: Range<usize>,
}

impl<'a> SlotGuard<'a> {
    /// `range` is in payload offsets.
    fn new(storage: spin::MutexGuard<'a, Box<[u8]>>, range: Range<usize>) -> Self {
        Self {
            storage,
            range: LEN_SIZE + range.start..LEN_SIZE + range.end,
        }
    }
}

impl Deref for SlotGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.storage[self.range.clone()]
    }
}

impl DerefMut for SlotGuard<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        let range = self.range.clone();
        &mut self.storage[range]
    }
}

/// Timeout for the next wait of a multi-buffer transfer bounded by
/// `deadline`, `None` once the deadline has passed.
///
/// The two special intervals are passed through unchanged.
pub(crate) fn remaining(deadline: SysTime, now: SysTime, timeout: Interval) -> Option<Interval> {
    if timeout.is_special() {
        return Some(timeout);
    }
    let next = deadline.diff(now);
    // Past the deadline the difference wraps to a huge value.
    (next <= timeout).then_some(next)
}
