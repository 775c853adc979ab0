//! Test helper utilities.

extern crate alloc;

use alloc::boxed::Box;

use crate::kernel::Kernel;
use crate::mem::{StaticWorkingArea, WorkingArea};
use crate::port::HostPort;

/// Stack size of the areas handed out by [`static_area`].
pub(crate) const TEST_AREA_SIZE: usize = 2048;

/// Start a fresh kernel on the host port; the test thread becomes `main`.
///
/// Every test gets its own kernel, tests run in parallel.
pub(crate) fn boot() -> &'static Kernel {
    let kernel = leak(Kernel::new(HostPort::new()));
    kernel.init();
    kernel
}

/// Give `value` a `'static` lifetime.
pub(crate) fn leak<T: 'static>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

/// A new static working area, distinct from every other one.
pub(crate) fn static_area() -> WorkingArea {
    WorkingArea::from_static(leak(StaticWorkingArea::<TEST_AREA_SIZE>::new()))
}
