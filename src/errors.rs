//! Status values and error types for kernel operations.
//!
//! Blocking primitives report their outcome through a [`Msg`], the integer
//! wake-up message delivered to a thread when it leaves a blocked state.
//! Higher level APIs convert failure messages into [`WaitError`] so callers
//! can use `?`. Dynamic thread creation reports [`SpawnError`].
//!
//! Programmer errors (null-equivalent handles, double suspension, releasing a
//! thread without references...) are not represented here: they are debug
//! assertions.

#![allow(clippy::uninlined_format_args)]

use core::fmt;

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

/// Wake-up message.
///
/// Any value can be delivered to a resumed thread; negative values are
/// reserved for failure outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Msg(i32);

impl Msg {
    /// Normal wake-up.
    pub const OK: Msg = Msg(0);
    /// The wait timed out.
    pub const TIMEOUT: Msg = Msg(-1);
    /// The object the thread was waiting on has been reset.
    pub const RESET: Msg = Msg(-2);

    /// Wrap a raw message value.
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    /// Raw message value.
    pub const fn value(self) -> i32 {
        self.0
    }

    /// `true` for every non-failure message, including user values.
    pub const fn is_ok(self) -> bool {
        self.0 >= 0
    }

    /// Convert a failure message into a [`WaitError`].
    ///
    /// Negative values other than [`Msg::TIMEOUT`] are treated as a reset.
    pub fn into_result(self) -> Result<Msg, WaitError> {
        match self {
            Msg::TIMEOUT => Err(WaitError::Timeout),
            m if m.0 < 0 => Err(WaitError::Reset),
            m => Ok(m),
        }
    }
}

impl From<i32> for Msg {
    fn from(value: i32) -> Self {
        Msg(value)
    }
}

impl From<WaitError> for Msg {
    fn from(error: WaitError) -> Self {
        match error {
            WaitError::Timeout => Msg::TIMEOUT,
            WaitError::Reset => Msg::RESET,
        }
    }
}

/// Recoverable outcome of a blocking operation that did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitError {
    /// The timeout expired before the condition was satisfied.
    Timeout,
    /// The object was reset while waiting; the caller must resynchronize.
    Reset,
}

/// Errors that can occur while creating a dynamic thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// The heap has no free block large enough
    OutOfMemory,
    /// The memory pool has no free object
    PoolExhausted,
    /// The requested working area cannot hold a thread
    InvalidStackSize(usize),
}

/// Unified error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Blocking operation failed
    Wait(WaitError),
    /// Thread creation failed
    Spawn(SpawnError),
}

impl fmt::Display for Msg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Msg::OK => write!(f, "MSG_OK"),
            Msg::TIMEOUT => write!(f, "MSG_TIMEOUT"),
            Msg::RESET => write!(f, "MSG_RESET"),
            Msg(v) => write!(f, "msg({})", v),
        }
    }
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitError::Timeout => write!(f, "Wait timed out"),
            WaitError::Reset => write!(f, "Object was reset while waiting"),
        }
    }
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::OutOfMemory => write!(f, "Out of heap memory for thread creation"),
            SpawnError::PoolExhausted => write!(f, "Memory pool exhausted"),
            SpawnError::InvalidStackSize(size) => write!(f, "Invalid working area size: {}", size),
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::Wait(e) => write!(f, "Wait error: {}", e),
            KernelError::Spawn(e) => write!(f, "Thread spawn error: {}", e),
        }
    }
}

impl From<WaitError> for KernelError {
    fn from(error: WaitError) -> Self {
        KernelError::Wait(error)
    }
}

impl From<SpawnError> for KernelError {
    fn from(error: SpawnError) -> Self {
        KernelError::Spawn(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_msg_into_result() {
        assert_eq!(Msg::OK.into_result(), Ok(Msg::OK));
        assert_eq!(Msg::new(42).into_result(), Ok(Msg::new(42)));
        assert_eq!(Msg::TIMEOUT.into_result(), Err(WaitError::Timeout));
        assert_eq!(Msg::RESET.into_result(), Err(WaitError::Reset));
        assert_eq!(Msg::new(-7).into_result(), Err(WaitError::Reset));
    }

    #[test]
    fn test_error_conversions() {
        let e: KernelError = SpawnError::PoolExhausted.into();
        assert_eq!(e, KernelError::Spawn(SpawnError::PoolExhausted));
        assert_eq!(Msg::from(WaitError::Timeout), Msg::TIMEOUT);
        assert_eq!(
            KernelError::from(WaitError::Reset).to_string(),
            "Wait error: Object was reset while waiting"
        );
        assert_eq!(Msg::new(3).to_string(), "msg(3)");
    }
}
