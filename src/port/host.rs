//! Hosted port: kernel threads backed by std threads.
//!
//! Every kernel thread gets its own std thread, but only the holder of the
//! baton runs; all the others are parked on a condition variable. A context
//! switch passes the baton and parks the caller until it gets the baton back,
//! which reproduces the single-CPU execution model on a host.

extern crate std;

use std::boxed::Box;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use super::{Port, ThreadBody};
use crate::mem::WorkingArea;
use crate::thread::ThreadId;

std::thread_local! {
    /// Kernel thread backed by the calling std thread.
    static CONTEXT: Cell<Option<ThreadId>> = const { Cell::new(None) };
}

/// Unwinding payload used to abandon the std thread of an exited kernel thread.
struct ThreadExited;

struct Baton {
    running: Mutex<Option<ThreadId>>,
    turn: Condvar,
}

impl Baton {
    fn pass(&self, to: ThreadId) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        *running = Some(to);
        self.turn.notify_all();
    }

    fn wait_turn(&self, id: ThreadId) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        while *running != Some(id) {
            running = self.turn.wait(running).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Port running the kernel on top of the host operating system.
#[derive(Clone)]
pub struct HostPort {
    baton: Arc<Baton>,
}

impl HostPort {
    pub fn new() -> Self {
        Self {
            baton: Arc::new(Baton {
                running: Mutex::new(None),
                turn: Condvar::new(),
            }),
        }
    }
}

impl Default for HostPort {
    fn default() -> Self {
        Self::new()
    }
}

impl Port for HostPort {
    fn name(&self) -> &'static str {
        "host"
    }

    fn adopt(&self, id: ThreadId) {
        CONTEXT.with(|context| context.set(Some(id)));
        self.baton.pass(id);
    }

    fn spawn(&self, id: ThreadId, name: &'static str, _area: WorkingArea, body: ThreadBody) {
        let baton = Arc::clone(&self.baton);
        let spawned = std::thread::Builder::new()
            .name(std::format!("{}#{}", name, id))
            .spawn(move || {
                CONTEXT.with(|context| context.set(Some(id)));
                baton.wait_turn(id);
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(body)) {
                    if !payload.is::<ThreadExited>() {
                        // The baton is lost with this thread, nothing else can run.
                        log::error!("kernel thread {} panicked", id);
                        std::eprintln!("kernel thread {} panicked, aborting", id);
                        std::process::abort();
                    }
                }
            });
        if let Err(e) = spawned {
            panic!("host port: cannot create context for thread {}: {}", id, e);
        }
    }

    fn switch(&self, from: ThreadId, to: ThreadId) {
        self.baton.pass(to);
        self.baton.wait_turn(from);
    }

    fn exit(&self, from: ThreadId, to: ThreadId) -> ! {
        let _ = from;
        self.baton.pass(to);
        panic::resume_unwind(Box::new(ThreadExited))
    }

    fn is_running(&self, id: ThreadId) -> bool {
        CONTEXT.with(|context| context.get()) == Some(id)
    }
}
