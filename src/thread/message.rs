//! Synchronous messages.
//!
//! A sender blocks until the receiver picks its message up and answers it.
//! Senders are served in FIFO order.

use crate::errors::Msg;
use crate::kernel::Kernel;
use crate::thread::{ThreadId, ThreadState};

impl Kernel {
    /// Send `msg` to thread `to` and wait for the answer.
    pub fn send(&self, to: ThreadId, msg: Msg) -> Msg {
        let mut sys = self.lock();
        let core = sys.core();
        let me = core.current_id();
        debug_assert!(to != me, "thread {} sending to itself", me);

        core.tcb_mut(me).sent_msg = msg;
        let receiver = core.tcb_mut(to);
        receiver.msg_queue.push_back(me);
        if receiver.state == ThreadState::WtMsg {
            core.wake_i(to, Msg::OK);
        }
        sys.go_sleep_s(ThreadState::SndMsgQ)
    }

    /// Wait for a message; returns the sender, which stays blocked until
    /// [`Kernel::release_message`].
    pub fn wait_message(&self) -> ThreadId {
        let mut sys = self.lock();
        let me = sys.current();
        if sys.core().tcb(me).msg_queue.is_empty() {
            sys.go_sleep_s(ThreadState::WtMsg);
        }
        let core = sys.core();
        match core.tcb_mut(me).msg_queue.pop_front() {
            Some(sender) => {
                core.tcb_mut(sender).state = ThreadState::SndMsg;
                sender
            }
            None => unreachable!("woken without a message"),
        }
    }

    /// Message carried by `sender`, which must be waiting for an answer.
    pub fn message_of(&self, sender: ThreadId) -> Msg {
        let sys = self.lock();
        let tcb = sys.core_ref().tcb(sender);
        debug_assert!(tcb.state == ThreadState::SndMsg, "thread {} has no pending message", sender);
        tcb.sent_msg
    }

    /// Answer the message of `sender` and resume it.
    pub fn release_message(&self, sender: ThreadId, answer: Msg) {
        let mut sys = self.lock();
        debug_assert!(
            sys.core_ref().tcb(sender).state == ThreadState::SndMsg,
            "thread {} has no pending message",
            sender
        );
        sys.wakeup_s(sender, answer);
    }

    /// `true` if a message is queued for the calling thread.
    pub fn is_message_pending(&self) -> bool {
        let sys = self.lock();
        let core = sys.core_ref();
        !core.tcb(core.current_id()).msg_queue.is_empty()
    }
}
