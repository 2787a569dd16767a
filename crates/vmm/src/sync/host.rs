//! A scheduler backed by host threads.
//!
//! Used by the test suite and the software-emulated kernel. Sleepers park on a condition
//! variable and stay listed in a waiter table until a wake-up removes their entry.
//! Fairness follows a virtual runtime that callers assign per thread; a thread deserves a
//! contended lock ahead of another if it has run for less.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};
use std::vec::Vec;

use super::lock::{Scheduler, WaitChannel, Wake};

#[derive(Debug)]
struct Waiter {
    channel: WaitChannel,
    thread: ThreadId,
}

/// A [`Scheduler`] for `std` threads.
#[derive(Debug, Default)]
pub struct HostScheduler {
    waiters: Mutex<Vec<Waiter>>,
    wakeup: Condvar,
    runtimes: Mutex<HashMap<ThreadId, u64>>,
}

impl HostScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the virtual runtime of `thread`. Threads start at zero.
    pub fn set_runtime(&self, thread: ThreadId, runtime: u64) {
        self.runtimes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(thread, runtime);
    }

    /// Returns the virtual runtime of `thread`.
    pub fn runtime(&self, thread: ThreadId) -> u64 {
        self.runtimes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&thread)
            .copied()
            .unwrap_or(0)
    }

    /// Returns the threads currently asleep on `channel`, in the order they went to sleep.
    pub fn sleepers(&self, channel: WaitChannel) -> Vec<ThreadId> {
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|waiter| waiter.channel == channel)
            .map(|waiter| waiter.thread)
            .collect()
    }
}

impl Scheduler for HostScheduler {
    type Thread = ThreadId;

    fn current(&self) -> ThreadId {
        thread::current().id()
    }

    fn sleep<G>(&self, channel: WaitChannel, guard: G, _interruptible: bool) {
        let me = self.current();
        let mut waiters = self.waiters.lock().unwrap_or_else(PoisonError::into_inner);
        waiters.push(Waiter {
            channel,
            thread: me,
        });
        drop(guard);

        while waiters.iter().any(|waiter| waiter.thread == me) {
            waiters = self
                .wakeup
                .wait(waiters)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn wake(&self, channel: WaitChannel, wake: Wake<ThreadId>) {
        let mut waiters = self.waiters.lock().unwrap_or_else(PoisonError::into_inner);
        let before = waiters.len();
        waiters.retain(|waiter| {
            let selected = match wake {
                Wake::All => true,
                Wake::Thread(thread) => waiter.thread == thread,
            };
            !(selected && waiter.channel == channel)
        });

        if waiters.len() != before {
            log::trace!("woke {} threads on {:?}", before - waiters.len(), channel);
            self.wakeup.notify_all();
        }
    }

    fn deserve(&self, candidate: ThreadId, incumbent: ThreadId) -> bool {
        self.runtime(candidate) < self.runtime(incumbent)
    }
}
