//! Synchronization primitives that cooperate with the scheduler.

#[cfg(any(test, feature = "software-emulation"))]
mod host;
mod lock;

#[cfg(any(test, feature = "software-emulation"))]
pub use host::HostScheduler;
pub use lock::{ExclusiveGuard, Lock, LockState, Scheduler, SharedGuard, WaitChannel, Wake};
