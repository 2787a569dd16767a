//! Scheduler-aware shared/exclusive lock.
//!
//! [`Lock`] lets many holders share a resource or one holder own it. Contended callers go to
//! sleep through the [`Scheduler`] instead of spinning. A thread asking for exclusive access
//! while readers are inside marks the lock as upgrading; from then on new readers are only
//! admitted if the scheduler says they deserve the lock ahead of the waiting writer, which
//! keeps a steady stream of readers from starving it. When the last reader leaves, the lock
//! passes straight to the upgrader and only that thread is woken.
//!
//! The lock protects no data of its own. Its state lives behind a `spin::Mutex` interlock
//! that is only held for the length of a state transition.

use core::fmt;

/// Identifies what a sleeping thread is waiting for.
///
/// A lock uses its own address, so a channel is only meaningful while the lock stays put,
/// which borrowing guarantees for every waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaitChannel(usize);

impl WaitChannel {
    /// Returns the channel identified by the address of `object`.
    pub fn of<T>(object: &T) -> Self {
        Self(object as *const T as usize)
    }
}

/// Which sleepers on a channel a wake-up is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake<T> {
    /// Every thread sleeping on the channel.
    All,
    /// Only the given thread, if it sleeps on the channel.
    Thread(T),
}

/// The services a [`Lock`] needs from the thread scheduler.
pub trait Scheduler: Sync {
    /// Handle of a schedulable thread.
    type Thread: Copy + Eq + fmt::Debug + Send;

    /// Returns the calling thread.
    fn current(&self) -> Self::Thread;

    /// Puts the calling thread to sleep on `channel` and releases `guard`.
    ///
    /// The thread must be registered as a sleeper before `guard` is dropped, so that a
    /// wake-up issued by whoever takes the guard next cannot be lost. Returns after a
    /// matching [`wake`](Scheduler::wake); callers must re-check their condition since other
    /// threads may have run in between. `interruptible` sleeps may also return early.
    fn sleep<G>(&self, channel: WaitChannel, guard: G, interruptible: bool);

    /// Wakes sleepers on `channel`.
    fn wake(&self, channel: WaitChannel, wake: Wake<Self::Thread>);

    /// Returns true if `candidate` should get the lock before `incumbent`.
    fn deserve(&self, candidate: Self::Thread, incumbent: Self::Thread) -> bool;
}

/// The state of a [`Lock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState<T> {
    /// Nobody holds the lock.
    Free,
    /// `count` threads hold the lock shared.
    Shared { count: usize },
    /// `owner` holds the lock exclusively.
    Exclusive { owner: T },
    /// `count` threads hold the lock shared and `candidate` waits to take it exclusively.
    ExclusiveUpgrade { candidate: T, count: usize },
}

/// A shared/exclusive lock that sleeps through a [`Scheduler`].
pub struct Lock<'s, S: Scheduler> {
    scheduler: &'s S,
    state: spin::Mutex<LockState<S::Thread>>,
}

impl<'s, S: Scheduler> Lock<'s, S> {
    /// Creates a free lock.
    pub const fn new(scheduler: &'s S) -> Self {
        Self {
            scheduler,
            state: spin::Mutex::new(LockState::Free),
        }
    }

    /// Returns a snapshot of the lock state.
    pub fn state(&self) -> LockState<S::Thread> {
        *self.state.lock()
    }

    fn channel(&self) -> WaitChannel {
        WaitChannel::of(self)
    }

    /// Takes the lock exclusively, sleeping until it is available.
    pub fn acquire_exclusive(&self) {
        let me = self.scheduler.current();

        loop {
            let mut state = self.state.lock();
            match *state {
                LockState::Free => {
                    *state = LockState::Exclusive { owner: me };
                    return;
                }
                // Handed over by the last reader.
                LockState::Exclusive { owner } if owner == me => return,
                LockState::Exclusive { .. } => {}
                LockState::Shared { count } => {
                    log::trace!("{:?} waits to upgrade past {} readers", me, count);
                    *state = LockState::ExclusiveUpgrade {
                        candidate: me,
                        count,
                    };
                }
                LockState::ExclusiveUpgrade { candidate, count } => {
                    if candidate != me && self.scheduler.deserve(me, candidate) {
                        log::trace!("{:?} replaces {:?} as upgrade candidate", me, candidate);
                        *state = LockState::ExclusiveUpgrade {
                            candidate: me,
                            count,
                        };
                    }
                }
            }
            self.scheduler.sleep(self.channel(), state, false);
        }
    }

    /// Takes the lock shared, sleeping while it is held exclusively or while an upgrade is
    /// pending that the caller does not deserve to overtake.
    pub fn acquire_shared(&self) {
        let me = self.scheduler.current();

        loop {
            let mut state = self.state.lock();
            if self.admit_shared(me, &mut state) {
                return;
            }
            self.scheduler.sleep(self.channel(), state, false);
        }
    }

    /// Takes the lock exclusively if it is free.
    pub fn try_acquire_exclusive(&self) -> bool {
        let mut state = self.state.lock();
        if *state == LockState::Free {
            *state = LockState::Exclusive {
                owner: self.scheduler.current(),
            };
            true
        } else {
            false
        }
    }

    /// Takes the lock shared if that is possible without sleeping.
    pub fn try_acquire_shared(&self) -> bool {
        let me = self.scheduler.current();
        self.admit_shared(me, &mut self.state.lock())
    }

    fn admit_shared(&self, me: S::Thread, state: &mut LockState<S::Thread>) -> bool {
        match *state {
            LockState::Free => *state = LockState::Shared { count: 1 },
            LockState::Shared { count } => *state = LockState::Shared { count: count + 1 },
            LockState::ExclusiveUpgrade { candidate, count }
                if self.scheduler.deserve(me, candidate) =>
            {
                *state = LockState::ExclusiveUpgrade {
                    candidate,
                    count: count + 1,
                }
            }
            LockState::Exclusive { .. } | LockState::ExclusiveUpgrade { .. } => return false,
        }
        true
    }

    /// Releases exclusive ownership and wakes every waiter.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread does not own the lock exclusively.
    pub fn release_exclusive(&self) {
        let me = self.scheduler.current();
        let mut state = self.state.lock();
        match *state {
            LockState::Exclusive { owner } if owner == me => *state = LockState::Free,
            other => panic!(
                "{:?} released a lock it does not own exclusively: {:?}",
                me, other
            ),
        }
        drop(state);

        self.scheduler.wake(self.channel(), Wake::All);
    }

    /// Releases one shared hold.
    ///
    /// When the last reader leaves while an upgrade is pending, the lock goes to the upgrade
    /// candidate and only that thread is woken. Otherwise everyone is woken.
    ///
    /// # Panics
    ///
    /// Panics if the lock is not held shared.
    pub fn release_shared(&self) {
        let mut state = self.state.lock();
        let wake = match *state {
            LockState::Shared { count: 1 } => {
                *state = LockState::Free;
                Some(Wake::All)
            }
            LockState::Shared { count } if count > 1 => {
                *state = LockState::Shared { count: count - 1 };
                None
            }
            LockState::ExclusiveUpgrade {
                candidate,
                count: 1,
            } => {
                log::trace!("handing lock over to {:?}", candidate);
                *state = LockState::Exclusive { owner: candidate };
                Some(Wake::Thread(candidate))
            }
            LockState::ExclusiveUpgrade { candidate, count } if count > 1 => {
                *state = LockState::ExclusiveUpgrade {
                    candidate,
                    count: count - 1,
                };
                None
            }
            other => panic!("shared release of a lock not held shared: {:?}", other),
        };
        drop(state);

        if let Some(wake) = wake {
            self.scheduler.wake(self.channel(), wake);
        }
    }

    /// Takes the lock exclusively and returns a guard that releases it on drop.
    pub fn exclusive(&self) -> ExclusiveGuard<'_, 's, S> {
        self.acquire_exclusive();
        ExclusiveGuard { lock: self }
    }

    /// Takes the lock shared and returns a guard that releases it on drop.
    pub fn shared(&self) -> SharedGuard<'_, 's, S> {
        self.acquire_shared();
        SharedGuard { lock: self }
    }

    /// Takes the lock exclusively if it is free, returning a guard on success.
    pub fn try_exclusive(&self) -> Option<ExclusiveGuard<'_, 's, S>> {
        self.try_acquire_exclusive()
            .then(|| ExclusiveGuard { lock: self })
    }

    /// Takes the lock shared if that is possible without sleeping, returning a guard on success.
    pub fn try_shared(&self) -> Option<SharedGuard<'_, 's, S>> {
        self.try_acquire_shared()
            .then(|| SharedGuard { lock: self })
    }
}

impl<S: Scheduler> fmt::Debug for Lock<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("state", &self.state())
            .finish()
    }
}

/// Exclusive hold on a [`Lock`], released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ExclusiveGuard<'a, 's, S: Scheduler> {
    lock: &'a Lock<'s, S>,
}

impl<S: Scheduler> Drop for ExclusiveGuard<'_, '_, S> {
    fn drop(&mut self) {
        self.lock.release_exclusive();
    }
}

/// Shared hold on a [`Lock`], released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct SharedGuard<'a, 's, S: Scheduler> {
    lock: &'a Lock<'s, S>,
}

impl<S: Scheduler> Drop for SharedGuard<'_, '_, S> {
    fn drop(&mut self) {
        self.lock.release_shared();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread::{self, ThreadId};

    use super::*;
    use crate::sync::HostScheduler;

    fn wait_until(mut condition: impl FnMut() -> bool) {
        while !condition() {
            thread::yield_now();
        }
    }

    fn sleeping(
        scheduler: &HostScheduler,
        lock: &Lock<'_, HostScheduler>,
        thread: ThreadId,
    ) -> bool {
        scheduler.sleepers(WaitChannel::of(lock)).contains(&thread)
    }

    #[test]
    fn exclusive_round_trip() {
        let scheduler = HostScheduler::new();
        let lock = Lock::new(&scheduler);
        let me = thread::current().id();

        lock.acquire_exclusive();
        assert_eq!(lock.state(), LockState::Exclusive { owner: me });
        lock.release_exclusive();
        assert_eq!(lock.state(), LockState::Free);
    }

    #[test]
    fn shared_counts_holders() {
        let scheduler = HostScheduler::new();
        let lock = Lock::new(&scheduler);

        let a = lock.shared();
        let b = lock.shared();
        assert_eq!(lock.state(), LockState::Shared { count: 2 });
        drop(a);
        assert_eq!(lock.state(), LockState::Shared { count: 1 });
        drop(b);
        assert_eq!(lock.state(), LockState::Free);
    }

    #[test]
    fn try_variants_do_not_change_state_on_failure() {
        let scheduler = HostScheduler::new();
        let lock = Lock::new(&scheduler);

        let reader = lock.try_shared().unwrap();
        assert!(lock.try_exclusive().is_none());
        assert_eq!(lock.state(), LockState::Shared { count: 1 });
        drop(reader);

        let writer = lock.try_exclusive().unwrap();
        assert!(!lock.try_acquire_shared());
        assert!(!lock.try_acquire_exclusive());
        assert_eq!(
            lock.state(),
            LockState::Exclusive {
                owner: thread::current().id()
            }
        );
        drop(writer);
        assert_eq!(lock.state(), LockState::Free);
    }

    #[test]
    #[should_panic(expected = "does not own exclusively")]
    fn release_exclusive_by_non_owner_panics() {
        let scheduler = HostScheduler::new();
        let lock = Lock::new(&scheduler);
        thread::scope(|s| {
            s.spawn(|| lock.acquire_exclusive()).join().unwrap();
        });
        lock.release_exclusive();
    }

    #[test]
    #[should_panic(expected = "not held shared")]
    fn unbalanced_shared_release_panics() {
        let scheduler = HostScheduler::new();
        let lock = Lock::new(&scheduler);
        lock.release_shared();
    }

    #[test]
    fn upgrade_hands_off_to_candidate_only() {
        let scheduler = HostScheduler::new();
        let lock = Lock::new(&scheduler);
        let order = std::sync::Mutex::new(Vec::new());

        lock.acquire_shared();
        thread::scope(|s| {
            let writer = s.spawn(|| {
                scheduler.set_runtime(scheduler.current(), 10);
                lock.acquire_exclusive();
                order.lock().unwrap().push("writer");
                lock.release_exclusive();
            });
            let writer_id = writer.thread().id();
            wait_until(|| sleeping(&scheduler, &lock, writer_id));
            assert_eq!(
                lock.state(),
                LockState::ExclusiveUpgrade {
                    candidate: writer_id,
                    count: 1
                }
            );

            // A reader with more accumulated runtime must wait behind the upgrade.
            let late = s.spawn(|| {
                scheduler.set_runtime(scheduler.current(), 50);
                lock.acquire_shared();
                order.lock().unwrap().push("late reader");
                lock.release_shared();
            });
            let late_id = late.thread().id();
            wait_until(|| sleeping(&scheduler, &lock, late_id));

            // A reader that deserves the lock is admitted while the upgrade is pending.
            s.spawn(|| {
                scheduler.set_runtime(scheduler.current(), 1);
                assert!(lock.try_acquire_shared());
                lock.release_shared();
            })
            .join()
            .unwrap();
            assert_eq!(
                lock.state(),
                LockState::ExclusiveUpgrade {
                    candidate: writer_id,
                    count: 1
                }
            );

            lock.release_shared();
            assert!(!sleeping(&scheduler, &lock, writer_id));
            assert!(sleeping(&scheduler, &lock, late_id) || !order.lock().unwrap().is_empty());

            writer.join().unwrap();
            late.join().unwrap();
        });

        assert_eq!(*order.lock().unwrap(), vec!["writer", "late reader"]);
        assert_eq!(lock.state(), LockState::Free);
    }

    #[test]
    fn release_shared_wakes_only_the_upgrader() {
        let scheduler = HostScheduler::new();
        let lock = Lock::new(&scheduler);

        let inspected = AtomicBool::new(false);

        lock.acquire_shared();
        thread::scope(|s| {
            let writer = s.spawn(|| {
                scheduler.set_runtime(scheduler.current(), 10);
                let guard = lock.exclusive();
                // Holds the lock until the main thread has inspected the sleepers.
                wait_until(|| inspected.load(Ordering::SeqCst));
                drop(guard);
            });
            let writer_id = writer.thread().id();
            wait_until(|| sleeping(&scheduler, &lock, writer_id));

            let reader = s.spawn(|| {
                scheduler.set_runtime(scheduler.current(), 20);
                drop(lock.shared());
            });
            let reader_id = reader.thread().id();
            wait_until(|| sleeping(&scheduler, &lock, reader_id));

            lock.release_shared();
            assert_eq!(lock.state(), LockState::Exclusive { owner: writer_id });
            assert_eq!(scheduler.sleepers(WaitChannel::of(&lock)), vec![reader_id]);
            inspected.store(true, Ordering::SeqCst);

            writer.join().unwrap();
            reader.join().unwrap();
        });
        assert_eq!(lock.state(), LockState::Free);
    }

    #[test]
    fn deserving_reader_joins_pending_upgrade() {
        let scheduler = HostScheduler::new();
        let lock = Lock::new(&scheduler);
        let admitted = AtomicBool::new(false);

        lock.acquire_shared();
        thread::scope(|s| {
            let writer = s.spawn(|| {
                scheduler.set_runtime(scheduler.current(), 10);
                drop(lock.exclusive());
            });
            let writer_id = writer.thread().id();
            wait_until(|| sleeping(&scheduler, &lock, writer_id));

            s.spawn({
                let (scheduler, lock, admitted) = (&scheduler, &lock, &admitted);
                move || {
                    scheduler.set_runtime(scheduler.current(), 1);
                    let guard = lock.shared();
                    assert_eq!(
                        lock.state(),
                        LockState::ExclusiveUpgrade {
                            candidate: writer_id,
                            count: 2
                        }
                    );
                    admitted.store(true, Ordering::SeqCst);
                    drop(guard);
                }
            })
            .join()
            .unwrap();

            assert!(admitted.load(Ordering::SeqCst));
            assert!(sleeping(&scheduler, &lock, writer_id));
            assert_eq!(
                lock.state(),
                LockState::ExclusiveUpgrade {
                    candidate: writer_id,
                    count: 1
                }
            );

            lock.release_shared();
            writer.join().unwrap();
        });
        assert_eq!(lock.state(), LockState::Free);
    }

    #[test]
    fn deserving_writer_replaces_candidate() {
        let scheduler = HostScheduler::new();
        let lock = Lock::new(&scheduler);

        lock.acquire_shared();
        thread::scope(|s| {
            let slow = s.spawn(|| {
                scheduler.set_runtime(scheduler.current(), 30);
                drop(lock.exclusive());
            });
            let slow_id = slow.thread().id();
            wait_until(|| sleeping(&scheduler, &lock, slow_id));

            let fast = s.spawn(|| {
                scheduler.set_runtime(scheduler.current(), 5);
                drop(lock.exclusive());
            });
            let fast_id = fast.thread().id();
            wait_until(|| sleeping(&scheduler, &lock, fast_id));

            assert_eq!(
                lock.state(),
                LockState::ExclusiveUpgrade {
                    candidate: fast_id,
                    count: 1
                }
            );

            lock.release_shared();
            slow.join().unwrap();
            fast.join().unwrap();
        });
        assert_eq!(lock.state(), LockState::Free);
    }

    #[test]
    fn writers_exclude_each_other() {
        let scheduler = HostScheduler::new();
        let lock = Lock::new(&scheduler);
        let inside = AtomicUsize::new(0);
        let total = AtomicUsize::new(0);

        thread::scope(|s| {
            for i in 0..8 {
                let (lock, scheduler, inside, total) = (&lock, &scheduler, &inside, &total);
                s.spawn(move || {
                    scheduler.set_runtime(scheduler.current(), i);
                    for round in 0..200 {
                        if round % 3 == 0 {
                            let _guard = lock.exclusive();
                            assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                            total.fetch_add(1, Ordering::SeqCst);
                            inside.fetch_sub(1, Ordering::SeqCst);
                        } else {
                            let _guard = lock.shared();
                            assert!(!matches!(lock.state(), LockState::Exclusive { .. }));
                        }
                    }
                });
            }
        });

        assert_eq!(total.load(Ordering::SeqCst), 8 * 67);
        assert_eq!(lock.state(), LockState::Free);
    }
}
