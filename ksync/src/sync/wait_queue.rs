//! # Wait queue.
//!
//! A [`WaitQueue`] is a named collection of parked threads. It never lives
//! on its own: it is a field of the state a [`SpinLock`] protects, so the
//! only way to reach it is through that lock's guard. This is what makes the
//! queue's central operation safe.
//!
//! [`WaitQueue::sleep`] consumes the guard. It publishes the calling thread
//! on the queue *while the guard is still held*, then releases the guard and
//! parks. Anyone who changes the condition the sleeper waits for must take
//! the same guard to wake it, so a wakeup either happens before the sleeper
//! checked the condition (and the sleeper sees the new state) or after the
//! sleeper is on the queue (and the wakeup reaches it). No wakeup is lost.
//!
//! The guard is **not** reacquired on return. Callers that need the
//! protected state again lock it again and re-check their condition.
//!
//! Waking order is unspecified. [`WaitQueue::wake_one`] resumes some sleeper,
//! not necessarily the one that slept first.
//!
//! [`SpinLock`]: kcore::sync::SpinLock

use kcore::{
    interrupt,
    sync::SpinLockGuard,
    thread::{Current, ParkHandle},
};
use std::collections::VecDeque;

/// A named queue of parked threads.
pub struct WaitQueue {
    name: &'static str,
    sleepers: VecDeque<ParkHandle>,
}

impl WaitQueue {
    /// Creates an empty wait queue.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            sleepers: VecDeque::new(),
        }
    }

    /// The name of this queue.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of parked threads.
    pub fn len(&self) -> usize {
        self.sleepers.len()
    }

    /// Returns true if no thread is parked on the queue.
    pub fn is_empty(&self) -> bool {
        self.sleepers.is_empty()
    }

    /// Parks the current thread on the queue that `queue` selects in the
    /// state `guard` protects, and releases `guard`.
    ///
    /// Enqueueing, releasing and parking are one indivisible step with
    /// respect to every other holder of the guard.
    ///
    /// # Panics
    /// Panics if called from an interrupt handler, or if the current thread
    /// holds any spinlock other than `guard`.
    pub fn sleep<T, F>(mut guard: SpinLockGuard<'_, T>, queue: F)
    where
        F: FnOnce(&mut T) -> &mut WaitQueue,
    {
        if interrupt::in_handler() {
            guard.unlock();
            panic!("WaitQueue::sleep called from an interrupt handler.");
        }
        Current::park_with(move |handle| {
            queue(&mut *guard).sleepers.push_back(handle);
            guard.unlock();
        });
    }

    /// Resumes one parked thread, if any.
    ///
    /// Returns true if a thread was resumed.
    pub fn wake_one(&mut self) -> bool {
        match self.sleepers.pop_front() {
            Some(handle) => {
                handle.unpark();
                true
            }
            None => false,
        }
    }

    /// Resumes every parked thread and returns how many were resumed.
    pub fn wake_all(&mut self) -> usize {
        let n = self.sleepers.len();
        for handle in self.sleepers.drain(..) {
            handle.unpark();
        }
        n
    }
}

impl Drop for WaitQueue {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            assert!(
                self.sleepers.is_empty(),
                "WaitQueue `{}` destroyed with {} parked threads.",
                self.name,
                self.sleepers.len()
            );
        }
    }
}
