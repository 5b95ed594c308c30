//! # Semaphore.
//!
//! A **semaphore** regulates concurrent access to a finite set of resources.
//! It maintains a count of available "permits"; each permit grants a thread
//! the right to use the resource the semaphore guards.
//!
//! The count and the queue of threads waiting for a permit live together
//! behind one [`SpinLock`]:
//!
//! - [`Semaphore::wait`] (P) takes a permit. While the count is zero it
//!   sleeps on the queue, and re-checks the count every time it is woken.
//! - [`Semaphore::signal`] (V) returns a permit and wakes one waiter.
//! - [`SemaphorePermits`] is an RAII permit that calls `signal()` when
//!   dropped. `core::mem::forget` keeps the permit taken.
//!
//! The count is never negative, and at every observation it equals the
//! initial permits plus completed signals minus completed waits.
//!
//! Waiters are not served in arrival order. A thread that calls `wait` while
//! a permit is free takes it even if others have been waiting longer.
//!
//! #### Usage Example
//!
//! ```rust
//! use ksync::sync::Semaphore;
//!
//! let sema = Semaphore::new(3, ()); // Allows up to 3 concurrent threads.
//!
//! let permit = sema.wait();
//! assert_eq!(sema.count(), 2);
//! drop(permit);
//! assert_eq!(sema.count(), 3);
//! ```
//!
//! [`SpinLock`]: kcore::sync::SpinLock

use super::WaitQueue;
use kcore::{
    interrupt,
    sync::{SpinLock, WouldBlock},
};
use std::ops::Deref;

struct SemaphoreState {
    count: usize,
    waiters: WaitQueue,
}

/// Counting semaphore combined with the resource it guards.
pub struct Semaphore<T> {
    name: &'static str,
    state: SpinLock<SemaphoreState>,
    resource: T,
}

impl<T> Semaphore<T> {
    /// Creates a new semaphore with `permits` permits guarding `resource`.
    pub const fn new(permits: usize, resource: T) -> Self {
        Self::named("semaphore", permits, resource)
    }

    /// Creates a new named semaphore.
    pub const fn named(name: &'static str, permits: usize, resource: T) -> Self {
        Self {
            name,
            state: SpinLock::new(SemaphoreState {
                count: permits,
                waiters: WaitQueue::new(name),
            }),
            resource,
        }
    }

    /// The name of this semaphore.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Takes a permit, sleeping until one is available.
    ///
    /// # Panics
    /// Panics if called from an interrupt handler or while holding a
    /// spinlock.
    #[track_caller]
    pub fn wait(&self) -> SemaphorePermits<'_, T> {
        interrupt::assert_blockable("Semaphore::wait");
        loop {
            let mut state = self.state.lock();
            if state.count > 0 {
                state.count -= 1;
                state.unlock();
                return SemaphorePermits { sema: self };
            }
            WaitQueue::sleep(state, |s| &mut s.waiters);
        }
    }

    /// Takes a permit if one is available right now.
    ///
    /// # Errors
    /// Returns [`WouldBlock`] if the count is zero.
    pub fn try_wait(&self) -> Result<SemaphorePermits<'_, T>, WouldBlock> {
        let mut state = self.state.lock();
        let result = if state.count > 0 {
            state.count -= 1;
            Ok(SemaphorePermits { sema: self })
        } else {
            Err(WouldBlock)
        };
        state.unlock();
        result
    }

    /// Returns a permit and wakes one waiting thread.
    pub fn signal(&self) {
        let mut state = self.state.lock();
        state.count = state
            .count
            .checked_add(1)
            .unwrap_or_else(|| panic!("Semaphore `{}` count overflow.", self.name));
        state.waiters.wake_one();
        state.unlock();
    }

    /// Number of available permits.
    pub fn count(&self) -> usize {
        let state = self.state.lock();
        let count = state.count;
        state.unlock();
        count
    }
}

/// An RAII permit of a [`Semaphore`].
///
/// The permit gives access to the guarded resource and returns itself to the
/// semaphore when dropped.
pub struct SemaphorePermits<'a, T> {
    sema: &'a Semaphore<T>,
}

impl<T> Deref for SemaphorePermits<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.sema.resource
    }
}

impl<T> Drop for SemaphorePermits<'_, T> {
    fn drop(&mut self) {
        self.sema.signal();
    }
}
