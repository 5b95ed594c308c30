//! # Condition Variable.
//!
//! A **Condition Variable** lets a thread block until some state guarded by
//! an [`ExclusiveLock`] changes, without consuming CPU cycles. The lock is
//! supplied by the caller on every call; together they form a monitor.
//!
//! ## Monitor discipline
//!
//! - [`ConditionVariable::wait`] takes the caller's [`LockGuard`], releases
//!   the lock, sleeps, and reacquires the lock before returning the guard.
//! - [`ConditionVariable::signal`] and [`ConditionVariable::broadcast`] also
//!   take the guard, so they can only be called by the lock's holder. They
//!   wake one or all waiters and then release the lock. A signaller that
//!   still has work to do in the critical section locks it again.
//!
//! Releasing the lock and going to sleep are bracketed by the variable's own
//! spinlock. A signaller has to hold the lock and then that spinlock, so it
//! either runs before the waiter released the lock (and the waiter will see
//! the new state when it re-checks) or after the waiter is queued (and the
//! wakeup reaches it). No signal sent after the release is lost.
//!
//! The variable remembers which lock its queued waiters used. Using a
//! different lock while waiters are queued panics.
//!
//! [`ConditionVariable::wait_while`] runs the usual check-and-sleep loop:
//!
//! ```rust
//! # use ksync::sync::{ConditionVariable, ExclusiveLock};
//! # let lock = ExclusiveLock::new(1);
//! # let condvar = ConditionVariable::new();
//! let guard = condvar.wait_while(&lock, |count| *count == 0);
//! guard.unlock();
//! ```

use super::{ExclusiveLock, LockGuard, WaitQueue};
use kcore::{interrupt, sync::SpinLock};

struct CvState {
    waiters: WaitQueue,
    // Address of the lock the queued waiters released.
    bound: Option<usize>,
}

/// A Condition Variable
///
/// Condition variables represent the ability to block a thread such that it
/// consumes no CPU time while waiting for an event to occur. Condition
/// variables are typically associated with a boolean predicate (a condition)
/// and a lock. The predicate is always verified inside of the lock before
/// determining that a thread must block.
///
/// Waiters are not woken in arrival order.
pub struct ConditionVariable {
    name: &'static str,
    state: SpinLock<CvState>,
}

impl Default for ConditionVariable {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionVariable {
    /// Creates a new condition variable which is ready to be waited on and
    /// signaled.
    pub const fn new() -> Self {
        Self::named("cv")
    }

    /// Creates a new named condition variable.
    pub const fn named(name: &'static str) -> Self {
        Self {
            name,
            state: SpinLock::new(CvState {
                waiters: WaitQueue::new(name),
                bound: None,
            }),
        }
    }

    /// The name of this condition variable.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Releases the lock held by `guard`, sleeps until signaled, and
    /// reacquires the lock.
    ///
    /// Wakeups carry no information; the caller re-checks its condition
    /// after this returns.
    ///
    /// # Panics
    /// - If called from an interrupt handler or while holding a spinlock.
    /// - If other waiters are queued with a different lock.
    pub fn wait<'a, T>(&self, guard: LockGuard<'a, T>) -> LockGuard<'a, T> {
        interrupt::assert_blockable("ConditionVariable::wait");
        let lock = guard.exclusive_lock();
        assert!(
            lock.is_held_by_caller(),
            "ConditionVariable `{}`: wait without holding `{}`.",
            self.name,
            lock.name()
        );

        let mut state = self.state.lock();
        let addr = lock as *const ExclusiveLock<T> as usize;
        match state.bound {
            Some(bound) if bound != addr => {
                state.unlock();
                panic!(
                    "ConditionVariable `{}` used with lock `{}` while waiters of another lock are queued.",
                    self.name,
                    lock.name()
                );
            }
            _ => state.bound = Some(addr),
        }
        guard.unlock();
        WaitQueue::sleep(state, |s| &mut s.waiters);
        lock.lock()
    }

    /// Blocks the current thread while `predicate` returns `true`.
    ///
    /// This function locks `lock` and checks the predicate. If it returns
    /// `true`, the thread waits on the variable and re-evaluates the
    /// predicate every time it wakes up. The returned guard holds the lock
    /// and the predicate is `false` for the protected state.
    ///
    /// There is **no need to check the predicate before calling**
    /// `wait_while`.
    pub fn wait_while<'a, T>(
        &self,
        lock: &'a ExclusiveLock<T>,
        mut predicate: impl FnMut(&mut T) -> bool,
    ) -> LockGuard<'a, T> {
        let mut guard = lock.lock();
        while predicate(&mut *guard) {
            guard = self.wait(guard);
        }
        guard
    }

    /// Wakes up one blocked thread on this condvar, then releases the lock.
    ///
    /// Calls to `signal` are not buffered in any way.
    pub fn signal<T>(&self, guard: LockGuard<'_, T>) {
        self.notify(guard, false);
    }

    /// Wakes up all blocked threads on this condvar, then releases the lock.
    ///
    /// Calls to `broadcast` are not buffered in any way.
    pub fn broadcast<T>(&self, guard: LockGuard<'_, T>) {
        self.notify(guard, true);
    }

    fn notify<T>(&self, guard: LockGuard<'_, T>, all: bool) {
        let lock = guard.exclusive_lock();
        assert!(
            lock.is_held_by_caller(),
            "ConditionVariable `{}`: signal without holding `{}`.",
            self.name,
            lock.name()
        );

        let mut state = self.state.lock();
        if let Some(bound) = state.bound {
            if bound != lock as *const ExclusiveLock<T> as usize {
                state.unlock();
                panic!(
                    "ConditionVariable `{}` signaled with lock `{}`, but its waiters use another lock.",
                    self.name,
                    lock.name()
                );
            }
        }
        if all {
            state.waiters.wake_all();
        } else {
            state.waiters.wake_one();
        }
        if state.waiters.is_empty() {
            state.bound = None;
        }
        state.unlock();
        guard.unlock();
    }
}
