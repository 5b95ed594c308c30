//! # Exclusive lock.
//!
//! An [`ExclusiveLock`] lets **only one thread at a time** into a critical
//! section. Unlike the [`SpinLock`], a thread that finds the lock taken
//! sleeps on the lock's wait queue instead of spinning, so the critical
//! section may be long and may itself block.
//!
//! |                | SpinLock                 | ExclusiveLock             |
//! |----------------|--------------------------|---------------------------|
//! | Waiting thread | Spins (busy-waits)       | Sleeps                    |
//! | CPU usage      | High (wastes CPU cycles) | Low (no busy waiting)     |
//! | Overhead       | Low (fast if uncontended)| Higher (due to sleep/wake)|
//! | Owner          | Debugging aid only       | Tracked and enforced      |
//!
//! The lock records which thread holds it. The owner, and only the owner,
//! may release it, and [`ExclusiveLock::is_held_by_caller`] answers whether
//! the calling thread is the owner. The owner field is read and written
//! only under the lock's internal spinlock.
//!
//! ## Re-entrance
//!
//! Acquiring a lock the caller already holds is a programming error and
//! panics. It never silently succeeds and never deadlocks.
//!
//! ## Guards
//!
//! [`ExclusiveLock::lock`] returns a [`LockGuard`] that gives access to the
//! protected data. Like every kernel guard it must be released with
//! [`LockGuard::unlock`]; dropping it panics. Locks that protect no data can
//! also be used through [`ExclusiveLock::acquire`] and
//! [`ExclusiveLock::release`].
//!
//! [`SpinLock`]: kcore::sync::SpinLock

use super::WaitQueue;
use kcore::{
    interrupt,
    sync::{SpinLock, WouldBlock},
    thread::Current,
};
use std::{
    cell::UnsafeCell,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    panic::Location,
};

struct LockState {
    // Tid of the holder. Only meaningful while the lock is held.
    owner: Option<u64>,
    waiters: WaitQueue,
}

/// An ownership-tracked mutual exclusion primitive useful for protecting
/// shared data.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use kcore::thread::ThreadBuilder;
/// use ksync::sync::ExclusiveLock;
///
/// let data = Arc::new(ExclusiveLock::new(0));
/// let handles = (0..10)
///     .map(|_| {
///         let data = Arc::clone(&data);
///         ThreadBuilder::new("work").spawn(move || {
///             let mut guard = data.lock();
///             *guard += 1;
///             // the lock must be "explicitly" unlocked.
///             guard.unlock();
///         })
///     })
///     .collect::<Vec<_>>();
/// for handle in handles {
///     assert_eq!(handle.join(), 0);
/// }
/// let guard = data.lock();
/// assert_eq!(*guard, 10);
/// guard.unlock();
/// ```
pub struct ExclusiveLock<T> {
    name: &'static str,
    state: SpinLock<LockState>,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for ExclusiveLock<T> {}
unsafe impl<T: Send> Sync for ExclusiveLock<T> {}

impl<T> ExclusiveLock<T> {
    /// Creates a new lock in an unlocked state ready for use.
    pub const fn new(t: T) -> Self {
        Self::named("lock", t)
    }

    /// Creates a new named lock in an unlocked state.
    pub const fn named(name: &'static str, t: T) -> Self {
        Self {
            name,
            state: SpinLock::new(LockState {
                owner: None,
                waiters: WaitQueue::new(name),
            }),
            data: UnsafeCell::new(t),
        }
    }

    /// The name of this lock.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Acquires the lock, sleeping until it is able to do so.
    ///
    /// Upon returning, the calling thread is the owner of the lock.
    ///
    /// # Panics
    /// - If the calling thread already holds the lock.
    /// - If called from an interrupt handler or while holding a spinlock.
    #[track_caller]
    pub fn lock(&self) -> LockGuard<'_, T> {
        let owner = self.acquire_inner();
        LockGuard {
            lock: self,
            owner,
            caller: Location::caller(),
            _not_send: PhantomData,
        }
    }

    /// Attempts to acquire the lock without sleeping.
    ///
    /// # Errors
    /// Returns [`WouldBlock`] if another thread holds the lock.
    ///
    /// # Panics
    /// If the calling thread already holds the lock.
    #[track_caller]
    pub fn try_lock(&self) -> Result<LockGuard<'_, T>, WouldBlock> {
        let me = Current::get_tid();
        let mut state = self.state.lock();
        match state.owner {
            None => {
                state.owner = Some(me);
                state.unlock();
                Ok(LockGuard {
                    lock: self,
                    owner: me,
                    caller: Location::caller(),
                    _not_send: PhantomData,
                })
            }
            Some(owner) if owner == me => {
                state.unlock();
                self.reentered(me)
            }
            Some(_) => {
                state.unlock();
                Err(WouldBlock)
            }
        }
    }

    /// Returns true if the calling thread holds this lock.
    pub fn is_held_by_caller(&self) -> bool {
        let me = Current::get_tid();
        let state = self.state.lock();
        let held = state.owner == Some(me);
        state.unlock();
        held
    }

    /// Consumes this lock, returning the underlying data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    /// Returns a mutable reference to the underlying data.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    fn acquire_inner(&self) -> u64 {
        interrupt::assert_blockable("ExclusiveLock::lock");
        let me = Current::get_tid();
        loop {
            let mut state = self.state.lock();
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.unlock();
                    return me;
                }
                Some(owner) if owner == me => {
                    state.unlock();
                    self.reentered(me)
                }
                Some(_) => WaitQueue::sleep(state, |s| &mut s.waiters),
            }
        }
    }

    fn release_inner(&self, owner: u64) {
        let me = Current::get_tid();
        let mut state = self.state.lock();
        if state.owner != Some(owner) || owner != me {
            let actual = state.owner;
            state.unlock();
            panic!(
                "ExclusiveLock `{}` released by thread {me}, but it is held by {actual:?}.",
                self.name
            );
        }
        state.owner = None;
        state.waiters.wake_one();
        state.unlock();
    }

    fn reentered(&self, me: u64) -> ! {
        panic!(
            "ExclusiveLock `{}` acquired again by its owner (thread {me}).",
            self.name
        )
    }
}

impl ExclusiveLock<()> {
    /// Acquires a lock that protects no data.
    ///
    /// The lock stays held until the same thread calls
    /// [`ExclusiveLock::release`].
    ///
    /// # Panics
    /// Same as [`ExclusiveLock::lock`].
    pub fn acquire(&self) {
        self.acquire_inner();
    }

    /// Releases a lock taken with [`ExclusiveLock::acquire`] and wakes one
    /// waiter.
    ///
    /// # Panics
    /// If the calling thread does not hold the lock.
    pub fn release(&self) {
        self.release_inner(Current::get_tid());
    }
}

impl<T: Default> Default for ExclusiveLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// An implementation of a "scoped lock" of an [`ExclusiveLock`]. When this
/// structure is dropped (falls out of scope) without unlock, panic occurs.
///
/// The guard belongs to the thread that acquired the lock and cannot be sent
/// to another thread.
pub struct LockGuard<'a, T> {
    lock: &'a ExclusiveLock<T>,
    owner: u64,
    caller: &'static Location<'static>,
    _not_send: PhantomData<*const ()>,
}

unsafe impl<T: Sync> Sync for LockGuard<'_, T> {}

impl<'a, T> LockGuard<'a, T> {
    /// Releases the underlying [`ExclusiveLock`] and wakes one waiter.
    pub fn unlock(self) {
        self.lock.release_inner(self.owner);
        core::mem::forget(self);
    }

    pub(super) fn exclusive_lock(&self) -> &'a ExclusiveLock<T> {
        self.lock
    }
}

impl<T> Deref for LockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for LockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for LockGuard<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut state = self.lock.state.lock();
            if state.owner == Some(self.owner) {
                state.owner = None;
                state.waiters.wake_one();
            }
            state.unlock();
            return;
        }
        panic!(
            "`.unlock()` must be explicitly called before dropping LockGuard.
The lock `{}` is held at {:?}.",
            self.lock.name, self.caller
        );
    }
}
