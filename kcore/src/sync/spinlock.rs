//! SMP-supported spinlock.
//!
//! On a uniprocessor, a short critical section only needs to keep the
//! holder from being preempted. With several cores running at once that is
//! not enough: contexts on other cores can touch the shared state at the
//! same time. A core therefore 1) polls a flag that says whether the lock is
//! taken, 2) sets the flag when it takes the lock, and 3) clears it on
//! `unlock`. Steps 1 and 2 are one atomic read-modify-write.
//!
//! The holder also disables preemption ([`InterruptGuard`]) for as long as
//! the lock is held, which is what lets the blocking primitives detect an
//! attempt to suspend inside a short critical section.

use crate::{interrupt::InterruptGuard, thread::Current};
use core::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
    panic::Location,
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
};
use crossbeam_utils::{Backoff, CachePadded};

/// The lock could not be acquired at this time because the operation would
/// otherwise block.
#[derive(Debug, PartialEq, Eq)]
pub struct WouldBlock;

/// A mutual exclusion primitive useful for protecting shared data
///
/// This spinlock will busy-wait threads waiting for the lock to become
/// available. The spinlock can be created via a [`new`] constructor. Each
/// spinlock has a type parameter which represents the data that it is
/// protecting. The data can only be accessed through the guards returned from
/// [`lock`] and [`try_lock`], which guarantees that the data is only ever
/// accessed when the spinlock is locked.
///
/// A spinlock protects O(1) work only. The holder must never suspend while
/// holding it; the blocking primitives assert this.
///
/// [`new`]: Self::new
/// [`lock`]: Self::lock
/// [`try_lock`]: Self::try_lock
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use kcore::sync::SpinLock;
/// use kcore::thread::ThreadBuilder;
///
/// let data = Arc::new(SpinLock::new(0));
///
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
pub struct SpinLock<T: ?Sized> {
    locked: CachePadded<AtomicBool>,
    // Tid of the holder plus one; zero when free. Debugging aid only.
    holder: AtomicU64,
    contenders: AtomicUsize,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Creates a new spinlock in an unlocked state ready for use.
    ///
    /// # Examples
    ///
    /// ```
    /// use kcore::sync::SpinLock;
    ///
    /// let spinlock = SpinLock::new(0);
    /// ```
    #[inline]
    pub const fn new(t: T) -> SpinLock<T> {
        SpinLock {
            locked: CachePadded::new(AtomicBool::new(false)),
            holder: AtomicU64::new(0),
            contenders: AtomicUsize::new(0),
            data: UnsafeCell::new(t),
        }
    }
}

impl<T: ?Sized> SpinLock<T> {
    /// Acquires a spinlock, spinning until it is able to do so.
    ///
    /// Upon returning, the caller is the only context with the lock held and
    /// preemption is disabled for it. When the guard goes out of scope
    /// without [`SpinLockGuard::unlock`], panic occurs.
    ///
    /// Locking a spinlock the caller already holds never returns.
    #[track_caller]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let caller = Location::caller();
        if let Ok(guard) = self.try_lock_at(caller) {
            return guard;
        }

        self.contenders.fetch_add(1, Ordering::Relaxed);
        let backoff = Backoff::new();
        let guard = loop {
            while self.locked.load(Ordering::Relaxed) {
                backoff.snooze();
            }
            if let Ok(guard) = self.try_lock_at(caller) {
                break guard;
            }
        };
        self.contenders.fetch_sub(1, Ordering::Relaxed);
        guard
    }

    /// Attempts to acquire this lock.
    ///
    /// This function does not spin.
    ///
    /// # Errors
    ///
    /// If the spinlock could not be acquired because it is already locked,
    /// then this call will return the [`WouldBlock`] error.
    #[track_caller]
    pub fn try_lock(&self) -> Result<SpinLockGuard<'_, T>, WouldBlock> {
        self.try_lock_at(Location::caller())
    }

    fn try_lock_at(
        &self,
        caller: &'static Location<'static>,
    ) -> Result<SpinLockGuard<'_, T>, WouldBlock> {
        let guard = InterruptGuard::new();
        if self.locked.swap(true, Ordering::Acquire) {
            drop(guard);
            return Err(WouldBlock);
        }
        self.holder.store(Current::get_tid() + 1, Ordering::Relaxed);
        Ok(SpinLockGuard {
            caller,
            lock: self,
            guard: Some(guard),
        })
    }

    /// Returns the thread id of the current holder, if any.
    ///
    /// The answer may be stale by the time it is read; use it for
    /// diagnostics only.
    pub fn holder(&self) -> Option<u64> {
        match self.holder.load(Ordering::Relaxed) {
            0 => None,
            tid => Some(tid - 1),
        }
    }

    /// Returns a mutable reference to the underlying data.
    ///
    /// No locking is needed as the borrow proves exclusive access.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: ?Sized> Drop for SpinLock<T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        assert!(
            !self.locked.load(Ordering::Relaxed),
            "SpinLock destroyed while held by thread {:?}.",
            self.holder()
        );
        assert_eq!(
            self.contenders.load(Ordering::Relaxed),
            0,
            "SpinLock destroyed while contexts are spinning on it."
        );
    }
}

impl<T: Default> Default for SpinLock<T> {
    /// Creates a `SpinLock<T>`, with the `Default` value for T.
    fn default() -> SpinLock<T> {
        SpinLock::new(Default::default())
    }
}

impl<T: ?Sized> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

/// An implementation of a "scoped lock" of a spinlock. When this structure
/// is dropped (falls out of scope) without unlock, panic occurs.
///
/// The lock must be explicitly unlocked by [`unlock`] method.
///
/// The data protected by the spinlock can be accessed through this guard.
///
/// This structure is created by the [`lock`] and [`try_lock`] methods on
/// [`SpinLock`].
///
/// [`lock`]: SpinLock::lock
/// [`try_lock`]: SpinLock::try_lock
/// [`unlock`]: Self::unlock
pub struct SpinLockGuard<'a, T: ?Sized + 'a> {
    caller: &'static Location<'static>,
    lock: &'a SpinLock<T>,
    guard: Option<InterruptGuard>,
}

unsafe impl<T: ?Sized + Sync> Sync for SpinLockGuard<'_, T> {}

impl<T: ?Sized> SpinLockGuard<'_, T> {
    /// Releases the underlying [`SpinLock`].
    ///
    /// As the guard does **not** automatically release the lock on drop,
    /// the caller must explicitly invoke [`unlock`] to mark the lock
    /// as available again.
    ///
    /// [`unlock`]: Self::unlock
    pub fn unlock(mut self) {
        self.release();
        core::mem::forget(self);
    }

    fn release(&mut self) {
        self.lock.holder.store(0, Ordering::Relaxed);
        self.lock.locked.store(false, Ordering::Release);
        self.guard.take();
    }
}

impl<T: ?Sized> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            // Unwinding through a critical section; let the other contexts go.
            self.release();
            return;
        }
        panic!(
            "`.unlock()` must be explicitly called before dropping SpinLockGuard.
The lock is held at {:?}.",
            self.caller
        );
    }
}
