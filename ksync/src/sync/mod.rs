//! # Synchronization Primitives.
//!
//! The kernel coordinates access to shared state among many threads. The
//! base layer offers only the [`SpinLock`], which is correct but spins while
//! it waits. This module builds the blocking primitives on top of it:
//!
//! - [`WaitQueue`]: a named queue of parked threads, reachable only through
//!   the spinlock that guards it, with an atomic "enqueue, release, park".
//! - [`Semaphore`]: a counting permit.
//! - [`ExclusiveLock`]: ownership-tracked mutual exclusion; only the owner
//!   may release it.
//! - [`ConditionVariable`]: monitor-style wait and notify tied to an
//!   [`ExclusiveLock`] the caller holds.
//!
//! | Primitive             | Blocks Thread? | Fair? | Typical Use Case                          |
//! |-----------------------|----------------|-------|-------------------------------------------|
//! | [`SpinLock`]          | No (busy wait) | No    | O(1) updates, usable in interrupt handlers |
//! | [`ExclusiveLock`]     | Yes            | No    | Exclusive access to shared data            |
//! | [`ConditionVariable`] | Yes            | No    | Waiting for a condition to become true     |
//! | [`Semaphore`]         | Yes            | No    | Limiting access to a bounded resource      |
//!
//! None of the blocking primitives serve waiters in arrival order, and none
//! of them time out: a sleeping thread resumes only when another thread
//! wakes it through the same queue.
//!
//! Blocking is only allowed where suspending is: calling `wait` or `lock`
//! from an interrupt handler or while holding a spinlock panics.
//!
//! [`SpinLock`]: kcore::sync::SpinLock

pub mod condition_variable;
pub mod exclusive_lock;
pub mod semaphore;
pub mod wait_queue;

pub use condition_variable::ConditionVariable;
pub use exclusive_lock::{ExclusiveLock, LockGuard};
pub use kcore::sync::{SpinLock, SpinLockGuard, WouldBlock};
pub use semaphore::{Semaphore, SemaphorePermits};
pub use wait_queue::WaitQueue;
