//! Synchronization primitives of the base layer.
//!
//! Only the short critical section lives here. Blocking primitives are
//! built on top of it, together with [`Current::park_with`], in the upper
//! layers.
//!
//! [`Current::park_with`]: crate::thread::Current::park_with

pub mod spinlock;

pub use spinlock::{SpinLock, SpinLockGuard, WouldBlock};
