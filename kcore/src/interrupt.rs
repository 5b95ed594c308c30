//! Preemption and interrupt-context bookkeeping.
//!
//! A hosted context cannot really mask interrupts, but the kernel still has
//! to know two things about the code that is currently running: whether it
//! sits inside a short critical section (where it must not suspend), and
//! whether it is running an interrupt handler (where it must not block at
//! all). Both are tracked per execution context.
//!
//! [`InterruptGuard`] is the "interrupts disabled" token. Every held
//! [`SpinLock`] owns one, and guards nest: [`InterruptState::current`] is
//! [`InterruptState::Off`] as long as any guard of the current context is
//! alive.
//!
//! [`SpinLock`]: crate::sync::SpinLock

use core::{cell::Cell, marker::PhantomData};

thread_local! {
    static DISABLE_DEPTH: Cell<usize> = const { Cell::new(0) };
    static IN_HANDLER: Cell<bool> = const { Cell::new(false) };
}

/// Enumeration representing the interrupt state.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum InterruptState {
    /// Interrupts are enabled.
    On,
    /// Interrupts are disabled.
    Off,
}

impl InterruptState {
    /// Reads the current interrupt state of the calling context.
    ///
    /// # Returns
    /// - [`InterruptState::On`] if no [`InterruptGuard`] is alive.
    /// - [`InterruptState::Off`] otherwise.
    pub fn current() -> Self {
        if DISABLE_DEPTH.with(|d| d.get()) == 0 {
            Self::On
        } else {
            Self::Off
        }
    }
}

/// An RAII-based guard for managing interrupt disabling.
///
/// When an `InterruptGuard` is created, interrupts are disabled on the
/// current context. When the last guard is dropped, they are enabled again.
///
/// **Important:**
/// - [`InterruptGuard`] instances **must be dropped in reverse order of their
///   creation** to prevent unintended interrupt state changes.
/// - A guard belongs to the context that created it and cannot be sent to
///   another one.
pub struct InterruptGuard {
    _not_send: PhantomData<*const ()>,
}

impl InterruptGuard {
    /// Creates a new `InterruptGuard`, disabling interrupts.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        DISABLE_DEPTH.with(|d| d.set(d.get() + 1));
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        DISABLE_DEPTH.with(|d| {
            let prev = d.get();
            assert!(prev > 0, "Mismatched InterruptGuard drop calls: {prev}");
            d.set(prev - 1);
        });
    }
}

/// Marks the current context as running an interrupt handler.
///
/// The mark is removed when the returned [`HandlerGuard`] is dropped.
/// Handlers do not nest.
pub fn enter_handler() -> HandlerGuard {
    IN_HANDLER.with(|h| {
        assert!(!h.get(), "Nested interrupt handler.");
        h.set(true);
    });
    HandlerGuard {
        _not_send: PhantomData,
    }
}

/// Returns true if the current context is running an interrupt handler.
pub fn in_handler() -> bool {
    IN_HANDLER.with(|h| h.get())
}

/// Token of a running interrupt handler, created by [`enter_handler`].
pub struct HandlerGuard {
    _not_send: PhantomData<*const ()>,
}

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        IN_HANDLER.with(|h| h.set(false));
    }
}

/// Asserts that the current context may suspend.
///
/// Blocking primitives call this before they could put the caller to sleep.
///
/// # Panics
/// Panics if the caller runs an interrupt handler or holds a short critical
/// section.
#[track_caller]
pub fn assert_blockable(op: &str) {
    assert!(!in_handler(), "{op} called from an interrupt handler.");
    assert!(
        InterruptState::current() == InterruptState::On,
        "{op} called while holding a spinlock."
    );
}
