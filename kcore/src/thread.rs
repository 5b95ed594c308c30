//! Thread abstration, an abstraction of an execution context.
//!
//! ## The threading model
//!
//! An executing kernel consists of a collection of threads, each with their
//! own stack and local state. Every thread carries a kernel thread id that
//! never changes and is never reused, which is what ownership-tracking
//! primitives record as "the owner".
//!
//! A thread suspends itself with [`Current::park_with`]. The closure given
//! to it receives a [`ParkHandle`] for the calling thread and runs *before*
//! the thread actually sleeps; it is the place to publish the handle (push
//! it on a wait queue) and to release the short critical section that
//! protects that queue. Whoever later takes the handle off the queue wakes
//! the thread with [`ParkHandle::unpark`]. A wakeup that arrives between the
//! closure returning and the thread falling asleep is not lost.

use crate::{
    KernelError,
    interrupt::InterruptState,
    sync::SpinLock,
};
use std::{
    cell::Cell,
    collections::BTreeMap,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

/// A possible state of the thread.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ThreadState {
    /// Thread is runnable.
    Runnable,
    /// Thread is running.
    Running,
    /// Thread is parked.
    Parked,
}

static NEXT_TID: AtomicU64 = AtomicU64::new(1);
static THREAD_STATE_TABLE: SpinLock<BTreeMap<u64, ThreadState>> = SpinLock::new(BTreeMap::new());

thread_local! {
    static TID: Cell<u64> = const { Cell::new(0) };
    // Set on threads started by `ThreadBuilder`.
    static SPAWNED: Cell<bool> = const { Cell::new(false) };
}

fn allocate_tid() -> u64 {
    NEXT_TID.fetch_add(1, Ordering::Relaxed)
}

fn set_state(tid: u64, state: ThreadState) {
    let mut tst = THREAD_STATE_TABLE.lock();
    tst.insert(tid, state);
    tst.unlock();
}

fn remove_state(tid: u64) {
    let mut tst = THREAD_STATE_TABLE.lock();
    tst.remove(&tid);
    tst.unlock();
}

/// Get the state of the thread identified by `tid`.
///
/// A thread has an entry from the moment it is spawned until it exits. A
/// thread not started by [`ThreadBuilder`] has one only while it is parked.
///
/// # Errors
/// Returns [`KernelError::InvalidArgument`] if the thread has no entry.
pub fn get_state_by_tid(tid: u64) -> Result<ThreadState, KernelError> {
    let tst = THREAD_STATE_TABLE.lock();
    let result = tst.get(&tid).copied();
    tst.unlock();
    result.ok_or(KernelError::InvalidArgument)
}

struct Parker {
    tid: u64,
    thread: std::thread::Thread,
    unparked: AtomicBool,
}

/// A handle that represent the parked thread.
pub struct ParkHandle {
    parker: Arc<Parker>,
}

impl ParkHandle {
    /// The thread id of the parked thread.
    pub fn tid(&self) -> u64 {
        self.parker.tid
    }

    /// Consume the handle and unpark the underlying thread.
    pub fn unpark(self) {
        let mut tst = THREAD_STATE_TABLE.lock();
        if let Some(state) = tst.get_mut(&self.parker.tid) {
            *state = ThreadState::Runnable;
        }
        tst.unlock();
        self.parker.unparked.store(true, Ordering::Release);
        self.parker.thread.unpark();
    }
}

impl core::fmt::Debug for ParkHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ParkHandle")
            .field("tid", &self.parker.tid)
            .finish()
    }
}

/// A struct to control the current thread.
pub struct Current {
    _p: (),
}

impl Current {
    /// Park the current thread.
    ///
    /// `f` runs with the handle of the current thread before the thread
    /// sleeps. The thread resumes once the handle is unparked.
    ///
    /// # Panics
    /// Panics if the current thread still holds a spinlock after `f`
    /// returns.
    pub fn park_with(f: impl FnOnce(ParkHandle)) {
        let tid = Self::get_tid();
        let parker = Arc::new(Parker {
            tid,
            thread: std::thread::current(),
            unparked: AtomicBool::new(false),
        });
        set_state(tid, ThreadState::Parked);
        f(ParkHandle {
            parker: parker.clone(),
        });
        assert!(
            InterruptState::current() == InterruptState::On,
            "Try to park a thread while holding a lock."
        );
        while !parker.unparked.load(Ordering::Acquire) {
            std::thread::park();
        }
        if SPAWNED.with(|s| s.get()) {
            set_state(tid, ThreadState::Running);
        } else {
            remove_state(tid);
        }
    }

    /// Get the current thread's id.
    pub fn get_tid() -> u64 {
        TID.with(|tid| {
            if tid.get() == 0 {
                tid.set(allocate_tid());
            }
            tid.get()
        })
    }
}

/// A handle to join a thread.
pub struct JoinHandle {
    /// Thread id of this thread.
    pub tid: u64,
    inner: std::thread::JoinHandle<i32>,
}

impl JoinHandle {
    /// Wait for the thread to exit and returns its exit code.
    ///
    /// A thread that panicked exits with -1.
    pub fn join(self) -> i32 {
        self.inner.join().unwrap_or(-1)
    }
}

/// A builder for a new thread.
pub struct ThreadBuilder {
    name: String,
    tid: u64,
}

impl ThreadBuilder {
    /// Create a new thread builder for the thread named `name`.
    pub fn new<I: Into<String>>(name: I) -> Self {
        Self {
            name: name.into(),
            tid: allocate_tid(),
        }
    }

    /// Get the thread id of this thread.
    pub fn get_tid(&self) -> u64 {
        self.tid
    }

    /// Spawn the thread.
    pub fn spawn<F: FnOnce() + Send + 'static>(self, thread_fn: F) -> JoinHandle {
        let Self { name, tid } = self;
        set_state(tid, ThreadState::Runnable);
        let inner = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                TID.with(|t| t.set(tid));
                SPAWNED.with(|s| s.set(true));
                set_state(tid, ThreadState::Running);
                let code = match std::panic::catch_unwind(AssertUnwindSafe(thread_fn)) {
                    Ok(()) => 0,
                    Err(_) => -1,
                };
                remove_state(tid);
                code
            })
            .unwrap_or_else(|e| panic!("Failed to spawn thread `{name}`: {e}"));
        JoinHandle { tid, inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn tids_are_unique() {
        let me = Current::get_tid();
        assert_eq!(me, Current::get_tid());
        let builder = ThreadBuilder::new("child");
        let expected = builder.get_tid();
        let seen = Arc::new(AtomicU64::new(0));
        let seen_c = seen.clone();
        let handle = builder.spawn(move || seen_c.store(Current::get_tid(), Ordering::SeqCst));
        assert_eq!(handle.tid, expected);
        assert_eq!(handle.join(), 0);
        assert_eq!(seen.load(Ordering::SeqCst), expected);
        assert_ne!(expected, me);
        assert_eq!(get_state_by_tid(expected), Err(KernelError::InvalidArgument));
    }

    #[test]
    fn panicking_thread_exits_with_error() {
        let handle = ThreadBuilder::new("panic").spawn(|| panic!("boom"));
        assert_eq!(handle.join(), -1);
    }

    #[test]
    fn park_and_unpark() {
        let slot: Arc<Mutex<Option<ParkHandle>>> = Arc::new(Mutex::new(None));
        let slot_c = slot.clone();
        let handle = ThreadBuilder::new("sleeper").spawn(move || {
            Current::park_with(|h| *slot_c.lock().unwrap() = Some(h));
        });
        let tid = handle.tid;
        let parked = loop {
            if let Some(h) = slot.lock().unwrap().take() {
                break h;
            }
            std::thread::yield_now();
        };
        assert_eq!(parked.tid(), tid);
        while get_state_by_tid(tid) != Ok(ThreadState::Parked) {
            std::thread::yield_now();
        }
        parked.unpark();
        assert_eq!(handle.join(), 0);
    }

    #[test]
    fn unpark_before_sleep_is_not_lost() {
        // The handle is unparked from inside the closure, before the thread
        // goes to sleep.
        Current::park_with(|h| h.unpark());
        assert_eq!(
            get_state_by_tid(Current::get_tid()),
            Err(KernelError::InvalidArgument)
        );
    }

    #[test]
    fn exited_threads_leave_the_state_table() {
        let first = ThreadBuilder::new("first");
        let first_tid = first.get_tid();
        assert_eq!(get_state_by_tid(first_tid), Err(KernelError::InvalidArgument));
        assert_eq!(first.spawn(|| ()).join(), 0);
        assert_eq!(get_state_by_tid(first_tid), Err(KernelError::InvalidArgument));

        let tids = (0..64)
            .map(|i| {
                let handle = ThreadBuilder::new(format!("churn_{i}")).spawn(move || {
                    if i % 2 == 0 {
                        Current::park_with(|h| h.unpark());
                    }
                    assert_eq!(
                        get_state_by_tid(Current::get_tid()),
                        Ok(ThreadState::Running)
                    );
                });
                let tid = handle.tid;
                assert_eq!(handle.join(), 0);
                tid
            })
            .collect::<Vec<_>>();
        let tst = THREAD_STATE_TABLE.lock();
        let leaked = tids.iter().filter(|tid| tst.contains_key(tid)).count();
        tst.unlock();
        assert_eq!(leaked, 0);
    }

    #[test]
    fn late_unpark_does_not_resurrect_an_entry() {
        let slot: Arc<Mutex<Option<ParkHandle>>> = Arc::new(Mutex::new(None));
        let slot_c = slot.clone();
        let handle = ThreadBuilder::new("stale").spawn(move || {
            Current::park_with(|h| h.unpark());
            // Park once more so a handle of this thread outlives it.
            Current::park_with(|h| {
                let extra = ParkHandle {
                    parker: h.parker.clone(),
                };
                h.unpark();
                *slot_c.lock().unwrap() = Some(extra);
            });
        });
        let tid = handle.tid;
        assert_eq!(handle.join(), 0);
        let stale = slot.lock().unwrap().take().unwrap();
        stale.unpark();
        assert_eq!(get_state_by_tid(tid), Err(KernelError::InvalidArgument));
    }
}
