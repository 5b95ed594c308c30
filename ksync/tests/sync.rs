use kcore::{
    interrupt,
    sync::SpinLock,
    thread::{ThreadBuilder, ThreadState, get_state_by_tid},
};
use ksync::sync::{ConditionVariable, ExclusiveLock, Semaphore, WouldBlock};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::yield_now();
    }
}

fn wait_parked(tid: u64) {
    wait_until("the thread to park", || {
        get_state_by_tid(tid) == Ok(ThreadState::Parked)
    });
}

mod exclusive_lock {
    use super::*;

    #[test]
    fn smoke() {
        const LENGTH: usize = 64;
        let output = Arc::new(ExclusiveLock::new(Vec::new()));
        let counter = Arc::new(AtomicUsize::new(0));

        let handles = (0..LENGTH)
            .map(|i| {
                let (counter, output) = (counter.clone(), output.clone());
                ThreadBuilder::new("smoker").spawn(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let mut d = output.lock();
                    d.push(i);
                    d.unlock();
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            assert_eq!(handle.join(), 0);
        }

        let mut output = output.lock();
        output.sort();
        assert_eq!(&*output, &(0..LENGTH).collect::<Vec<_>>());
        output.unlock();
    }

    #[test]
    fn no_lost_updates() {
        const N: usize = 8;
        const M: usize = 500;
        let counter = Arc::new(ExclusiveLock::new(0usize));

        let handles = (0..N)
            .map(|_| {
                let counter = counter.clone();
                ThreadBuilder::new("incr").spawn(move || {
                    for _ in 0..M {
                        let mut guard = counter.lock();
                        let v = *guard;
                        std::thread::yield_now();
                        *guard = v + 1;
                        guard.unlock();
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            assert_eq!(handle.join(), 0);
        }

        let guard = counter.lock();
        assert_eq!(*guard, N * M);
        guard.unlock();
    }

    #[test]
    fn parking() {
        let lock = Arc::new(ExclusiveLock::new(()));
        let guard = lock.lock();

        let be_parked = {
            let lock = lock.clone();
            ThreadBuilder::new("blockee").spawn(move || {
                let guard = lock.lock();
                guard.unlock();
            })
        };

        wait_parked(be_parked.tid);
        assert_eq!(
            get_state_by_tid(be_parked.tid),
            Ok(ThreadState::Parked),
            "Blocked thread by ExclusiveLock should be in Parked state"
        );

        guard.unlock();
        assert_eq!(be_parked.join(), 0);
    }

    #[test]
    fn held_by_caller() {
        let lock = Arc::new(ExclusiveLock::new(0));
        let acquired = Arc::new(AtomicBool::new(false));
        let release = Arc::new(AtomicBool::new(false));

        assert!(!lock.is_held_by_caller());
        let holder = {
            let (lock, acquired, release) = (lock.clone(), acquired.clone(), release.clone());
            ThreadBuilder::new("holder").spawn(move || {
                assert!(!lock.is_held_by_caller());
                let guard = lock.lock();
                assert!(lock.is_held_by_caller());
                acquired.store(true, Ordering::SeqCst);
                while !release.load(Ordering::SeqCst) {
                    std::thread::yield_now();
                }
                guard.unlock();
                assert!(!lock.is_held_by_caller());
            })
        };

        wait_until("the holder", || acquired.load(Ordering::SeqCst));
        assert!(!lock.is_held_by_caller());
        assert_eq!(lock.try_lock().map(|g| g.unlock()), Err(WouldBlock));
        release.store(true, Ordering::SeqCst);
        assert_eq!(holder.join(), 0);

        let guard = lock.try_lock().expect("lock is free");
        assert!(lock.is_held_by_caller());
        guard.unlock();
        assert!(!lock.is_held_by_caller());
    }

    #[test]
    #[should_panic(expected = "acquired again")]
    fn reentrant_acquire_panics() {
        let lock = ExclusiveLock::new(());
        let _guard = lock.lock();
        let _again = lock.lock();
    }

    #[test]
    fn release_by_non_owner_panics() {
        let lock = Arc::new(ExclusiveLock::new(()));
        lock.acquire();

        let thief = {
            let lock = lock.clone();
            ThreadBuilder::new("thief").spawn(move || lock.release())
        };
        assert_eq!(thief.join(), -1);

        assert!(lock.is_held_by_caller());
        lock.release();
        assert!(!lock.is_held_by_caller());
    }

    #[test]
    #[should_panic(expected = "released by thread")]
    fn release_of_free_lock_panics() {
        let lock = ExclusiveLock::new(());
        lock.release();
    }

    #[test]
    #[should_panic(expected = "must be explicitly called")]
    fn implicit_drop_panics() {
        let lock = ExclusiveLock::new(());
        let _guard = lock.lock();
    }

    #[test]
    #[should_panic(expected = "holding a spinlock")]
    fn blocking_under_spinlock_panics() {
        let spin = SpinLock::new(());
        let lock = ExclusiveLock::new(());
        let _spin = spin.lock();
        let guard = lock.lock();
        guard.unlock();
    }

    #[test]
    fn released_lock_is_not_handed_to_a_waiter() {
        const ROUNDS: usize = 50;
        let lock = Arc::new(ExclusiveLock::new(0usize));
        let mut barged = 0;

        for round in 0..ROUNDS {
            let guard = lock.lock();
            let waiter = {
                let lock = lock.clone();
                ThreadBuilder::new("waiter").spawn(move || {
                    let mut guard = lock.lock();
                    *guard += 1;
                    guard.unlock();
                })
            };
            wait_parked(waiter.tid);
            guard.unlock();

            // The woken waiter competes for the lock like any newcomer.
            if let Ok(guard) = lock.try_lock() {
                barged += 1;
                assert_eq!(*guard, round);
                guard.unlock();
            }
            assert_eq!(waiter.join(), 0);
        }

        assert!(barged > 0);
        let guard = lock.lock();
        assert_eq!(*guard, ROUNDS);
        guard.unlock();
    }
}

mod condition_variable {
    use super::*;

    const MAX: usize = 2;
    const ITEMS: usize = 18;

    struct BufferInner {
        item: [usize; MAX],
        front: usize,
        tail: usize,
    }

    impl BufferInner {
        fn is_full(&self) -> bool {
            self.tail.overflowing_sub(self.front).0 % MAX == MAX - 1
        }
        fn is_empty(&self) -> bool {
            self.front == self.tail
        }
    }

    struct Buffer {
        inner: ExclusiveLock<BufferInner>,
        full: ConditionVariable,
        empty: ConditionVariable,
    }

    impl Buffer {
        fn new() -> Self {
            Buffer {
                inner: ExclusiveLock::new(BufferInner {
                    item: [0; MAX],
                    front: 0,
                    tail: 0,
                }),
                full: ConditionVariable::named("full"),
                empty: ConditionVariable::named("empty"),
            }
        }

        fn put(&self, val: usize) {
            let mut guard = self.full.wait_while(&self.inner, |b| b.is_full());
            let tail = (guard.tail + 1) % MAX;
            guard.tail = tail;
            guard.item[tail] = val;
            self.empty.signal(guard);
        }

        fn put_many(&self, val: &[usize]) {
            let mut idx = 0;
            while idx < val.len() {
                let mut guard = self.full.wait_while(&self.inner, |b| b.is_full());
                while !guard.is_full() && idx < val.len() {
                    let tail = (guard.tail + 1) % MAX;
                    guard.tail = tail;
                    guard.item[tail] = val[idx];
                    idx += 1;
                }
                self.empty.broadcast(guard);
            }
        }

        fn get(&self) -> usize {
            let mut guard = self.empty.wait_while(&self.inner, |b| b.is_empty());
            let front = (guard.front + 1) % MAX;
            let item = guard.item[front];
            guard.front = front;
            self.full.signal(guard);
            item
        }
    }

    fn bounded_buffer(batched: bool) {
        let buffer = Arc::new(Buffer::new());
        let waiters = Arc::new(AtomicUsize::new(0));
        let output = Arc::new(ExclusiveLock::new(Vec::new()));

        let consumers = (0..ITEMS)
            .map(|_| {
                let (buffer, waiters, output) = (buffer.clone(), waiters.clone(), output.clone());
                ThreadBuilder::new("consumer").spawn(move || {
                    waiters.fetch_add(1, Ordering::SeqCst);
                    let d = buffer.get();
                    let mut guard = output.lock();
                    guard.push(d);
                    guard.unlock();
                })
            })
            .collect::<Vec<_>>();
        wait_until("every consumer", || waiters.load(Ordering::SeqCst) == ITEMS);

        let producer = {
            let buffer = buffer.clone();
            ThreadBuilder::new("producer").spawn(move || {
                let items = (0..ITEMS).collect::<Vec<_>>();
                if batched {
                    for chunk in items.chunks(3) {
                        buffer.put_many(chunk);
                    }
                } else {
                    for i in items {
                        buffer.put(i);
                    }
                }
            })
        };

        for consumer in consumers {
            assert_eq!(consumer.join(), 0);
        }
        assert_eq!(producer.join(), 0);

        let mut output = output.lock();
        output.sort();
        assert_eq!(&*output, &(0..ITEMS).collect::<Vec<_>>());
        output.unlock();
    }

    #[test]
    fn bounded_buffer_1() {
        bounded_buffer(false);
    }

    #[test]
    fn bounded_buffer_2() {
        bounded_buffer(true);
    }

    #[test]
    fn wait_returns_with_lock_held() {
        for _ in 0..200 {
            let lock = Arc::new(ExclusiveLock::new(false));
            let cv = Arc::new(ConditionVariable::new());

            let waiter = {
                let (lock, cv) = (lock.clone(), cv.clone());
                ThreadBuilder::new("waiter").spawn(move || {
                    let guard = cv.wait_while(&lock, |ready| !*ready);
                    assert!(lock.is_held_by_caller());
                    assert!(*guard);
                    guard.unlock();
                })
            };
            let signaller = {
                let (lock, cv) = (lock.clone(), cv.clone());
                ThreadBuilder::new("signaller").spawn(move || {
                    let mut guard = lock.lock();
                    *guard = true;
                    cv.signal(guard);
                })
            };

            assert_eq!(signaller.join(), 0);
            assert_eq!(waiter.join(), 0);
        }
    }

    #[test]
    fn broadcast_wakes_everyone() {
        const WAITERS: usize = 8;
        let lock = Arc::new(ExclusiveLock::new(false));
        let cv = Arc::new(ConditionVariable::new());

        let waiters = (0..WAITERS)
            .map(|_| {
                let (lock, cv) = (lock.clone(), cv.clone());
                ThreadBuilder::new("waiter").spawn(move || {
                    let guard = cv.wait_while(&lock, |go| !*go);
                    guard.unlock();
                })
            })
            .collect::<Vec<_>>();
        for waiter in waiters.iter() {
            wait_parked(waiter.tid);
        }

        let mut guard = lock.lock();
        *guard = true;
        cv.broadcast(guard);
        for waiter in waiters {
            assert_eq!(waiter.join(), 0);
        }
    }

    #[test]
    fn signaller_locks_again_to_continue() {
        let lock = ExclusiveLock::new(0);
        let cv = ConditionVariable::new();

        let mut guard = lock.lock();
        *guard += 1;
        cv.signal(guard);
        assert!(!lock.is_held_by_caller());

        let mut guard = lock.try_lock().expect("signal released the lock");
        *guard += 1;
        cv.broadcast(guard);
        assert!(!lock.is_held_by_caller());

        let guard = lock.lock();
        assert_eq!(*guard, 2);
        guard.unlock();
    }

    #[test]
    #[should_panic(expected = "waiters use another lock")]
    fn signal_with_another_lock_panics() {
        let first = Arc::new(ExclusiveLock::new(false));
        let second = ExclusiveLock::new(false);
        let cv = Arc::new(ConditionVariable::new());

        let waiter = {
            let (first, cv) = (first.clone(), cv.clone());
            ThreadBuilder::new("waiter").spawn(move || {
                let guard = cv.wait_while(&first, |go| !*go);
                guard.unlock();
            })
        };
        wait_parked(waiter.tid);

        let guard = second.lock();
        cv.signal(guard);
    }
}

mod semaphore {
    use super::*;

    #[test]
    fn sema_0() {
        let sema = Arc::new(Semaphore::new(0, ()));
        let is_woken_up = Arc::new(AtomicBool::new(false));

        let thread = {
            let (sema, is_woken_up) = (sema.clone(), is_woken_up.clone());
            ThreadBuilder::new("worker").spawn(move || {
                let permit = sema.wait();
                is_woken_up.store(true, Ordering::SeqCst);
                core::mem::forget(permit);
            })
        };

        wait_parked(thread.tid);
        assert!(!is_woken_up.load(Ordering::SeqCst));

        sema.signal();
        assert_eq!(thread.join(), 0);
        assert!(is_woken_up.load(Ordering::SeqCst));
        assert_eq!(sema.count(), 0);
    }

    fn admits_in_steps(permits: u32, step: u32) {
        const COUNT: u32 = 16;
        let sema = Arc::new(Semaphore::new(permits as usize, ()));
        let ready_counter = Arc::new(AtomicU32::new(0));
        let counter = Arc::new(AtomicU32::new(0));

        let handles = (0..COUNT)
            .map(|i| {
                let (sema, ready_counter, counter) =
                    (sema.clone(), ready_counter.clone(), counter.clone());
                ThreadBuilder::new(format!("t{i}")).spawn(move || {
                    ready_counter.fetch_add(1, Ordering::SeqCst);
                    let sema_permit = sema.wait();
                    counter.fetch_add(1, Ordering::SeqCst);
                    core::mem::forget(sema_permit);
                })
            })
            .collect::<Vec<_>>();

        wait_until("every thread", || ready_counter.load(Ordering::SeqCst) == COUNT);

        let mut expected_cnt = permits;
        wait_until("the initial permits", || {
            counter.load(Ordering::SeqCst) == expected_cnt
        });
        while expected_cnt < COUNT {
            expected_cnt += step;
            for _ in 0..step {
                sema.signal();
            }
            wait_until("the released threads", || {
                counter.load(Ordering::SeqCst) == expected_cnt
            });
            std::thread::sleep(Duration::from_millis(2));
            assert_eq!(counter.load(Ordering::SeqCst), expected_cnt);
        }
        for handle in handles {
            assert_eq!(handle.join(), 0);
        }
        assert_eq!(sema.count(), 0);
    }

    #[test]
    fn sema_1() {
        admits_in_steps(1, 1);
    }

    #[test]
    fn sema_2() {
        admits_in_steps(2, 2);
    }

    #[test]
    fn exec_order() {
        const COUNT: usize = 3;

        let counter = Arc::new(AtomicUsize::new(0));
        let sema = Arc::new(Semaphore::new(0, 0));

        let handles = (0..COUNT)
            .map(|i| {
                let (counter, sema) = (counter.clone(), sema.clone());
                ThreadBuilder::new(format!("support_{i}")).spawn(move || {
                    let _guard = sema.wait();
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect::<Vec<_>>();

        for handle in handles.iter() {
            wait_parked(handle.tid);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        sema.signal();
        for handle in handles {
            assert_eq!(handle.join(), 0);
        }
        assert_eq!(counter.load(Ordering::SeqCst), COUNT);
        assert_eq!(sema.count(), 1);
    }

    #[test]
    fn n_permits() {
        const COUNT: usize = 5;
        const PERMITS: usize = 3;

        let counter = Arc::new(AtomicUsize::new(0));
        let sema = Arc::new(Semaphore::new(PERMITS, 0));
        let lock = Arc::new(ExclusiveLock::new(0));

        let guard = lock.lock();

        let handles = (0..COUNT)
            .map(|i| {
                let (counter, sema, lock) = (counter.clone(), sema.clone(), lock.clone());
                ThreadBuilder::new(format!("support_{i}")).spawn(move || {
                    let _guard = sema.wait();
                    counter.fetch_add(1, Ordering::SeqCst);
                    let lock = lock.lock();
                    lock.unlock();
                })
            })
            .collect::<Vec<_>>();

        for handle in handles.iter() {
            wait_parked(handle.tid);
        }
        assert_eq!(counter.load(Ordering::SeqCst), PERMITS);
        assert_eq!(sema.count(), 0);

        guard.unlock();
        for handle in handles {
            assert_eq!(handle.join(), 0);
        }
        assert_eq!(counter.load(Ordering::SeqCst), COUNT);
        assert_eq!(sema.count(), PERMITS);
    }

    #[test]
    fn permit_gives_access_to_resource() {
        let sema = Semaphore::new(1, String::from("printer"));
        let permit = sema.wait();
        assert_eq!(permit.as_str(), "printer");
        assert!(sema.try_wait().is_err());
        drop(permit);
        assert_eq!(sema.try_wait().map(|p| p.len()), Ok(7));
    }

    #[test]
    fn count_tracks_completed_operations() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..50 {
            let initial = rng.gen_range(0..4);
            let sema = Semaphore::new(initial, ());
            let (mut acquires, mut releases) = (0usize, 0usize);
            for _ in 0..200 {
                match rng.gen_range(0..3) {
                    0 => {
                        if let Ok(permit) = sema.try_wait() {
                            core::mem::forget(permit);
                            acquires += 1;
                        }
                    }
                    1 if sema.count() > 0 => {
                        core::mem::forget(sema.wait());
                        acquires += 1;
                    }
                    _ => {
                        sema.signal();
                        releases += 1;
                    }
                }
                assert_eq!(sema.count() + acquires, initial + releases);
            }
        }
    }

    #[test]
    fn count_is_restored_under_contention() {
        const THREADS: usize = 6;
        const PERMITS: usize = 2;
        let sema = Arc::new(Semaphore::new(PERMITS, ()));
        let inside = Arc::new(AtomicUsize::new(0));

        let handles = (0..THREADS)
            .map(|i| {
                let (sema, inside) = (sema.clone(), inside.clone());
                ThreadBuilder::new(format!("contender_{i}")).spawn(move || {
                    let mut rng = StdRng::seed_from_u64(i as u64);
                    for _ in 0..rng.gen_range(50..150) {
                        let permit = sema.wait();
                        assert!(inside.fetch_add(1, Ordering::SeqCst) < PERMITS);
                        std::thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                        drop(permit);
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            assert_eq!(handle.join(), 0);
        }
        assert_eq!(sema.count(), PERMITS);
    }

    #[test]
    fn signalled_permit_is_not_handed_to_a_waiter() {
        const ROUNDS: usize = 50;
        let sema = Arc::new(Semaphore::new(1, AtomicUsize::new(0)));
        let mut barged = 0;

        for round in 0..ROUNDS {
            let permit = sema.wait();
            let waiter = {
                let sema = sema.clone();
                ThreadBuilder::new("waiter").spawn(move || {
                    let permit = sema.wait();
                    permit.fetch_add(1, Ordering::SeqCst);
                    drop(permit);
                })
            };
            wait_parked(waiter.tid);
            drop(permit);

            if let Ok(permit) = sema.try_wait() {
                barged += 1;
                assert_eq!(sema.count(), 0);
                assert_eq!(permit.load(Ordering::SeqCst), round);
                drop(permit);
            }
            assert_eq!(waiter.join(), 0);
        }

        assert!(barged > 0);
        assert_eq!(sema.count(), 1);
        assert_eq!(sema.wait().load(Ordering::SeqCst), ROUNDS);
    }

    #[test]
    #[should_panic(expected = "interrupt handler")]
    fn wait_in_handler_panics() {
        let sema = Semaphore::new(1, ());
        let _handler = interrupt::enter_handler();
        let _permit = sema.wait();
    }

    #[test]
    fn signal_in_handler_is_allowed() {
        let sema = Semaphore::new(0, ());
        {
            let _handler = interrupt::enter_handler();
            sema.signal();
        }
        assert_eq!(sema.count(), 1);
    }
}
