#![allow(dead_code)]

use core::alloc::Layout;
use core::ptr::NonNull;
use lfrc::{make, make_with_allocator, Global, RawAllocator, Shared, Weak};
use tracing::{debug, trace};

cfg_if::cfg_if! {
    if #[cfg(loom)] {
        pub(crate) use loom::sync::atomic::{AtomicUsize, Ordering};
        pub(crate) use loom::sync::Arc;
        pub(crate) use loom::thread;
    } else if #[cfg(feature = "shuttle")] {
        pub(crate) use shuttle::sync::atomic::{AtomicUsize, Ordering};
        pub(crate) use shuttle::sync::Arc;
        pub(crate) use shuttle::thread;
    } else if #[cfg(feature = "std")] {
        pub(crate) use std::sync::atomic::{AtomicUsize, Ordering};
        pub(crate) use std::sync::Arc;
        pub(crate) use std::thread;
    }
}

/// Constructor and destructor calls of [Tracked] values, shared by every thread of a test.
#[derive(Debug)]
pub(crate) struct Calls {
    constructed: AtomicUsize,
    destroyed: AtomicUsize,
}

impl Calls {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            constructed: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
        })
    }

    pub(crate) fn constructed(&self) -> usize {
        self.constructed.load(Ordering::Acquire)
    }

    pub(crate) fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub(crate) struct Tracked {
    pub(crate) id: usize,
    calls: Arc<Calls>,
}

impl Tracked {
    pub(crate) fn new(id: usize, calls: &Arc<Calls>) -> Self {
        calls.constructed.fetch_add(1, Ordering::AcqRel);
        Self {
            id,
            calls: calls.clone(),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.calls.destroyed.fetch_add(1, Ordering::AcqRel);
    }
}

/// Forwards to [Global] and counts how many blocks are still outstanding.
#[derive(Debug, Clone)]
pub(crate) struct CountingAllocator {
    outstanding: Arc<AtomicUsize>,
}

impl CountingAllocator {
    pub(crate) fn new() -> (Self, Arc<AtomicUsize>) {
        let outstanding: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
        (
            Self {
                outstanding: outstanding.clone(),
            },
            outstanding,
        )
    }
}

unsafe impl RawAllocator for CountingAllocator {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let ptr: NonNull<u8> = Global.allocate(layout)?;
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        Some(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        Global.deallocate(ptr, layout)
    }
}

/// Every thread repeatedly copies a shared handle into a local one and then overwrites the local
/// copy with a freshly made value. Only the original value may survive.
pub(crate) fn copy_and_assign_test(num_threads: usize, iterations: usize) {
    let calls: Arc<Calls> = Calls::new();
    let shared: Shared<Tracked> = make(Tracked::new(0, &calls));

    let join_handles: Vec<thread::JoinHandle<()>> = (0..num_threads)
        .map(|i| {
            let shared: Shared<Tracked> = shared.clone();
            let calls: Arc<Calls> = calls.clone();
            thread::spawn(move || {
                for j in 0..iterations {
                    let mut local: Shared<Tracked> = shared.clone();
                    assert_eq!(local.id, 0);
                    let fresh: Shared<Tracked> = make(Tracked::new(i * iterations + j + 1, &calls));
                    local.clone_from(&fresh);
                    assert_eq!(local.use_count(), 2);
                    trace!("thread {i} finished iteration {j}");
                }
            })
        })
        .collect();

    join_handles
        .into_iter()
        .for_each(|join_handle| join_handle.join().expect("A thread panicked"));

    debug!(
        "constructed {}, destroyed {}",
        calls.constructed(),
        calls.destroyed()
    );
    assert_eq!(calls.constructed(), num_threads * iterations + 1);
    assert_eq!(calls.destroyed(), num_threads * iterations);
    assert_eq!(shared.use_count(), 1);
    assert_eq!(shared.id, 0);
}

/// One thread releases the last strong handle while the others try to promote weak handles.
/// Each promotion either sees the intact value or a null handle, the value is destroyed exactly
/// once, and the block is returned to its allocator once everything is released.
pub(crate) fn promote_while_releasing_test(num_threads: usize) {
    let calls: Arc<Calls> = Calls::new();
    let (allocator, outstanding) = CountingAllocator::new();
    let shared: Shared<Tracked> = match make_with_allocator(Tracked::new(7, &calls), allocator) {
        Ok(shared) => shared,
        Err(error) => panic!("{error}"),
    };
    let weak: Weak<Tracked> = shared.downgrade();

    let releaser: thread::JoinHandle<()> = thread::spawn(move || drop(shared));
    let join_handles: Vec<thread::JoinHandle<()>> = (0..num_threads)
        .map(|_| {
            let weak: Weak<Tracked> = weak.clone();
            thread::spawn(move || {
                let locked: Shared<Tracked> = weak.lock();
                match locked.get() {
                    Some(value) => assert_eq!(value.id, 7),
                    None => assert!(weak.expired()),
                }
            })
        })
        .collect();

    releaser.join().expect("The releasing thread panicked");
    join_handles
        .into_iter()
        .for_each(|join_handle| join_handle.join().expect("A thread panicked"));

    assert!(weak.expired());
    assert!(weak.lock().is_null());
    assert_eq!(calls.constructed(), 1);
    assert_eq!(calls.destroyed(), 1);
    assert_eq!(outstanding.load(Ordering::Acquire), 1);

    drop(weak);
    assert_eq!(outstanding.load(Ordering::Acquire), 0);
}

/// Threads create, copy, promote and drop weak handles while a strong handle stays alive.
pub(crate) fn weak_churn_test(num_threads: usize, iterations: usize) {
    let calls: Arc<Calls> = Calls::new();
    let mut shared: Shared<Tracked> = make(Tracked::new(3, &calls));

    let join_handles: Vec<thread::JoinHandle<()>> = (0..num_threads)
        .map(|_| {
            let weak: Weak<Tracked> = shared.downgrade();
            thread::spawn(move || {
                for _ in 0..iterations {
                    let copy: Weak<Tracked> = weak.clone();
                    let locked: Shared<Tracked> = copy.lock();
                    assert_eq!(locked.id, 3);
                    let mut assigned: Weak<Tracked> = Weak::new();
                    assigned.clone_from(&copy);
                    assert!(!assigned.expired());
                }
            })
        })
        .collect();

    join_handles
        .into_iter()
        .for_each(|join_handle| join_handle.join().expect("A thread panicked"));

    assert_eq!(shared.use_count(), 1);
    assert_eq!(shared.weak_count(), 0);

    let weak: Weak<Tracked> = shared.downgrade();
    shared.reset();
    assert!(weak.expired());
    assert_eq!(calls.destroyed(), 1);
}

/// Two handles to different values are swapped with each other's copies concurrently. Both values
/// survive until every handle is gone.
pub(crate) fn concurrent_reassignment_test(num_threads: usize, iterations: usize) {
    let calls: Arc<Calls> = Calls::new();
    let first: Shared<Tracked> = make(Tracked::new(1, &calls));
    let second: Shared<Tracked> = make(Tracked::new(2, &calls));

    let join_handles: Vec<thread::JoinHandle<()>> = (0..num_threads)
        .map(|i| {
            let mut mine: Shared<Tracked> = first.clone();
            let mut other: Shared<Tracked> = second.clone();
            thread::spawn(move || {
                for _ in 0..iterations {
                    mine.swap(&mut other);
                    if i % 2 == 0 {
                        mine.clone_from(&other);
                    }
                    assert!(mine.id == 1 || mine.id == 2);
                }
            })
        })
        .collect();

    join_handles
        .into_iter()
        .for_each(|join_handle| join_handle.join().expect("A thread panicked"));

    assert_eq!(first.use_count(), 1);
    assert_eq!(second.use_count(), 1);
    assert_eq!(calls.destroyed(), 0);
    drop(first);
    drop(second);
    assert_eq!(calls.destroyed(), 2);
}

/// One slot per thread, each written before the thread releases its handle. Dropping the value
/// checks that every write is visible to the finalizing thread.
pub(crate) struct Slots {
    slots: Vec<AtomicUsize>,
    finalized: Arc<AtomicUsize>,
}

impl Drop for Slots {
    fn drop(&mut self) {
        for (i, slot) in self.slots.iter().enumerate() {
            // Relaxed: only the handles' release and the finalizer's acquire order these.
            assert_eq!(slot.load(Ordering::Relaxed), i + 1, "write to slot {i} was lost");
        }
        self.finalized.fetch_add(1, Ordering::AcqRel);
    }
}

/// Every thread stores into its own slot of the value and then drops its strong handle. Whichever
/// thread finalizes the value must observe all of those stores.
pub(crate) fn publish_before_release_test(num_threads: usize) {
    let finalized: Arc<AtomicUsize> = Arc::new(AtomicUsize::new(0));
    let shared: Shared<Slots> = make(Slots {
        slots: (0..num_threads).map(|_| AtomicUsize::new(0)).collect(),
        finalized: finalized.clone(),
    });

    let join_handles: Vec<thread::JoinHandle<()>> = (0..num_threads)
        .map(|i| {
            let shared: Shared<Slots> = shared.clone();
            thread::spawn(move || {
                shared.slots[i].store(i + 1, Ordering::Relaxed);
                drop(shared);
            })
        })
        .collect();
    drop(shared);

    join_handles
        .into_iter()
        .for_each(|join_handle| join_handle.join().expect("A thread panicked"));

    assert_eq!(finalized.load(Ordering::Acquire), 1);
}
