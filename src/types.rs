/// The value of a strong or weak counter in a [ControlBlock](crate::block::ControlBlock).
pub(crate) type RefCount = usize;

/// The largest count a handle may observe before incrementing. Past this point the counter is
/// considered overflowed, which can only happen if handles are leaked with `mem::forget` in a loop.
///
/// Keeping the limit at `isize::MAX` leaves enough headroom that even `isize::MAX` threads racing
/// past the check at the same time cannot wrap the counter around to zero.
pub(crate) const MAX_REFCOUNT: RefCount = isize::MAX as usize;

/// Bail out of a counter overflow. Continuing would eventually wrap the counter and free a value
/// which is still referenced.
#[cfg(feature = "std")]
#[cold]
pub(crate) fn refcount_overflow() -> ! {
    std::process::abort()
}

/// Bail out of a counter overflow. Without std, panicking while already panicking is the only way
/// to abort.
#[cfg(not(feature = "std"))]
#[cold]
pub(crate) fn refcount_overflow() -> ! {
    struct PanicOnDrop;
    impl Drop for PanicOnDrop {
        fn drop(&mut self) {
            panic!("reference count overflow");
        }
    }
    let _double_panic = PanicOnDrop;
    panic!("reference count overflow");
}
