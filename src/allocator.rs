use core::alloc::Layout;
use core::ptr::NonNull;

/// The minimal allocation capability a control block needs: hand out a block of memory and take it
/// back.
///
/// The allocator is moved into the control block it allocated and is used exactly once more, by
/// whichever thread releases the last reference, to return the block's storage. It is never
/// accessed concurrently, so it only needs to be [Send].
///
/// # Safety
///
/// A non-null pointer returned by `allocate` must be valid for reads and writes of
/// `layout.size()` bytes and aligned to `layout.align()`, and must stay valid until it is passed
/// to `deallocate` with the same layout.
pub unsafe trait RawAllocator {
    /// Allocate memory for `layout`. `layout` never has a size of zero. Returns `None` if the
    /// request cannot be satisfied.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Return memory previously handed out by [RawAllocator::allocate].
    ///
    /// # Safety
    /// `ptr` must have been returned by `allocate` on this allocator (or a value it was moved
    /// from) with the same `layout`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Forwards to the global allocator registered with `#[global_allocator]`.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct Global;

unsafe impl RawAllocator for Global {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        debug_assert!(layout.size() != 0);
        NonNull::new(unsafe { alloc::alloc::alloc(layout) })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        alloc::alloc::dealloc(ptr.as_ptr(), layout)
    }
}

/// Ask `allocator` for `layout`, turning a refusal into [Error](crate::err::Error).
pub(crate) fn allocate_block<A: RawAllocator>(
    allocator: &A,
    layout: Layout,
) -> Result<NonNull<u8>, crate::err::Error> {
    allocator
        .allocate(layout)
        .ok_or(crate::err::Error::AllocationFailed {
            size: layout.size(),
            align: layout.align(),
        })
}
