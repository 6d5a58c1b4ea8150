use crate::sync::{fence, AtomicUsize, Ordering};
use crate::types::{refcount_overflow, RefCount, MAX_REFCOUNT};
use core::ptr::NonNull;

use tracing::trace;

pub(crate) mod array;
pub(crate) mod deleter;
pub(crate) mod inline;

/// A type-erased operation on the block which starts with a [ControlBlock]. Each storage layout
/// supplies its own pair when the block is created.
pub(crate) type BlockFn = unsafe fn(NonNull<ControlBlock>);

/// Bookkeeping shared by every [Shared](crate::Shared) and [Weak](crate::Weak) handle of one
/// managed value.
///
/// Every storage layout is a `#[repr(C)]` struct whose first field is a `ControlBlock`, so a
/// pointer to the layout and a pointer to its control block are interchangeable. The layout
/// specific parts (the value, the deleter, the allocator) are only reached through
/// `destroy_value` and `deallocate_self`.
///
/// The managed value is alive iff `strong > 0`. `weak` counts outstanding weak handles plus one
/// extra unit held collectively by the strong handles while `strong > 0`; the strong side gives
/// that unit up right after destroying the value. The storage is released by whichever decrement
/// takes `weak` to zero, which can only happen once `strong` is zero as well.
#[repr(C)]
pub(crate) struct ControlBlock {
    strong: AtomicUsize,
    weak: AtomicUsize,
    destroy_value: BlockFn,
    deallocate_self: BlockFn,
}

impl ControlBlock {
    /// A control block owned by exactly one strong handle and no weak handles.
    pub(crate) fn new(destroy_value: BlockFn, deallocate_self: BlockFn) -> Self {
        Self {
            strong: AtomicUsize::new(1),
            weak: AtomicUsize::new(1),
            destroy_value,
            deallocate_self,
        }
    }

    /// Add a strong reference on behalf of a caller which already holds one.
    pub(crate) fn increment_strong(&self) {
        // The caller's own reference keeps the count above zero, so nothing needs to be ordered
        // with this increment.
        let previous: RefCount = self.strong.fetch_add(1, Ordering::Relaxed);
        if previous > MAX_REFCOUNT {
            refcount_overflow();
        }
    }

    /// Add a strong reference only if the managed value is still alive.
    ///
    /// Once `strong` has reached zero the value is being or has been destroyed, and it must never
    /// become non-zero again. A blind `fetch_add` could revive it, so the read and the conditional
    /// write are fused into a compare-and-set which is retried until it either succeeds or
    /// observes zero.
    pub(crate) fn try_increment_strong(&self) -> bool {
        let mut current: RefCount = self.strong.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                trace!("value was already destroyed; refusing to promote");
                return false;
            }
            if current > MAX_REFCOUNT {
                refcount_overflow();
            }
            // Acquire on success pairs with the Release decrements of other strong handles, so
            // the promoted handle observes every write made through them.
            match self.strong.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => {
                    trace!("strong count changed from {current} to {actual} during promotion; retrying");
                    current = actual;
                }
            }
        }
    }

    /// Release one strong reference. The thread which releases the last one destroys the value
    /// and then gives up the implicit weak unit, possibly releasing the block itself.
    ///
    /// # Safety
    /// `block` must point to a live control block, and the caller must own one unit of its strong
    /// count. That unit is consumed; `block` must not be used by the caller afterwards.
    pub(crate) unsafe fn decrement_strong(block: NonNull<ControlBlock>) {
        // Release makes every use of the value through this handle happen before the count drops.
        if block.as_ref().strong.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }
        // Pairs with the Release decrements of every other strong handle: their writes to the
        // value are visible before it is destroyed.
        fence(Ordering::Acquire);

        trace!("strong count reached zero; destroying value");
        // Gives up the implicit weak unit even if the value's finalizer unwinds.
        let _implicit_weak: ImplicitWeak = ImplicitWeak(block);
        let destroy_value: BlockFn = block.as_ref().destroy_value;
        destroy_value(block);
    }

    /// Add a weak reference on behalf of a caller which already holds a strong or weak one.
    pub(crate) fn increment_weak(&self) {
        let previous: RefCount = self.weak.fetch_add(1, Ordering::Relaxed);
        if previous > MAX_REFCOUNT {
            refcount_overflow();
        }
    }

    /// Release one weak reference, releasing the block's storage if it was the last reference of
    /// any kind.
    ///
    /// # Safety
    /// `block` must point to a live control block, and the caller must own one unit of its weak
    /// count (or be the strong side giving up its implicit unit). That unit is consumed.
    pub(crate) unsafe fn decrement_weak(block: NonNull<ControlBlock>) {
        if block.as_ref().weak.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }
        fence(Ordering::Acquire);

        trace!("weak count reached zero; releasing control block");
        let deallocate_self: BlockFn = block.as_ref().deallocate_self;
        deallocate_self(block);
    }

    /// A snapshot of the strong count.
    pub(crate) fn strong_count(&self) -> RefCount {
        self.strong.load(Ordering::Acquire)
    }

    /// A snapshot of the number of weak handles, excluding the unit held by the strong side.
    ///
    /// While the last strong handle is being released the implicit unit may still be counted for
    /// a moment, so the result is advisory in the same way as [ControlBlock::strong_count].
    pub(crate) fn weak_count(&self) -> RefCount {
        let weak: RefCount = self.weak.load(Ordering::Acquire);
        let strong: RefCount = self.strong.load(Ordering::Acquire);
        if strong > 0 {
            weak.saturating_sub(1)
        } else {
            weak
        }
    }
}

/// The weak unit held by the strong side, released when dropped.
struct ImplicitWeak(NonNull<ControlBlock>);

impl Drop for ImplicitWeak {
    fn drop(&mut self) {
        unsafe { ControlBlock::decrement_weak(self.0) }
    }
}

/// The two pointers a handle carries: its control block, and the value it hands out.
///
/// The value pointer usually points into the block's managed value, but an aliasing handle may
/// point at any sub-object whose lifetime is bounded by it.
pub(crate) struct RawHandle<T: ?Sized> {
    pub(crate) block: NonNull<ControlBlock>,
    pub(crate) value: NonNull<T>,
}

impl<T: ?Sized> Clone for RawHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for RawHandle<T> {}

impl<T: ?Sized> RawHandle<T> {
    /// # Safety
    /// The block must still be allocated, which holds as long as the caller owns a strong or weak
    /// unit of it.
    pub(crate) unsafe fn control(&self) -> &ControlBlock {
        self.block.as_ref()
    }

    /// The address of the value, with any slice length or vtable dropped.
    pub(crate) fn address(&self) -> *const u8 {
        self.value.cast::<u8>().as_ptr() as *const u8
    }
}
