use crate::allocator::{allocate_block, RawAllocator};
use crate::block::{ControlBlock, RawHandle};
use crate::err::Error;
use core::alloc::Layout;
use core::mem::{self, ManuallyDrop, MaybeUninit};
use core::ptr::{self, NonNull};

use tracing::trace;

/// A control block and its managed value in a single allocation.
#[repr(C)]
pub(crate) struct InlineBlock<T, A: RawAllocator> {
    control: ControlBlock,
    allocator: ManuallyDrop<A>,
    value: MaybeUninit<T>,
}

impl<T, A: RawAllocator + Send + 'static> InlineBlock<T, A> {
    /// Allocate the block and initialize its counters, leaving the value unconstructed.
    pub(crate) fn allocate(allocator: A) -> Result<UninitInline<T, A>, Error> {
        let layout: Layout = Layout::new::<Self>();
        let block: NonNull<Self> = allocate_block(&allocator, layout)?.cast();
        trace!("allocated inline block of {} bytes", layout.size());
        unsafe {
            let raw: *mut Self = block.as_ptr();
            ptr::addr_of_mut!((*raw).control)
                .write(ControlBlock::new(Self::destroy_value, Self::deallocate_self));
            ptr::addr_of_mut!((*raw).allocator).write(ManuallyDrop::new(allocator));
        }
        Ok(UninitInline { block })
    }

    unsafe fn destroy_value(control: NonNull<ControlBlock>) {
        let block: *mut Self = control.cast::<Self>().as_ptr();
        ptr::drop_in_place(ptr::addr_of_mut!((*block).value) as *mut T);
    }

    unsafe fn deallocate_self(control: NonNull<ControlBlock>) {
        Self::release_storage(control.cast::<Self>());
    }

    /// Return the block to its allocator. The value must already be destroyed or never have been
    /// constructed.
    unsafe fn release_storage(block: NonNull<Self>) {
        let raw: *mut Self = block.as_ptr();
        let allocator: A = ManuallyDrop::take(&mut (*raw).allocator);
        ptr::drop_in_place(ptr::addr_of_mut!((*raw).control));
        allocator.deallocate(block.cast(), Layout::new::<Self>());
    }
}

/// An [InlineBlock] whose value has not been constructed yet.
///
/// Dropping it returns the storage to the allocator without touching the value, so a constructor
/// which fails or panics after allocation leaks nothing and never has its output finalized.
pub(crate) struct UninitInline<T, A: RawAllocator + Send + 'static> {
    block: NonNull<InlineBlock<T, A>>,
}

impl<T, A: RawAllocator + Send + 'static> UninitInline<T, A> {
    /// Move `value` into the block, producing a handle which owns the block's single strong unit.
    pub(crate) fn finish(self, value: T) -> RawHandle<T> {
        let block: NonNull<InlineBlock<T, A>> = self.block;
        mem::forget(self);
        unsafe {
            let value_ptr: *mut T = ptr::addr_of_mut!((*block.as_ptr()).value) as *mut T;
            value_ptr.write(value);
            RawHandle {
                block: block.cast(),
                value: NonNull::new_unchecked(value_ptr),
            }
        }
    }
}

impl<T, A: RawAllocator + Send + 'static> Drop for UninitInline<T, A> {
    fn drop(&mut self) {
        trace!("value was never constructed; releasing inline block");
        unsafe { InlineBlock::release_storage(self.block) }
    }
}
