use crate::allocator::{allocate_block, RawAllocator};
use crate::block::{ControlBlock, RawHandle};
use crate::err::Error;
use alloc::boxed::Box;
use core::alloc::Layout;
use core::mem::ManuallyDrop;
use core::ptr::{self, NonNull};

use tracing::trace;

/// Finalizes a value whose storage is owned outside of its control block.
///
/// Every `FnOnce(NonNull<T>)` closure is a deleter. The deleter runs exactly once, on whichever
/// thread releases the last strong reference.
pub trait Deleter<T: ?Sized> {
    /// Destroy the value at `ptr` and release its storage.
    fn delete(self, ptr: NonNull<T>);
}

impl<T: ?Sized, F: FnOnce(NonNull<T>)> Deleter<T> for F {
    fn delete(self, ptr: NonNull<T>) {
        self(ptr)
    }
}

/// Reclaims values which were allocated as a [Box], including unsized ones such as
/// `Box<dyn Trait>` or `Box<[T]>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BoxDeleter;

impl<T: ?Sized> Deleter<T> for BoxDeleter {
    fn delete(self, ptr: NonNull<T>) {
        // Only reachable through Shared::from_box, which hands over a pointer from Box::into_raw.
        drop(unsafe { Box::from_raw(ptr.as_ptr()) });
    }
}

/// A control block which points at a separately allocated value and finalizes it with a
/// [Deleter].
#[repr(C)]
pub(crate) struct DeleterBlock<T: ?Sized, D, A> {
    control: ControlBlock,
    allocator: ManuallyDrop<A>,
    deleter: ManuallyDrop<D>,
    value: NonNull<T>,
}

impl<T: ?Sized, D, A> DeleterBlock<T, D, A>
where
    D: Deleter<T> + Send + 'static,
    A: RawAllocator + Send + 'static,
{
    /// Allocate a block taking ownership of `value`.
    ///
    /// If the block cannot be allocated, `deleter` is run on `value` before the error is returned,
    /// so ownership of the value is never lost.
    pub(crate) fn allocate(value: NonNull<T>, deleter: D, allocator: A) -> Result<RawHandle<T>, Error> {
        let layout: Layout = Layout::new::<Self>();
        let block: NonNull<Self> = match allocate_block(&allocator, layout) {
            Ok(block) => block.cast(),
            Err(error) => {
                trace!("could not allocate deleter block; finalizing value immediately");
                deleter.delete(value);
                return Err(error);
            }
        };
        unsafe {
            let raw: *mut Self = block.as_ptr();
            ptr::addr_of_mut!((*raw).control)
                .write(ControlBlock::new(Self::destroy_value, Self::deallocate_self));
            ptr::addr_of_mut!((*raw).allocator).write(ManuallyDrop::new(allocator));
            ptr::addr_of_mut!((*raw).deleter).write(ManuallyDrop::new(deleter));
            ptr::addr_of_mut!((*raw).value).write(value);
        }
        Ok(RawHandle {
            block: block.cast(),
            value,
        })
    }

    unsafe fn destroy_value(control: NonNull<ControlBlock>) {
        let raw: *mut Self = control.cast::<Self>().as_ptr();
        let deleter: D = ManuallyDrop::take(&mut (*raw).deleter);
        let value: NonNull<T> = (*raw).value;
        deleter.delete(value);
    }

    unsafe fn deallocate_self(control: NonNull<ControlBlock>) {
        let block: NonNull<Self> = control.cast::<Self>();
        let raw: *mut Self = block.as_ptr();
        let allocator: A = ManuallyDrop::take(&mut (*raw).allocator);
        ptr::drop_in_place(ptr::addr_of_mut!((*raw).control));
        allocator.deallocate(block.cast(), Layout::new::<Self>());
    }
}
