use crate::allocator::{allocate_block, RawAllocator};
use crate::block::{ControlBlock, RawHandle};
use crate::err::Error;
use core::alloc::Layout;
use core::marker::PhantomData;
use core::mem::{self, ManuallyDrop};
use core::ptr::{self, NonNull};

use tracing::trace;

/// A control block followed by `len` elements, all in one allocation. The struct is only the
/// fixed-size prefix; the elements start `elements_offset` bytes after it.
#[repr(C)]
pub(crate) struct ArrayBlock<A> {
    control: ControlBlock,
    allocator: ManuallyDrop<A>,
    len: usize,
    elements_offset: usize,
    /// The layout the whole block was allocated with.
    layout: Layout,
}

impl<A: RawAllocator + Send + 'static> ArrayBlock<A> {
    /// Compute the layout of a block holding `len` elements and the offset of the first element.
    fn layout_for<T>(len: usize) -> Result<(Layout, usize), Error> {
        let elements: Layout = Layout::array::<T>(len).map_err(|_| Error::CapacityOverflow(len))?;
        let (layout, elements_offset) = Layout::new::<Self>()
            .extend(elements)
            .map_err(|_| Error::CapacityOverflow(len))?;
        Ok((layout.pad_to_align(), elements_offset))
    }

    /// Allocate a block with room for `len` elements, none of them constructed yet.
    pub(crate) fn allocate<T>(len: usize, allocator: A) -> Result<UninitArray<T, A>, Error> {
        let (layout, elements_offset) = Self::layout_for::<T>(len)?;
        let block: NonNull<Self> = allocate_block(&allocator, layout)?.cast();
        trace!("allocated array block of {} bytes for {len} elements", layout.size());
        unsafe {
            block.as_ptr().write(Self {
                control: ControlBlock::new(Self::destroy_value::<T>, Self::deallocate_self),
                allocator: ManuallyDrop::new(allocator),
                len,
                elements_offset,
                layout,
            });
        }
        Ok(UninitArray {
            block,
            initialized: 0,
            marker: PhantomData,
        })
    }

    unsafe fn elements<T>(block: NonNull<Self>) -> *mut T {
        let offset: usize = (*block.as_ptr()).elements_offset;
        (block.as_ptr() as *mut u8).add(offset) as *mut T
    }

    unsafe fn destroy_value<T>(control: NonNull<ControlBlock>) {
        let block: NonNull<Self> = control.cast();
        let len: usize = (*block.as_ptr()).len;
        trace!("destroying {len} array elements");
        // drop_in_place on a slice keeps dropping the remaining elements if one of them panics
        ptr::drop_in_place(ptr::slice_from_raw_parts_mut(Self::elements::<T>(block), len));
    }

    unsafe fn deallocate_self(control: NonNull<ControlBlock>) {
        Self::release_storage(control.cast());
    }

    unsafe fn release_storage(block: NonNull<Self>) {
        let raw: *mut Self = block.as_ptr();
        let allocator: A = ManuallyDrop::take(&mut (*raw).allocator);
        let layout: Layout = (*raw).layout;
        ptr::drop_in_place(ptr::addr_of_mut!((*raw).control));
        allocator.deallocate(block.cast(), layout);
    }
}

/// An [ArrayBlock] whose elements are being constructed front to back.
///
/// Dropping it before [UninitArray::finish] drops exactly the elements constructed so far and
/// returns the storage to the allocator.
pub(crate) struct UninitArray<T, A: RawAllocator + Send + 'static> {
    block: NonNull<ArrayBlock<A>>,
    initialized: usize,
    marker: PhantomData<T>,
}

impl<T, A: RawAllocator + Send + 'static> UninitArray<T, A> {
    pub(crate) fn len(&self) -> usize {
        unsafe { (*self.block.as_ptr()).len }
    }

    /// Construct the next element in place. Must be called at most [UninitArray::len] times.
    pub(crate) fn push(&mut self, element: T) {
        assert!(self.initialized < self.len(), "array block is already full");
        unsafe { ArrayBlock::elements::<T>(self.block).add(self.initialized).write(element) };
        self.initialized += 1;
    }

    /// Hand the block over to a strong handle. Every element must have been pushed.
    pub(crate) fn finish(self) -> RawHandle<[T]> {
        let len: usize = self.len();
        assert_eq!(self.initialized, len, "array block was not fully constructed");
        let block: NonNull<ArrayBlock<A>> = self.block;
        mem::forget(self);
        unsafe {
            let elements: *mut [T] =
                ptr::slice_from_raw_parts_mut(ArrayBlock::elements::<T>(block), len);
            RawHandle {
                block: block.cast(),
                value: NonNull::new_unchecked(elements),
            }
        }
    }
}

impl<T, A: RawAllocator + Send + 'static> Drop for UninitArray<T, A> {
    fn drop(&mut self) {
        trace!(
            "array construction stopped after {} elements; releasing array block",
            self.initialized
        );
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
                ArrayBlock::elements::<T>(self.block),
                self.initialized,
            ));
            ArrayBlock::release_storage(self.block);
        }
    }
}
