//! Functions which build a managed value together with its control block.
//!
//! Every function here allocates the control block and the value storage in one request. The
//! value is produced only after that storage exists, and if producing it fails (a constructor
//! returning `Err`, or panicking) the storage is returned to its allocator, nothing is finalized,
//! and the failure reaches the caller unchanged.

use crate::allocator::{Global, RawAllocator};
use crate::block::array::{ArrayBlock, UninitArray};
use crate::block::deleter::Deleter;
use crate::block::inline::{InlineBlock, UninitInline};
use crate::err::{unwrap_global, Error};
use crate::shared::Shared;

use tracing::instrument;

/// Move `value` into a new control block.
#[instrument(level = "trace", skip_all)]
pub fn make<T>(value: T) -> Shared<T> {
    make_with(move || value)
}

/// Build the managed value with `construct` once the control block has been allocated.
///
/// If `construct` panics, the block is released and the panic continues unwinding.
#[instrument(level = "trace", skip_all)]
pub fn make_with<T, F>(construct: F) -> Shared<T>
where
    F: FnOnce() -> T,
{
    let uninit: UninitInline<T, Global> = unwrap_global(InlineBlock::allocate(Global));
    let value: T = construct();
    unsafe { Shared::from_raw_handle(uninit.finish(value)) }
}

/// Build the managed value with a fallible constructor.
///
/// If `construct` fails, the block is released without finalizing anything and its error is
/// returned unchanged.
#[instrument(level = "trace", skip_all)]
pub fn try_make<T, E, F>(construct: F) -> Result<Shared<T>, E>
where
    F: FnOnce() -> Result<T, E>,
{
    let uninit: UninitInline<T, Global> = unwrap_global(InlineBlock::allocate(Global));
    let value: T = construct()?;
    Ok(unsafe { Shared::from_raw_handle(uninit.finish(value)) })
}

/// Like [make], allocating the control block from `allocator`. The allocator is kept in the
/// block and releases it once the last strong and weak handles are gone.
#[instrument(level = "trace", skip_all, fields(size = core::mem::size_of::<T>()))]
pub fn make_with_allocator<T, A>(value: T, allocator: A) -> Result<Shared<T>, Error>
where
    A: RawAllocator + Send + 'static,
{
    try_make_with_allocator(move || Ok(value), allocator)
}

/// Like [try_make], allocating the control block from `allocator`.
///
/// The caller's error type absorbs allocation failures through `From<Error>`. Allocation happens
/// before `construct` is called, so a refused allocation means `construct` never runs.
#[instrument(level = "trace", skip_all, fields(size = core::mem::size_of::<T>()))]
pub fn try_make_with_allocator<T, A, E, F>(construct: F, allocator: A) -> Result<Shared<T>, E>
where
    A: RawAllocator + Send + 'static,
    E: From<Error>,
    F: FnOnce() -> Result<T, E>,
{
    let uninit: UninitInline<T, A> = InlineBlock::allocate(allocator)?;
    let value: T = construct()?;
    Ok(unsafe { Shared::from_raw_handle(uninit.finish(value)) })
}

/// Take ownership of `ptr`, to be finalized by `deleter` once the last strong handle is released.
/// A null `ptr` produces a null handle.
///
/// # Safety
/// See [Shared::from_raw_with_deleter].
pub unsafe fn make_with_deleter<T: ?Sized, D>(ptr: *mut T, deleter: D) -> Shared<T>
where
    D: Deleter<T> + Send + 'static,
{
    Shared::from_raw_with_deleter(ptr, deleter)
}

/// `len` default-constructed elements sharing one control block.
///
/// # Panics
/// Panics if the block for `len` elements would overflow the address space.
#[instrument(level = "trace")]
pub fn make_array<T: Default>(len: usize) -> Shared<[T]> {
    make_array_with(len, |_| T::default())
}

/// `len` elements, each built by `construct` from its index, sharing one control block.
///
/// If `construct` panics, the elements already built are dropped, the block is released, and the
/// panic continues unwinding.
#[instrument(level = "trace", skip(construct))]
pub fn make_array_with<T, F>(len: usize, construct: F) -> Shared<[T]>
where
    F: FnMut(usize) -> T,
{
    unwrap_global(fill_array(len, Global, construct))
}

/// Like [make_array], allocating the control block from `allocator`.
#[instrument(level = "trace", skip(allocator))]
pub fn make_array_with_allocator<T, A>(len: usize, allocator: A) -> Result<Shared<[T]>, Error>
where
    T: Default,
    A: RawAllocator + Send + 'static,
{
    fill_array(len, allocator, |_| T::default())
}

fn fill_array<T, A, F>(len: usize, allocator: A, mut construct: F) -> Result<Shared<[T]>, Error>
where
    A: RawAllocator + Send + 'static,
    F: FnMut(usize) -> T,
{
    let mut uninit: UninitArray<T, A> = ArrayBlock::allocate(len, allocator)?;
    for index in 0..len {
        uninit.push(construct(index));
    }
    Ok(unsafe { Shared::from_raw_handle(uninit.finish()) })
}
