use crate::allocator::{Global, RawAllocator};
use crate::block::deleter::{BoxDeleter, Deleter, DeleterBlock};
use crate::block::{ControlBlock, RawHandle};
use crate::err::{unwrap_global, Error};
use crate::types::RefCount;
use crate::weak::Weak;
use alloc::boxed::Box;
use core::cmp::Ordering;
use core::fmt::{self, Debug, Display, Formatter, Pointer};
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use core::mem;
use core::ops::Deref;
use core::ptr::NonNull;

/// An owning, atomically reference-counted handle to a managed value.
///
/// Cloning a `Shared` adds a strong reference to the value's control block; dropping one releases
/// it. The value is destroyed by whichever thread releases the last strong reference, and every
/// write made through any handle before it was released is visible to that thread.
///
/// A `Shared` may be null, in which case it owns nothing and has no control block at all.
/// Besides owning handles created by the [factory](crate::factory) functions, a `Shared` can adopt
/// a [Box] ([Shared::from_box]), adopt a raw pointer together with a custom [Deleter]
/// ([Shared::from_raw_with_deleter]), or point at a sub-object of another handle's value
/// ([Shared::project]).
pub struct Shared<T: ?Sized> {
    raw: Option<RawHandle<T>>,
    marker: PhantomData<T>,
}

unsafe impl<T: ?Sized + Send + Sync> Send for Shared<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for Shared<T> {}

impl<T: ?Sized> Shared<T> {
    /// A handle which owns nothing.
    pub const fn null() -> Self {
        Self {
            raw: None,
            marker: PhantomData,
        }
    }

    /// Wrap a handle which already owns one strong unit of its block.
    ///
    /// # Safety
    /// The caller transfers one strong unit of `raw.block` to the returned handle.
    pub(crate) unsafe fn from_raw_handle(raw: RawHandle<T>) -> Self {
        Self {
            raw: Some(raw),
            marker: PhantomData,
        }
    }

    pub(crate) fn raw_handle(&self) -> Option<RawHandle<T>> {
        self.raw
    }

    /// Take ownership of a boxed value. Unsized values such as `Box<dyn Trait>` are supported; the
    /// value is later dropped and freed exactly as the [Box] would have done.
    pub fn from_box(value: Box<T>) -> Self {
        let ptr: NonNull<T> = unsafe { NonNull::new_unchecked(Box::into_raw(value)) };
        let raw: RawHandle<T> = unwrap_global(DeleterBlock::allocate(ptr, BoxDeleter, Global));
        unsafe { Self::from_raw_handle(raw) }
    }

    /// Take ownership of `ptr`, which `deleter` will finalize once the last strong reference is
    /// released.
    ///
    /// A null `ptr` produces a null handle without allocating a control block; `deleter` is then
    /// dropped without being called.
    ///
    /// # Safety
    /// `ptr` must stay valid for shared access until `deleter` is called with it, and `deleter`
    /// must be sound to call with it once.
    pub unsafe fn from_raw_with_deleter<D>(ptr: *mut T, deleter: D) -> Self
    where
        D: Deleter<T> + Send + 'static,
    {
        unwrap_global(Self::from_raw_with_deleter_in(ptr, deleter, Global))
    }

    /// Like [Shared::from_raw_with_deleter], allocating the control block from `allocator`.
    ///
    /// If the control block cannot be allocated, `deleter` is called with `ptr` before the error
    /// is returned.
    ///
    /// # Safety
    /// Same as [Shared::from_raw_with_deleter].
    pub unsafe fn from_raw_with_deleter_in<D, A>(
        ptr: *mut T,
        deleter: D,
        allocator: A,
    ) -> Result<Self, Error>
    where
        D: Deleter<T> + Send + 'static,
        A: RawAllocator + Send + 'static,
    {
        let ptr: NonNull<T> = match NonNull::new(ptr) {
            Some(ptr) => ptr,
            None => return Ok(Self::null()),
        };
        let raw: RawHandle<T> = DeleterBlock::allocate(ptr, deleter, allocator)?;
        Ok(Self::from_raw_handle(raw))
    }

    /// A handle which shares `owner`'s control block but points at `value`.
    ///
    /// [Shared::use_count] of the result tracks the owner's value, which stays alive as long as
    /// the result does. Aliasing a null owner produces a null handle.
    ///
    /// # Safety
    /// `value` must be valid for shared access for as long as the owner's value is alive.
    ///
    /// The returned handle may be the last strong reference, so the owner's whole value may be
    /// dropped wherever it is released. If `Shared<U>` can cross threads (`U: Send + Sync`) while
    /// `T` is not `Send + Sync`, the caller must keep the result and every handle derived from it
    /// on the owner's thread.
    pub unsafe fn alias<U: ?Sized>(owner: &Self, value: NonNull<U>) -> Shared<U> {
        match owner.raw {
            Some(raw) => {
                raw.control().increment_strong();
                Shared::from_raw_handle(RawHandle {
                    block: raw.block,
                    value,
                })
            }
            None => Shared::null(),
        }
    }

    /// A handle to a part of `owner`'s value, such as one of its fields, which keeps the whole
    /// value alive. Projecting a null owner produces a null handle.
    ///
    /// Releasing the projection may drop the whole owner, possibly on another thread, so the owner
    /// must be `Send + Sync` even when the projected part is:
    ///
    /// ```compile_fail
    /// use lfrc::{make, Shared};
    /// use std::rc::Rc;
    ///
    /// struct Owner {
    ///     _local: Rc<()>,
    ///     field: u32,
    /// }
    ///
    /// let owner: Shared<Owner> = make(Owner { _local: Rc::new(()), field: 7 });
    /// let field: Shared<u32> = Shared::project(&owner, |o: &Owner| &o.field);
    /// ```
    pub fn project<U: ?Sized, F>(owner: &Self, project: F) -> Shared<U>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&T) -> &U,
    {
        match owner.get() {
            Some(value) => {
                let part: NonNull<U> = NonNull::from(project(value));
                unsafe { Self::alias(owner, part) }
            }
            None => Shared::null(),
        }
    }

    /// The managed value, or `None` for a null handle.
    pub fn get(&self) -> Option<&T> {
        self.raw.map(|raw| unsafe { &*raw.value.as_ptr() })
    }

    /// The pointer this handle hands out, or `None` for a null handle.
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.raw.map(|raw| raw.value)
    }

    pub fn is_null(&self) -> bool {
        self.raw.is_none()
    }

    /// A snapshot of the number of strong handles sharing this handle's control block, or zero
    /// for a null handle.
    pub fn use_count(&self) -> RefCount {
        self.raw
            .map_or(0, |raw| unsafe { raw.control() }.strong_count())
    }

    /// A snapshot of the number of weak handles observing this handle's control block.
    pub fn weak_count(&self) -> RefCount {
        self.raw.map_or(0, |raw| unsafe { raw.control() }.weak_count())
    }

    /// Whether this is the only strong handle to its value. Weak handles are not considered.
    pub fn is_unique(&self) -> bool {
        self.use_count() == 1
    }

    /// Create a weak handle observing this handle's value.
    pub fn downgrade(&self) -> Weak<T> {
        Weak::from(self)
    }

    /// Release this handle's reference, leaving it null.
    pub fn reset(&mut self) {
        drop(mem::take(self));
    }

    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other)
    }

    /// Whether both handles share a control block, even if they point at different parts of the
    /// value. Two null handles are considered to share ownership.
    pub fn owner_eq<U: ?Sized>(&self, other: &Shared<U>) -> bool {
        self.raw.map(|raw| raw.block) == other.raw.map(|raw| raw.block)
    }

    /// The address of the value this handle points at, with any metadata dropped.
    fn address(&self) -> *const u8 {
        self.raw.map_or(core::ptr::null(), |raw| raw.address())
    }
}

impl<T: ?Sized> Clone for Shared<T> {
    fn clone(&self) -> Self {
        if let Some(raw) = self.raw {
            unsafe { raw.control() }.increment_strong();
        }
        Self {
            raw: self.raw,
            marker: PhantomData,
        }
    }

    /// Copy-then-swap: the previous reference is released by the temporary, after the new one has
    /// been acquired, so re-assigning a handle from its own family never lets the count touch zero.
    fn clone_from(&mut self, source: &Self) {
        let mut copy: Self = source.clone();
        mem::swap(self, &mut copy);
    }
}

impl<T: ?Sized> Drop for Shared<T> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            unsafe { ControlBlock::decrement_strong(raw.block) };
        }
    }
}

impl<T: ?Sized> Default for Shared<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized> Deref for Shared<T> {
    type Target = T;

    /// # Panics
    /// Panics if the handle is null. Use [Shared::get] to check first.
    fn deref(&self) -> &T {
        match self.get() {
            Some(value) => value,
            None => panic!("dereferenced a null Shared handle"),
        }
    }
}

impl<T> From<T> for Shared<T> {
    fn from(value: T) -> Self {
        crate::factory::make(value)
    }
}

impl<T: ?Sized> From<Box<T>> for Shared<T> {
    fn from(value: Box<T>) -> Self {
        Self::from_box(value)
    }
}

impl<T: ?Sized, U: ?Sized> PartialEq<Shared<U>> for Shared<T> {
    /// Handles are equal when they point at the same address, regardless of which control block
    /// they share.
    fn eq(&self, other: &Shared<U>) -> bool {
        self.address() == other.address()
    }
}

impl<T: ?Sized> Eq for Shared<T> {}

impl<T: ?Sized> PartialOrd for Shared<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: ?Sized> Ord for Shared<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.address().cmp(&other.address())
    }
}

impl<T: ?Sized> Hash for Shared<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state)
    }
}

impl<T: ?Sized + Debug> Debug for Shared<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => Debug::fmt(value, f),
            None => f.write_str("null"),
        }
    }
}

impl<T: ?Sized + Display> Display for Shared<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => Display::fmt(value, f),
            None => f.write_str("null"),
        }
    }
}

impl<T: ?Sized> Pointer for Shared<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Pointer::fmt(&self.address(), f)
    }
}
