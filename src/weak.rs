use crate::block::{ControlBlock, RawHandle};
use crate::shared::Shared;
use crate::types::RefCount;
use core::fmt::{self, Debug, Formatter};
use core::marker::PhantomData;
use core::mem;

/// A non-owning handle to a value managed by [Shared] handles.
///
/// A `Weak` keeps the control block allocated but not the value: once the last [Shared] is
/// released the value is destroyed, and [Weak::lock] returns a null handle from then on.
pub struct Weak<T: ?Sized> {
    raw: Option<RawHandle<T>>,
    marker: PhantomData<T>,
}

unsafe impl<T: ?Sized + Send + Sync> Send for Weak<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for Weak<T> {}

impl<T: ?Sized> Weak<T> {
    /// A weak handle which observes nothing. It is always expired.
    pub const fn new() -> Self {
        Self {
            raw: None,
            marker: PhantomData,
        }
    }

    /// Whether the observed value has been destroyed. Null handles are always expired.
    pub fn expired(&self) -> bool {
        self.use_count() == 0
    }

    /// Promote to a strong handle if the value is still alive, otherwise return a null handle.
    ///
    /// A successful result points at the same (possibly projected) address as the handle this one
    /// was downgraded from, and keeps the value alive for as long as it exists.
    pub fn lock(&self) -> Shared<T> {
        match self.raw {
            Some(raw) if unsafe { raw.control() }.try_increment_strong() => unsafe {
                Shared::from_raw_handle(raw)
            },
            _ => Shared::null(),
        }
    }

    /// A snapshot of the number of strong handles to the observed value.
    pub fn use_count(&self) -> RefCount {
        self.raw.map_or(0, |raw| unsafe { raw.control() }.strong_count())
    }

    /// A snapshot of the number of weak handles observing the value, this one included.
    pub fn weak_count(&self) -> RefCount {
        self.raw.map_or(0, |raw| unsafe { raw.control() }.weak_count())
    }

    /// Release this handle's reference to the control block, leaving it null.
    pub fn reset(&mut self) {
        drop(mem::take(self));
    }

    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other)
    }

    /// Whether both handles observe the same control block.
    pub fn owner_eq<U: ?Sized>(&self, other: &Weak<U>) -> bool {
        self.raw.map(|raw| raw.block) == other.raw.map(|raw| raw.block)
    }
}

impl<T: ?Sized> From<&Shared<T>> for Weak<T> {
    fn from(shared: &Shared<T>) -> Self {
        let raw: Option<RawHandle<T>> = shared.raw_handle();
        if let Some(raw) = raw {
            unsafe { raw.control() }.increment_weak();
        }
        Self {
            raw,
            marker: PhantomData,
        }
    }
}

impl<T: ?Sized> Clone for Weak<T> {
    fn clone(&self) -> Self {
        if let Some(raw) = self.raw {
            unsafe { raw.control() }.increment_weak();
        }
        Self {
            raw: self.raw,
            marker: PhantomData,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        let mut copy: Self = source.clone();
        mem::swap(self, &mut copy);
    }
}

impl<T: ?Sized> Drop for Weak<T> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            unsafe { ControlBlock::decrement_weak(raw.block) };
        }
    }
}

impl<T: ?Sized> Default for Weak<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Debug for Weak<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("(Weak)")
    }
}
