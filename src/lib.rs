//! A lock-free, atomically reference-counted shared pointer.
//!
//! [Shared] is an owning handle and [Weak] is a non-owning one. Both refer to a control block
//! holding two atomic counters, and every count change is a single atomic read-modify-write, so
//! handles can be cloned, dropped, downgraded and promoted from any number of threads without
//! locks.
//!
//! The managed value is destroyed exactly once, by whichever thread releases the last strong
//! reference. The control block itself is released once the last strong and the last weak
//! references are gone.
//!
//! Values are created through the functions in [factory], which place the value inside its control
//! block, or adopted from a [Box] or from a raw pointer with a custom [Deleter]. Blocks can come
//! from any [RawAllocator], and arrays of elements can share a single block.
//!
//! ```
//! use lfrc::{make, Shared, Weak};
//!
//! let shared: Shared<String> = make(String::from("hello"));
//! let weak: Weak<String> = shared.downgrade();
//! assert_eq!(*weak.lock(), "hello");
//!
//! drop(shared);
//! assert!(weak.lock().is_null());
//! ```
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "alloc"))]
compile_error!("lfrc needs the `alloc` feature to allocate control blocks");

extern crate alloc;

pub mod allocator;
mod block;
pub mod err;
pub mod factory;
pub mod shared;
mod sync;
mod types;
pub mod weak;

pub use allocator::{Global, RawAllocator};
pub use block::deleter::{BoxDeleter, Deleter};
pub use err::Error;
pub use factory::{
    make, make_array, make_array_with, make_array_with_allocator, make_with, make_with_allocator,
    make_with_deleter, try_make, try_make_with_allocator,
};
pub use shared::Shared;
pub use weak::Weak;
