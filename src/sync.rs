//! A module which decides which synchronization primitives to use throughout the rest of the crate
//! depending on features and configuration options

#[cfg(all(loom, not(feature = "std")))]
compile_error!("loom requires the standard library");

cfg_if::cfg_if! {
    if #[cfg(loom)] {
        pub(crate) use loom::sync::atomic::{fence, AtomicUsize, Ordering};
    } else if #[cfg(feature = "shuttle")] {
        pub(crate) use shuttle::sync::atomic::{AtomicUsize, Ordering};
        // shuttle explores schedules under sequential consistency, so a plain fence is enough
        pub(crate) use core::sync::atomic::fence;
    } else {
        pub(crate) use core::sync::atomic::{fence, AtomicUsize, Ordering};
    }
}
