use displaydoc::Display;

/// Any error which can occur while building a control block.
///
/// Failures of the managed value's own constructor are never wrapped in this type: the fallible
/// factories hand them back unchanged.
#[derive(Debug, Display, Clone, Copy, Eq, PartialEq)]
pub enum Error {
    /// The allocator could not provide {size} bytes aligned to {align} for a control block.
    AllocationFailed { size: usize, align: usize },

    /// A control block holding an array of {0} elements does not fit in the address space.
    CapacityOverflow(usize),
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Resolve a block construction result the way the standard collections do when the global
/// allocator is in use: report exhaustion through `handle_alloc_error`, panic on layout overflow.
pub(crate) fn unwrap_global<T>(result: Result<T, Error>) -> T {
    match result {
        Ok(value) => value,
        Err(Error::AllocationFailed { size, align }) => {
            match core::alloc::Layout::from_size_align(size, align) {
                Ok(layout) => alloc::alloc::handle_alloc_error(layout),
                Err(_) => panic!("allocation of {size} bytes aligned to {align} failed"),
            }
        }
        Err(Error::CapacityOverflow(len)) => panic!("capacity overflow: {len} elements"),
    }
}
