use portable_atomic::{AtomicU64, Ordering};

/// Process-wide allocator used by every [`Pool`](crate::Pool).
pub(crate) static POOL_INDEX: IndexAllocator = IndexAllocator::new();

/// A lock-free, monotonic index allocator.
///
/// Every call to [`allocate`](Self::allocate) returns a value strictly greater
/// than any value previously returned by the same allocator. Values are never
/// recycled, so an index identifies one pool for the whole process lifetime
/// and can safely namespace its in-process endpoints.
///
/// The counter is only reachable through `allocate`; there is no way to read
/// or reset it.
#[derive(Debug)]
pub struct IndexAllocator {
    next: AtomicU64,
}

impl IndexAllocator {
    /// Creates an allocator whose first index is `0`.
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
        }
    }

    /// Returns the next unused index.
    ///
    /// Safe to call from any number of threads concurrently.
    pub fn allocate(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IndexAllocator {
    fn default() -> Self {
        Self::new()
    }
}
