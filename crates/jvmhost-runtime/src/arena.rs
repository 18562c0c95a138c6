//! Call-scoped memory pools.
//!
//! Strings and option arrays handed to the runtime during creation must stay
//! valid until the create call returns, and nothing longer. A [`MemoryPool`]
//! owns those buffers so they can be released together once the call is over.

use std::alloc::{self, Layout};
use std::collections::HashMap;
use std::ffi::{c_char, CString};
use std::ptr::NonNull;

use tracing::trace;

use crate::error::{HostError, HostResult};

/// Alignment of every pool allocation; enough for any option record.
pub const POOL_ALIGN: usize = 16;

/// A pool that tracks allocations until they are released.
pub trait MemoryPool {
    /// Allocate `size` bytes aligned to [`POOL_ALIGN`].
    fn allocate(&mut self, size: usize) -> HostResult<NonNull<u8>>;

    /// Release one allocation. Returns `false` if the pointer is not tracked.
    fn release(&mut self, ptr: NonNull<u8>) -> bool;

    /// Release every tracked allocation. Safe to call repeatedly.
    fn release_all(&mut self);
}

/// Copy `text` into the pool as a NUL-terminated C string.
pub fn pool_strdup(pool: &mut dyn MemoryPool, text: &str) -> HostResult<*mut c_char> {
    let text = CString::new(text)?;
    let bytes = text.as_bytes_with_nul();
    let buf = pool.allocate(bytes.len())?;
    // SAFETY: `buf` is a fresh allocation of `bytes.len()` bytes.
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf.as_ptr(), bytes.len());
    }
    Ok(buf.as_ptr().cast())
}

/// Allocate room for `count` values of `T` from the pool.
pub fn pool_array<T>(pool: &mut dyn MemoryPool, count: usize) -> HostResult<NonNull<T>> {
    debug_assert!(std::mem::align_of::<T>() <= POOL_ALIGN);
    let size = std::mem::size_of::<T>()
        .checked_mul(count)
        .ok_or(HostError::OutOfMemory { size: usize::MAX })?;
    Ok(pool.allocate(size)?.cast())
}

/// Heap-backed pool keyed by allocation address.
#[derive(Debug, Default)]
pub struct SimpleMemoryPool {
    allocations: HashMap<usize, Layout>,
}

impl SimpleMemoryPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self {
            allocations: HashMap::new(),
        }
    }

    /// Number of live allocations.
    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    /// Check whether the pool holds nothing.
    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}

impl MemoryPool for SimpleMemoryPool {
    fn allocate(&mut self, size: usize) -> HostResult<NonNull<u8>> {
        let layout = Layout::from_size_align(size.max(1), POOL_ALIGN)
            .map_err(|_| HostError::OutOfMemory { size })?;
        // SAFETY: the layout has a non-zero size.
        let ptr = unsafe { alloc::alloc(layout) };
        let ptr = NonNull::new(ptr).ok_or(HostError::OutOfMemory { size })?;
        self.allocations.insert(ptr.as_ptr() as usize, layout);
        Ok(ptr)
    }

    fn release(&mut self, ptr: NonNull<u8>) -> bool {
        match self.allocations.remove(&(ptr.as_ptr() as usize)) {
            Some(layout) => {
                // SAFETY: the pointer was produced by `alloc` with this layout
                // and has just been removed from the tracking map.
                unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
                true
            }
            None => false,
        }
    }

    fn release_all(&mut self) {
        if !self.allocations.is_empty() {
            trace!("Releasing {} pool allocations", self.allocations.len());
        }
        for (addr, layout) in self.allocations.drain() {
            // SAFETY: every tracked address came from `alloc` with its layout.
            unsafe { alloc::dealloc(addr as *mut u8, layout) };
        }
    }
}

impl Drop for SimpleMemoryPool {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// Borrows a pool for one call and releases what that call allocated.
///
/// Allocations made through the scope are returned to the underlying pool
/// when the scope drops; anything the pool held beforehand is left alone.
pub struct PoolScope<'a> {
    pool: &'a mut dyn MemoryPool,
    owned: Vec<NonNull<u8>>,
}

impl<'a> PoolScope<'a> {
    pub fn new(pool: &'a mut dyn MemoryPool) -> Self {
        Self {
            pool,
            owned: Vec::new(),
        }
    }

    /// Number of allocations made through this scope that are still live.
    pub fn live(&self) -> usize {
        self.owned.len()
    }
}

impl MemoryPool for PoolScope<'_> {
    fn allocate(&mut self, size: usize) -> HostResult<NonNull<u8>> {
        let ptr = self.pool.allocate(size)?;
        self.owned.push(ptr);
        Ok(ptr)
    }

    fn release(&mut self, ptr: NonNull<u8>) -> bool {
        match self.owned.iter().position(|p| *p == ptr) {
            Some(index) => {
                self.owned.swap_remove(index);
                self.pool.release(ptr)
            }
            None => false,
        }
    }

    fn release_all(&mut self) {
        for ptr in self.owned.drain(..) {
            self.pool.release(ptr);
        }
    }
}

impl Drop for PoolScope<'_> {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn test_allocate_and_release() {
        let mut pool = SimpleMemoryPool::new();
        let a = pool.allocate(32).unwrap();
        let b = pool.allocate(0).unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(a.as_ptr() as usize % POOL_ALIGN, 0);

        assert!(pool.release(a));
        assert!(!pool.release(a), "double release must be rejected");
        assert!(pool.release(b));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_release_foreign_pointer() {
        let mut pool = SimpleMemoryPool::new();
        let mut other = SimpleMemoryPool::new();
        let foreign = other.allocate(8).unwrap();
        assert!(!pool.release(foreign));
        assert!(other.release(foreign));
    }

    #[test]
    fn test_release_all_is_idempotent() {
        let mut pool = SimpleMemoryPool::new();
        pool.release_all();
        for size in [1, 7, 64, 4096] {
            pool.allocate(size).unwrap();
        }
        pool.release_all();
        assert!(pool.is_empty());
        pool.release_all();
        pool.release_all();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_strdup() {
        let mut pool = SimpleMemoryPool::new();
        let s = pool_strdup(&mut pool, "-Xmx256m").unwrap();
        let copied = unsafe { CStr::from_ptr(s) };
        assert_eq!(copied.to_str().unwrap(), "-Xmx256m");
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_strdup_rejects_interior_nul() {
        let mut pool = SimpleMemoryPool::new();
        let err = pool_strdup(&mut pool, "bad\0option").unwrap_err();
        assert!(matches!(err, HostError::InvalidString(_)));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_scope_releases_only_its_allocations() {
        let mut pool = SimpleMemoryPool::new();
        let kept = pool.allocate(16).unwrap();
        {
            let mut scope = PoolScope::new(&mut pool);
            pool_strdup(&mut scope, "exit").unwrap();
            pool_array::<u64>(&mut scope, 4).unwrap();
            assert_eq!(scope.live(), 2);
        }
        assert_eq!(pool.len(), 1);
        assert!(pool.release(kept));
    }
}
