//! ABI layer for memory pools.
//!
//! C callers receive raw addresses into the pool buffer. An address is valid
//! until the next allocation that grows the pool, `pyrt_pool_reset`, or
//! `pyrt_pool_free`.

use std::ffi::c_void;
use std::ptr;

use pyrt_core::error::RuntimeResult;
use pyrt_membrane::MemoryPool;

use crate::util::require;

/// Opaque pool handle.
pub struct PyrtPool(MemoryPool);

/// Open a pool of `initial_capacity` bytes (`0` for the configured default).
/// Null with MemoryError on failure.
#[unsafe(no_mangle)]
pub extern "C" fn pyrt_pool_new(initial_capacity: usize) -> *mut PyrtPool {
    MemoryPool::open(Some(initial_capacity))
        .map_or(ptr::null_mut(), |pool| Box::into_raw(Box::new(PyrtPool(pool))))
}

/// Carve `size` bytes (rounded up to pointer alignment), growing if needed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_pool_alloc(pool: *mut PyrtPool, size: usize) -> *mut c_void {
    let result = (|| -> RuntimeResult<_> {
        require(pool, "pyrt_pool_alloc", "pool")?;
        // SAFETY: non-null handles come from `pyrt_pool_new`.
        let pool = unsafe { &mut (*pool).0 };
        pool.alloc_raw(size)
    })();
    result.map_or(ptr::null_mut(), |block| block.as_ptr().cast())
}

/// Invalidate every block and rewind the pool; capacity is kept.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_pool_reset(pool: *mut PyrtPool) {
    // SAFETY: non-null handles come from `pyrt_pool_new`.
    if let Some(pool) = unsafe { pool.as_mut() } {
        pool.0.reset();
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_pool_used(pool: *const PyrtPool) -> usize {
    // SAFETY: non-null handles come from `pyrt_pool_new`.
    unsafe { pool.as_ref() }.map_or(0, |pool| pool.0.used())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_pool_capacity(pool: *const PyrtPool) -> usize {
    // SAFETY: non-null handles come from `pyrt_pool_new`.
    unsafe { pool.as_ref() }.map_or(0, |pool| pool.0.capacity())
}

/// Release the pool buffer and the handle. Null is a no-op.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_pool_free(pool: *mut PyrtPool) {
    if pool.is_null() {
        return;
    }
    // SAFETY: non-null handles come from `Box::into_raw` in `pyrt_pool_new`
    // and are freed at most once.
    drop(unsafe { Box::from_raw(pool) });
}
