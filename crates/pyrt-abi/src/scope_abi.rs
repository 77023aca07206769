//! ABI layer for scope allocators.
//!
//! A scope handle owns every block allocated through it or registered with
//! it; `pyrt_scope_free` releases them newest first and frees the handle.

use std::ffi::{c_int, c_void};
use std::ptr;

use pyrt_core::error::RuntimeResult;
use pyrt_membrane::ScopeAllocator;

use crate::util::{require, status};

/// Opaque scope handle.
pub struct PyrtScope(ScopeAllocator);

#[unsafe(no_mangle)]
pub extern "C" fn pyrt_scope_new() -> *mut PyrtScope {
    Box::into_raw(Box::new(PyrtScope(ScopeAllocator::open())))
}

/// Allocate `size` bytes owned by `scope`. Null on failure (ValueError for
/// zero, MemoryError on exhaustion).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_scope_alloc(scope: *mut PyrtScope, size: usize) -> *mut c_void {
    let result = (|| -> RuntimeResult<_> {
        require(scope, "pyrt_scope_alloc", "scope")?;
        // SAFETY: non-null handles come from `pyrt_scope_new`.
        let scope = unsafe { &mut (*scope).0 };
        scope.alloc(size)
    })();
    result.map_or(ptr::null_mut(), |block| block.as_ptr().cast())
}

/// Zeroed `count * size` bytes owned by `scope`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_scope_calloc(
    scope: *mut PyrtScope,
    count: usize,
    size: usize,
) -> *mut c_void {
    let result = (|| -> RuntimeResult<_> {
        require(scope, "pyrt_scope_calloc", "scope")?;
        // SAFETY: non-null handles come from `pyrt_scope_new`.
        let scope = unsafe { &mut (*scope).0 };
        scope.alloc_zeroed(count, size)
    })();
    result.map_or(ptr::null_mut(), |block| block.as_ptr().cast())
}

/// Hand a `malloc`ed block to `scope`. Returns `0` or an error code.
/// Registering the same block twice frees it twice.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_scope_register(scope: *mut PyrtScope, block: *mut c_void) -> c_int {
    status((|| -> RuntimeResult<()> {
        require(scope, "pyrt_scope_register", "scope")?;
        // SAFETY: non-null handles come from `pyrt_scope_new`.
        let scope = unsafe { &mut (*scope).0 };
        // SAFETY: caller hands over a live C-heap block.
        unsafe { scope.register(block.cast()) }
    })())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_scope_count(scope: *const PyrtScope) -> usize {
    // SAFETY: non-null handles come from `pyrt_scope_new`.
    unsafe { scope.as_ref() }.map_or(0, |scope| scope.0.len())
}

/// Release everything the scope owns and free the handle. Null is a no-op.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_scope_free(scope: *mut PyrtScope) {
    if scope.is_null() {
        return;
    }
    // SAFETY: non-null handles come from `Box::into_raw` in `pyrt_scope_new`
    // and are freed at most once.
    drop(unsafe { Box::from_raw(scope) });
}
