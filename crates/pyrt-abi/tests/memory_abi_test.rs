//! Scope, pool, refcount, registry and checked-heap entry points.

use std::ffi::{CStr, c_int, c_void};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use pyrt_abi::error_abi::{pyrt_error_clear, pyrt_error_code};
use pyrt_abi::malloc_abi::{
    pyrt_calloc, pyrt_free, pyrt_malloc, pyrt_memcpy_safe, pyrt_memmove_safe, pyrt_memset_safe,
    pyrt_realloc, pyrt_strdup,
};
use pyrt_abi::pool_abi::{
    pyrt_pool_alloc, pyrt_pool_capacity, pyrt_pool_free, pyrt_pool_new, pyrt_pool_reset,
    pyrt_pool_used,
};
use pyrt_abi::refcount_abi::{
    pyrt_refcount_count, pyrt_refcount_data, pyrt_refcount_new, pyrt_refcount_release,
    pyrt_refcount_retain,
};
use pyrt_abi::registry_abi::{
    pyrt_registry_cleanup_all, pyrt_registry_count, pyrt_registry_free, pyrt_registry_new,
    pyrt_registry_register,
};
use pyrt_abi::scope_abi::{
    pyrt_scope_alloc, pyrt_scope_calloc, pyrt_scope_count, pyrt_scope_free, pyrt_scope_new,
    pyrt_scope_register,
};

const VALUE_ERROR: c_int = 5;

static DESTRUCTOR_CALLS: AtomicUsize = AtomicUsize::new(0);
static DESTRUCTOR_LOCK: Mutex<()> = Mutex::new(());

unsafe extern "C" fn count_destructor(payload: *mut c_void) {
    assert!(!payload.is_null());
    DESTRUCTOR_CALLS.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn scope_owns_allocations_and_adopted_blocks() {
    pyrt_error_clear();
    let scope = pyrt_scope_new();
    assert!(!scope.is_null());
    // SAFETY: `scope` is a live handle; blocks are used within their sizes.
    unsafe {
        let a = pyrt_scope_alloc(scope, 32);
        assert!(!a.is_null());
        a.cast::<u8>().write_bytes(0x5A, 32);

        let z = pyrt_scope_calloc(scope, 4, 8);
        let zeroed = std::slice::from_raw_parts(z.cast::<u8>(), 32);
        assert!(zeroed.iter().all(|&b| b == 0));

        let foreign = libc::malloc(16);
        assert_eq!(pyrt_scope_register(scope, foreign), 0);
        assert_eq!(pyrt_scope_count(scope), 3);

        assert!(pyrt_scope_alloc(scope, 0).is_null());
        assert_eq!(pyrt_error_code(), VALUE_ERROR);
        assert_eq!(pyrt_scope_count(scope), 3);
        pyrt_error_clear();

        assert_eq!(pyrt_scope_register(scope, ptr::null_mut()), VALUE_ERROR);
        pyrt_error_clear();

        pyrt_scope_free(scope);
        pyrt_scope_free(ptr::null_mut());
    }
}

#[test]
fn null_scope_handle_is_value_error() {
    pyrt_error_clear();
    // SAFETY: null handles are rejected.
    unsafe {
        assert!(pyrt_scope_alloc(ptr::null_mut(), 8).is_null());
        assert_eq!(pyrt_error_code(), VALUE_ERROR);
        assert_eq!(pyrt_scope_count(ptr::null()), 0);
    }
    pyrt_error_clear();
}

#[test]
fn pool_alignment_growth_and_reset() {
    let pool = pyrt_pool_new(64);
    assert!(!pool.is_null());
    let align = std::mem::size_of::<usize>();
    // SAFETY: `pool` is a live handle; addresses are only used before growth.
    unsafe {
        assert_eq!(pyrt_pool_capacity(pool), 64);
        let a = pyrt_pool_alloc(pool, 3);
        let b = pyrt_pool_alloc(pool, 5);
        assert_eq!(b as usize - a as usize, align);
        assert_eq!(pyrt_pool_used(pool), 2 * align);

        let big = pyrt_pool_alloc(pool, 100);
        assert!(!big.is_null());
        assert!(pyrt_pool_capacity(pool) >= 2 * align + 100);

        pyrt_pool_reset(pool);
        assert_eq!(pyrt_pool_used(pool), 0);
        let again = pyrt_pool_alloc(pool, 1);
        assert!(!again.is_null());
        assert_eq!(pyrt_pool_used(pool), align);

        pyrt_pool_free(pool);
        pyrt_pool_free(ptr::null_mut());
    }
}

#[test]
fn pool_zero_capacity_uses_default() {
    let pool = pyrt_pool_new(0);
    // SAFETY: live handle, freed once.
    unsafe {
        assert!(pyrt_pool_capacity(pool) > 0);
        pyrt_pool_free(pool);
    }
}

#[test]
fn refcount_destructor_runs_once_at_zero() {
    let _guard = DESTRUCTOR_LOCK.lock().unwrap();
    DESTRUCTOR_CALLS.store(0, Ordering::SeqCst);
    let handle = pyrt_refcount_new(24, Some(count_destructor));
    assert!(!handle.is_null());
    // SAFETY: `handle` is live until the final release.
    unsafe {
        let data = pyrt_refcount_data(handle);
        assert_eq!(data as usize % 16, 0);
        let bytes = std::slice::from_raw_parts_mut(data.cast::<u8>(), 24);
        assert!(bytes.iter().all(|&b| b == 0));
        bytes[0] = 42;

        assert_eq!(pyrt_refcount_retain(handle), handle);
        assert_eq!(pyrt_refcount_count(handle), 2);
        assert_eq!(pyrt_refcount_release(handle), 0);
        assert_eq!(DESTRUCTOR_CALLS.load(Ordering::SeqCst), 0);
        assert_eq!(pyrt_refcount_count(handle), 1);
        assert_eq!(*pyrt_refcount_data(handle).cast::<u8>(), 42);

        assert_eq!(pyrt_refcount_release(handle), 1);
    }
    assert_eq!(DESTRUCTOR_CALLS.load(Ordering::SeqCst), 1);
}

#[test]
fn refcount_null_handles() {
    pyrt_error_clear();
    // SAFETY: null handles are rejected.
    unsafe {
        assert!(pyrt_refcount_retain(ptr::null_mut()).is_null());
        assert_eq!(pyrt_error_code(), VALUE_ERROR);
        pyrt_error_clear();
        assert_eq!(pyrt_refcount_release(ptr::null_mut()), 0);
        assert_eq!(pyrt_error_code(), VALUE_ERROR);
        pyrt_error_clear();
        assert_eq!(pyrt_refcount_count(ptr::null_mut()), 0);
        assert_eq!(pyrt_error_code(), 0);
    }
    pyrt_error_clear();
    let plain = pyrt_refcount_new(0, None);
    // SAFETY: live handle released once.
    unsafe {
        assert_eq!(pyrt_refcount_count(plain), 1);
        assert_eq!(pyrt_refcount_release(plain), 1);
    }
}

unsafe extern "C" fn record_cleanup(resource: *mut c_void) {
    // SAFETY: resources in this test are `Vec<u32>` order logs paired with a tag.
    let (log, tag) = unsafe { &mut *resource.cast::<(*mut Vec<u32>, u32)>() };
    // SAFETY: the log outlives the registry.
    unsafe { (**log).push(*tag) };
}

#[test]
fn registry_runs_cleanups_newest_first() {
    pyrt_error_clear();
    let mut log: Vec<u32> = Vec::new();
    let log_ptr = ptr::from_mut(&mut log);
    let mut resources: Vec<(*mut Vec<u32>, u32)> = (1..=3).map(|tag| (log_ptr, tag)).collect();
    let registry = pyrt_registry_new();
    // SAFETY: resources outlive the registry; cleanup matches their layout.
    unsafe {
        for resource in &mut resources {
            let rc = pyrt_registry_register(
                registry,
                ptr::from_mut(resource).cast(),
                Some(record_cleanup),
                c"entry".as_ptr(),
            );
            assert_eq!(rc, 0);
        }
        assert_eq!(
            pyrt_registry_register(registry, ptr::null_mut(), Some(record_cleanup), ptr::null()),
            VALUE_ERROR
        );
        pyrt_error_clear();
        assert_eq!(
            pyrt_registry_register(
                registry,
                ptr::from_mut(&mut resources[0]).cast(),
                None,
                ptr::null()
            ),
            VALUE_ERROR
        );
        pyrt_error_clear();
        assert_eq!(pyrt_registry_count(registry), 3);
        assert_eq!(pyrt_registry_cleanup_all(registry), 3);
        assert_eq!(pyrt_registry_cleanup_all(registry), 0);
        pyrt_registry_free(registry);
    }
    assert_eq!(log, vec![3, 2, 1]);
}

#[test]
fn checked_heap_round_trip() {
    pyrt_error_clear();
    // SAFETY: every block is used within its size and freed once.
    unsafe {
        assert!(pyrt_malloc(0).is_null());
        assert_eq!(pyrt_error_code(), VALUE_ERROR);
        pyrt_error_clear();
        assert!(pyrt_calloc(usize::MAX, 2).is_null());
        assert_eq!(pyrt_error_code(), VALUE_ERROR);
        pyrt_error_clear();

        let block = pyrt_malloc(8);
        assert!(!block.is_null());
        assert_eq!(pyrt_memset_safe(block, 0x7F, 8, 8), 0);
        assert_eq!(pyrt_memset_safe(block, 0, 9, 8), VALUE_ERROR);
        pyrt_error_clear();
        assert!(std::slice::from_raw_parts(block.cast::<u8>(), 8).iter().all(|&b| b == 0x7F));

        let grown = pyrt_realloc(block, 64);
        assert!(!grown.is_null());
        assert_eq!(*grown.cast::<u8>().add(7), 0x7F);

        let src = *b"abcdef";
        assert_eq!(pyrt_memcpy_safe(grown, 64, src.as_ptr().cast(), src.len()), 0);
        assert_eq!(pyrt_memcpy_safe(grown, 4, src.as_ptr().cast(), src.len()), VALUE_ERROR);
        pyrt_error_clear();
        assert_eq!(pyrt_memmove_safe(grown.cast::<u8>().add(1).cast(), 63, grown, 5), 0);
        assert_eq!(std::slice::from_raw_parts(grown.cast::<u8>(), 6), b"aabcde");

        assert!(pyrt_realloc(grown, 0).is_null());
        assert_eq!(pyrt_error_code(), 0);

        let copy = pyrt_strdup(c"hello".as_ptr());
        assert_eq!(CStr::from_ptr(copy), c"hello");
        pyrt_free(copy.cast());
        assert!(pyrt_strdup(ptr::null()).is_null());
        assert_eq!(pyrt_error_code(), VALUE_ERROR);
        pyrt_free(ptr::null_mut());
    }
    pyrt_error_clear();
}
