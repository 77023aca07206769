//! ABI layer for reference-counted objects.
//!
//! A handle is an opaque pointer to one shared object; `pyrt_refcount_data`
//! yields its zero-initialized, 16-byte aligned payload. The handle itself
//! carries no holder identity: every `retain` must be balanced by one
//! `release` on the same handle value.

use std::ffi::{c_int, c_void};
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};

use pyrt_core::error::{ErrorKind, RuntimeResult, raise};
use pyrt_membrane::RefCounted;

/// Called once with the payload address when the count reaches zero.
pub type DestructorFn = unsafe extern "C" fn(payload: *mut c_void);

#[repr(C, align(16))]
#[derive(Clone, Copy)]
struct Chunk([u8; 16]);

type Payload = Box<[Chunk]>;

#[track_caller]
fn zeroed_payload(size: usize) -> RuntimeResult<Payload> {
    let chunks = size.div_ceil(size_of::<Chunk>());
    let mut payload = Vec::new();
    if payload.try_reserve_exact(chunks).is_err() {
        return Err(raise(
            ErrorKind::Memory,
            format!("failed to allocate refcounted payload of {size} bytes"),
            "pyrt_refcount_new",
        ));
    }
    payload.resize(chunks, Chunk([0; 16]));
    Ok(payload.into_boxed_slice())
}

/// Run `f` against the object behind `handle` without giving up a holder.
///
/// # Safety
///
/// Non-null `handle` must come from `pyrt_refcount_new` and still be held.
#[track_caller]
unsafe fn with_object<R>(
    handle: *mut c_void,
    function: &'static str,
    f: impl FnOnce(&RefCounted<Payload>) -> R,
) -> RuntimeResult<R> {
    let Some(raw) = NonNull::new(handle) else {
        return Err(raise(ErrorKind::Value, "refcounted handle is null", function));
    };
    // SAFETY: caller contract; `ManuallyDrop` keeps the holder count intact.
    let object = ManuallyDrop::new(unsafe { RefCounted::<Payload>::from_raw(raw.cast()) });
    Ok(f(&object))
}

/// New object with a count of one and a zeroed payload of `payload_size`
/// bytes. Null with MemoryError on exhaustion.
#[unsafe(no_mangle)]
pub extern "C" fn pyrt_refcount_new(
    payload_size: usize,
    destructor: Option<DestructorFn>,
) -> *mut c_void {
    let Ok(payload) = zeroed_payload(payload_size) else {
        return ptr::null_mut();
    };
    let object = match destructor {
        Some(destructor) => RefCounted::with_destructor(payload, move |payload: &mut Payload| {
            // SAFETY: the payload is live until after the destructor returns.
            unsafe { destructor(payload.as_mut_ptr().cast()) }
        }),
        None => RefCounted::new(payload),
    };
    object.into_raw().as_ptr().cast()
}

/// Add a holder. Returns `handle`, or null with ValueError for a null handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_refcount_retain(handle: *mut c_void) -> *mut c_void {
    // SAFETY: forwarded caller contract.
    let retained = unsafe {
        with_object(handle, "pyrt_refcount_retain", |object| {
            object.retain().into_raw()
        })
    };
    retained.map_or(ptr::null_mut(), |raw| raw.as_ptr().cast())
}

/// Drop a holder. Returns `1` if this destroyed the object (the destructor
/// has run and `handle` is dangling), `0` otherwise. Null returns `0` with
/// ValueError.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_refcount_release(handle: *mut c_void) -> c_int {
    let Some(raw) = NonNull::new(handle) else {
        let _ = raise(
            ErrorKind::Value,
            "refcounted handle is null",
            "pyrt_refcount_release",
        );
        return 0;
    };
    // SAFETY: caller gives up one holder produced by new/retain.
    let object = unsafe { RefCounted::<Payload>::from_raw(raw.cast()) };
    c_int::from(object.release())
}

/// Current holder count; `0` for null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_refcount_count(handle: *mut c_void) -> usize {
    if handle.is_null() {
        return 0;
    }
    // SAFETY: forwarded caller contract.
    unsafe { with_object(handle, "pyrt_refcount_count", RefCounted::count) }.unwrap_or(0)
}

/// Payload address, valid while any holder remains.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_refcount_data(handle: *mut c_void) -> *mut c_void {
    // SAFETY: forwarded caller contract; no Rust borrow of the payload
    // outlives this call.
    let data = unsafe {
        with_object(handle, "pyrt_refcount_data", |object| {
            (*object.as_ptr()).as_mut_ptr()
        })
    };
    data.map_or(ptr::null_mut(), |chunks| chunks.cast())
}
