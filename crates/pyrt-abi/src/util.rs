//! Shared helpers for turning C arguments into runtime values.

use std::borrow::Cow;
use std::ffi::{CStr, c_char, c_int};

use pyrt_core::error::{ErrorKind, RuntimeResult, raise};

/// Borrow a C string, or `None` for null.
///
/// # Safety
///
/// Non-null `ptr` must be NUL-terminated and outlive the returned borrow.
pub(crate) unsafe fn opt_cstr<'a>(ptr: *const c_char) -> Option<Cow<'a, str>> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: caller contract.
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy())
}

/// Map a runtime result onto an ABI status code (`0` on success).
pub(crate) fn status(result: RuntimeResult<()>) -> c_int {
    match result {
        Ok(()) => ErrorKind::Ok.code(),
        Err(err) => err.kind().code(),
    }
}

/// Reject a null handle with a Value-kind error naming `function`.
#[track_caller]
pub(crate) fn require<T>(ptr: *const T, function: &'static str, what: &str) -> RuntimeResult<()> {
    if ptr.is_null() {
        Err(raise(ErrorKind::Value, format!("{what} is null"), function))
    } else {
        Ok(())
    }
}
