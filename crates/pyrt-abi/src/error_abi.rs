//! ABI layer for the per-thread error context.
//!
//! Messages are handed out as pointers into a thread-local C string that is
//! refreshed on every `pyrt_error_message` call; copy the text before the
//! next call on the same thread.

use std::cell::RefCell;
use std::ffi::{CStr, CString, c_char, c_int};

use pyrt_core::error::{self, ErrorKind, Location, errno_to_kind};

use crate::util::opt_cstr;

fn kind_from_code(code: c_int) -> ErrorKind {
    ErrorKind::from_code(code).unwrap_or(ErrorKind::Generic)
}

fn name_cstr(kind: ErrorKind) -> &'static CStr {
    match kind {
        ErrorKind::Ok => c"OK",
        ErrorKind::Generic => c"GenericError",
        ErrorKind::Memory => c"MemoryError",
        ErrorKind::Index => c"IndexError",
        ErrorKind::Key => c"KeyError",
        ErrorKind::Value => c"ValueError",
        ErrorKind::Type => c"TypeError",
        ErrorKind::Io => c"IOError",
        ErrorKind::FileNotFound => c"FileNotFoundError",
        ErrorKind::Permission => c"PermissionError",
        ErrorKind::Runtime => c"RuntimeError",
    }
}

thread_local! {
    static MESSAGE: RefCell<CString> = RefCell::new(CString::default());
}

/// Overwrite the current error. `message`, `file` and `function` may be null.
/// Unknown codes are stored as `GenericError`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_error_set(
    code: c_int,
    message: *const c_char,
    file: *const c_char,
    line: c_int,
    function: *const c_char,
) {
    // SAFETY: non-null strings are NUL-terminated per the C contract.
    let (message, file, function) =
        unsafe { (opt_cstr(message), opt_cstr(file), opt_cstr(function)) };
    let location = file.map(|file| {
        Location::new(
            file.into_owned(),
            u32::try_from(line).unwrap_or(0),
            function.map_or_else(|| String::from("?"), |f| f.into_owned()),
        )
    });
    error::set_error(
        kind_from_code(code),
        message.as_deref().unwrap_or(""),
        location,
    );
}

#[unsafe(no_mangle)]
pub extern "C" fn pyrt_error_code() -> c_int {
    error::last_error_code().code()
}

/// Current message (empty when clear). Valid until the next call on this thread.
#[unsafe(no_mangle)]
pub extern "C" fn pyrt_error_message() -> *const c_char {
    let text = error::last_error_message();
    // Interior NULs cannot come from C callers; Rust-side messages drop them.
    let owned = CString::new(text.replace('\0', "")).unwrap_or_default();
    MESSAGE.with_borrow_mut(|slot| {
        *slot = owned;
        slot.as_ptr()
    })
}

/// Static display name for `code` (`"IndexError"`, ...). Unknown codes map to
/// `"GenericError"`.
#[unsafe(no_mangle)]
pub extern "C" fn pyrt_error_name(code: c_int) -> *const c_char {
    name_cstr(kind_from_code(code)).as_ptr()
}

#[unsafe(no_mangle)]
pub extern "C" fn pyrt_error_clear() {
    error::clear_error();
}

#[unsafe(no_mangle)]
pub extern "C" fn pyrt_error_has() -> c_int {
    c_int::from(error::has_error())
}

/// Write the pending error to stderr.
#[unsafe(no_mangle)]
pub extern "C" fn pyrt_error_print() {
    error::print_error();
}

#[unsafe(no_mangle)]
pub extern "C" fn pyrt_error_from_errno(errno: c_int) -> c_int {
    errno_to_kind(errno).code()
}
