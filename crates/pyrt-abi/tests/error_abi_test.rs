//! Per-thread error context through the C entry points.

use std::ffi::{CStr, c_int};
use std::ptr;

use pyrt_abi::error_abi::{
    pyrt_error_clear, pyrt_error_code, pyrt_error_from_errno, pyrt_error_has,
    pyrt_error_message, pyrt_error_name, pyrt_error_set,
};
use pyrt_abi::slice_abi::{PyrtNormalizedSlice, PyrtSlice, pyrt_normalize_index, pyrt_normalize_slice};
use pyrt_core::error::last_error;

fn message() -> String {
    // SAFETY: valid until the next call on this thread.
    unsafe { CStr::from_ptr(pyrt_error_message()) }
        .to_string_lossy()
        .into_owned()
}

fn name(code: c_int) -> &'static str {
    // SAFETY: names are static NUL-terminated strings.
    unsafe { CStr::from_ptr(pyrt_error_name(code)) }
        .to_str()
        .unwrap()
}

#[test]
fn set_then_read_back_with_location() {
    pyrt_error_clear();
    assert_eq!(pyrt_error_has(), 0);
    assert_eq!(message(), "");
    // SAFETY: all strings are NUL-terminated literals.
    unsafe {
        pyrt_error_set(4, c"key 'x' not found".as_ptr(), c"gen.c".as_ptr(), 17, c"main".as_ptr());
    }
    assert_eq!(pyrt_error_has(), 1);
    assert_eq!(pyrt_error_code(), 4);
    assert_eq!(message(), "key 'x' not found");
    let err = last_error().unwrap();
    assert_eq!(
        err.to_string(),
        "[KeyError]: key 'x' not found (at gen.c:17 in main)"
    );
    pyrt_error_clear();
    assert_eq!(pyrt_error_code(), 0);
    assert_eq!(message(), "");
}

#[test]
fn null_strings_and_unknown_codes() {
    pyrt_error_clear();
    // SAFETY: null strings are accepted.
    unsafe { pyrt_error_set(42, ptr::null(), ptr::null(), 0, ptr::null()) };
    assert_eq!(pyrt_error_code(), 1);
    assert_eq!(message(), "");
    assert!(last_error().unwrap().location.is_none());
    pyrt_error_clear();
}

#[test]
fn long_messages_are_truncated() {
    pyrt_error_clear();
    let long = std::ffi::CString::new("x".repeat(2000)).unwrap();
    // SAFETY: NUL-terminated message.
    unsafe { pyrt_error_set(5, long.as_ptr(), ptr::null(), 0, ptr::null()) };
    assert_eq!(message().len(), 511);
    pyrt_error_clear();
}

#[test]
fn names_and_errno_mapping() {
    assert_eq!(name(0), "OK");
    assert_eq!(name(3), "IndexError");
    assert_eq!(name(8), "FileNotFoundError");
    assert_eq!(name(-1), "GenericError");
    assert_eq!(pyrt_error_from_errno(libc::ENOMEM), 2);
    assert_eq!(pyrt_error_from_errno(libc::ENOENT), 8);
    assert_eq!(pyrt_error_from_errno(libc::EPERM), 9);
    assert_eq!(pyrt_error_from_errno(libc::EINVAL), 5);
    assert_eq!(pyrt_error_from_errno(libc::EAGAIN), 10);
}

#[test]
fn success_leaves_pending_error_untouched() {
    pyrt_error_clear();
    assert_eq!(pyrt_normalize_index(9, 3), -1);
    assert_eq!(pyrt_error_code(), 3);
    assert_eq!(pyrt_normalize_index(-1, 3), 2);
    assert_eq!(pyrt_error_code(), 3, "success does not clear");
    pyrt_error_clear();
}

#[test]
fn slice_normalization_through_the_abi() {
    pyrt_error_clear();
    let mut out = PyrtNormalizedSlice::default();
    let spec = PyrtSlice {
        start: -100,
        stop: 100,
        has_start: 1,
        has_stop: 1,
        ..PyrtSlice::default()
    };
    // SAFETY: both structs are live locals.
    assert_eq!(unsafe { pyrt_normalize_slice(&spec, 5, &mut out) }, 0);
    assert_eq!(
        out,
        PyrtNormalizedSlice {
            start: 0,
            stop: 5,
            step: 1,
            length: 5
        }
    );

    let reversed = PyrtSlice {
        step: -1,
        has_step: 1,
        ..PyrtSlice::default()
    };
    // SAFETY: as above.
    assert_eq!(unsafe { pyrt_normalize_slice(&reversed, 4, &mut out) }, 0);
    assert_eq!((out.start, out.stop, out.step, out.length), (3, -1, -1, 4));

    let zero = PyrtSlice {
        has_step: 1,
        ..PyrtSlice::default()
    };
    let before = out;
    // SAFETY: as above.
    assert_eq!(unsafe { pyrt_normalize_slice(&zero, 4, &mut out) }, 5);
    assert_eq!(out, before, "output untouched on failure");
    pyrt_error_clear();
}
