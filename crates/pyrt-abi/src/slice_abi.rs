//! ABI layer for index and slice normalization.

use std::ffi::c_int;

use pyrt_core::error::{ErrorKind, RuntimeResult, raise};
use pyrt_core::slice::{Range, normalize_index, normalize_slice};

use crate::util::{require, status};

/// `start:stop:step` as written in the source; unset parts have `has_* == 0`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct PyrtSlice {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
    pub has_start: c_int,
    pub has_stop: c_int,
    pub has_step: c_int,
}

/// Normalized bounds. `step` keeps its sign; `length` is the number of
/// indices `start, start+step, ...` visits before reaching `stop`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PyrtNormalizedSlice {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
    pub length: usize,
}

fn flag(set: c_int, value: i64) -> Option<i64> {
    (set != 0).then_some(value)
}

/// Resolve `index` against `length`; `-1` with an IndexError on failure.
#[unsafe(no_mangle)]
pub extern "C" fn pyrt_normalize_index(index: i64, length: usize) -> i64 {
    normalize_index(index, length)
        .ok()
        .and_then(|resolved| i64::try_from(resolved).ok())
        .unwrap_or(-1)
}

/// Normalize `slice` against `length` into `*out`. Returns `0` or an error code;
/// `*out` is untouched on failure.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_normalize_slice(
    slice: *const PyrtSlice,
    length: usize,
    out: *mut PyrtNormalizedSlice,
) -> c_int {
    status((|| -> RuntimeResult<_> {
        require(slice, "pyrt_normalize_slice", "slice")?;
        require(out, "pyrt_normalize_slice", "output slot")?;
        // SAFETY: non-null, points at a caller-owned PyrtSlice.
        let s = unsafe { *slice };
        let normalized = normalize_slice(
            flag(s.has_start, s.start),
            flag(s.has_stop, s.stop),
            flag(s.has_step, s.step),
            length,
        )?;
        // SAFETY: non-null, points at caller-owned writable storage.
        unsafe {
            out.write(PyrtNormalizedSlice {
                start: normalized.start(),
                stop: normalized.stop(),
                step: normalized.step(),
                length: normalized.len(),
            });
        }
        Ok(())
    })())
}

/// Number of values `range(start, stop, step)` produces, or `-1` with a
/// ValueError when `step` is zero.
#[unsafe(no_mangle)]
pub extern "C" fn pyrt_range_len(start: i64, stop: i64, step: i64) -> i64 {
    match Range::new(start, stop, step) {
        Ok(range) => i64::try_from(range.count_total()).unwrap_or(i64::MAX),
        Err(_) => -1,
    }
}

/// `value in range(start, stop, step)` as `0`/`1`; `-1` when `step` is zero.
#[unsafe(no_mangle)]
pub extern "C" fn pyrt_range_contains(start: i64, stop: i64, step: i64, value: i64) -> c_int {
    match Range::new(start, stop, step) {
        Ok(range) => c_int::from(range.contains(value)),
        Err(_) => -1,
    }
}

/// Element `position` of a normalized slice, i.e. `start + position * step`.
/// `-1` with an IndexError when `position >= length`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_slice_index(slice: *const PyrtNormalizedSlice, position: usize) -> i64 {
    let result = (|| -> RuntimeResult<_> {
        require(slice, "pyrt_slice_index", "slice")?;
        // SAFETY: non-null, points at a caller-owned PyrtNormalizedSlice.
        let s = unsafe { *slice };
        if position >= s.length {
            return Err(raise(
                ErrorKind::Index,
                format!("slice position {position} out of range for length {}", s.length),
                "pyrt_slice_index",
            ));
        }
        // Within `length` the visited index always lies in [0, usize::MAX).
        let offset = i64::try_from(position).unwrap_or(i64::MAX);
        Ok(s.start + offset * s.step)
    })();
    result.unwrap_or(-1)
}
