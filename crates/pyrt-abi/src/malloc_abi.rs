//! ABI layer for checked heap operations, bounded copies and memory
//! tracking.
//!
//! Blocks returned here live on the C heap and may be released with either
//! `pyrt_free` or libc `free`.

use std::ffi::{c_char, c_int, c_void};
use std::ptr;

use pyrt_core::error::RuntimeResult;
use pyrt_membrane::alloc::{self, MemoryStats};
use pyrt_membrane::config::{self, TrackingLevel};

use crate::util::{require, status};

/// Mirror of the process-wide memory counters.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PyrtMemoryStats {
    pub total_allocated: u64,
    pub total_freed: u64,
    pub current_allocated: u64,
    pub peak_allocated: u64,
    pub allocation_count: u64,
    pub free_count: u64,
}

impl From<MemoryStats> for PyrtMemoryStats {
    fn from(stats: MemoryStats) -> Self {
        Self {
            total_allocated: stats.total_allocated,
            total_freed: stats.total_freed,
            current_allocated: stats.current_allocated,
            peak_allocated: stats.peak_allocated,
            allocation_count: stats.allocation_count,
            free_count: stats.free_count,
        }
    }
}

/// `malloc` that rejects zero sizes. Null with ValueError or MemoryError.
#[unsafe(no_mangle)]
pub extern "C" fn pyrt_malloc(size: usize) -> *mut c_void {
    alloc::checked_malloc(size).map_or(ptr::null_mut(), |block| block.as_ptr().cast())
}

/// Zeroed `count * size` bytes. Null with ValueError on zero or overflow.
#[unsafe(no_mangle)]
pub extern "C" fn pyrt_calloc(count: usize, size: usize) -> *mut c_void {
    alloc::checked_calloc(count, size).map_or(ptr::null_mut(), |block| block.as_ptr().cast())
}

/// Resize `block`. `new_size == 0` frees it and returns null without an
/// error; on failure the original block stays live.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_realloc(block: *mut c_void, new_size: usize) -> *mut c_void {
    // SAFETY: caller passes null or a live C-heap block.
    match unsafe { alloc::checked_realloc(block.cast(), new_size) } {
        Ok(Some(resized)) => resized.as_ptr().cast(),
        Ok(None) | Err(_) => ptr::null_mut(),
    }
}

/// Null-tolerant `free`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_free(block: *mut c_void) {
    // SAFETY: caller passes null or a live C-heap block.
    unsafe { alloc::release(block.cast()) };
}

/// `memcpy` that refuses to write past `dest_size`. Returns `0` or an error
/// code; nothing is written on failure.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_memcpy_safe(
    dest: *mut c_void,
    dest_size: usize,
    src: *const c_void,
    src_size: usize,
) -> c_int {
    // SAFETY: caller contract on the region sizes.
    status(unsafe { alloc::copy_raw(dest.cast(), dest_size, src.cast(), src_size, false) })
}

/// `memmove` counterpart of [`pyrt_memcpy_safe`]; regions may overlap.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_memmove_safe(
    dest: *mut c_void,
    dest_size: usize,
    src: *const c_void,
    src_size: usize,
) -> c_int {
    // SAFETY: caller contract on the region sizes.
    status(unsafe { alloc::copy_raw(dest.cast(), dest_size, src.cast(), src_size, true) })
}

/// `memset` of `count` bytes that refuses to write past `dest_size`.
/// `value` is truncated to a byte as with libc `memset`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_memset_safe(
    dest: *mut c_void,
    value: c_int,
    count: usize,
    dest_size: usize,
) -> c_int {
    // SAFETY: caller contract on the region size.
    status(unsafe { alloc::fill_raw(dest.cast(), dest_size, value as u8, count) })
}

/// `strdup` with error reporting. Null with ValueError for a null source.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_strdup(src: *const c_char) -> *mut c_char {
    // SAFETY: caller passes null or a NUL-terminated string.
    unsafe { alloc::duplicate_c_str(src) }.map_or(ptr::null_mut(), |copy| copy.as_ptr())
}

/// Set the tracking level: `0` off, `1` counters, `2` counters and lifecycle
/// log. Larger values clamp to `2`.
#[unsafe(no_mangle)]
pub extern "C" fn pyrt_memory_tracking(level: c_int) {
    let level = match level {
        i32::MIN..=0 => TrackingLevel::Off,
        1 => TrackingLevel::Stats,
        _ => TrackingLevel::Trace,
    };
    config::set_tracking_level(level);
}

/// Copy the current counters into `*out`. Returns `0` or ValueError for null.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_memory_stats(out: *mut PyrtMemoryStats) -> c_int {
    status((|| -> RuntimeResult<()> {
        require(out, "pyrt_memory_stats", "output slot")?;
        // SAFETY: non-null, caller-owned writable storage.
        unsafe { out.write(alloc::stats().into()) };
        Ok(())
    })())
}

#[unsafe(no_mangle)]
pub extern "C" fn pyrt_memory_reset_stats() {
    alloc::reset_stats();
}

/// `1` while tracked bytes remain allocated.
#[unsafe(no_mangle)]
pub extern "C" fn pyrt_memory_has_leaks() -> c_int {
    c_int::from(alloc::has_leaks())
}
