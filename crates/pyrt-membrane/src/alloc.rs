//! Checked allocation and memory counters.
//!
//! Raw heap access goes through a [`RawAllocator`]. The default is the C heap
//! so pointers handed to generated code can be released with `free`.
//! [`RecordingAllocator`] keeps every block alive for its own lifetime and
//! logs releases, which lets tests observe double registration without a
//! real double free.

use std::cell::{Cell, RefCell};
use std::ffi::{CStr, c_char};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU64, Ordering};

use pyrt_core::error::{ErrorKind, RuntimeError, RuntimeResult, raise};

use crate::config::tracking_level;

/// Source of raw heap blocks.
pub trait RawAllocator {
    /// `size` bytes, or null on exhaustion.
    fn allocate(&self, size: usize) -> *mut u8;

    /// `size` zeroed bytes, or null on exhaustion.
    fn allocate_zeroed(&self, size: usize) -> *mut u8 {
        let block = self.allocate(size);
        if !block.is_null() {
            // SAFETY: `allocate` returned a block valid for `size` bytes.
            unsafe { ptr::write_bytes(block, 0, size) };
        }
        block
    }

    /// Resize a block. On null the original block is untouched.
    ///
    /// # Safety
    ///
    /// `block` must be null or a live block from this allocator.
    unsafe fn reallocate(&self, block: *mut u8, new_size: usize) -> *mut u8;

    /// # Safety
    ///
    /// `block` must be a live block from this allocator. It is dead afterwards.
    unsafe fn release(&self, block: *mut u8);
}

impl<A: RawAllocator + ?Sized> RawAllocator for &A {
    fn allocate(&self, size: usize) -> *mut u8 {
        (**self).allocate(size)
    }

    fn allocate_zeroed(&self, size: usize) -> *mut u8 {
        (**self).allocate_zeroed(size)
    }

    unsafe fn reallocate(&self, block: *mut u8, new_size: usize) -> *mut u8 {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).reallocate(block, new_size) }
    }

    unsafe fn release(&self, block: *mut u8) {
        // SAFETY: forwarded caller contract.
        unsafe { (**self).release(block) }
    }
}

/// The C heap (`malloc`/`calloc`/`realloc`/`free`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemAllocator;

impl RawAllocator for SystemAllocator {
    fn allocate(&self, size: usize) -> *mut u8 {
        // SAFETY: malloc has no preconditions.
        unsafe { libc::malloc(size).cast() }
    }

    fn allocate_zeroed(&self, size: usize) -> *mut u8 {
        // SAFETY: calloc has no preconditions.
        unsafe { libc::calloc(1, size).cast() }
    }

    unsafe fn reallocate(&self, block: *mut u8, new_size: usize) -> *mut u8 {
        // SAFETY: caller guarantees `block` is null or from malloc.
        unsafe { libc::realloc(block.cast(), new_size).cast() }
    }

    unsafe fn release(&self, block: *mut u8) {
        // SAFETY: caller guarantees `block` is a live malloc block.
        unsafe { libc::free(block.cast()) }
    }
}

/// Allocator that owns every block until it is dropped and records each
/// release instead of freeing.
///
/// An optional budget makes allocation fail once exhausted.
#[derive(Debug, Default)]
pub struct RecordingAllocator {
    blocks: RefCell<Vec<Box<[u8]>>>,
    releases: RefCell<Vec<usize>>,
    budget: Cell<Option<usize>>,
}

impl RecordingAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `successes` more allocations, then return null.
    #[must_use]
    pub fn failing_after(successes: usize) -> Self {
        let alloc = Self::default();
        alloc.budget.set(Some(successes));
        alloc
    }

    /// Addresses passed to `release`, in call order.
    #[must_use]
    pub fn releases(&self) -> Vec<usize> {
        self.releases.borrow().clone()
    }

    /// How many times `block` was released.
    #[must_use]
    pub fn release_count(&self, block: *const u8) -> usize {
        let addr = block as usize;
        self.releases.borrow().iter().filter(|&&a| a == addr).count()
    }

    #[must_use]
    pub fn allocations(&self) -> usize {
        self.blocks.borrow().len()
    }

    fn take_budget(&self) -> bool {
        match self.budget.get() {
            None => true,
            Some(0) => false,
            Some(n) => {
                self.budget.set(Some(n - 1));
                true
            }
        }
    }

    fn block_len(&self, block: *const u8) -> Option<usize> {
        self.blocks
            .borrow()
            .iter()
            .find(|b| ptr::eq(b.as_ptr(), block))
            .map(|b| b.len())
    }
}

impl RawAllocator for RecordingAllocator {
    fn allocate(&self, size: usize) -> *mut u8 {
        if !self.take_budget() {
            return ptr::null_mut();
        }
        let mut block = vec![0u8; size.max(1)].into_boxed_slice();
        let addr = block.as_mut_ptr();
        self.blocks.borrow_mut().push(block);
        addr
    }

    unsafe fn reallocate(&self, block: *mut u8, new_size: usize) -> *mut u8 {
        let grown = self.allocate(new_size);
        if grown.is_null() || block.is_null() {
            return grown;
        }
        let old_len = self.block_len(block).unwrap_or(0);
        // SAFETY: both blocks are owned by `self.blocks`, distinct, and at
        // least `min(old_len, new_size)` bytes long.
        unsafe { ptr::copy_nonoverlapping(block, grown, old_len.min(new_size)) };
        self.releases.borrow_mut().push(block as usize);
        grown
    }

    unsafe fn release(&self, block: *mut u8) {
        self.releases.borrow_mut().push(block as usize);
    }
}

/// Snapshot of the memory counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub total_allocated: u64,
    pub total_freed: u64,
    pub current_allocated: u64,
    pub peak_allocated: u64,
    pub allocation_count: u64,
    pub free_count: u64,
}

/// Allocation counters. Relaxed atomics: diagnostic only.
#[derive(Debug, Default)]
pub struct MemoryTracker {
    total_allocated: AtomicU64,
    total_freed: AtomicU64,
    current_allocated: AtomicU64,
    peak_allocated: AtomicU64,
    allocation_count: AtomicU64,
    free_count: AtomicU64,
}

impl MemoryTracker {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            total_allocated: AtomicU64::new(0),
            total_freed: AtomicU64::new(0),
            current_allocated: AtomicU64::new(0),
            peak_allocated: AtomicU64::new(0),
            allocation_count: AtomicU64::new(0),
            free_count: AtomicU64::new(0),
        }
    }

    pub fn on_alloc(&self, size: usize) {
        let size = size as u64;
        self.total_allocated.fetch_add(size, Ordering::Relaxed);
        self.allocation_count.fetch_add(1, Ordering::Relaxed);
        let current = self.current_allocated.fetch_add(size, Ordering::Relaxed) + size;
        self.peak_allocated.fetch_max(current, Ordering::Relaxed);
    }

    /// Count a free. `size` is `None` when the block size is unknown, in which
    /// case only the free count moves.
    pub fn on_free(&self, size: Option<usize>) {
        self.free_count.fetch_add(1, Ordering::Relaxed);
        if let Some(size) = size {
            let size = size as u64;
            self.total_freed.fetch_add(size, Ordering::Relaxed);
            let _ = self
                .current_allocated
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |cur| {
                    Some(cur.saturating_sub(size))
                });
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> MemoryStats {
        MemoryStats {
            total_allocated: self.total_allocated.load(Ordering::Relaxed),
            total_freed: self.total_freed.load(Ordering::Relaxed),
            current_allocated: self.current_allocated.load(Ordering::Relaxed),
            peak_allocated: self.peak_allocated.load(Ordering::Relaxed),
            allocation_count: self.allocation_count.load(Ordering::Relaxed),
            free_count: self.free_count.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.total_allocated,
            &self.total_freed,
            &self.current_allocated,
            &self.peak_allocated,
            &self.allocation_count,
            &self.free_count,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn has_leaks(&self) -> bool {
        self.current_allocated.load(Ordering::Relaxed) > 0
    }
}

static TRACKER: MemoryTracker = MemoryTracker::new();

/// Process-wide counters, updated when tracking is `stats` or `trace`.
#[must_use]
pub fn tracker() -> &'static MemoryTracker {
    &TRACKER
}

#[must_use]
pub fn stats() -> MemoryStats {
    TRACKER.snapshot()
}

pub fn reset_stats() {
    TRACKER.reset();
}

#[must_use]
pub fn has_leaks() -> bool {
    TRACKER.has_leaks()
}

pub(crate) fn note_alloc(size: usize) {
    if tracking_level().counts_enabled() {
        TRACKER.on_alloc(size);
    }
}

pub(crate) fn note_free(size: Option<usize>) {
    if tracking_level().counts_enabled() {
        TRACKER.on_free(size);
    }
}

/// `malloc` that rejects zero sizes and reports exhaustion.
#[track_caller]
pub fn checked_malloc_in<A: RawAllocator + ?Sized>(
    alloc: &A,
    size: usize,
) -> RuntimeResult<NonNull<u8>> {
    if size == 0 {
        return Err(raise(
            ErrorKind::Value,
            "cannot allocate zero bytes",
            "checked_malloc",
        ));
    }
    match NonNull::new(alloc.allocate(size)) {
        Some(block) => {
            note_alloc(size);
            Ok(block)
        }
        None => Err(raise(
            ErrorKind::Memory,
            format!("failed to allocate {size} bytes"),
            "checked_malloc",
        )),
    }
}

#[track_caller]
pub fn checked_malloc(size: usize) -> RuntimeResult<NonNull<u8>> {
    checked_malloc_in(&SystemAllocator, size)
}

/// Zeroed `count * size` bytes. Zero or overflowing requests fail with
/// [`ErrorKind::Value`].
#[track_caller]
pub fn checked_calloc_in<A: RawAllocator + ?Sized>(
    alloc: &A,
    count: usize,
    size: usize,
) -> RuntimeResult<NonNull<u8>> {
    if count == 0 || size == 0 {
        return Err(raise(
            ErrorKind::Value,
            "cannot allocate zero elements",
            "checked_calloc",
        ));
    }
    let Some(total) = count.checked_mul(size) else {
        return Err(raise(
            ErrorKind::Value,
            format!("allocation size overflow: {count} * {size}"),
            "checked_calloc",
        ));
    };
    match NonNull::new(alloc.allocate_zeroed(total)) {
        Some(block) => {
            note_alloc(total);
            Ok(block)
        }
        None => Err(raise(
            ErrorKind::Memory,
            format!("failed to allocate {total} bytes"),
            "checked_calloc",
        )),
    }
}

#[track_caller]
pub fn checked_calloc(count: usize, size: usize) -> RuntimeResult<NonNull<u8>> {
    checked_calloc_in(&SystemAllocator, count, size)
}

/// Resize `block`. A zero `new_size` releases the block and yields `None`.
/// On failure the original block is still live.
///
/// # Safety
///
/// `block` must be null or a live block from `alloc`.
#[track_caller]
pub unsafe fn checked_realloc_in<A: RawAllocator + ?Sized>(
    alloc: &A,
    block: *mut u8,
    new_size: usize,
) -> RuntimeResult<Option<NonNull<u8>>> {
    if new_size == 0 {
        if !block.is_null() {
            // SAFETY: caller contract.
            unsafe { alloc.release(block) };
            note_free(None);
        }
        return Ok(None);
    }
    // SAFETY: caller contract.
    let resized = unsafe { alloc.reallocate(block, new_size) };
    match NonNull::new(resized) {
        Some(resized) => {
            if block.is_null() {
                note_alloc(new_size);
            }
            Ok(Some(resized))
        }
        None => Err(raise(
            ErrorKind::Memory,
            format!("failed to reallocate to {new_size} bytes"),
            "checked_realloc",
        )),
    }
}

/// # Safety
///
/// `block` must be null or a live C-heap block.
#[track_caller]
pub unsafe fn checked_realloc(
    block: *mut u8,
    new_size: usize,
) -> RuntimeResult<Option<NonNull<u8>>> {
    // SAFETY: forwarded caller contract.
    unsafe { checked_realloc_in(&SystemAllocator, block, new_size) }
}

/// Null-tolerant free.
///
/// # Safety
///
/// `block` must be null or a live block from `alloc`.
pub unsafe fn release_in<A: RawAllocator + ?Sized>(
    alloc: &A,
    block: *mut u8,
    size: Option<usize>,
) {
    if block.is_null() {
        return;
    }
    // SAFETY: caller contract.
    unsafe { alloc.release(block) };
    note_free(size);
}

/// # Safety
///
/// `block` must be null or a live C-heap block.
pub unsafe fn release(block: *mut u8) {
    // SAFETY: forwarded caller contract.
    unsafe { release_in(&SystemAllocator, block, None) }
}

#[track_caller]
fn overrun(function: &'static str, what: &str, count: usize, capacity: usize) -> RuntimeError {
    raise(
        ErrorKind::Value,
        format!("{what} {count} exceeds destination size {capacity}"),
        function,
    )
}

/// Copy all of `src` into the front of `dest`. Nothing is written when
/// `src` is longer than `dest`.
#[track_caller]
pub fn copy_checked(dest: &mut [u8], src: &[u8]) -> RuntimeResult<()> {
    if src.len() > dest.len() {
        return Err(overrun("copy_checked", "source size", src.len(), dest.len()));
    }
    dest[..src.len()].copy_from_slice(src);
    Ok(())
}

/// Move `count` bytes inside `buf` from `src_offset` to `dest_offset`;
/// the ranges may overlap.
#[track_caller]
pub fn move_checked(
    buf: &mut [u8],
    src_offset: usize,
    dest_offset: usize,
    count: usize,
) -> RuntimeResult<()> {
    let src_end = src_offset.checked_add(count);
    let dest_end = dest_offset.checked_add(count);
    match (src_end, dest_end) {
        (Some(s), Some(d)) if s <= buf.len() && d <= buf.len() => {
            buf.copy_within(src_offset..s, dest_offset);
            Ok(())
        }
        _ => Err(overrun("move_checked", "move of", count, buf.len())),
    }
}

/// Set the first `count` bytes of `dest` to `value`.
#[track_caller]
pub fn fill_checked(dest: &mut [u8], value: u8, count: usize) -> RuntimeResult<()> {
    if count > dest.len() {
        return Err(overrun("fill_checked", "count", count, dest.len()));
    }
    dest[..count].fill(value);
    Ok(())
}

/// Bounded `memcpy` (or `memmove` when `overlapping`) over raw pointers.
///
/// # Safety
///
/// Non-null `dest` must be writable for `dest_size` bytes and non-null `src`
/// readable for `src_size` bytes. Unless `overlapping` is set the regions must
/// not overlap.
#[track_caller]
pub unsafe fn copy_raw(
    dest: *mut u8,
    dest_size: usize,
    src: *const u8,
    src_size: usize,
    overlapping: bool,
) -> RuntimeResult<()> {
    let function = if overlapping { "memmove_safe" } else { "memcpy_safe" };
    if dest.is_null() || src.is_null() {
        return Err(raise(ErrorKind::Value, "null pointer in copy", function));
    }
    if src_size > dest_size {
        return Err(overrun(function, "source size", src_size, dest_size));
    }
    // SAFETY: both regions are valid for `src_size` bytes per caller contract.
    unsafe {
        if overlapping {
            ptr::copy(src, dest, src_size);
        } else {
            ptr::copy_nonoverlapping(src, dest, src_size);
        }
    }
    Ok(())
}

/// Bounded `memset` over a raw pointer.
///
/// # Safety
///
/// Non-null `dest` must be writable for `dest_size` bytes.
#[track_caller]
pub unsafe fn fill_raw(
    dest: *mut u8,
    dest_size: usize,
    value: u8,
    count: usize,
) -> RuntimeResult<()> {
    if dest.is_null() {
        return Err(raise(ErrorKind::Value, "null pointer in fill", "memset_safe"));
    }
    if count > dest_size {
        return Err(overrun("memset_safe", "count", count, dest_size));
    }
    // SAFETY: `dest` is valid for `count <= dest_size` bytes.
    unsafe { ptr::write_bytes(dest, value, count) };
    Ok(())
}

/// Copy `text` onto the C heap with a trailing NUL.
#[track_caller]
pub fn duplicate_str(text: &str) -> RuntimeResult<NonNull<c_char>> {
    let bytes = text.as_bytes();
    let block = checked_malloc(bytes.len() + 1)?;
    // SAFETY: `block` holds `len + 1` bytes and cannot overlap `text`.
    unsafe {
        ptr::copy_nonoverlapping(bytes.as_ptr(), block.as_ptr(), bytes.len());
        block.as_ptr().add(bytes.len()).write(0);
    }
    Ok(block.cast())
}

/// `strdup` with error reporting.
///
/// # Safety
///
/// Non-null `src` must point at a NUL-terminated string.
#[track_caller]
pub unsafe fn duplicate_c_str(src: *const c_char) -> RuntimeResult<NonNull<c_char>> {
    if src.is_null() {
        return Err(raise(ErrorKind::Value, "cannot duplicate null string", "strdup"));
    }
    // SAFETY: caller guarantees NUL termination.
    let bytes = unsafe { CStr::from_ptr(src) }.to_bytes_with_nul();
    let block = checked_malloc(bytes.len())?;
    // SAFETY: `block` holds `bytes.len()` bytes.
    unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), block.as_ptr(), bytes.len()) };
    Ok(block.cast())
}
