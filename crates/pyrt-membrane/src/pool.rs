//! Bump-pointer memory pool.
//!
//! One contiguous buffer hands out pointer-aligned blocks. Blocks are never
//! freed individually: the whole pool is reset or released. When a request
//! does not fit the buffer doubles until it does.
//!
//! Growth moves the buffer, so the safe API hands out [`PoolBlock`] handles
//! (pool id, offset, length, epoch) that are resolved on every access. A
//! handle only resolves against the pool that issued it. `reset` starts a new
//! epoch and older handles are rejected. [`MemoryPool::alloc_raw`] returns
//! a bare address for C callers; that address dies at the next growth, reset
//! or close.

use std::alloc::{Layout, alloc_zeroed, dealloc, realloc};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use pyrt_core::error::{ErrorKind, RuntimeResult, raise};

use crate::alloc::{note_alloc, note_free};
use crate::config::default_pool_capacity;
use crate::lifecycle::{self, LifecycleEvent, LogLevel};

/// Block offsets and sizes are rounded up to this.
pub const POOL_ALIGN: usize = std::mem::size_of::<usize>();

/// Alignment of the backing buffer.
const BUFFER_ALIGN: usize = 16;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to one block of a [`MemoryPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolBlock {
    pool: u64,
    offset: usize,
    len: usize,
    epoch: u64,
}

impl PoolBlock {
    /// Byte offset from the start of the pool buffer.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Requested size in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Id of the pool that issued the block.
    #[must_use]
    pub const fn pool_id(&self) -> u64 {
        self.pool
    }

    /// Pool epoch the block was carved in.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Growable bump allocator with group release.
#[derive(Debug)]
pub struct MemoryPool {
    id: u64,
    buf: NonNull<u8>,
    capacity: usize,
    used: usize,
    allocations: usize,
    epoch: u64,
    growths: u32,
}

#[track_caller]
fn buffer_layout(capacity: usize) -> RuntimeResult<Layout> {
    match Layout::from_size_align(capacity, BUFFER_ALIGN) {
        Ok(layout) => Ok(layout),
        Err(_) => Err(raise(
            ErrorKind::Memory,
            format!("memory pool of {capacity} bytes exceeds the address space"),
            "pool_open",
        )),
    }
}

impl MemoryPool {
    /// Open a pool. `None` or zero uses the configured default capacity.
    #[track_caller]
    pub fn open(initial_capacity: Option<usize>) -> RuntimeResult<Self> {
        let capacity = match initial_capacity {
            Some(n) if n > 0 => n,
            _ => default_pool_capacity(),
        };
        let layout = buffer_layout(capacity)?;
        // SAFETY: `layout` has non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let Some(buf) = NonNull::new(raw) else {
            return Err(raise(
                ErrorKind::Memory,
                format!("failed to allocate memory pool of {capacity} bytes"),
                "pool_open",
            ));
        };
        note_alloc(capacity);
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        lifecycle::emit(|| {
            LifecycleEvent::new("pool", "open")
                .ptr(buf.as_ptr())
                .size(capacity)
                .details(format!("pool={id}"))
        });
        Ok(Self {
            id,
            buf,
            capacity,
            used: 0,
            allocations: 0,
            epoch: 0,
            growths: 0,
        })
    }

    #[track_caller]
    pub fn with_capacity(capacity: usize) -> RuntimeResult<Self> {
        Self::open(Some(capacity))
    }

    /// Carve `size` bytes (zero is allowed and yields an empty block).
    #[track_caller]
    pub fn alloc(&mut self, size: usize) -> RuntimeResult<PoolBlock> {
        let offset = self.bump(size)?;
        Ok(PoolBlock {
            pool: self.id,
            offset,
            len: size,
            epoch: self.epoch,
        })
    }

    /// Carve `size` bytes and return the current address of the block.
    ///
    /// The address is only valid until the next growth, `reset` or close.
    #[track_caller]
    pub fn alloc_raw(&mut self, size: usize) -> RuntimeResult<NonNull<u8>> {
        let offset = self.bump(size)?;
        // SAFETY: `offset <= used <= capacity`, inside the buffer.
        Ok(unsafe { self.buf.add(offset) })
    }

    #[track_caller]
    fn bump(&mut self, size: usize) -> RuntimeResult<usize> {
        let needed = size
            .checked_next_multiple_of(POOL_ALIGN)
            .and_then(|aligned| self.used.checked_add(aligned));
        let Some(needed) = needed else {
            return Err(raise(
                ErrorKind::Memory,
                format!("pool request of {size} bytes overflows"),
                "pool_alloc",
            ));
        };
        if needed > self.capacity {
            self.grow(needed)?;
        }
        let offset = self.used;
        self.used = needed;
        self.allocations += 1;
        Ok(offset)
    }

    #[track_caller]
    fn grow(&mut self, needed: usize) -> RuntimeResult<()> {
        let mut new_capacity = self.capacity;
        while new_capacity < needed {
            match new_capacity.checked_mul(2) {
                Some(doubled) => new_capacity = doubled,
                None => {
                    return Err(raise(
                        ErrorKind::Memory,
                        format!("pool cannot grow to {needed} bytes"),
                        "pool_alloc",
                    ));
                }
            }
        }
        let old_layout = buffer_layout(self.capacity)?;
        buffer_layout(new_capacity)?;
        // SAFETY: `buf` was allocated with `old_layout`; the new size is
        // non-zero and forms a valid layout with the same alignment.
        let raw = unsafe { realloc(self.buf.as_ptr(), old_layout, new_capacity) };
        let Some(buf) = NonNull::new(raw) else {
            lifecycle::emit(|| {
                LifecycleEvent::new("pool", "grow")
                    .level(LogLevel::Warn)
                    .size(new_capacity)
                    .outcome("failed")
                    .details(format!("pool={}", self.id))
            });
            return Err(raise(
                ErrorKind::Memory,
                format!("failed to grow memory pool to {new_capacity} bytes"),
                "pool_alloc",
            ));
        };
        // SAFETY: the tail `[capacity, new_capacity)` belongs to the new buffer.
        unsafe {
            buf.as_ptr()
                .add(self.capacity)
                .write_bytes(0, new_capacity - self.capacity);
        }
        note_alloc(new_capacity - self.capacity);
        lifecycle::emit(|| {
            LifecycleEvent::new("pool", "grow")
                .ptr(buf.as_ptr())
                .size(new_capacity)
                .details(format!("from={}", self.capacity))
        });
        self.buf = buf;
        self.capacity = new_capacity;
        self.growths += 1;
        Ok(())
    }

    #[track_caller]
    fn check(&self, block: &PoolBlock) -> RuntimeResult<()> {
        if block.pool != self.id {
            return Err(raise(
                ErrorKind::Value,
                format!(
                    "pool block belongs to pool {}, not pool {}",
                    block.pool, self.id
                ),
                "pool_access",
            ));
        }
        if block.epoch != self.epoch {
            return Err(raise(
                ErrorKind::Value,
                format!(
                    "stale pool block from epoch {} (pool is at epoch {})",
                    block.epoch, self.epoch
                ),
                "pool_access",
            ));
        }
        match block.offset.checked_add(block.len) {
            Some(end) if end <= self.used => Ok(()),
            _ => Err(raise(
                ErrorKind::Value,
                format!(
                    "pool block {}+{} is outside the used region",
                    block.offset, block.len
                ),
                "pool_access",
            )),
        }
    }

    /// Contents of `block`.
    #[track_caller]
    pub fn bytes(&self, block: &PoolBlock) -> RuntimeResult<&[u8]> {
        self.check(block)?;
        // SAFETY: the range is inside the used, initialized region.
        Ok(unsafe { std::slice::from_raw_parts(self.buf.as_ptr().add(block.offset), block.len) })
    }

    #[track_caller]
    pub fn bytes_mut(&mut self, block: &PoolBlock) -> RuntimeResult<&mut [u8]> {
        self.check(block)?;
        // SAFETY: as in `bytes`, and `&mut self` makes the borrow unique.
        Ok(unsafe {
            std::slice::from_raw_parts_mut(self.buf.as_ptr().add(block.offset), block.len)
        })
    }

    /// Current address of `block`; dies at the next growth, reset or close.
    #[track_caller]
    pub fn address(&self, block: &PoolBlock) -> RuntimeResult<NonNull<u8>> {
        self.check(block)?;
        // SAFETY: offset is inside the buffer.
        Ok(unsafe { self.buf.add(block.offset) })
    }

    /// Forget every block without shrinking. Older handles become stale.
    pub fn reset(&mut self) {
        lifecycle::emit(|| {
            LifecycleEvent::new("pool", "reset")
                .ptr(self.buf.as_ptr())
                .size(self.used)
                .details(format!("allocations={}", self.allocations))
        });
        self.used = 0;
        self.allocations = 0;
        self.epoch += 1;
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes handed out since the last reset, including alignment padding.
    #[must_use]
    pub fn used(&self) -> usize {
        self.used
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity - self.used
    }

    /// Blocks handed out since the last reset.
    #[must_use]
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Times the buffer has doubled.
    #[must_use]
    pub fn growths(&self) -> u32 {
        self.growths
    }

    /// Release the buffer. Equivalent to dropping the pool.
    pub fn close(self) {}
}

impl Drop for MemoryPool {
    fn drop(&mut self) {
        lifecycle::emit(|| {
            LifecycleEvent::new("pool", "close")
                .ptr(self.buf.as_ptr())
                .size(self.capacity)
        });
        if let Ok(layout) = Layout::from_size_align(self.capacity, BUFFER_ALIGN) {
            // SAFETY: `buf` was allocated (or last reallocated) with this layout.
            unsafe { dealloc(self.buf.as_ptr(), layout) };
        }
        note_free(Some(self.capacity));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrt_core::error::{clear_error, last_error_code};

    #[test]
    fn zero_capacity_uses_default() {
        let pool = MemoryPool::open(Some(0)).unwrap();
        assert_eq!(pool.capacity(), default_pool_capacity());
        let pool = MemoryPool::open(None).unwrap();
        assert_eq!(pool.capacity(), default_pool_capacity());
    }

    #[test]
    fn blocks_are_pointer_aligned_and_contiguous() {
        let mut pool = MemoryPool::with_capacity(256).unwrap();
        let a = pool.alloc(3).unwrap();
        let b = pool.alloc(POOL_ALIGN + 1).unwrap();
        let c = pool.alloc(0).unwrap();
        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset(), POOL_ALIGN);
        assert_eq!(c.offset(), 3 * POOL_ALIGN);
        assert!(c.is_empty());
        assert_eq!(pool.used(), 3 * POOL_ALIGN);
        assert_eq!(pool.allocations(), 3);
        assert!(pool.bytes(&c).unwrap().is_empty());
    }

    #[test]
    fn reset_reuses_offsets() {
        let mut pool = MemoryPool::with_capacity(128).unwrap();
        let _ = pool.alloc(16).unwrap();
        let first = pool.alloc(24).unwrap();
        pool.reset();
        let _ = pool.alloc(16).unwrap();
        let second = pool.alloc(24).unwrap();
        assert_eq!(first.offset(), second.offset());
        assert_eq!(pool.capacity(), 128, "reset does not shrink");
    }

    #[test]
    fn stale_handles_are_rejected() {
        clear_error();
        let mut pool = MemoryPool::with_capacity(64).unwrap();
        let block = pool.alloc(8).unwrap();
        pool.bytes_mut(&block).unwrap().copy_from_slice(b"12345678");
        pool.reset();
        let err = pool.bytes(&block).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Value);
        assert_eq!(last_error_code(), ErrorKind::Value);
        clear_error();
    }

    #[test]
    fn growth_doubles_and_preserves_contents() {
        let mut pool = MemoryPool::with_capacity(32).unwrap();
        let early = pool.alloc(16).unwrap();
        pool.bytes_mut(&early).unwrap().copy_from_slice(b"pool-block-data!");
        assert_eq!(pool.growths(), 0);

        let big = pool.alloc(100).unwrap();
        assert_eq!(pool.capacity(), 128);
        assert_eq!(pool.growths(), 1);
        assert_eq!(pool.bytes(&early).unwrap(), b"pool-block-data!");
        assert!(pool.bytes(&big).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn no_growth_until_capacity_is_exceeded() {
        let mut pool = MemoryPool::with_capacity(64).unwrap();
        let mut handed_out = 0;
        while handed_out + POOL_ALIGN <= 64 {
            pool.alloc(POOL_ALIGN).unwrap();
            handed_out += POOL_ALIGN;
            assert_eq!(pool.growths(), 0);
            assert!(pool.used() <= 64);
        }
        assert_eq!(pool.remaining(), 0);
        pool.alloc(1).unwrap();
        assert_eq!(pool.growths(), 1);
        assert_eq!(pool.capacity(), 128);
    }

    #[test]
    fn raw_addresses_track_offsets() {
        let mut pool = MemoryPool::with_capacity(64).unwrap();
        let block = pool.alloc(8).unwrap();
        let raw = pool.alloc_raw(8).unwrap();
        let base = pool.address(&block).unwrap();
        assert_eq!(raw.as_ptr() as usize - base.as_ptr() as usize, 8);
    }

    #[test]
    fn handles_outside_used_region_are_rejected() {
        clear_error();
        let pool = MemoryPool::with_capacity(64).unwrap();
        let forged = PoolBlock {
            pool: pool.id(),
            offset: 0,
            len: 8,
            epoch: 0,
        };
        assert_eq!(pool.bytes(&forged).unwrap_err().kind(), ErrorKind::Value);
        clear_error();
    }

    #[test]
    fn handles_from_another_pool_are_rejected() {
        clear_error();
        let mut a = MemoryPool::with_capacity(64).unwrap();
        let mut b = MemoryPool::with_capacity(64).unwrap();
        assert_ne!(a.id(), b.id());
        let from_a = a.alloc(8).unwrap();
        let from_b = b.alloc(8).unwrap();
        a.bytes_mut(&from_a).unwrap().fill(b'A');
        b.bytes_mut(&from_b).unwrap().fill(b'B');
        assert_eq!(from_a.offset(), from_b.offset());
        assert_eq!(from_a.epoch(), from_b.epoch());

        let err = b.bytes(&from_a).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Value);
        assert_eq!(last_error_code(), ErrorKind::Value);
        assert!(b.address(&from_a).is_err());
        assert!(b.bytes_mut(&from_a).is_err());
        assert_eq!(a.bytes(&from_a).unwrap(), b"AAAAAAAA");
        assert_eq!(b.bytes(&from_b).unwrap(), b"BBBBBBBB");
        clear_error();
    }

    #[test]
    fn oversized_request_is_memory_error() {
        clear_error();
        let mut pool = MemoryPool::with_capacity(64).unwrap();
        let err = pool.alloc(usize::MAX).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Memory);
        assert_eq!(pool.used(), 0);
        clear_error();
    }
}
