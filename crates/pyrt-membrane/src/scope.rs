//! Scope allocator.
//!
//! Owns raw allocations made (or adopted) inside one lexical scope and frees
//! each registration exactly once, newest first, when the scope closes.
//! Dropping the allocator closes it, so early returns and `?` still release
//! everything registered before the failure.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use pyrt_core::error::{ErrorKind, RuntimeResult, raise};

use crate::alloc::{
    RawAllocator, RecordingAllocator, SystemAllocator, checked_calloc_in, checked_malloc_in,
    note_free,
};
use crate::lifecycle::{self, LifecycleEvent, LogLevel};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy)]
struct Registration {
    block: NonNull<u8>,
    /// Known for blocks this scope allocated; adopted blocks are unsized.
    size: Option<usize>,
}

/// LIFO owner of raw heap blocks.
#[derive(Debug)]
pub struct ScopeAllocator<A: RawAllocator = SystemAllocator> {
    id: u64,
    registrations: Vec<Registration>,
    allocator: A,
}

impl ScopeAllocator<SystemAllocator> {
    /// Open a scope over the C heap.
    #[must_use]
    pub fn open() -> Self {
        Self::with_allocator(SystemAllocator)
    }
}

impl Default for ScopeAllocator<SystemAllocator> {
    fn default() -> Self {
        Self::open()
    }
}

impl<A: RawAllocator> ScopeAllocator<A> {
    #[must_use]
    pub fn with_allocator(allocator: A) -> Self {
        let id = NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed);
        lifecycle::emit(|| LifecycleEvent::new("scope", "open").details(format!("scope={id}")));
        Self {
            id,
            registrations: Vec::new(),
            allocator,
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Allocate `size` bytes owned by this scope.
    ///
    /// Zero fails with [`ErrorKind::Value`], exhaustion with
    /// [`ErrorKind::Memory`]. Earlier registrations stay owned either way.
    #[track_caller]
    pub fn alloc(&mut self, size: usize) -> RuntimeResult<NonNull<u8>> {
        let block = checked_malloc_in(&self.allocator, size)
            .inspect_err(|_| self.failed("alloc", size))?;
        self.push(block, Some(size), "alloc");
        Ok(block)
    }

    /// Zeroed `count * size` bytes owned by this scope.
    #[track_caller]
    pub fn alloc_zeroed(&mut self, count: usize, size: usize) -> RuntimeResult<NonNull<u8>> {
        let block = checked_calloc_in(&self.allocator, count, size)
            .inspect_err(|_| self.failed("alloc_zeroed", count.saturating_mul(size)))?;
        self.push(block, Some(count * size), "alloc_zeroed");
        Ok(block)
    }

    /// Adopt a block allocated elsewhere. Registering the same block twice
    /// makes two entries and it will be released twice.
    ///
    /// # Safety
    ///
    /// Non-null `block` must be live, come from this scope's allocator, and
    /// not be released by anyone else.
    #[track_caller]
    pub unsafe fn register(&mut self, block: *mut u8) -> RuntimeResult<()> {
        let Some(block) = NonNull::new(block) else {
            return Err(raise(
                ErrorKind::Value,
                "cannot register a null pointer",
                "scope_register",
            ));
        };
        self.push(block, None, "register");
        Ok(())
    }

    fn failed(&self, event: &'static str, size: usize) {
        lifecycle::emit(|| {
            LifecycleEvent::new("scope", event)
                .level(LogLevel::Warn)
                .size(size)
                .outcome("failed")
                .details(format!("scope={}", self.id))
        });
    }

    fn push(&mut self, block: NonNull<u8>, size: Option<usize>, event: &'static str) {
        self.registrations.push(Registration { block, size });
        lifecycle::emit(|| {
            let mut e = LifecycleEvent::new("scope", event)
                .ptr(block.as_ptr())
                .details(format!("scope={} live={}", self.id, self.registrations.len()));
            if let Some(size) = size {
                e = e.size(size);
            }
            e
        });
    }

    /// Registrations currently owned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    #[must_use]
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Release everything now. Equivalent to dropping the scope.
    pub fn close(self) {}

    fn release_all(&mut self) {
        let released = self.registrations.len();
        while let Some(reg) = self.registrations.pop() {
            // SAFETY: every registration is a live block from `self.allocator`
            // (checked allocation or the `register` contract) and is popped
            // before release, so each entry is released once.
            unsafe { self.allocator.release(reg.block.as_ptr()) };
            note_free(reg.size);
        }
        lifecycle::emit(|| {
            LifecycleEvent::new("scope", "close")
                .details(format!("scope={} released={released}", self.id))
        });
    }
}

impl ScopeAllocator<&RecordingAllocator> {
    /// Adopt any address into a scope whose allocator only records
    /// releases. Lets safe callers exercise double registration.
    #[track_caller]
    pub fn register_recorded(&mut self, block: *mut u8) -> RuntimeResult<()> {
        // SAFETY: `RecordingAllocator::release` logs the address and never
        // dereferences or frees it.
        unsafe { self.register(block) }
    }
}

impl<A: RawAllocator> Drop for ScopeAllocator<A> {
    fn drop(&mut self) {
        self.release_all();
    }
}
