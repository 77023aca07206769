//! Manually reference-counted objects.
//!
//! A [`RefCounted`] is one holder of a shared heap envelope carrying the
//! holder count, an optional destructor, and the payload. `clone` retains,
//! dropping (or [`RefCounted::release`]) releases, and the destructor runs
//! exactly once when the count goes from one to zero. The count is a plain
//! `Cell`, so the type is neither `Send` nor `Sync`.

use std::cell::{Cell, UnsafeCell};
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

use crate::lifecycle::{self, LifecycleEvent};

type Destructor<T> = Box<dyn FnOnce(&mut T)>;

struct Envelope<T> {
    count: Cell<usize>,
    destructor: Cell<Option<Destructor<T>>>,
    payload: UnsafeCell<T>,
}

/// Shared handle to a reference-counted payload.
pub struct RefCounted<T> {
    envelope: NonNull<Envelope<T>>,
    _owns: PhantomData<Envelope<T>>,
}

impl<T> RefCounted<T> {
    /// Wrap `payload` with a count of one and no destructor.
    #[must_use]
    pub fn new(payload: T) -> Self {
        Self::build(payload, None)
    }

    /// Wrap `payload` with a count of one. `destructor` runs on the payload
    /// when the last holder releases, before the payload itself is dropped.
    #[must_use]
    pub fn with_destructor(payload: T, destructor: impl FnOnce(&mut T) + 'static) -> Self {
        Self::build(payload, Some(Box::new(destructor)))
    }

    fn build(payload: T, destructor: Option<Destructor<T>>) -> Self {
        let envelope = Box::new(Envelope {
            count: Cell::new(1),
            destructor: Cell::new(destructor),
            payload: UnsafeCell::new(payload),
        });
        let envelope = NonNull::from(Box::leak(envelope));
        lifecycle::emit(|| LifecycleEvent::new("refcount", "new").ptr(envelope.as_ptr()));
        Self {
            envelope,
            _owns: PhantomData,
        }
    }

    fn envelope(&self) -> &Envelope<T> {
        // SAFETY: the envelope stays alive while any holder exists.
        unsafe { self.envelope.as_ref() }
    }

    /// Another holder of the same object.
    #[must_use]
    pub fn retain(&self) -> Self {
        let count = &self.envelope().count;
        let Some(next) = count.get().checked_add(1) else {
            std::process::abort();
        };
        count.set(next);
        lifecycle::emit(|| {
            LifecycleEvent::new("refcount", "retain")
                .ptr(self.envelope.as_ptr())
                .details(format!("count={next}"))
        });
        Self {
            envelope: self.envelope,
            _owns: PhantomData,
        }
    }

    /// Give up this holder. Returns `true` if this was the last one and the
    /// object was destroyed.
    pub fn release(self) -> bool {
        let last = self.count() == 1;
        drop(self);
        last
    }

    /// Current number of holders.
    #[must_use]
    pub fn count(&self) -> usize {
        self.envelope().count.get()
    }

    /// Raw address of the payload, valid while any holder exists.
    #[must_use]
    pub fn as_ptr(&self) -> *mut T {
        self.envelope().payload.get()
    }

    /// Whether two handles share one object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.envelope == other.envelope
    }

    /// Turn this holder into an opaque address without releasing it.
    #[must_use]
    pub fn into_raw(self) -> NonNull<()> {
        let raw = self.envelope.cast();
        std::mem::forget(self);
        raw
    }

    /// Reclaim a holder produced by [`RefCounted::into_raw`].
    ///
    /// # Safety
    ///
    /// `raw` must come from `into_raw` on a `RefCounted<T>` of the same `T`,
    /// and each `into_raw` may be matched by at most one `from_raw`.
    #[must_use]
    pub unsafe fn from_raw(raw: NonNull<()>) -> Self {
        Self {
            envelope: raw.cast(),
            _owns: PhantomData,
        }
    }
}

impl<T> Clone for RefCounted<T> {
    fn clone(&self) -> Self {
        self.retain()
    }
}

impl<T> Deref for RefCounted<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the payload is only mutated by the destructor, which runs
        // after the last holder (and so the last borrow) is gone.
        unsafe { &*self.envelope().payload.get() }
    }
}

impl<T> Drop for RefCounted<T> {
    fn drop(&mut self) {
        let count = &self.envelope().count;
        let remaining = count.get() - 1;
        count.set(remaining);
        if remaining > 0 {
            lifecycle::emit(|| {
                LifecycleEvent::new("refcount", "release")
                    .ptr(self.envelope.as_ptr())
                    .details(format!("count={remaining}"))
            });
            return;
        }
        lifecycle::emit(|| {
            LifecycleEvent::new("refcount", "destroy").ptr(self.envelope.as_ptr())
        });
        // SAFETY: this was the last holder; the envelope came from
        // `Box::leak` in `build` and nobody else can reach it now.
        let mut envelope = unsafe { Box::from_raw(self.envelope.as_ptr()) };
        if let Some(destructor) = envelope.destructor.take() {
            destructor(envelope.payload.get_mut());
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for RefCounted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefCounted")
            .field("count", &self.count())
            .field("payload", &**self)
            .finish()
    }
}
