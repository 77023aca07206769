//! Resource registry.
//!
//! A scope allocator generalized to arbitrary resources: each entry pairs a
//! resource with the callback that disposes of it. `cleanup_all` runs the
//! callbacks newest first and empties the registry; dropping the registry
//! does the same.

use std::fmt;

use crate::lifecycle::{self, LifecycleEvent};

struct Entry {
    name: Option<String>,
    cleanup: Box<dyn FnOnce()>,
}

/// Ordered set of pending cleanups.
#[derive(Default)]
pub struct ResourceRegistry {
    entries: Vec<Entry>,
}

impl ResourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `resource`; `cleanup` receives it at cleanup time.
    pub fn register<R: 'static>(
        &mut self,
        resource: R,
        cleanup: impl FnOnce(R) + 'static,
        name: Option<&str>,
    ) {
        self.register_fn(move || cleanup(resource), name);
    }

    /// Register a bare cleanup callback.
    pub fn register_fn(&mut self, cleanup: impl FnOnce() + 'static, name: Option<&str>) {
        self.entries.push(Entry {
            name: name.map(str::to_owned),
            cleanup: Box::new(cleanup),
        });
        lifecycle::emit(|| {
            LifecycleEvent::new("registry", "register").details(format!(
                "name={} live={}",
                name.unwrap_or("-"),
                self.entries.len()
            ))
        });
    }

    /// Run every cleanup, newest first, and empty the registry. Returns how
    /// many ran. Safe to call repeatedly.
    pub fn cleanup_all(&mut self) -> usize {
        let mut ran = 0;
        while let Some(entry) = self.entries.pop() {
            lifecycle::emit(|| {
                LifecycleEvent::new("registry", "cleanup")
                    .details(format!("name={}", entry.name.as_deref().unwrap_or("-")))
            });
            (entry.cleanup)();
            ran += 1;
        }
        ran
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry names in registration order (`None` for unnamed entries).
    #[must_use]
    pub fn names(&self) -> Vec<Option<&str>> {
        self.entries.iter().map(|e| e.name.as_deref()).collect()
    }

    /// Run every cleanup and discard the registry.
    pub fn close(self) {}
}

impl Drop for ResourceRegistry {
    fn drop(&mut self) {
        self.cleanup_all();
    }
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("names", &self.names())
            .finish()
    }
}
