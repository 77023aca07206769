//! ABI layer for resource registries.

use std::ffi::{c_char, c_int, c_void};

use pyrt_core::error::{ErrorKind, RuntimeResult, raise};
use pyrt_membrane::ResourceRegistry;

use crate::util::{opt_cstr, require, status};

/// Disposes of one registered resource.
pub type CleanupFn = unsafe extern "C" fn(resource: *mut c_void);

/// Opaque registry handle.
pub struct PyrtRegistry(ResourceRegistry);

#[unsafe(no_mangle)]
pub extern "C" fn pyrt_registry_new() -> *mut PyrtRegistry {
    Box::into_raw(Box::new(PyrtRegistry(ResourceRegistry::new())))
}

/// Register `resource` with its cleanup. `name` may be null. Returns `0`, or
/// ValueError for a null registry, resource or cleanup.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_registry_register(
    registry: *mut PyrtRegistry,
    resource: *mut c_void,
    cleanup: Option<CleanupFn>,
    name: *const c_char,
) -> c_int {
    status((|| -> RuntimeResult<()> {
        require(registry, "pyrt_registry_register", "registry")?;
        require(resource, "pyrt_registry_register", "resource")?;
        let Some(cleanup) = cleanup else {
            return Err(raise(
                ErrorKind::Value,
                "cleanup callback is null",
                "pyrt_registry_register",
            ));
        };
        // SAFETY: non-null handles come from `pyrt_registry_new`.
        let registry = unsafe { &mut (*registry).0 };
        // SAFETY: non-null names are NUL-terminated.
        let name = unsafe { opt_cstr(name) };
        registry.register(
            resource,
            move |resource| {
                // SAFETY: the caller registered a callback valid for `resource`.
                unsafe { cleanup(resource) }
            },
            name.as_deref(),
        );
        Ok(())
    })())
}

/// Run every pending cleanup, newest first. Returns how many ran.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_registry_cleanup_all(registry: *mut PyrtRegistry) -> usize {
    // SAFETY: non-null handles come from `pyrt_registry_new`.
    unsafe { registry.as_mut() }.map_or(0, |registry| registry.0.cleanup_all())
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_registry_count(registry: *const PyrtRegistry) -> usize {
    // SAFETY: non-null handles come from `pyrt_registry_new`.
    unsafe { registry.as_ref() }.map_or(0, |registry| registry.0.len())
}

/// Run pending cleanups and free the handle. Null is a no-op.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_registry_free(registry: *mut PyrtRegistry) {
    if registry.is_null() {
        return;
    }
    // SAFETY: non-null handles come from `Box::into_raw` in
    // `pyrt_registry_new` and are freed at most once.
    drop(unsafe { Box::from_raw(registry) });
}
