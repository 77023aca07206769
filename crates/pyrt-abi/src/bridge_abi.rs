//! ABI layer for the generic container bridge.
//!
//! Generated code describes each container type once with a capability table
//! and passes the table next to the container on every call. Containers,
//! elements, keys and values are all opaque `void *` to the runtime; only the
//! table's callbacks ever look inside them.
//!
//! A null table, a null container, or a table missing a callback the
//! operation needs fails with ValueError "invalid container or capability
//! table".

use std::borrow::Cow;
use std::ffi::{CStr, c_char, c_int, c_void};
use std::marker::{PhantomData, PhantomPinned};

use pyrt_core::bridge::{self, MapCaps, MembershipCaps, SequenceCaps, SizeCaps};
use pyrt_core::error::{ErrorKind, RuntimeError, RuntimeResult, raise};
use pyrt_core::slice::SliceSpec;

use crate::slice_abi::PyrtSlice;
use crate::util::status;

pub type SizeFn = unsafe extern "C" fn(container: *const c_void) -> usize;
pub type AtFn = unsafe extern "C" fn(container: *const c_void, index: usize) -> *mut c_void;
pub type ContainsFn = unsafe extern "C" fn(container: *const c_void, key: *const c_void) -> c_int;
pub type GetFn = unsafe extern "C" fn(container: *const c_void, key: *const c_void) -> *mut c_void;
pub type EqualFn = unsafe extern "C" fn(a: *const c_void, b: *const c_void) -> c_int;
/// Writes at most `capacity` bytes (no terminator needed) and returns the
/// number written.
pub type KeyReprFn =
    unsafe extern "C" fn(key: *const c_void, buf: *mut c_char, capacity: usize) -> usize;
pub type VisitFn = unsafe extern "C" fn(ctx: *mut c_void, index: usize, element: *mut c_void);
pub type ItemVisitFn =
    unsafe extern "C" fn(ctx: *mut c_void, key: *const c_void, value: *mut c_void);
/// Native iteration: calls `visit(ctx, key, value)` once per entry.
pub type IterateFn =
    unsafe extern "C" fn(container: *const c_void, visit: ItemVisitFn, ctx: *mut c_void);

/// Positional container description (`list`, `tuple`, arrays).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PyrtSequenceCaps {
    /// NUL-terminated display name, or null for `"sequence"`.
    pub type_name: *const c_char,
    pub size: Option<SizeFn>,
    pub at: Option<AtFn>,
}

/// Keyed container description (`dict`, `set`). `get`, `iterate` and
/// `key_repr` may be null for set-like containers that only answer membership.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PyrtMapCaps {
    /// NUL-terminated display name, or null for `"map"`.
    pub type_name: *const c_char,
    pub size: Option<SizeFn>,
    pub contains: Option<ContainsFn>,
    pub get: Option<GetFn>,
    pub iterate: Option<IterateFn>,
    pub key_repr: Option<KeyReprFn>,
}

/// Stand-in for any C object reached through a capability table.
#[repr(C)]
pub struct Foreign {
    _data: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

impl Foreign {
    /// # Safety
    ///
    /// Non-null `ptr` must stay valid for `'a`.
    unsafe fn from_ptr<'a>(ptr: *const c_void) -> Option<&'a Foreign> {
        // SAFETY: `Foreign` is zero-sized, so any non-null address is a valid
        // reference target; liveness is the caller's contract.
        unsafe { ptr.cast::<Foreign>().as_ref() }
    }

    fn as_ptr(&self) -> *const c_void {
        (self as *const Foreign).cast()
    }
}

#[track_caller]
fn invalid(function: &'static str) -> RuntimeError {
    raise(
        ErrorKind::Value,
        "invalid container or capability table",
        function,
    )
}

unsafe fn table_name<'a>(ptr: *const c_char, fallback: &'static str) -> Cow<'a, str> {
    if ptr.is_null() {
        Cow::Borrowed(fallback)
    } else {
        // SAFETY: non-null names are NUL-terminated static strings.
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy()
    }
}

/// A sequence table with every callback present.
struct SequenceTable<'t> {
    name: Cow<'t, str>,
    size: SizeFn,
    at: AtFn,
}

impl SequenceTable<'_> {
    #[track_caller]
    unsafe fn load<'c>(
        caps: *const PyrtSequenceCaps,
        container: *const c_void,
        function: &'static str,
    ) -> RuntimeResult<(Self, &'c Foreign)> {
        // SAFETY: non-null tables point at caller-owned PyrtSequenceCaps.
        let caps = unsafe { caps.as_ref() }.ok_or_else(|| invalid(function))?;
        // SAFETY: caller keeps the container alive for the call.
        let container = unsafe { Foreign::from_ptr(container) }.ok_or_else(|| invalid(function))?;
        let (Some(size), Some(at)) = (caps.size, caps.at) else {
            return Err(invalid(function));
        };
        // SAFETY: type_name contract on PyrtSequenceCaps.
        let name = unsafe { table_name(caps.type_name, "sequence") };
        Ok((Self { name, size, at }, container))
    }
}

impl SizeCaps<Foreign> for SequenceTable<'_> {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn size(&self, container: &Foreign) -> usize {
        // SAFETY: `container` came from the caller alongside this table.
        unsafe { (self.size)(container.as_ptr()) }
    }
}

impl SequenceCaps<Foreign> for SequenceTable<'_> {
    type Elem = Foreign;

    fn at<'a>(&self, container: &'a Foreign, index: usize) -> Option<&'a Foreign> {
        // SAFETY: index < size; returned elements live as long as the container.
        unsafe { Foreign::from_ptr((self.at)(container.as_ptr(), index)) }
    }
}

/// A map table; optional callbacks are checked per operation.
struct MapTable<'t> {
    name: Cow<'t, str>,
    size: SizeFn,
    contains: ContainsFn,
    get: Option<GetFn>,
    iterate: Option<IterateFn>,
    key_repr: Option<KeyReprFn>,
}

impl MapTable<'_> {
    #[track_caller]
    unsafe fn load<'c>(
        caps: *const PyrtMapCaps,
        container: *const c_void,
        function: &'static str,
    ) -> RuntimeResult<(Self, &'c Foreign)> {
        // SAFETY: non-null tables point at caller-owned PyrtMapCaps.
        let caps = unsafe { caps.as_ref() }.ok_or_else(|| invalid(function))?;
        // SAFETY: caller keeps the container alive for the call.
        let container = unsafe { Foreign::from_ptr(container) }.ok_or_else(|| invalid(function))?;
        let (Some(size), Some(contains)) = (caps.size, caps.contains) else {
            return Err(invalid(function));
        };
        // SAFETY: type_name contract on PyrtMapCaps.
        let name = unsafe { table_name(caps.type_name, "map") };
        let table = Self {
            name,
            size,
            contains,
            get: caps.get,
            iterate: caps.iterate,
            key_repr: caps.key_repr,
        };
        Ok((table, container))
    }
}

impl SizeCaps<Foreign> for MapTable<'_> {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn size(&self, container: &Foreign) -> usize {
        // SAFETY: `container` came from the caller alongside this table.
        unsafe { (self.size)(container.as_ptr()) }
    }
}

impl MembershipCaps<Foreign> for MapTable<'_> {
    type Needle = Foreign;

    fn contains(&self, container: &Foreign, needle: &Foreign) -> bool {
        // SAFETY: both pointers came from the caller for this call.
        unsafe { (self.contains)(container.as_ptr(), needle.as_ptr()) != 0 }
    }
}

type DynItemVisit<'v> = dyn FnMut(&'v Foreign, &'v Foreign) + 'v;

unsafe extern "C" fn forward_item(ctx: *mut c_void, key: *const c_void, value: *mut c_void) {
    // SAFETY: `ctx` is the `&mut &mut DynItemVisit` set up in `for_each_item`,
    // live for the duration of the iterate callback.
    let visit = unsafe { &mut *ctx.cast::<&mut DynItemVisit<'static>>() };
    // SAFETY: entries stay valid while the container is borrowed.
    let entry = unsafe { (Foreign::from_ptr(key), Foreign::from_ptr(value.cast_const())) };
    if let (Some(key), Some(value)) = entry {
        visit(key, value);
    }
}

impl MapCaps<Foreign> for MapTable<'_> {
    type Key = Foreign;
    type Value = Foreign;

    fn contains(&self, container: &Foreign, key: &Foreign) -> bool {
        MembershipCaps::contains(self, container, key)
    }

    fn get<'a>(&self, container: &'a Foreign, key: &Foreign) -> Option<&'a Foreign> {
        let get = self.get?;
        // SAFETY: values live as long as the container.
        unsafe { Foreign::from_ptr(get(container.as_ptr(), key.as_ptr())) }
    }

    fn for_each_item<'a>(
        &self,
        container: &'a Foreign,
        visit: &mut dyn FnMut(&'a Foreign, &'a Foreign),
    ) {
        let Some(iterate) = self.iterate else {
            return;
        };
        let mut slot: &mut dyn FnMut(&'a Foreign, &'a Foreign) = visit;
        let ctx = (&raw mut slot).cast::<c_void>();
        // SAFETY: `forward_item` only dereferences `ctx` during this call.
        unsafe { iterate(container.as_ptr(), forward_item, ctx) };
    }

    fn describe_key(&self, key: &Foreign) -> String {
        let Some(key_repr) = self.key_repr else {
            return format!("{:p}", key.as_ptr());
        };
        let mut buf = [0u8; 128];
        // SAFETY: the callback writes at most `buf.len()` bytes.
        let written = unsafe { key_repr(key.as_ptr(), buf.as_mut_ptr().cast(), buf.len()) };
        String::from_utf8_lossy(&buf[..written.min(buf.len())]).into_owned()
    }
}

/// `len(container)` through a bare size callback. `0` with ValueError on
/// invalid input.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_len(container: *const c_void, size: Option<SizeFn>) -> usize {
    match size {
        // SAFETY: container and callback come from the caller as a pair.
        Some(size) if !container.is_null() => unsafe { size(container) },
        _ => {
            let _ = invalid("pyrt_len");
            0
        }
    }
}

/// `bool(container)`: `1` when non-empty. `0` with ValueError on invalid input.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_truthy(container: *const c_void, size: Option<SizeFn>) -> c_int {
    let result = (|| -> RuntimeResult<_> {
        let (Some(size), false) = (size, container.is_null()) else {
            return Err(invalid("pyrt_truthy"));
        };
        // SAFETY: container and callback come from the caller as a pair.
        Ok(unsafe { size(container) } != 0)
    })();
    result.map_or(0, c_int::from)
}

/// `container[index]` with negative indexing. Null with IndexError when out
/// of range.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_safe_at(
    caps: *const PyrtSequenceCaps,
    container: *const c_void,
    index: i64,
) -> *mut c_void {
    let result = (|| -> RuntimeResult<_> {
        // SAFETY: pointer contract of this module.
        let (table, container) = unsafe { SequenceTable::load(caps, container, "pyrt_safe_at") }?;
        bridge::safe_at(&table, container, index)
    })();
    result.map_or(std::ptr::null_mut(), |elem| elem.as_ptr().cast_mut())
}

/// `container[key]` for mappings. Null with KeyError naming the key when absent.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_safe_get(
    caps: *const PyrtMapCaps,
    container: *const c_void,
    key: *const c_void,
) -> *mut c_void {
    let result = (|| -> RuntimeResult<_> {
        // SAFETY: pointer contract of this module.
        let (table, container) = unsafe { MapTable::load(caps, container, "pyrt_safe_get") }?;
        if table.get.is_none() {
            return Err(invalid("pyrt_safe_get"));
        }
        // SAFETY: the key lives for the call.
        let key = unsafe { Foreign::from_ptr(key) }.ok_or_else(|| invalid("pyrt_safe_get"))?;
        bridge::safe_get(&table, container, key)
    })();
    result.map_or(std::ptr::null_mut(), |value| value.as_ptr().cast_mut())
}

/// `needle in container` via the table's hashed membership callback.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_contains(
    caps: *const PyrtMapCaps,
    container: *const c_void,
    needle: *const c_void,
) -> c_int {
    let result = (|| -> RuntimeResult<_> {
        // SAFETY: pointer contract of this module.
        let (table, container) = unsafe { MapTable::load(caps, container, "pyrt_contains") }?;
        // SAFETY: the needle lives for the call.
        let needle = unsafe { Foreign::from_ptr(needle) }.ok_or_else(|| invalid("pyrt_contains"))?;
        Ok(bridge::contains(&table, container, needle))
    })();
    result.map_or(0, c_int::from)
}

/// `target in sequence` by linear scan with `equal`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_sequence_contains(
    caps: *const PyrtSequenceCaps,
    container: *const c_void,
    target: *const c_void,
    equal: Option<EqualFn>,
) -> c_int {
    let result = (|| -> RuntimeResult<_> {
        // SAFETY: pointer contract of this module.
        let (table, container) =
            unsafe { SequenceTable::load(caps, container, "pyrt_sequence_contains") }?;
        let equal = equal.ok_or_else(|| invalid("pyrt_sequence_contains"))?;
        // SAFETY: the target lives for the call.
        let target =
            unsafe { Foreign::from_ptr(target) }.ok_or_else(|| invalid("pyrt_sequence_contains"))?;
        Ok(bridge::sequence_contains(&table, container, target, |a, b| {
            // SAFETY: both are live elements or the caller's target.
            unsafe { equal(a.as_ptr(), b.as_ptr()) != 0 }
        }))
    })();
    result.map_or(0, c_int::from)
}

/// Call `visit(ctx, index, element)` for each non-empty position in order.
/// Returns the number visited, or `-1` on invalid input.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_enumerate(
    caps: *const PyrtSequenceCaps,
    container: *const c_void,
    visit: Option<VisitFn>,
    ctx: *mut c_void,
) -> isize {
    let result = (|| -> RuntimeResult<_> {
        // SAFETY: pointer contract of this module.
        let (table, container) = unsafe { SequenceTable::load(caps, container, "pyrt_enumerate") }?;
        let visit = visit.ok_or_else(|| invalid("pyrt_enumerate"))?;
        Ok(bridge::enumerate(&table, container, |index, elem| {
            // SAFETY: `ctx` is opaque caller state handed back verbatim.
            unsafe { visit(ctx, index, elem.as_ptr().cast_mut()) }
        }))
    })();
    result.map_or(-1, |visited| isize::try_from(visited).unwrap_or(isize::MAX))
}

/// Call `visit(ctx, key, value)` for every entry in native order. Returns `0`
/// or an error code.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_items(
    caps: *const PyrtMapCaps,
    container: *const c_void,
    visit: Option<ItemVisitFn>,
    ctx: *mut c_void,
) -> c_int {
    status((|| -> RuntimeResult<_> {
        // SAFETY: pointer contract of this module.
        let (table, container) = unsafe { MapTable::load(caps, container, "pyrt_items") }?;
        let (Some(visit), Some(_)) = (visit, table.iterate) else {
            return Err(invalid("pyrt_items"));
        };
        bridge::items(&table, container, |key, value| {
            // SAFETY: `ctx` is opaque caller state handed back verbatim.
            unsafe { visit(ctx, key.as_ptr(), value.as_ptr().cast_mut()) }
        });
        Ok(())
    })())
}

/// Sequence equality. `0` (and ValueError) on invalid input.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_equal(
    caps: *const PyrtSequenceCaps,
    a: *const c_void,
    b: *const c_void,
    equal: Option<EqualFn>,
) -> c_int {
    let result = (|| -> RuntimeResult<_> {
        // SAFETY: pointer contract of this module.
        let (table, a) = unsafe { SequenceTable::load(caps, a, "pyrt_equal") }?;
        // SAFETY: as above; `b` shares the table.
        let b = unsafe { Foreign::from_ptr(b) }.ok_or_else(|| invalid("pyrt_equal"))?;
        let equal = equal.ok_or_else(|| invalid("pyrt_equal"))?;
        Ok(bridge::equal(&table, a, b, |x, y| {
            // SAFETY: both are live elements.
            unsafe { equal(x.as_ptr(), y.as_ptr()) != 0 }
        }))
    })();
    result.map_or(0, c_int::from)
}

/// Mapping equality with `value_equal`. `0` (and ValueError) on invalid input.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_map_equal(
    caps: *const PyrtMapCaps,
    a: *const c_void,
    b: *const c_void,
    value_equal: Option<EqualFn>,
) -> c_int {
    let result = (|| -> RuntimeResult<_> {
        // SAFETY: pointer contract of this module.
        let (table, a) = unsafe { MapTable::load(caps, a, "pyrt_map_equal") }?;
        // SAFETY: as above; `b` shares the table.
        let b = unsafe { Foreign::from_ptr(b) }.ok_or_else(|| invalid("pyrt_map_equal"))?;
        let (Some(value_equal), Some(_), Some(_)) = (value_equal, table.get, table.iterate) else {
            return Err(invalid("pyrt_map_equal"));
        };
        Ok(bridge::map_equal(&table, a, b, |x, y| {
            // SAFETY: both are live values.
            unsafe { value_equal(x.as_ptr(), y.as_ptr()) != 0 }
        }))
    })();
    result.map_or(0, c_int::from)
}

/// Write the elements of `container[slice]` into `out[..capacity]`. Returns
/// the number written, or `-1` on error (ValueError when `capacity` is too
/// small; nothing is written in that case).
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pyrt_slice(
    caps: *const PyrtSequenceCaps,
    container: *const c_void,
    slice: *const PyrtSlice,
    out: *mut *mut c_void,
    capacity: usize,
) -> isize {
    let result = (|| -> RuntimeResult<_> {
        // SAFETY: pointer contract of this module.
        let (table, container) = unsafe { SequenceTable::load(caps, container, "pyrt_slice") }?;
        // SAFETY: non-null slices point at a caller-owned PyrtSlice.
        let s = unsafe { slice.as_ref() }.copied().ok_or_else(|| invalid("pyrt_slice"))?;
        let spec = SliceSpec::new(
            (s.has_start != 0).then_some(s.start),
            (s.has_stop != 0).then_some(s.stop),
            (s.has_step != 0).then_some(s.step),
        );
        let elems = bridge::slice(&table, container, &spec)?;
        if elems.len() > capacity || (out.is_null() && !elems.is_empty()) {
            return Err(raise(
                ErrorKind::Value,
                format!("slice of {} elements does not fit in {capacity}", elems.len()),
                "pyrt_slice",
            ));
        }
        for (i, elem) in elems.iter().enumerate() {
            // SAFETY: i < capacity, and `out` has room for `capacity` slots.
            unsafe { out.add(i).write(elem.as_ptr().cast_mut()) };
        }
        Ok(elems.len())
    })();
    result.map_or(-1, |written| isize::try_from(written).unwrap_or(isize::MAX))
}
