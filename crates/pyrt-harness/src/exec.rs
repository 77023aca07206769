//! Fixture execution: one runtime call per case, rendered to a string.
//!
//! Successful calls render their value; runtime failures render as
//! `error:<KindName>`. Each case starts from a clear error context.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use pyrt_core::bridge::{self, Native};
use pyrt_core::error::{self, ErrorKind, Location, RuntimeError, RuntimeResult, errno_to_kind};
use pyrt_core::slice::{Range, SliceSpec, normalize_index, normalize_slice};
use pyrt_membrane::alloc::copy_checked;
use pyrt_membrane::{
    MemoryPool, RawAllocator, RecordingAllocator, RefCounted, ResourceRegistry, ScopeAllocator,
};
use serde_json::Value;

use crate::error::HarnessError;

/// Operations a fixture may name.
pub const FUNCTIONS: &[&str] = &[
    "normalize_index",
    "normalize_slice",
    "range",
    "range_contains",
    "safe_at",
    "safe_get",
    "contains",
    "sequence_contains",
    "slice",
    "enumerate",
    "equal",
    "scope",
    "scope_double_register",
    "pool",
    "refcount",
    "registry",
    "error_render",
    "errno",
    "checked_copy",
];

/// Run `function` with `inputs` and render the outcome.
pub fn execute(function: &str, inputs: &Value) -> Result<String, HarnessError> {
    error::clear_error();
    let rendered = match function {
        "normalize_index" => {
            let index = int(inputs, "index")?;
            let length = size(inputs, "length")?;
            render(normalize_index(index, length), |i| i.to_string())
        }
        "normalize_slice" => {
            let length = size(inputs, "length")?;
            let result = normalize_slice(
                opt_int(inputs, "start")?,
                opt_int(inputs, "stop")?,
                opt_int(inputs, "step")?,
                length,
            );
            render(result, |s| {
                format!(
                    "start={} stop={} step={} len={} indices={}",
                    s.start(),
                    s.stop(),
                    s.step(),
                    s.len(),
                    list(s.indices())
                )
            })
        }
        "range" => {
            let start = opt_int(inputs, "start")?.unwrap_or(0);
            let step = opt_int(inputs, "step")?.unwrap_or(1);
            let stop = int(inputs, "stop")?;
            render(Range::new(start, stop, step), list)
        }
        "range_contains" => {
            let range = Range::new(
                int(inputs, "start")?,
                int(inputs, "stop")?,
                opt_int(inputs, "step")?.unwrap_or(1),
            );
            let value = int(inputs, "value")?;
            render(range, |r| r.contains(value).to_string())
        }
        "safe_at" => {
            let items = strings(inputs, "items")?;
            let index = int(inputs, "index")?;
            render(bridge::safe_at(&Native, &items, index), String::clone)
        }
        "safe_get" => {
            let map = string_map(inputs, "map")?;
            let key = string(inputs, "key")?;
            render(bridge::safe_get(&Native, &map, &key), String::clone)
        }
        "contains" => {
            let set: BTreeSet<String> = strings(inputs, "items")?.into_iter().collect();
            let needle = string(inputs, "needle")?;
            bridge::contains(&Native, &set, &needle).to_string()
        }
        "sequence_contains" => {
            let items = strings(inputs, "items")?;
            let needle = string(inputs, "needle")?;
            bridge::sequence_contains(&Native, &items, &needle, |a, b| a == b).to_string()
        }
        "slice" => {
            let items = strings(inputs, "items")?;
            let spec = SliceSpec::new(
                opt_int(inputs, "start")?,
                opt_int(inputs, "stop")?,
                opt_int(inputs, "step")?,
            );
            render(bridge::slice(&Native, &items, &spec), list)
        }
        "enumerate" => {
            let items = strings(inputs, "items")?;
            let mut parts = Vec::new();
            bridge::enumerate(&Native, &items, |i, item| parts.push(format!("{i}:{item}")));
            parts.join(" ")
        }
        "equal" => {
            let left = strings(inputs, "left")?;
            let right = strings(inputs, "right")?;
            bridge::equal(&Native, &left, &right, |a, b| a == b).to_string()
        }
        "scope" => run_scope(inputs)?,
        "scope_double_register" => run_double_register(),
        "pool" => run_pool(inputs)?,
        "refcount" => run_refcount(inputs)?,
        "registry" => run_registry(inputs)?,
        "error_render" => run_error_render(inputs)?,
        "errno" => {
            let errno = i32::try_from(int(inputs, "errno")?)
                .map_err(|_| HarnessError::BadInput { field: "errno" })?;
            errno_to_kind(errno).name().to_owned()
        }
        "checked_copy" => {
            let mut dest = vec![0u8; size(inputs, "dest_size")?];
            let src = string(inputs, "src")?;
            render(copy_checked(&mut dest, src.as_bytes()), |()| {
                String::from_utf8_lossy(&dest[..src.len()]).into_owned()
            })
        }
        other => return Err(HarnessError::UnknownFunction(other.to_owned())),
    };
    Ok(rendered)
}

fn render<T>(result: RuntimeResult<T>, ok: impl FnOnce(T) -> String) -> String {
    match result {
        Ok(value) => ok(value),
        Err(err) => format!("error:{}", err.kind().name()),
    }
}

fn list<I>(items: I) -> String
where
    I: IntoIterator,
    I::Item: std::fmt::Display,
{
    let parts: Vec<String> = items.into_iter().map(|i| i.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

fn field<'a>(inputs: &'a Value, name: &'static str) -> Result<&'a Value, HarnessError> {
    inputs.get(name).ok_or(HarnessError::BadInput { field: name })
}

fn int(inputs: &Value, name: &'static str) -> Result<i64, HarnessError> {
    field(inputs, name)?
        .as_i64()
        .ok_or(HarnessError::BadInput { field: name })
}

fn opt_int(inputs: &Value, name: &'static str) -> Result<Option<i64>, HarnessError> {
    match inputs.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or(HarnessError::BadInput { field: name }),
    }
}

fn size(inputs: &Value, name: &'static str) -> Result<usize, HarnessError> {
    field(inputs, name)?
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or(HarnessError::BadInput { field: name })
}

fn sizes(inputs: &Value, name: &'static str) -> Result<Vec<usize>, HarnessError> {
    match inputs.get(name) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_u64()
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or(HarnessError::BadInput { field: name })
            })
            .collect(),
        Some(_) => Err(HarnessError::BadInput { field: name }),
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn string(inputs: &Value, name: &'static str) -> Result<String, HarnessError> {
    field(inputs, name).map(text)
}

fn strings(inputs: &Value, name: &'static str) -> Result<Vec<String>, HarnessError> {
    field(inputs, name)?
        .as_array()
        .map(|items| items.iter().map(text).collect())
        .ok_or(HarnessError::BadInput { field: name })
}

fn string_map(inputs: &Value, name: &'static str) -> Result<BTreeMap<String, String>, HarnessError> {
    field(inputs, name)?
        .as_object()
        .map(|map| map.iter().map(|(k, v)| (k.clone(), text(v))).collect())
        .ok_or(HarnessError::BadInput { field: name })
}

/// Allocate `sizes` in one scope (optionally failing after `fail_after`
/// allocator successes), stop at the first failure, close, and report whether
/// every block was released once in reverse order.
fn run_scope(inputs: &Value) -> Result<String, HarnessError> {
    let sizes = sizes(inputs, "sizes")?;
    let recorder = match opt_int(inputs, "fail_after")? {
        Some(n) => RecordingAllocator::failing_after(
            usize::try_from(n).map_err(|_| HarnessError::BadInput { field: "fail_after" })?,
        ),
        None => RecordingAllocator::new(),
    };
    let mut blocks = Vec::new();
    let mut failure = None;
    {
        let mut scope = ScopeAllocator::with_allocator(&recorder);
        for size in sizes {
            match scope.alloc(size) {
                Ok(block) => blocks.push(block.as_ptr() as usize),
                Err(err) => {
                    failure = Some(err.kind());
                    break;
                }
            }
        }
    }
    let released = recorder.releases();
    let lifo = released.iter().eq(blocks.iter().rev());
    let mut out = format!(
        "registered={} released={} lifo={lifo}",
        blocks.len(),
        released.len()
    );
    if let Some(kind) = failure {
        out.push_str(&format!(" error={}", kind.name()));
    }
    Ok(out)
}

fn run_double_register() -> String {
    let recorder = RecordingAllocator::new();
    let block = recorder.allocate(16);
    let outcome = {
        let mut scope = ScopeAllocator::with_allocator(&recorder);
        scope.register_recorded(block).and_then(|()| scope.register_recorded(block))
    };
    render(outcome, |()| format!("releases={}", recorder.release_count(block)))
}

/// Bump-allocate `sizes`, optionally reset and allocate `after_reset`.
fn run_pool(inputs: &Value) -> Result<String, HarnessError> {
    let capacity = size(inputs, "capacity")?;
    let mut pool = match MemoryPool::open(Some(capacity)) {
        Ok(pool) => pool,
        Err(err) => return Ok(format!("error:{}", err.kind().name())),
    };
    let mut offsets = Vec::new();
    for size in sizes(inputs, "sizes")? {
        match pool.alloc(size) {
            Ok(block) => offsets.push(block.offset()),
            Err(err) => return Ok(format!("error:{}", err.kind().name())),
        }
    }
    let mut out = format!(
        "offsets={} used={} growths={}",
        list(&offsets),
        pool.used(),
        pool.growths()
    );
    if inputs.get("after_reset").is_some() {
        pool.reset();
        let mut again = Vec::new();
        for size in sizes(inputs, "after_reset")? {
            match pool.alloc(size) {
                Ok(block) => again.push(block.offset()),
                Err(err) => return Ok(format!("error:{}", err.kind().name())),
            }
        }
        out.push_str(&format!(" after_reset={}", list(&again)));
    }
    Ok(out)
}

/// New object, `retains` extra holders, then release every holder in turn.
fn run_refcount(inputs: &Value) -> Result<String, HarnessError> {
    let retains = size(inputs, "retains")?;
    let runs = Rc::new(Cell::new(0u32));
    let seen = Rc::clone(&runs);
    let first = RefCounted::with_destructor((), move |_: &mut ()| seen.set(seen.get() + 1));
    let mut holders = vec![first];
    for _ in 0..retains {
        let next = holders[0].retain();
        holders.push(next);
    }
    let mut destroyed_on = None;
    let total = holders.len();
    for (i, holder) in holders.into_iter().enumerate() {
        if holder.release() {
            destroyed_on = Some(i + 1);
        }
    }
    Ok(format!(
        "releases={total} destroyed_on={} destructor_runs={}",
        destroyed_on.map_or_else(|| String::from("-"), |n| n.to_string()),
        runs.get()
    ))
}

fn run_registry(inputs: &Value) -> Result<String, HarnessError> {
    let names = strings(inputs, "names")?;
    let order = Rc::new(RefCell::new(Vec::new()));
    let mut registry = ResourceRegistry::new();
    for name in &names {
        let order = Rc::clone(&order);
        registry.register(name.clone(), move |n| order.borrow_mut().push(n), Some(name));
    }
    let ran = registry.cleanup_all();
    let order = order.borrow();
    Ok(format!("ran={ran} order={}", list(order.iter())))
}

fn run_error_render(inputs: &Value) -> Result<String, HarnessError> {
    let kind = ErrorKind::from_name(&string(inputs, "kind")?)
        .ok_or(HarnessError::BadInput { field: "kind" })?;
    let mut err = RuntimeError::without_location(kind, string(inputs, "message")?);
    if let Some(file) = inputs.get("file") {
        let line = u32::try_from(int(inputs, "line")?)
            .map_err(|_| HarnessError::BadInput { field: "line" })?;
        err = err.with_location(Location::new(text(file), line, string(inputs, "function")?));
    }
    Ok(err.to_string())
}
