// All extern "C" exports accept raw pointers from generated C code; each
// module documents its pointer contract once instead of per function.
#![allow(clippy::missing_safety_doc)]
//! # pyrt-abi
//!
//! `extern "C"` boundary for C code generated against the pyrt runtime.
//!
//! ```text
//! generated C -> pyrt_* entry (this crate) -> pyrt-core / pyrt-membrane -> return
//! ```
//!
//! Every entry point is total: bad input never aborts. A failing call records
//! into the calling thread's error context and returns a sentinel (null, `-1`,
//! `0`, or a non-zero error code) that the caller must check before using the
//! result. `pyrt_error_code` / `pyrt_error_message` read the context back.
//!
//! Polymorphic operations take capability tables: `#[repr(C)]` structs of
//! function pointers describing how to size, index, look up, and iterate one
//! container type.

mod util;

pub mod bridge_abi;
pub mod error_abi;
pub mod malloc_abi;
pub mod pool_abi;
pub mod refcount_abi;
pub mod registry_abi;
pub mod scope_abi;
pub mod slice_abi;
