//! # pyrt-core
//!
//! Safe core of the pyrt runtime: the pieces generated code leans on to get
//! dynamic-language behavior out of statically typed containers.
//!
//! - [`error`]: the per-thread last-error slot, the [`ErrorKind`] taxonomy and
//!   errno mapping.
//! - [`slice`]: negative-index resolution and slice normalization.
//! - [`bridge`]: capability-table driven container operations (`safe_at`,
//!   `safe_get`, membership, enumeration, equality).
//!
//! No `unsafe` code is permitted at the crate level. Raw memory lives in
//! `pyrt-membrane`; the C calling convention lives in `pyrt-abi`.

#![deny(unsafe_code)]

pub mod bridge;
pub mod error;
pub mod slice;

pub use error::{ErrorContext, ErrorKind, Location, RuntimeError, RuntimeResult};
pub use slice::{NormalizedSlice, Range, SliceSpec, normalize_index, normalize_slice};
