//! Memory membrane for the pyrt runtime.
//!
//! Everything that touches raw heap memory on behalf of generated code lives
//! here, behind safe owners that release deterministically:
//!
//! - **Checked allocation** (`alloc`): size-validated malloc/calloc/realloc,
//!   bounded copy/move/fill, and process-wide memory counters
//! - **Scope allocator** (`scope`): LIFO ownership of raw allocations tied to
//!   a lexical scope
//! - **Memory pool** (`pool`): bump allocation with group reset and release
//! - **Reference counting** (`refcount`): retain/release with a destructor
//!   at count zero
//! - **Resource registry** (`registry`): arbitrary cleanup callbacks run in
//!   reverse registration order
//! - **Configuration** (`config`): tracking level and pool defaults
//! - **Lifecycle log** (`lifecycle`): bounded structured event ring
//!
//! Failures are reported through `pyrt_core::error`: each returns `Err` and
//! records into the calling thread's error context.

pub mod alloc;
pub mod config;
pub mod lifecycle;
pub mod pool;
pub mod refcount;
pub mod registry;
pub mod scope;

pub use alloc::{MemoryStats, RawAllocator, RecordingAllocator, SystemAllocator};
pub use config::{RuntimeConfig, TrackingLevel};
pub use lifecycle::{LifecycleEvent, LifecycleLog, LifecycleRecord, LogLevel};
pub use pool::{MemoryPool, PoolBlock};
pub use refcount::RefCounted;
pub use registry::ResourceRegistry;
pub use scope::ScopeAllocator;
