//! Error taxonomy and last-error reporting.
//!
//! Every fallible runtime operation fails in two ways at once: it returns an
//! `Err(RuntimeError)` to Rust callers and records the same failure into the
//! per-thread [`ErrorContext`] slot, which is what generated C code polls after
//! a sentinel return. Success never touches the slot.

mod context;
mod errno;

pub use context::{
    ErrorContext, MESSAGE_CAPACITY, clear_error, has_error, last_error, last_error_code,
    last_error_message, print_error, record_error, render_last_error, set_error,
    with_last_error,
};
pub use errno::errno_to_kind;

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

/// Failure classification, one variant per dynamic-language exception family.
///
/// The discriminants are the ABI codes generated code compares against.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i32)]
pub enum ErrorKind {
    /// No error pending.
    #[default]
    Ok = 0,
    Generic = 1,
    /// Allocation failure (`MemoryError`).
    Memory = 2,
    /// Sequence position out of range (`IndexError`).
    Index = 3,
    /// Missing mapping key (`KeyError`).
    Key = 4,
    /// Argument has the right type but an illegal value (`ValueError`).
    Value = 5,
    Type = 6,
    Io = 7,
    FileNotFound = 8,
    Permission = 9,
    Runtime = 10,
}

impl ErrorKind {
    /// Every kind, in ABI code order.
    pub const ALL: [ErrorKind; 11] = [
        ErrorKind::Ok,
        ErrorKind::Generic,
        ErrorKind::Memory,
        ErrorKind::Index,
        ErrorKind::Key,
        ErrorKind::Value,
        ErrorKind::Type,
        ErrorKind::Io,
        ErrorKind::FileNotFound,
        ErrorKind::Permission,
        ErrorKind::Runtime,
    ];

    /// ABI code for this kind.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Inverse of [`ErrorKind::code`].
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Exception-style display name (`"IndexError"`, `"KeyError"`, ...).
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Generic => "GenericError",
            Self::Memory => "MemoryError",
            Self::Index => "IndexError",
            Self::Key => "KeyError",
            Self::Value => "ValueError",
            Self::Type => "TypeError",
            Self::Io => "IOError",
            Self::FileNotFound => "FileNotFoundError",
            Self::Permission => "PermissionError",
            Self::Runtime => "RuntimeError",
        }
    }

    /// Parse a display name back into a kind (exact match).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Source position a failure is attributed to.
///
/// Rust callers get the position of the call into the runtime (via
/// `#[track_caller]`); C callers pass their own `__FILE__`/`__LINE__`/`__func__`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub file: Cow<'static, str>,
    pub line: u32,
    pub function: Cow<'static, str>,
}

impl Location {
    /// Location of the caller, attributed to runtime operation `function`.
    #[must_use]
    #[track_caller]
    pub fn caller(function: &'static str) -> Self {
        let here = std::panic::Location::caller();
        Self {
            file: Cow::Borrowed(here.file()),
            line: here.line(),
            function: Cow::Borrowed(function),
        }
    }

    #[must_use]
    pub fn new(
        file: impl Into<Cow<'static, str>>,
        line: u32,
        function: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            file: file.into(),
            line,
            function: function.into(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} in {}", self.file, self.line, self.function)
    }
}

fn location_suffix(location: &Option<Location>) -> String {
    match location {
        Some(loc) => format!(" (at {loc})"),
        None => String::new(),
    }
}

/// A classified runtime failure.
///
/// Renders as `[KindName]: message (at file:line in function)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{kind}]: {message}{}", location_suffix(.location))]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Option<Location>,
}

/// Result alias used across the runtime crates.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

impl RuntimeError {
    /// Build an error attributed to the caller. Does not touch the error context.
    #[must_use]
    #[track_caller]
    pub fn new(kind: ErrorKind, message: impl Into<String>, function: &'static str) -> Self {
        Self {
            kind,
            message: message.into(),
            location: Some(Location::caller(function)),
        }
    }

    #[must_use]
    pub fn without_location(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Store this error in the thread's last-error slot and hand it back.
    #[must_use]
    pub fn record(self) -> Self {
        record_error(&self);
        self
    }
}

/// Build an error attributed to the caller, record it, and return it.
///
/// This is the single failure path used by runtime operations.
#[must_use]
#[track_caller]
pub fn raise(kind: ErrorKind, message: impl Into<String>, function: &'static str) -> RuntimeError {
    RuntimeError::new(kind, message, function).record()
}

impl From<std::io::Error> for RuntimeError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.raw_os_error() {
            Some(code) => errno_to_kind(code),
            None => ErrorKind::from(err.kind()),
        };
        Self::without_location(kind, err.to_string())
    }
}
