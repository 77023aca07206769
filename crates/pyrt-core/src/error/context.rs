//! Last-error slot.
//!
//! One [`ErrorContext`] lives in thread-local storage and is shared by every
//! runtime component on that thread. It is last-write-wins: a failure
//! overwrites whatever was there, success leaves it alone, and nothing is
//! stacked or chained. Callers check immediately after each call.

use std::cell::RefCell;

use super::{ErrorKind, Location, RuntimeError};

/// Byte capacity of the stored message, including the C terminator.
pub const MESSAGE_CAPACITY: usize = 512;

/// Current error state: code, bounded message, and attribution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    code: ErrorKind,
    message: String,
    location: Option<Location>,
}

impl ErrorContext {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            code: ErrorKind::Ok,
            message: String::new(),
            location: None,
        }
    }

    /// Overwrite the current error. Messages longer than
    /// `MESSAGE_CAPACITY - 1` bytes are truncated on a char boundary.
    pub fn set(&mut self, code: ErrorKind, message: &str, location: Option<Location>) {
        self.code = code;
        self.message.clear();
        self.message.push_str(truncate_message(message));
        self.location = location;
    }

    pub fn record(&mut self, err: &RuntimeError) {
        self.set(err.kind, &err.message, err.location.clone());
    }

    #[must_use]
    pub fn code(&self) -> ErrorKind {
        self.code
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    pub fn clear(&mut self) {
        self.code = ErrorKind::Ok;
        self.message.clear();
        self.location = None;
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        !self.code.is_ok()
    }

    /// Snapshot as a [`RuntimeError`], or `None` when no error is pending.
    #[must_use]
    pub fn to_error(&self) -> Option<RuntimeError> {
        self.has_error().then(|| RuntimeError {
            kind: self.code,
            message: self.message.clone(),
            location: self.location.clone(),
        })
    }

    /// `[KindName]: message (at file:line in function)`, or `None` when clear.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.to_error().map(|err| err.to_string())
    }
}

fn truncate_message(message: &str) -> &str {
    let limit = MESSAGE_CAPACITY - 1;
    if message.len() <= limit {
        return message;
    }
    let mut end = limit;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    &message[..end]
}

thread_local! {
    static LAST_ERROR: RefCell<ErrorContext> = const { RefCell::new(ErrorContext::new()) };
}

/// Overwrite this thread's last error.
pub fn set_error(code: ErrorKind, message: &str, location: Option<Location>) {
    LAST_ERROR.with_borrow_mut(|ctx| ctx.set(code, message, location));
}

pub fn record_error(err: &RuntimeError) {
    LAST_ERROR.with_borrow_mut(|ctx| ctx.record(err));
}

#[must_use]
pub fn last_error_code() -> ErrorKind {
    LAST_ERROR.with_borrow(ErrorContext::code)
}

#[must_use]
pub fn last_error_message() -> String {
    LAST_ERROR.with_borrow(|ctx| ctx.message().to_owned())
}

#[must_use]
pub fn last_error() -> Option<RuntimeError> {
    LAST_ERROR.with_borrow(ErrorContext::to_error)
}

pub fn clear_error() {
    LAST_ERROR.with_borrow_mut(ErrorContext::clear);
}

#[must_use]
pub fn has_error() -> bool {
    LAST_ERROR.with_borrow(ErrorContext::has_error)
}

#[must_use]
pub fn render_last_error() -> Option<String> {
    LAST_ERROR.with_borrow(ErrorContext::render)
}

/// Run `f` against this thread's context without cloning it.
pub fn with_last_error<R>(f: impl FnOnce(&ErrorContext) -> R) -> R {
    LAST_ERROR.with_borrow(f)
}

/// Write the pending error, if any, to stderr.
pub fn print_error() {
    if let Some(line) = render_last_error() {
        eprintln!("{line}");
    }
}
