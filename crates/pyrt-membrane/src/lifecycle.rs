//! Structured lifecycle records.
//!
//! When tracking is `trace`, scope, pool, refcount and registry operations
//! append one record per event to a bounded ring. The oldest record is evicted
//! once the ring is full. The harness drains the ring and writes JSONL.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::config::tracking_level;

/// Records retained before the oldest is evicted.
pub const LOG_CAPACITY: usize = 4096;

/// Lifecycle log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// One event as reported by a component, before it is numbered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub level: LogLevel,
    /// `scope`, `pool`, `refcount`, `registry`, `alloc`.
    pub component: &'static str,
    /// `open`, `alloc`, `register`, `release`, `close`, ...
    pub event: &'static str,
    pub ptr: Option<usize>,
    pub size: Option<usize>,
    pub outcome: &'static str,
    pub details: String,
}

impl LifecycleEvent {
    #[must_use]
    pub fn new(component: &'static str, event: &'static str) -> Self {
        Self {
            level: LogLevel::Debug,
            component,
            event,
            ptr: None,
            size: None,
            outcome: "ok",
            details: String::new(),
        }
    }

    #[must_use]
    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn ptr<T>(mut self, ptr: *const T) -> Self {
        self.ptr = Some(ptr as usize);
        self
    }

    #[must_use]
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    #[must_use]
    pub fn outcome(mut self, outcome: &'static str) -> Self {
        self.outcome = outcome;
        self
    }

    #[must_use]
    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }
}

/// A numbered lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleRecord {
    /// Monotonic per-log id.
    pub decision_id: u64,
    /// Correlation id: `membrane::<component>::<event>::<id>`.
    pub trace_id: String,
    pub level: LogLevel,
    pub component: &'static str,
    pub event: &'static str,
    pub ptr: Option<usize>,
    pub size: Option<usize>,
    pub outcome: &'static str,
    pub details: String,
}

struct LogRing {
    next_id: u64,
    evicted: u64,
    capacity: usize,
    records: VecDeque<LifecycleRecord>,
}

/// Bounded ring of lifecycle records.
pub struct LifecycleLog {
    inner: Mutex<LogRing>,
}

impl LifecycleLog {
    #[must_use]
    pub const fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    /// Ring holding at most `capacity` records (at least one).
    #[must_use]
    pub const fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: parking_lot::const_mutex(LogRing {
                next_id: 1,
                evicted: 0,
                capacity: if capacity == 0 { 1 } else { capacity },
                records: VecDeque::new(),
            }),
        }
    }

    /// Append an event and return its decision id.
    pub fn record(&self, event: LifecycleEvent) -> u64 {
        let mut ring = self.inner.lock();
        let decision_id = ring.next_id;
        ring.next_id += 1;
        if ring.records.len() >= ring.capacity {
            ring.records.pop_front();
            ring.evicted += 1;
        }
        let trace_id = format!(
            "membrane::{}::{}::{:016x}",
            event.component, event.event, decision_id
        );
        ring.records.push_back(LifecycleRecord {
            decision_id,
            trace_id,
            level: event.level,
            component: event.component,
            event: event.event,
            ptr: event.ptr,
            size: event.size,
            outcome: event.outcome,
            details: event.details,
        });
        decision_id
    }

    /// Take every retained record, oldest first.
    pub fn drain(&self) -> Vec<LifecycleRecord> {
        self.inner.lock().records.drain(..).collect()
    }

    /// Copy of the retained records without removing them.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LifecycleRecord> {
        self.inner.lock().records.iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records dropped because the ring was full.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.inner.lock().evicted
    }
}

impl Default for LifecycleLog {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_LOG: LifecycleLog = LifecycleLog::new();

/// Process-wide log the membrane components write to.
#[must_use]
pub fn global() -> &'static LifecycleLog {
    &GLOBAL_LOG
}

/// Record into the global log when tracking is `trace`. The event is only
/// built when it will be kept.
pub fn emit(build: impl FnOnce() -> LifecycleEvent) {
    if tracking_level().logs_enabled() {
        GLOBAL_LOG.record(build());
    }
}

/// Drain the global log.
pub fn drain() -> Vec<LifecycleRecord> {
    GLOBAL_LOG.drain()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_numbered_in_order() {
        let log = LifecycleLog::new();
        let a = log.record(LifecycleEvent::new("scope", "open"));
        let b = log.record(LifecycleEvent::new("scope", "alloc").size(32).ptr(0x1000 as *const u8));
        assert_eq!((a, b), (1, 2));

        let records = log.drain();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event, "open");
        assert_eq!(records[1].size, Some(32));
        assert_eq!(records[1].ptr, Some(0x1000));
        assert_eq!(records[1].trace_id, "membrane::scope::alloc::0000000000000002");
        assert!(log.is_empty());
    }

    #[test]
    fn full_ring_evicts_oldest() {
        let log = LifecycleLog::with_capacity(3);
        for _ in 0..5 {
            log.record(LifecycleEvent::new("pool", "alloc"));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.evicted(), 2);
        let ids: Vec<u64> = log.snapshot().iter().map(|r| r.decision_id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
    }

    #[test]
    fn zero_capacity_keeps_one() {
        let log = LifecycleLog::with_capacity(0);
        log.record(LifecycleEvent::new("refcount", "retain"));
        log.record(LifecycleEvent::new("refcount", "release"));
        let records = log.drain();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event, "release");
    }

    #[test]
    fn builder_sets_fields() {
        let event = LifecycleEvent::new("registry", "cleanup")
            .level(LogLevel::Warn)
            .outcome("partial")
            .details("name=db");
        assert_eq!(event.level, LogLevel::Warn);
        assert_eq!(event.outcome, "partial");
        assert_eq!(event.details, "name=db");
        assert_eq!(LogLevel::Warn.as_str(), "warn");
    }
}
