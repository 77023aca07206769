//! Runtime configuration.
//!
//! Two environment variables are read once and cached:
//! - `PYRT_MEMORY_TRACKING`: `off` (default), `stats` (allocation counters),
//!   or `trace` (counters plus lifecycle log records).
//! - `PYRT_POOL_CAPACITY`: default byte capacity for pools opened without an
//!   explicit size. Must be a positive integer; anything else means 4096.
//!
//! Both caches are atomic state machines rather than `OnceLock` so a call that
//! re-enters while the environment is being read gets the default instead of
//! blocking. `set_*` overrides replace the cached value directly.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Pool capacity used when neither the caller nor the environment gives one.
pub const DEFAULT_POOL_CAPACITY: usize = 4096;

pub const TRACKING_ENV: &str = "PYRT_MEMORY_TRACKING";
pub const POOL_CAPACITY_ENV: &str = "PYRT_POOL_CAPACITY";

/// How much bookkeeping the membrane does on each allocation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackingLevel {
    /// No counters, no log records.
    #[default]
    Off,
    /// Allocation and free counters.
    Stats,
    /// Counters plus lifecycle log records.
    Trace,
}

impl TrackingLevel {
    /// Parse from string (case-insensitive). Unknown values are `Off`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "stats" | "count" | "counters" | "1" | "on" => Self::Stats,
            "trace" | "log" | "full" | "2" => Self::Trace,
            _ => Self::Off,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Stats => "stats",
            Self::Trace => "trace",
        }
    }

    #[must_use]
    pub const fn counts_enabled(self) -> bool {
        !matches!(self, Self::Off)
    }

    #[must_use]
    pub const fn logs_enabled(self) -> bool {
        matches!(self, Self::Trace)
    }
}

// 0=unresolved, 1=Off, 2=Stats, 3=Trace, 255=resolving.
static CACHED_TRACKING: AtomicU8 = AtomicU8::new(0);

const TRACKING_UNRESOLVED: u8 = 0;
const TRACKING_OFF: u8 = 1;
const TRACKING_STATS: u8 = 2;
const TRACKING_TRACE: u8 = 3;
const TRACKING_RESOLVING: u8 = 255;

fn tracking_to_u8(level: TrackingLevel) -> u8 {
    match level {
        TrackingLevel::Off => TRACKING_OFF,
        TrackingLevel::Stats => TRACKING_STATS,
        TrackingLevel::Trace => TRACKING_TRACE,
    }
}

fn u8_to_tracking(v: u8) -> TrackingLevel {
    match v {
        TRACKING_STATS => TrackingLevel::Stats,
        TRACKING_TRACE => TrackingLevel::Trace,
        _ => TrackingLevel::Off,
    }
}

/// Configured tracking level (reads the environment on first call).
#[must_use]
pub fn tracking_level() -> TrackingLevel {
    let cached = CACHED_TRACKING.load(Ordering::Relaxed);
    if cached != TRACKING_UNRESOLVED && cached != TRACKING_RESOLVING {
        return u8_to_tracking(cached);
    }
    if cached == TRACKING_RESOLVING {
        return TrackingLevel::Off;
    }
    if CACHED_TRACKING
        .compare_exchange(
            TRACKING_UNRESOLVED,
            TRACKING_RESOLVING,
            Ordering::SeqCst,
            Ordering::Relaxed,
        )
        .is_err()
    {
        let v = CACHED_TRACKING.load(Ordering::Relaxed);
        return if v != TRACKING_UNRESOLVED && v != TRACKING_RESOLVING {
            u8_to_tracking(v)
        } else {
            TrackingLevel::Off
        };
    }

    let level = std::env::var(TRACKING_ENV)
        .map(|v| TrackingLevel::from_str_loose(&v))
        .unwrap_or_default();
    // An override may have landed while we were reading the environment.
    let _ = CACHED_TRACKING.compare_exchange(
        TRACKING_RESOLVING,
        tracking_to_u8(level),
        Ordering::Release,
        Ordering::Relaxed,
    );
    u8_to_tracking(CACHED_TRACKING.load(Ordering::Acquire))
}

/// Replace the tracking level for the rest of the process.
pub fn set_tracking_level(level: TrackingLevel) {
    CACHED_TRACKING.store(tracking_to_u8(level), Ordering::Release);
}

// 0=unresolved, usize::MAX=resolving, anything else is the capacity.
static CACHED_POOL_CAPACITY: AtomicUsize = AtomicUsize::new(0);

const CAPACITY_RESOLVING: usize = usize::MAX;

fn parse_pool_capacity(raw: &str) -> usize {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 && n != CAPACITY_RESOLVING => n,
        _ => DEFAULT_POOL_CAPACITY,
    }
}

/// Capacity for pools opened without an explicit size.
#[must_use]
pub fn default_pool_capacity() -> usize {
    let cached = CACHED_POOL_CAPACITY.load(Ordering::Relaxed);
    if cached == CAPACITY_RESOLVING {
        return DEFAULT_POOL_CAPACITY;
    }
    if cached != 0 {
        return cached;
    }
    if CACHED_POOL_CAPACITY
        .compare_exchange(0, CAPACITY_RESOLVING, Ordering::SeqCst, Ordering::Relaxed)
        .is_err()
    {
        let v = CACHED_POOL_CAPACITY.load(Ordering::Relaxed);
        return if v != 0 && v != CAPACITY_RESOLVING {
            v
        } else {
            DEFAULT_POOL_CAPACITY
        };
    }

    let capacity = std::env::var(POOL_CAPACITY_ENV)
        .map(|v| parse_pool_capacity(&v))
        .unwrap_or(DEFAULT_POOL_CAPACITY);
    let _ = CACHED_POOL_CAPACITY.compare_exchange(
        CAPACITY_RESOLVING,
        capacity,
        Ordering::Release,
        Ordering::Relaxed,
    );
    match CACHED_POOL_CAPACITY.load(Ordering::Acquire) {
        0 | CAPACITY_RESOLVING => DEFAULT_POOL_CAPACITY,
        v => v,
    }
}

/// Replace the default pool capacity. Zero restores 4096.
pub fn set_default_pool_capacity(capacity: usize) {
    let capacity = if capacity == 0 || capacity == CAPACITY_RESOLVING {
        DEFAULT_POOL_CAPACITY
    } else {
        capacity
    };
    CACHED_POOL_CAPACITY.store(capacity, Ordering::Release);
}

/// Snapshot of every runtime setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub tracking: TrackingLevel,
    pub pool_capacity: usize,
}

impl RuntimeConfig {
    #[must_use]
    pub fn current() -> Self {
        Self {
            tracking: tracking_level(),
            pool_capacity: default_pool_capacity(),
        }
    }

    /// Install this configuration as the process-wide one.
    pub fn apply(self) {
        set_tracking_level(self.tracking);
        set_default_pool_capacity(self.pool_capacity);
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tracking: TrackingLevel::Off,
            pool_capacity: DEFAULT_POOL_CAPACITY,
        }
    }
}
