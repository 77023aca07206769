//! Index and slice normalization.
//!
//! Pure arithmetic that turns dynamic-language positions (negative offsets,
//! omitted bounds, signed steps) into concrete bounds over a sequence of known
//! length. The only side effect is recording into the error context when an
//! input is rejected.

use crate::error::{ErrorKind, RuntimeResult, raise};

fn len_as_i64(length: usize) -> i64 {
    i64::try_from(length).unwrap_or(i64::MAX)
}

/// Resolve a possibly-negative index against `length`.
///
/// Negative indices count from the end (`-1` is the last element). Anything
/// still outside `[0, length)` after the single offset fails with
/// [`ErrorKind::Index`].
#[track_caller]
pub fn normalize_index(index: i64, length: usize) -> RuntimeResult<usize> {
    let resolved = if index < 0 {
        index.saturating_add(len_as_i64(length))
    } else {
        index
    };
    match usize::try_from(resolved) {
        Ok(position) if position < length => Ok(position),
        _ => Err(raise(
            ErrorKind::Index,
            format!("index {index} out of range for length {length}"),
            "normalize_index",
        )),
    }
}

/// Raw `start:stop:step` as written in source, any part may be omitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SliceSpec {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl SliceSpec {
    /// `[:]`
    #[must_use]
    pub const fn full() -> Self {
        Self {
            start: None,
            stop: None,
            step: None,
        }
    }

    #[must_use]
    pub const fn new(start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Self {
        Self { start, stop, step }
    }

    #[must_use]
    pub const fn with_start(mut self, start: i64) -> Self {
        self.start = Some(start);
        self
    }

    #[must_use]
    pub const fn with_stop(mut self, stop: i64) -> Self {
        self.stop = Some(stop);
        self
    }

    #[must_use]
    pub const fn with_step(mut self, step: i64) -> Self {
        self.step = Some(step);
        self
    }

    /// Shorthand for [`normalize_slice`] on this spec.
    #[track_caller]
    pub fn normalize(&self, length: usize) -> RuntimeResult<NormalizedSlice> {
        normalize_slice(self.start, self.stop, self.step, length)
    }
}

/// Concrete slice bounds over a sequence of fixed length.
///
/// For a forward step `start` and `stop` lie in `[0, length]`; for a backward
/// step they lie in `[-1, length - 1]`, where `-1` means "before the first
/// element". `len()` is exactly the number of indices [`indices`] yields.
///
/// [`indices`]: NormalizedSlice::indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NormalizedSlice {
    start: i64,
    stop: i64,
    step: i64,
    length: usize,
}

impl NormalizedSlice {
    #[must_use]
    pub const fn start(&self) -> i64 {
        self.start
    }

    #[must_use]
    pub const fn stop(&self) -> i64 {
        self.stop
    }

    /// Signed step; never zero.
    #[must_use]
    pub const fn step(&self) -> i64 {
        self.step
    }

    #[must_use]
    pub const fn step_magnitude(&self) -> u64 {
        self.step.unsigned_abs()
    }

    #[must_use]
    pub const fn is_reversed(&self) -> bool {
        self.step < 0
    }

    /// Number of indices visited.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Indices visited in order.
    #[must_use]
    pub fn indices(&self) -> SliceIndices {
        SliceIndices {
            next: self.start,
            step: self.step,
            remaining: self.length,
        }
    }
}

/// Iterator returned by [`NormalizedSlice::indices`].
#[derive(Debug, Clone)]
pub struct SliceIndices {
    next: i64,
    step: i64,
    remaining: usize,
}

impl Iterator for SliceIndices {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let current = usize::try_from(self.next).ok()?;
        self.remaining -= 1;
        self.next = self.next.saturating_add(self.step);
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for SliceIndices {}

fn clamp_bound(value: i64, length: i64, forward: bool) -> i64 {
    let value = if value < 0 {
        value.saturating_add(length)
    } else {
        value
    };
    if value < 0 {
        if forward { 0 } else { -1 }
    } else if value >= length {
        if forward { length } else { length - 1 }
    } else {
        value
    }
}

fn visit_count(start: i64, stop: i64, step: i64) -> usize {
    let magnitude = u128::from(step.unsigned_abs());
    let span = if step > 0 {
        if start >= stop {
            return 0;
        }
        u128::from(stop.abs_diff(start))
    } else {
        if start <= stop {
            return 0;
        }
        u128::from(start.abs_diff(stop))
    };
    usize::try_from(span.div_ceil(magnitude)).unwrap_or(usize::MAX)
}

/// Normalize `start:stop:step` against a sequence of `length` elements.
///
/// Omitted parts take the dynamic-language defaults for the step's direction.
/// Negative bounds are offset by `length` once and then clamped into the legal
/// range, so out-of-range bounds never fail. A zero step fails with
/// [`ErrorKind::Value`].
#[track_caller]
pub fn normalize_slice(
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
    length: usize,
) -> RuntimeResult<NormalizedSlice> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(raise(
            ErrorKind::Value,
            "slice step cannot be zero",
            "normalize_slice",
        ));
    }
    let forward = step > 0;
    let len = len_as_i64(length);

    let start = match start {
        Some(value) => clamp_bound(value, len, forward),
        None if forward => 0,
        None => len - 1,
    };
    let stop = match stop {
        Some(value) => clamp_bound(value, len, forward),
        None if forward => len,
        None => -1,
    };

    Ok(NormalizedSlice {
        start,
        stop,
        step,
        length: visit_count(start, stop, step),
    })
}

/// Lazy arithmetic progression matching the `range` builtin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    start: i64,
    stop: i64,
    step: i64,
    current: Option<i64>,
}

impl Range {
    /// `range(stop)`: `0, 1, ..., stop - 1`.
    #[must_use]
    pub fn up_to(stop: i64) -> Self {
        Self {
            start: 0,
            stop,
            step: 1,
            current: Some(0),
        }
    }

    /// `range(start, stop, step)`; a zero step fails with [`ErrorKind::Value`].
    #[track_caller]
    pub fn new(start: i64, stop: i64, step: i64) -> RuntimeResult<Self> {
        if step == 0 {
            return Err(raise(
                ErrorKind::Value,
                "range() arg 3 must not be zero",
                "range",
            ));
        }
        Ok(Self {
            start,
            stop,
            step,
            current: Some(start),
        })
    }

    #[must_use]
    pub const fn start(&self) -> i64 {
        self.start
    }

    #[must_use]
    pub const fn stop(&self) -> i64 {
        self.stop
    }

    #[must_use]
    pub const fn step(&self) -> i64 {
        self.step
    }

    /// Total number of values the full progression produces.
    #[must_use]
    pub fn count_total(&self) -> usize {
        visit_count(self.start, self.stop, self.step)
    }

    #[must_use]
    pub fn contains(&self, value: i64) -> bool {
        let in_bounds = if self.step > 0 {
            self.start <= value && value < self.stop
        } else {
            self.stop < value && value <= self.start
        };
        in_bounds && (i128::from(value) - i128::from(self.start)) % i128::from(self.step) == 0
    }
}

impl Iterator for Range {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        let current = self.current?;
        let live = if self.step > 0 {
            current < self.stop
        } else {
            current > self.stop
        };
        if !live {
            self.current = None;
            return None;
        }
        self.current = current.checked_add(self.step);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{clear_error, last_error_code};

    fn explicit_walk(slice: &NormalizedSlice) -> usize {
        let mut count = 0usize;
        let mut i = slice.start();
        if slice.step() > 0 {
            while i < slice.stop() {
                count += 1;
                i += slice.step();
            }
        } else {
            while i > slice.stop() {
                count += 1;
                i += slice.step();
            }
        }
        count
    }

    fn xorshift(state: &mut u64) -> u64 {
        *state ^= *state << 13;
        *state ^= *state >> 7;
        *state ^= *state << 17;
        *state
    }

    #[test]
    fn negative_index_resolves_from_end() {
        assert_eq!(normalize_index(-1, 5).unwrap(), 4);
        assert_eq!(normalize_index(-5, 5).unwrap(), 0);
        assert_eq!(normalize_index(0, 5).unwrap(), 0);
        assert_eq!(normalize_index(4, 5).unwrap(), 4);
    }

    #[test]
    fn every_index_in_range_is_equivalent() {
        for length in 0..12usize {
            let len = length as i64;
            for i in -len..len {
                let expected = if i < 0 { i + len } else { i };
                assert_eq!(normalize_index(i, length).unwrap(), expected as usize);
            }
        }
    }

    #[test]
    fn out_of_range_index_fails_with_index_kind() {
        clear_error();
        let err = normalize_index(5, 5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Index);
        assert_eq!(last_error_code(), ErrorKind::Index);
        assert!(err.message().contains('5'));

        assert_eq!(normalize_index(-6, 5).unwrap_err().kind(), ErrorKind::Index);
        assert_eq!(normalize_index(0, 0).unwrap_err().kind(), ErrorKind::Index);
        assert_eq!(
            normalize_index(i64::MIN, 3).unwrap_err().kind(),
            ErrorKind::Index
        );
        clear_error();
    }

    #[test]
    fn success_leaves_context_untouched() {
        clear_error();
        let _ = normalize_index(9, 3);
        let _ = normalize_index(1, 3).unwrap();
        assert_eq!(last_error_code(), ErrorKind::Index);
        clear_error();
    }

    #[test]
    fn full_slice_defaults() {
        let s = SliceSpec::full().normalize(5).unwrap();
        assert_eq!((s.start(), s.stop(), s.step(), s.len()), (0, 5, 1, 5));

        let r = SliceSpec::full().with_step(-1).normalize(5).unwrap();
        assert_eq!((r.start(), r.stop(), r.step(), r.len()), (4, -1, -1, 5));
        assert!(r.is_reversed());
        assert_eq!(r.indices().collect::<Vec<_>>(), vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn far_negative_start_clamps_to_zero() {
        let s = normalize_slice(Some(-100), Some(3), Some(1), 5).unwrap();
        assert_eq!(s.start(), 0);
        assert_eq!(s.stop(), 3);
        assert_eq!(s.indices().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn stepped_slices() {
        let s = SliceSpec::new(Some(1), None, Some(2)).normalize(10).unwrap();
        assert_eq!(s.indices().collect::<Vec<_>>(), vec![1, 3, 5, 7, 9]);
        assert_eq!(s.step_magnitude(), 2);

        let r = SliceSpec::new(Some(-2), Some(0), Some(-3)).normalize(10).unwrap();
        assert_eq!(r.indices().collect::<Vec<_>>(), vec![8, 5, 2]);
        assert_eq!(r.step_magnitude(), 3);
    }

    #[test]
    fn empty_and_inverted_slices_have_zero_length() {
        assert!(normalize_slice(Some(3), Some(1), None, 5).unwrap().is_empty());
        assert!(normalize_slice(Some(1), Some(3), Some(-1), 5).unwrap().is_empty());
        let empty = normalize_slice(None, None, Some(-1), 0).unwrap();
        assert_eq!((empty.start(), empty.stop()), (-1, -1));
        assert!(empty.is_empty());
        assert_eq!(empty.indices().count(), 0);
    }

    #[test]
    fn zero_step_is_value_error() {
        clear_error();
        let err = normalize_slice(None, None, Some(0), 5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Value);
        assert_eq!(last_error_code(), ErrorKind::Value);
        for length in [0usize, 1, 7] {
            assert_eq!(
                normalize_slice(Some(1), Some(2), Some(0), length)
                    .unwrap_err()
                    .kind(),
                ErrorKind::Value
            );
        }
        clear_error();
    }

    #[test]
    fn bounds_stay_in_legal_range() {
        let mut state = 0x9E37_79B9_7F4A_7C15u64;
        for _ in 0..4000 {
            let length = (xorshift(&mut state) % 40) as usize;
            let start = (xorshift(&mut state) % 121) as i64 - 60;
            let stop = (xorshift(&mut state) % 121) as i64 - 60;
            let mut step = (xorshift(&mut state) % 15) as i64 - 7;
            if step == 0 {
                step = 1;
            }
            let s = normalize_slice(Some(start), Some(stop), Some(step), length).unwrap();
            let len = length as i64;
            if step > 0 {
                assert!((0..=len).contains(&s.start()));
                assert!((0..=len).contains(&s.stop()));
            } else {
                assert!((-1..len).contains(&s.start()));
                assert!((-1..len).contains(&s.stop()));
            }
            assert_eq!(s.len(), explicit_walk(&s), "{start}:{stop}:{step} over {length}");
            let visited: Vec<usize> = s.indices().collect();
            assert_eq!(visited.len(), s.len());
            assert!(visited.iter().all(|&i| i < length));
        }
    }

    #[test]
    fn extreme_inputs_do_not_overflow() {
        let s = normalize_slice(Some(i64::MIN), Some(i64::MAX), Some(i64::MAX), 3).unwrap();
        assert_eq!(s.indices().collect::<Vec<_>>(), vec![0]);
        let r = normalize_slice(Some(i64::MAX), Some(i64::MIN), Some(i64::MIN), 3).unwrap();
        assert_eq!(r.indices().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn range_matches_builtin() {
        assert_eq!(Range::up_to(4).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert_eq!(Range::up_to(-2).count(), 0);
        assert_eq!(
            Range::new(10, 0, -3).unwrap().collect::<Vec<_>>(),
            vec![10, 7, 4, 1]
        );
        let r = Range::new(2, 11, 3).unwrap();
        assert_eq!(r.count_total(), 3);
        assert!(r.contains(8));
        assert!(!r.contains(9));
        assert!(!r.contains(11));
    }

    #[test]
    fn range_zero_step_is_value_error() {
        clear_error();
        assert_eq!(Range::new(0, 5, 0).unwrap_err().kind(), ErrorKind::Value);
        assert_eq!(last_error_code(), ErrorKind::Value);
        clear_error();
    }

    #[test]
    fn range_stops_at_numeric_edge() {
        let values: Vec<i64> = Range::new(i64::MAX - 2, i64::MAX, 5).unwrap().collect();
        assert_eq!(values, vec![i64::MAX - 2]);
    }
}
