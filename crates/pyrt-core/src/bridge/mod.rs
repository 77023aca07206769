//! Generic container bridge.
//!
//! Dynamic-language container semantics (negative indexing, `KeyError` on a
//! missing key, `in`, `enumerate`, `==`) expressed once over capability
//! tables. Every entry point takes a table plus a container and never assumes
//! a concrete type. Failures return `Err` and record into the error context;
//! nothing here panics on bad input.

mod caps;
mod native;

pub use caps::{MapCaps, MembershipCaps, SequenceCaps, SizeCaps};
pub use native::Native;

use crate::error::{ErrorKind, RuntimeResult, raise};
use crate::slice::{SliceSpec, normalize_index};

#[must_use]
pub fn len<C, T>(caps: &T, container: &C) -> usize
where
    C: ?Sized,
    T: SizeCaps<C> + ?Sized,
{
    caps.size(container)
}

/// Non-empty containers are true.
#[must_use]
pub fn truthy<C, T>(caps: &T, container: &C) -> bool
where
    C: ?Sized,
    T: SizeCaps<C> + ?Sized,
{
    caps.size(container) != 0
}

/// Bounds-checked element access with negative-index support.
///
/// Fails with [`ErrorKind::Index`] when `index` is out of range or the
/// container yields no element for the resolved position.
#[track_caller]
pub fn safe_at<'a, C, S>(caps: &S, container: &'a C, index: i64) -> RuntimeResult<&'a S::Elem>
where
    C: ?Sized,
    S: SequenceCaps<C> + ?Sized,
{
    let position = normalize_index(index, caps.size(container))?;
    match caps.at(container, position) {
        Some(elem) => Ok(elem),
        None => Err(raise(
            ErrorKind::Index,
            format!("{} has no element at index {position}", caps.type_name()),
            "safe_at",
        )),
    }
}

/// Checked key lookup. A missing key fails with [`ErrorKind::Key`] and the
/// message names both the key and the container.
#[track_caller]
pub fn safe_get<'a, C, M>(caps: &M, container: &'a C, key: &M::Key) -> RuntimeResult<&'a M::Value>
where
    C: ?Sized,
    M: MapCaps<C> + ?Sized,
{
    let found = if caps.contains(container, key) {
        caps.get(container, key)
    } else {
        None
    };
    match found {
        Some(value) => Ok(value),
        None => Err(raise(
            ErrorKind::Key,
            format!(
                "key {} not found in {}",
                caps.describe_key(key),
                caps.type_name()
            ),
            "safe_get",
        )),
    }
}

/// `needle in container` for hashed or ordered containers.
#[must_use]
pub fn contains<C, M>(caps: &M, container: &C, needle: &M::Needle) -> bool
where
    C: ?Sized,
    M: MembershipCaps<C> + ?Sized,
{
    caps.contains(container, needle)
}

/// `target in sequence`: linear scan comparing with `element_equal`.
#[must_use]
pub fn sequence_contains<C, S, F>(
    caps: &S,
    container: &C,
    target: &S::Elem,
    mut element_equal: F,
) -> bool
where
    C: ?Sized,
    S: SequenceCaps<C> + ?Sized,
    F: FnMut(&S::Elem, &S::Elem) -> bool,
{
    (0..caps.size(container))
        .filter_map(|i| caps.at(container, i))
        .any(|elem| element_equal(elem, target))
}

/// Call `visit(index, element)` for positions `0..size` in order.
///
/// Positions the container reports as empty are skipped. Returns the number of
/// elements visited.
pub fn enumerate<'a, C, S, F>(caps: &S, container: &'a C, mut visit: F) -> usize
where
    C: ?Sized,
    S: SequenceCaps<C> + ?Sized,
    S::Elem: 'a,
    F: FnMut(usize, &'a S::Elem),
{
    let mut visited = 0;
    for index in 0..caps.size(container) {
        if let Some(elem) = caps.at(container, index) {
            visit(index, elem);
            visited += 1;
        }
    }
    visited
}

/// Visit every `(key, value)` in the container's own iteration order.
pub fn items<'a, C, M, F>(caps: &M, container: &'a C, mut visit: F)
where
    C: ?Sized,
    M: MapCaps<C> + ?Sized,
    M::Key: 'a,
    M::Value: 'a,
    F: FnMut(&'a M::Key, &'a M::Value),
{
    caps.for_each_item(container, &mut visit);
}

/// Sequence equality: same size and pairwise equal in order.
#[must_use]
pub fn equal<C, S, F>(caps: &S, a: &C, b: &C, mut element_equal: F) -> bool
where
    C: ?Sized,
    S: SequenceCaps<C> + ?Sized,
    F: FnMut(&S::Elem, &S::Elem) -> bool,
{
    let size = caps.size(a);
    if size != caps.size(b) {
        return false;
    }
    (0..size).all(|i| match (caps.at(a, i), caps.at(b, i)) {
        (Some(x), Some(y)) => element_equal(x, y),
        (None, None) => true,
        _ => false,
    })
}

/// Mapping equality: same size and every key of `a` maps to an equal value in `b`.
#[must_use]
pub fn map_equal<C, M, F>(caps: &M, a: &C, b: &C, mut value_equal: F) -> bool
where
    C: ?Sized,
    M: MapCaps<C> + ?Sized,
    F: FnMut(&M::Value, &M::Value) -> bool,
{
    if caps.size(a) != caps.size(b) {
        return false;
    }
    let mut same = true;
    caps.for_each_item(a, &mut |key, left| {
        if same {
            same = caps.get(b, key).is_some_and(|right| value_equal(left, right));
        }
    });
    same
}

/// Materialize `container[spec]` as element references in visit order.
///
/// Unlike [`enumerate`], an empty slot inside the slice fails with
/// [`ErrorKind::Index`]: a materialized slice has no way to represent a hole.
#[track_caller]
pub fn slice<'a, C, S>(
    caps: &S,
    container: &'a C,
    spec: &SliceSpec,
) -> RuntimeResult<Vec<&'a S::Elem>>
where
    C: ?Sized,
    S: SequenceCaps<C> + ?Sized,
{
    let normalized = spec.normalize(caps.size(container))?;
    let mut out = Vec::with_capacity(normalized.len());
    for index in normalized.indices() {
        match caps.at(container, index) {
            Some(elem) => out.push(elem),
            None => {
                return Err(raise(
                    ErrorKind::Index,
                    format!("{} has no element at index {index}", caps.type_name()),
                    "slice",
                ));
            }
        }
    }
    Ok(out)
}

/// `[a, b, c]` rendering.
#[must_use]
pub fn repr<C, S, F>(caps: &S, container: &C, mut element_repr: F) -> String
where
    C: ?Sized,
    S: SequenceCaps<C> + ?Sized,
    F: FnMut(&S::Elem) -> String,
{
    let mut out = String::from("[");
    let mut first = true;
    for index in 0..caps.size(container) {
        if let Some(elem) = caps.at(container, index) {
            if !first {
                out.push_str(", ");
            }
            out.push_str(&element_repr(elem));
            first = false;
        }
    }
    out.push(']');
    out
}

/// `{k: v, ...}` rendering in the container's iteration order.
#[must_use]
pub fn map_repr<C, M, K, V>(caps: &M, container: &C, mut key_repr: K, mut value_repr: V) -> String
where
    C: ?Sized,
    M: MapCaps<C> + ?Sized,
    K: FnMut(&M::Key) -> String,
    V: FnMut(&M::Value) -> String,
{
    let mut parts = Vec::with_capacity(caps.size(container));
    caps.for_each_item(container, &mut |key, value| {
        parts.push(format!("{}: {}", key_repr(key), value_repr(value)));
    });
    format!("{{{}}}", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

    use super::*;
    use crate::error::{clear_error, last_error_code, last_error_message};

    fn names() -> Vec<String> {
        ["ada", "grace", "linus", "ken", "barbara"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Foreign-style table whose odd slots are empty.
    struct Sparse;

    impl SizeCaps<Vec<Option<u32>>> for Sparse {
        fn type_name(&self) -> &str {
            "sparse"
        }

        fn size(&self, container: &Vec<Option<u32>>) -> usize {
            container.len()
        }
    }

    impl SequenceCaps<Vec<Option<u32>>> for Sparse {
        type Elem = u32;

        fn at<'a>(&self, container: &'a Vec<Option<u32>>, index: usize) -> Option<&'a u32> {
            container.get(index).and_then(Option::as_ref)
        }
    }

    /// Dense table that counts `at` calls.
    struct Counting {
        at_calls: Cell<usize>,
    }

    impl SizeCaps<Vec<u32>> for Counting {
        fn type_name(&self) -> &str {
            "counted"
        }

        fn size(&self, container: &Vec<u32>) -> usize {
            container.len()
        }
    }

    impl SequenceCaps<Vec<u32>> for Counting {
        type Elem = u32;

        fn at<'a>(&self, container: &'a Vec<u32>, index: usize) -> Option<&'a u32> {
            self.at_calls.set(self.at_calls.get() + 1);
            container.get(index)
        }
    }

    fn first_visited<'a, C, S>(caps: &S, container: &'a C) -> Option<(usize, &'a S::Elem)>
    where
        C: ?Sized,
        S: SequenceCaps<C> + ?Sized,
        S::Elem: 'a,
    {
        let mut first = None;
        enumerate(caps, container, |i, elem| {
            if first.is_none() {
                first = Some((i, elem));
            }
        });
        first
    }

    #[test]
    fn len_and_truthiness() {
        let v = names();
        assert_eq!(len(&Native, &v), 5);
        assert!(truthy(&Native, &v));
        let empty: Vec<String> = Vec::new();
        assert!(!truthy(&Native, &empty));
        assert_eq!(len(&Native, &v[1..3]), 2);
    }

    #[test]
    fn safe_at_negative_returns_last() {
        let v = names();
        assert_eq!(safe_at(&Native, &v, -1).unwrap(), "barbara");
        assert_eq!(safe_at(&Native, &v, 0).unwrap(), "ada");
        assert_eq!(safe_at(&Native, &v[..], -5).unwrap(), "ada");
    }

    #[test]
    fn safe_at_past_end_is_index_error() {
        clear_error();
        let v = names();
        let err = safe_at(&Native, &v, 5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Index);
        assert_eq!(last_error_code(), ErrorKind::Index);
        clear_error();
    }

    #[test]
    fn out_of_range_index_performs_no_lookup() {
        clear_error();
        let v = vec![10, 20, 30, 40, 50];
        let table = Counting {
            at_calls: Cell::new(0),
        };
        for index in [5, 6, i64::MAX, -6, i64::MIN] {
            let err = safe_at(&table, &v, index).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Index);
        }
        assert_eq!(table.at_calls.get(), 0);

        assert_eq!(*safe_at(&table, &v, -5).unwrap(), 10);
        assert_eq!(table.at_calls.get(), 1);
        clear_error();
    }

    #[test]
    fn safe_at_empty_slot_is_index_error() {
        clear_error();
        let v = vec![Some(1), None, Some(3)];
        assert_eq!(*safe_at(&Sparse, &v, -1).unwrap(), 3);
        let err = safe_at(&Sparse, &v, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Index);
        assert!(err.message().contains("sparse"));
        clear_error();
    }

    #[test]
    fn safe_get_missing_key_names_the_key() {
        clear_error();
        let mut map: HashMap<String, i32> = HashMap::new();
        map.insert("a".into(), 1);
        assert_eq!(*safe_get(&Native, &map, &"a".to_owned()).unwrap(), 1);

        let err = safe_get(&Native, &map, &"x".to_owned()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Key);
        assert!(err.message().contains('x'));
        assert!(err.message().contains("dict"));
        assert_eq!(last_error_code(), ErrorKind::Key);
        assert!(last_error_message().contains('x'));
        clear_error();
    }

    #[test]
    fn hashed_membership() {
        let set: HashSet<&str> = ["a", "b"].into_iter().collect();
        assert!(contains(&Native, &set, &"a"));
        assert!(!contains(&Native, &set, &"z"));

        let tree: BTreeSet<i32> = [3, 1, 2].into_iter().collect();
        assert!(contains(&Native, &tree, &2));

        let map: BTreeMap<i32, &str> = [(1, "one")].into_iter().collect();
        assert!(contains(&Native, &map, &1));
        assert!(!contains(&Native, &map, &2));
    }

    #[test]
    fn linear_membership_uses_callback() {
        let v = names();
        assert!(sequence_contains(&Native, &v, &"ken".to_owned(), |a, b| a == b));
        assert!(!sequence_contains(&Native, &v, &"KEN".to_owned(), |a, b| a == b));
        assert!(sequence_contains(&Native, &v, &"KEN".to_owned(), |a, b| {
            a.eq_ignore_ascii_case(b)
        }));
    }

    #[test]
    fn enumerate_visits_in_order_once() {
        let v = names();
        let mut seen = Vec::new();
        let count = enumerate(&Native, &v, |i, name| seen.push((i, name.as_str())));
        assert_eq!(count, 5);
        assert_eq!(seen[0], (0, "ada"));
        assert_eq!(seen[4], (4, "barbara"));
        assert!(seen.windows(2).all(|w| w[0].0 + 1 == w[1].0));
    }

    #[test]
    fn enumerate_skips_empty_slots() {
        let v = vec![Some(10), None, Some(30)];
        let mut seen = Vec::new();
        assert_eq!(enumerate(&Sparse, &v, |i, x| seen.push((i, *x))), 2);
        assert_eq!(seen, vec![(0, 10), (2, 30)]);
    }

    #[test]
    fn items_pass_through_native_order() {
        let map: BTreeMap<&str, i32> = [("b", 2), ("a", 1), ("c", 3)].into_iter().collect();
        let mut keys = Vec::new();
        items(&Native, &map, |k, v| keys.push((*k, *v)));
        assert_eq!(keys, vec![("a", 1), ("b", 2), ("c", 3)]);
    }

    #[test]
    fn visited_references_outlive_the_callback() {
        let v = names();
        assert_eq!(first_visited(&Native, &v), Some((0, &v[0])));
        let sparse = vec![None, Some(7u32)];
        assert_eq!(first_visited(&Sparse, &sparse), Some((1, &7)));

        let map: BTreeMap<String, i32> = [("k".to_owned(), 1)].into_iter().collect();
        let mut entries: Vec<(&String, &i32)> = Vec::new();
        items(&Native, &map, |k, v| entries.push((k, v)));
        let key = "k".to_owned();
        assert_eq!(entries, vec![(&key, &1)]);
    }

    #[test]
    fn sequence_equality() {
        let a = vec![1, 2, 3];
        let b = vec![1, 2, 3];
        let c = vec![1, 2];
        let d = vec![1, 2, 4];
        assert!(equal(&Native, &a, &b, |x, y| x == y));
        assert!(!equal(&Native, &a, &c, |x, y| x == y));
        assert!(!equal(&Native, &a, &d, |x, y| x == y));
        let empty: Vec<i32> = Vec::new();
        assert!(equal(&Native, &empty, &Vec::new(), |x, y| x == y));
    }

    #[test]
    fn mapping_equality() {
        let a: HashMap<&str, i32> = [("x", 1), ("y", 2)].into_iter().collect();
        let b: HashMap<&str, i32> = [("y", 2), ("x", 1)].into_iter().collect();
        let c: HashMap<&str, i32> = [("x", 1), ("y", 3)].into_iter().collect();
        let d: HashMap<&str, i32> = [("x", 1), ("z", 2)].into_iter().collect();
        assert!(map_equal(&Native, &a, &b, |l, r| l == r));
        assert!(!map_equal(&Native, &a, &c, |l, r| l == r));
        assert!(!map_equal(&Native, &a, &d, |l, r| l == r));
    }

    #[test]
    fn slice_materializes_visit_order() {
        let v = names();
        let tail = slice(&Native, &v, &SliceSpec::full().with_start(-2)).unwrap();
        assert_eq!(tail, vec!["ken", "barbara"]);

        let reversed = slice(&Native, &v, &SliceSpec::full().with_step(-2)).unwrap();
        assert_eq!(reversed, vec!["barbara", "linus", "ada"]);

        let clamped = slice(&Native, &v, &SliceSpec::new(Some(-100), Some(3), Some(1))).unwrap();
        assert_eq!(clamped, vec!["ada", "grace", "linus"]);
    }

    #[test]
    fn slice_over_empty_slot_is_index_error() {
        clear_error();
        let v = vec![Some(1), None, Some(3), None, Some(5)];
        let evens = slice(&Sparse, &v, &SliceSpec::full().with_step(2)).unwrap();
        assert_eq!(evens, vec![&1, &3, &5]);

        let err = slice(&Sparse, &v, &SliceSpec::full()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Index);
        assert!(err.message().contains("index 1"));
        clear_error();
    }

    #[test]
    fn slice_zero_step_is_value_error() {
        clear_error();
        let v = names();
        let err = slice(&Native, &v, &SliceSpec::full().with_step(0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Value);
        clear_error();
    }

    #[test]
    fn repr_forms() {
        let v = vec![1, 2, 3];
        assert_eq!(repr(&Native, &v, ToString::to_string), "[1, 2, 3]");
        let empty: Vec<i32> = Vec::new();
        assert_eq!(repr(&Native, &empty, ToString::to_string), "[]");

        let map: BTreeMap<&str, i32> = [("a", 1), ("b", 2)].into_iter().collect();
        assert_eq!(
            map_repr(&Native, &map, |k| format!("'{k}'"), ToString::to_string),
            "{'a': 1, 'b': 2}"
        );
    }

    #[test]
    fn works_through_trait_objects() {
        let v = names();
        let table: &dyn SequenceCaps<Vec<String>, Elem = String> = &Native;
        assert_eq!(safe_at(table, &v, -2).unwrap(), "ken");
        assert_eq!(len(table, &v), 5);
    }
}
