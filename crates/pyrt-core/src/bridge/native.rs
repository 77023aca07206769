//! Capability tables for the standard collections.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::{BuildHasher, Hash};

use super::caps::{MapCaps, MembershipCaps, SequenceCaps, SizeCaps};

/// Zero-sized capability table for `Vec`, slices, `VecDeque`, the hash and
/// B-tree maps, and the hash and B-tree sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Native;

impl<T> SizeCaps<Vec<T>> for Native {
    fn type_name(&self) -> &str {
        "list"
    }

    fn size(&self, container: &Vec<T>) -> usize {
        container.len()
    }
}

impl<T> SequenceCaps<Vec<T>> for Native {
    type Elem = T;

    fn at<'a>(&self, container: &'a Vec<T>, index: usize) -> Option<&'a T> {
        container.get(index)
    }
}

impl<T> SizeCaps<[T]> for Native {
    fn type_name(&self) -> &str {
        "list"
    }

    fn size(&self, container: &[T]) -> usize {
        container.len()
    }
}

impl<T> SequenceCaps<[T]> for Native {
    type Elem = T;

    fn at<'a>(&self, container: &'a [T], index: usize) -> Option<&'a T> {
        container.get(index)
    }
}

impl<T> SizeCaps<VecDeque<T>> for Native {
    fn type_name(&self) -> &str {
        "deque"
    }

    fn size(&self, container: &VecDeque<T>) -> usize {
        container.len()
    }
}

impl<T> SequenceCaps<VecDeque<T>> for Native {
    type Elem = T;

    fn at<'a>(&self, container: &'a VecDeque<T>, index: usize) -> Option<&'a T> {
        container.get(index)
    }
}

impl<K, V, S> SizeCaps<HashMap<K, V, S>> for Native {
    fn type_name(&self) -> &str {
        "dict"
    }

    fn size(&self, container: &HashMap<K, V, S>) -> usize {
        container.len()
    }
}

impl<K, V, S> MapCaps<HashMap<K, V, S>> for Native
where
    K: Hash + Eq + Debug,
    S: BuildHasher,
{
    type Key = K;
    type Value = V;

    fn contains(&self, container: &HashMap<K, V, S>, key: &K) -> bool {
        container.contains_key(key)
    }

    fn get<'a>(&self, container: &'a HashMap<K, V, S>, key: &K) -> Option<&'a V> {
        container.get(key)
    }

    fn for_each_item<'a>(
        &self,
        container: &'a HashMap<K, V, S>,
        visit: &mut dyn FnMut(&'a K, &'a V),
    ) {
        for (key, value) in container {
            visit(key, value);
        }
    }

    fn describe_key(&self, key: &K) -> String {
        format!("{key:?}")
    }
}

impl<K, V, S> MembershipCaps<HashMap<K, V, S>> for Native
where
    K: Hash + Eq,
    S: BuildHasher,
{
    type Needle = K;

    fn contains(&self, container: &HashMap<K, V, S>, needle: &K) -> bool {
        container.contains_key(needle)
    }
}

impl<K, V> SizeCaps<BTreeMap<K, V>> for Native {
    fn type_name(&self) -> &str {
        "dict"
    }

    fn size(&self, container: &BTreeMap<K, V>) -> usize {
        container.len()
    }
}

impl<K: Ord + Debug, V> MapCaps<BTreeMap<K, V>> for Native {
    type Key = K;
    type Value = V;

    fn contains(&self, container: &BTreeMap<K, V>, key: &K) -> bool {
        container.contains_key(key)
    }

    fn get<'a>(&self, container: &'a BTreeMap<K, V>, key: &K) -> Option<&'a V> {
        container.get(key)
    }

    fn for_each_item<'a>(
        &self,
        container: &'a BTreeMap<K, V>,
        visit: &mut dyn FnMut(&'a K, &'a V),
    ) {
        for (key, value) in container {
            visit(key, value);
        }
    }

    fn describe_key(&self, key: &K) -> String {
        format!("{key:?}")
    }
}

impl<K: Ord, V> MembershipCaps<BTreeMap<K, V>> for Native {
    type Needle = K;

    fn contains(&self, container: &BTreeMap<K, V>, needle: &K) -> bool {
        container.contains_key(needle)
    }
}

impl<T, S> SizeCaps<HashSet<T, S>> for Native {
    fn type_name(&self) -> &str {
        "set"
    }

    fn size(&self, container: &HashSet<T, S>) -> usize {
        container.len()
    }
}

impl<T: Hash + Eq, S: BuildHasher> MembershipCaps<HashSet<T, S>> for Native {
    type Needle = T;

    fn contains(&self, container: &HashSet<T, S>, needle: &T) -> bool {
        container.contains(needle)
    }
}

impl<T> SizeCaps<BTreeSet<T>> for Native {
    fn type_name(&self) -> &str {
        "set"
    }

    fn size(&self, container: &BTreeSet<T>) -> usize {
        container.len()
    }
}

impl<T: Ord> MembershipCaps<BTreeSet<T>> for Native {
    type Needle = T;

    fn contains(&self, container: &BTreeSet<T>, needle: &T) -> bool {
        container.contains(needle)
    }
}
