//! Reference-counted multiset registry.
//!
//! A [`Registry`] maps each key to one value plus a reference count.
//! Two registration modes share the same storage:
//!
//! - [`Registry::add_strict`] refuses a key that is already present.
//!   The system state's top-level chdesc table uses it.
//! - [`Registry::add`] increments the count of an existing key, keeping
//!   the first value. Dependency collections use it, because the traced
//!   component may add the same edge more than once.
//!
//! [`Registry::remove`] decrements and only detaches the entry when the
//! count reaches zero. Iteration yields each value once per live
//! reference, in first-insertion order.

use std::hash::Hash;
use std::iter;

use indexmap::IndexMap;

/// A key was already present in a strict registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("key already registered")]
pub struct DuplicateKey;

#[derive(Clone, Debug, PartialEq, Eq)]
struct Entry<V> {
    value: V,
    count: usize,
}

/// Map from key to `(value, reference count)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registry<K: Hash + Eq, V> {
    entries: IndexMap<K, Entry<V>>,
    total: usize,
}

impl<K: Hash + Eq, V> Default for Registry<K, V> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
            total: 0,
        }
    }
}

impl<K: Hash + Eq, V> Registry<K, V> {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key` once, failing if it is already present.
    pub fn add_strict(&mut self, key: K, value: V) -> Result<(), DuplicateKey> {
        if self.entries.contains_key(&key) {
            return Err(DuplicateKey);
        }
        self.entries.insert(key, Entry { value, count: 1 });
        self.total += 1;
        Ok(())
    }

    /// Add a reference to `key`, returning the new count.
    ///
    /// On first add `value` is stored; later adds keep the stored value
    /// and drop the new one.
    pub fn add(&mut self, key: K, value: V) -> usize {
        self.total += 1;
        let entry = self.entries.entry(key).or_insert(Entry { value, count: 0 });
        entry.count += 1;
        entry.count
    }

    /// Drop one reference to `key`.
    ///
    /// Returns the remaining count, or `None` if the key was absent.
    /// At zero the entry is detached.
    pub fn remove(&mut self, key: &K) -> Option<usize> {
        let entry = self.entries.get_mut(key)?;
        entry.count -= 1;
        self.total -= 1;
        let remaining = entry.count;
        if remaining == 0 {
            self.entries.shift_remove(key);
        }
        Some(remaining)
    }

    /// Detach `key` regardless of its count, returning its value.
    pub fn remove_all(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.shift_remove(key)?;
        self.total -= entry.count;
        Some(entry.value)
    }

    /// The value stored for `key`.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|e| &e.value)
    }

    /// Mutable access to the value stored for `key`.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.entries.get_mut(key).map(|e| &mut e.value)
    }

    /// Whether `key` has at least one reference.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Live references to `key`; zero when absent.
    pub fn count(&self, key: &K) -> usize {
        self.entries.get(key).map_or(0, |e| e.count)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no key is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all reference counts.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Each entry once, with its count.
    pub fn entries(&self) -> impl Iterator<Item = (&K, &V, usize)> + '_ {
        self.entries.iter().map(|(k, e)| (k, &e.value, e.count))
    }

    /// Each entry repeated once per live reference.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.entries
            .iter()
            .flat_map(|(k, e)| iter::repeat((k, &e.value)).take(e.count))
    }

    /// Each value repeated once per live reference.
    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    /// Each distinct key once.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.entries.keys()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.total = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strict_rejects_duplicates() {
        let mut reg = Registry::new();
        assert_eq!(reg.add_strict(1u32, "a"), Ok(()));
        assert_eq!(reg.add_strict(1u32, "b"), Err(DuplicateKey));
        assert_eq!(reg.get(&1), Some(&"a"));
        assert_eq!(reg.count(&1), 1);
    }

    #[test]
    fn counted_add_keeps_first_value() {
        let mut reg = Registry::new();
        assert_eq!(reg.add(7u32, 'x'), 1);
        assert_eq!(reg.add(7u32, 'y'), 2);
        assert_eq!(reg.get(&7), Some(&'x'));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.total(), 2);
    }

    #[test]
    fn remove_detaches_at_zero() {
        let mut reg = Registry::new();
        reg.add(3u32, ());
        reg.add(3u32, ());
        assert_eq!(reg.remove(&3), Some(1));
        assert!(reg.contains(&3));
        assert_eq!(reg.remove(&3), Some(0));
        assert!(!reg.contains(&3));
        assert_eq!(reg.remove(&3), None);
        assert!(reg.is_empty());
        assert_eq!(reg.total(), 0);
    }

    #[test]
    fn iteration_repeats_per_reference() {
        let mut reg = Registry::new();
        reg.add(1u32, "one");
        reg.add(2u32, "two");
        reg.add(1u32, "one");
        let seen: Vec<_> = reg.values().copied().collect();
        assert_eq!(seen, vec!["one", "one", "two"]);
    }

    #[test]
    fn remove_all_ignores_count() {
        let mut reg = Registry::new();
        reg.add(9u32, 'z');
        reg.add(9u32, 'z');
        reg.add(4u32, 'w');
        assert_eq!(reg.remove_all(&9), Some('z'));
        assert_eq!(reg.total(), 1);
        assert_eq!(reg.keys().copied().collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn removal_keeps_insertion_order() {
        let mut reg = Registry::new();
        for k in [5u32, 1, 8, 3] {
            reg.add(k, ());
        }
        reg.remove(&1);
        assert_eq!(reg.keys().copied().collect::<Vec<_>>(), vec![5, 8, 3]);
    }

    proptest! {
        #[test]
        fn adds_minus_removes(adds in 1usize..20, removes in 0usize..25) {
            let mut reg = Registry::new();
            for _ in 0..adds {
                reg.add(42u32, ());
            }
            for _ in 0..removes {
                reg.remove(&42);
            }
            let expected = adds.saturating_sub(removes);
            prop_assert_eq!(reg.count(&42), expected);
            prop_assert_eq!(reg.contains(&42), expected > 0);
            prop_assert_eq!(reg.iter().count(), expected);
            prop_assert_eq!(reg.total(), expected);
        }

        #[test]
        fn total_matches_iteration(ops in prop::collection::vec((0u32..6, any::<bool>()), 0..60)) {
            let mut reg = Registry::new();
            for (key, add) in ops {
                if add {
                    reg.add(key, key);
                } else {
                    reg.remove(&key);
                }
            }
            prop_assert_eq!(reg.iter().count(), reg.total());
            prop_assert!(reg.entries().all(|(_, _, c)| c > 0));
        }
    }
}
