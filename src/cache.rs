use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};

/// Request-scoped storage for values that a loader has already resolved.
///
/// Values are only ever handed out by clone, so an entry never aliases a value held by a caller.
pub trait Cache {
    type K;
    type V;

    fn get(&self, key: &Self::K) -> Option<&Self::V>;

    /// Inserts `value` only when `key` has no entry yet. Returns whether it was inserted.
    fn insert_if_absent(&mut self, key: Self::K, value: Self::V) -> bool;

    /// Inserts every pair whose key has no entry yet, leaving existing entries untouched.
    fn fill<I: IntoIterator<Item = (Self::K, Self::V)>>(&mut self, key_vals: I) -> usize {
        key_vals.into_iter().fold(0, |inserted, (key, value)| {
            inserted + usize::from(self.insert_if_absent(key, value))
        })
    }

    fn remove(&mut self, keys: &[Self::K]);
    fn flush(&mut self);
}

impl<K, V, S: BuildHasher> Cache for HashMap<K, V, S>
where
    K: Eq + Hash,
{
    type K = K;
    type V = V;

    fn get(&self, key: &Self::K) -> Option<&Self::V> {
        HashMap::get(self, key)
    }

    fn insert_if_absent(&mut self, key: Self::K, value: Self::V) -> bool {
        match self.entry(key) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    fn remove(&mut self, keys: &[Self::K]) {
        for key in keys.iter() {
            HashMap::remove(self, key);
        }
    }

    fn flush(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_if_absent_keeps_first_value() {
        let mut cache: HashMap<u32, &str> = HashMap::new();
        assert!(Cache::insert_if_absent(&mut cache, 1, "first"));
        assert!(!Cache::insert_if_absent(&mut cache, 1, "second"));
        assert_eq!(Cache::get(&cache, &1), Some(&"first"));

        Cache::remove(&mut cache, &[1]);
        assert_eq!(Cache::get(&cache, &1), None);
    }

    #[test]
    fn fill_never_replaces_an_entry() {
        let mut cache: HashMap<u32, &str> = HashMap::new();
        Cache::insert_if_absent(&mut cache, 1, "primed");

        assert_eq!(Cache::fill(&mut cache, vec![(1, "fetched"), (2, "fetched")]), 1);
        assert_eq!(Cache::get(&cache, &1), Some(&"primed"));
        assert_eq!(Cache::get(&cache, &2), Some(&"fetched"));
    }
}
