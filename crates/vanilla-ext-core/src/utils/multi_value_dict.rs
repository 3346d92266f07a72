//! A dictionary that can hold multiple values per key.
//!
//! Submitted form data and uploaded files both allow a key to repeat
//! (`tag=a&tag=b`, several files under one input). [`MultiValueDict`] keeps
//! every value in submission order while [`get`](MultiValueDict::get)
//! returns the last one.

use std::borrow::Borrow;
use std::collections::hash_map;
use std::collections::HashMap;
use std::hash::Hash;

/// A dictionary that maps keys to lists of values.
///
/// Lookups accept any borrowed form of the key, so a `MultiValueDict<String, _>`
/// is queried with plain `&str`.
///
/// # Examples
///
/// ```
/// use vanilla_ext_core::utils::MultiValueDict;
///
/// let mut d = MultiValueDict::new();
/// d.append("tag".to_string(), "red");
/// d.append("tag".to_string(), "blue");
///
/// assert_eq!(d.get("tag"), Some(&"blue"));
/// assert_eq!(d.get_list("tag"), Some(&["red", "blue"][..]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiValueDict<K: Eq + Hash, V> {
    inner: HashMap<K, Vec<V>>,
}

impl<K: Eq + Hash, V> Default for MultiValueDict<K, V> {
    fn default() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V> MultiValueDict<K, V> {
    /// Creates an empty `MultiValueDict`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last value submitted for the key.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.get(key).and_then(|values| values.last())
    }

    /// Returns every value for the key, in submission order.
    pub fn get_list<Q>(&self, key: &Q) -> Option<&[V]>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.get(key).map(Vec::as_slice)
    }

    /// Replaces every value for the key with `value`.
    pub fn set(&mut self, key: K, value: V) {
        self.inner.insert(key, vec![value]);
    }

    /// Adds `value` after any existing values for the key.
    pub fn append(&mut self, key: K, value: V) {
        self.inner.entry(key).or_default().push(value);
    }

    /// Returns `true` if the key has at least one value.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.contains_key(key)
    }

    pub fn keys(&self) -> hash_map::Keys<'_, K, Vec<V>> {
        self.inner.keys()
    }

    /// Iterates over `(key, values)` pairs in arbitrary order.
    pub fn iter(&self) -> hash_map::Iter<'_, K, Vec<V>> {
        self.inner.iter()
    }

    /// Returns the number of distinct keys.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<K: Eq + Hash, V> FromIterator<(K, V)> for MultiValueDict<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dict = Self::new();
        for (k, v) in iter {
            dict.append(k, v);
        }
        dict
    }
}
