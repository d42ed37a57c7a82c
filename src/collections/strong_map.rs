//! Insertion-ordered map and set keyed by tuples of strong arguments.
//!
//! Each entry retains its key arguments, so a tuple stays reachable and
//! enumerable for as long as it is in the collection, whatever else happens
//! to the objects in it.
//!
//! ## Architecture
//!
//! ```text
//!   keys ──► TupleHasher ──► TupleKey "0,3"
//!                                 │
//!   root: IndexMap<TupleKey, StrongEntry<V>>
//!     "0,3" ─► { keys: [objA, "x"], value }
//!     "1,3" ─► { keys: [objB, "x"], value }
//! ```
//!
//! ## Example Usage
//!
//! ```
//! use compositekit::collections::StrongSet;
//! use compositekit::key::Key;
//! use compositekit::shape::KeyShape;
//!
//! let mut set = StrongSet::new(KeyShape::strong(&["from", "to"]).unwrap()).unwrap();
//! set.add(&[Key::from("a"), Key::from("b")]).unwrap();
//! set.add(&[Key::from("b"), Key::from("a")]).unwrap();
//!
//! assert!(set.has(&[Key::from("a"), Key::from("b")]));
//! assert_eq!(set.len(), 2);
//!
//! let first: Vec<&[Key]> = set.iter().collect();
//! assert_eq!(first[0], &[Key::from("a"), Key::from("b")][..]);
//! ```

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;

use crate::collections::{check_value, release_keys, ValueValidator};
use crate::ds::tuple_hasher::{TupleHasher, TupleKey};
use crate::error::{CompositeError, ConfigError};
use crate::key::Key;
use crate::shape::KeyShape;
use crate::traits::{CompositeMap, CompositeSet, KeyedCollection};

#[derive(Debug)]
struct StrongEntry<V> {
    keys: Box<[Key]>,
    value: V,
}

/// Map from a tuple of strongly held keys to a value.
pub struct StrongMap<V> {
    shape: KeyShape,
    hasher: TupleHasher,
    root: IndexMap<TupleKey, StrongEntry<V>, FxBuildHasher>,
    value_validator: Option<ValueValidator<V>>,
}

impl<V> StrongMap<V> {
    /// Creates an empty map. Every slot of `shape` must be strong.
    pub fn new(shape: KeyShape) -> Result<Self, ConfigError> {
        shape.require_strong_only("StrongMap")?;
        Ok(Self {
            hasher: shape.hasher(),
            shape,
            root: IndexMap::default(),
            value_validator: None,
        })
    }

    /// Rejects values for which `f` returns `false`.
    pub fn with_value_validator(mut self, f: impl Fn(&V) -> bool + 'static) -> Self {
        self.value_validator = Some(Rc::new(f));
        self
    }

    /// Applies `set` to each `(keys, value)` pair; the first invalid pair
    /// aborts with its error.
    pub fn with_entries<I>(mut self, entries: I) -> Result<Self, CompositeError>
    where
        I: IntoIterator<Item = (Vec<Key>, V)>,
    {
        for (keys, value) in entries {
            self.set(&keys, value)?;
        }
        Ok(self)
    }

    pub fn shape(&self) -> &KeyShape {
        &self.shape
    }

    pub fn set(&mut self, keys: &[Key], value: V) -> Result<Option<V>, CompositeError> {
        self.shape.validate(keys)?;
        check_value(self.value_validator.as_ref(), &value)?;

        let tuple = self.hasher.build_key(keys);
        match self.root.get_mut(&tuple) {
            Some(entry) => Ok(Some(std::mem::replace(&mut entry.value, value))),
            None => {
                self.root.insert(
                    tuple,
                    StrongEntry {
                        keys: keys.into(),
                        value,
                    },
                );
                Ok(None)
            },
        }
    }

    fn tuple(&self, keys: &[Key]) -> Option<TupleKey> {
        if keys.len() != self.shape.arity() {
            return None;
        }
        self.hasher.build_key_if_present(keys)
    }

    pub fn get(&self, keys: &[Key]) -> Option<&V> {
        let tuple = self.tuple(keys)?;
        self.root.get(&tuple).map(|entry| &entry.value)
    }

    pub fn get_mut(&mut self, keys: &[Key]) -> Option<&mut V> {
        let tuple = self.tuple(keys)?;
        self.root.get_mut(&tuple).map(|entry| &mut entry.value)
    }

    pub fn has(&self, keys: &[Key]) -> bool {
        self.tuple(keys)
            .is_some_and(|tuple| self.root.contains_key(&tuple))
    }

    /// Removes the tuple and returns its value.
    ///
    /// Preserves the insertion order of the remaining entries, at O(n) cost.
    pub fn remove(&mut self, keys: &[Key]) -> Option<V> {
        let tuple = self.tuple(keys)?;
        let StrongEntry { keys, value } = self.root.shift_remove(&tuple)?;
        release_keys(&mut self.hasher, keys);
        Some(value)
    }

    pub fn delete(&mut self, keys: &[Key]) -> bool {
        self.remove(keys).is_some()
    }

    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn clear(&mut self) {
        self.root.clear();
        self.hasher = self.shape.hasher();
    }

    pub fn is_valid_key(&self, keys: &[Key]) -> bool {
        self.shape.is_valid(keys)
    }

    pub fn is_valid_value(&self, value: &V) -> bool {
        check_value(self.value_validator.as_ref(), value).is_ok()
    }

    /// Key tuples in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &[Key]> {
        self.root.values().map(|entry| &*entry.keys)
    }

    /// Values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.root.values().map(|entry| &entry.value)
    }

    /// `(keys, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&[Key], &V)> {
        self.root
            .values()
            .map(|entry| (&*entry.keys, &entry.value))
    }

    pub fn for_each(&self, mut f: impl FnMut(&[Key], &V)) {
        for (keys, value) in self.iter() {
            f(keys, value);
        }
    }

    /// The hasher backing tuple keys.
    pub fn hasher(&self) -> &TupleHasher {
        &self.hasher
    }
}

impl<V: fmt::Debug> fmt::Debug for StrongMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<V> KeyedCollection for StrongMap<V> {
    fn shape(&self) -> &KeyShape {
        &self.shape
    }

    fn has(&self, keys: &[Key]) -> bool {
        StrongMap::has(self, keys)
    }

    fn delete(&mut self, keys: &[Key]) -> bool {
        StrongMap::delete(self, keys)
    }

    fn len(&self) -> usize {
        self.root.len()
    }

    fn clear(&mut self) {
        StrongMap::clear(self)
    }
}

impl<V> CompositeMap<V> for StrongMap<V> {
    fn set(&mut self, keys: &[Key], value: V) -> Result<Option<V>, CompositeError> {
        StrongMap::set(self, keys, value)
    }

    fn get(&self, keys: &[Key]) -> Option<&V> {
        StrongMap::get(self, keys)
    }

    fn is_valid_value(&self, value: &V) -> bool {
        StrongMap::is_valid_value(self, value)
    }
}

// ---------------------------------------------------------------------------
// StrongSet
// ---------------------------------------------------------------------------

/// Set of tuples of strongly held keys.
pub struct StrongSet {
    map: StrongMap<()>,
}

impl StrongSet {
    /// Creates an empty set. Every slot of `shape` must be strong.
    pub fn new(shape: KeyShape) -> Result<Self, ConfigError> {
        StrongMap::new(shape).map(|map| Self { map })
    }

    /// Adds each tuple; the first invalid tuple aborts with its error.
    pub fn with_entries<I>(mut self, entries: I) -> Result<Self, CompositeError>
    where
        I: IntoIterator<Item = Vec<Key>>,
    {
        for keys in entries {
            self.add(&keys)?;
        }
        Ok(self)
    }

    pub fn shape(&self) -> &KeyShape {
        self.map.shape()
    }

    pub fn add(&mut self, keys: &[Key]) -> Result<bool, CompositeError> {
        Ok(self.map.set(keys, ())?.is_none())
    }

    pub fn has(&self, keys: &[Key]) -> bool {
        self.map.has(keys)
    }

    pub fn delete(&mut self, keys: &[Key]) -> bool {
        self.map.delete(keys)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear()
    }

    pub fn is_valid_key(&self, keys: &[Key]) -> bool {
        self.map.is_valid_key(keys)
    }

    /// Tuples in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &[Key]> {
        self.map.keys()
    }

    pub fn for_each(&self, mut f: impl FnMut(&[Key])) {
        for keys in self.iter() {
            f(keys);
        }
    }
}

impl fmt::Debug for StrongSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl KeyedCollection for StrongSet {
    fn shape(&self) -> &KeyShape {
        self.map.shape()
    }

    fn has(&self, keys: &[Key]) -> bool {
        StrongSet::has(self, keys)
    }

    fn delete(&mut self, keys: &[Key]) -> bool {
        StrongSet::delete(self, keys)
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn clear(&mut self) {
        StrongSet::clear(self)
    }
}

impl CompositeSet for StrongSet {
    fn add(&mut self, keys: &[Key]) -> Result<bool, CompositeError> {
        StrongSet::add(self, keys)
    }
}
