//! Two-level collections: an outer key tuple owning an inner map or set.
//!
//! A `TwoLevelCollection` splits each full key tuple into an *outer* part and
//! an *inner* part. The outer part selects an inner collection (created on
//! the first insert under that outer key); the inner part selects an entry
//! within it. Set-typed variants use `V = ()`.
//!
//! ## Architecture
//!
//! ```text
//!   outer keys ──► OuterIndex::compose ──► O::RootKey ─────────┐
//!     StrongOuter: TupleHasher   → TupleKey                    │
//!     WeakOuter:   CompositeWeakKeyCache → CompositeKey        │
//!                                                              ▼
//!   root: IndexMap<O::RootKey, OuterEntry<V>>
//!     okey#1 ─► { keys: retained outer keys (strong only),
//!                 inner: IndexMap<TupleKey, InnerEntry<V>> }
//!                    "0" ─► { keys: ["x"], value }
//!                    "1" ─► { keys: ["y"], value }
//!
//!   size     = Σ inner.len()   (kept incrementally)
//!   map_size = root.len()
//! ```
//!
//! ## Lifecycle Rules
//!
//! | Operation          | Inner drained to zero  | Outer entry            |
//! |--------------------|------------------------|------------------------|
//! | `delete`           | outer entry removed    | released in same call  |
//! | `clear_sets`       | kept, now empty        | stays indexed          |
//! | `delete_sets`      | discarded              | released               |
//! | weak arg reclaimed | discarded on `purge`   | record already evicted |
//!
//! ## Example Usage
//!
//! ```
//! use compositekit::collections::StrongMapOfStrongSets;
//! use compositekit::key::Key;
//! use compositekit::shape::KeyShape;
//!
//! let mut tags = StrongMapOfStrongSets::new(
//!     KeyShape::strong(&["repo"]).unwrap(),
//!     KeyShape::strong(&["tag"]).unwrap(),
//! )
//! .unwrap();
//!
//! let repo = [Key::from("core")];
//! tags.add(&repo, &[Key::from("x")]).unwrap();
//! tags.add(&repo, &[Key::from("y")]).unwrap();
//! tags.delete(&repo, &[Key::from("x")]);
//! assert_eq!(tags.get_size_of_set(&repo), 1);
//!
//! tags.delete(&repo, &[Key::from("y")]);
//! assert!(!tags.has_sets(&repo));
//! ```

use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use tracing::debug;

use crate::collections::{check_value, release_keys, ValueValidator};
use crate::composer::{CompositeKey, CompositeWeakKeyCache};
use crate::ds::tuple_hasher::{TupleHasher, TupleKey};
use crate::error::{CompositeError, ConfigError, InvariantError};
use crate::key::Key;
use crate::shape::KeyShape;

// ---------------------------------------------------------------------------
// Outer index
// ---------------------------------------------------------------------------

/// Maps the outer part of a key tuple to a hashable root key.
pub trait OuterIndex {
    type RootKey: Clone + Eq + Hash + fmt::Debug;

    fn shape(&self) -> &KeyShape;

    /// Returns the root key for `keys`, allocating as needed.
    fn compose(&mut self, keys: &[Key]) -> Result<Self::RootKey, CompositeError>;

    /// Returns the root key for `keys` without allocating.
    fn peek(&self, keys: &[Key]) -> Option<Self::RootKey>;

    /// The outer keys a new root entry should retain, if any.
    fn retain(&self, keys: &[Key]) -> Option<Box<[Key]>>;

    /// Called after the root entry for `key` is removed.
    fn release(&mut self, key: &Self::RootKey, retained: Option<Box<[Key]>>);

    /// Root keys whose entries must be dropped because an outer argument was
    /// reclaimed.
    fn purge(&mut self) -> Vec<Self::RootKey>;

    fn clear(&mut self);

    fn check_invariants(&self) -> Result<(), InvariantError> {
        Ok(())
    }
}

/// Outer level holding every outer argument strongly.
#[derive(Debug)]
pub struct StrongOuter {
    shape: KeyShape,
    hasher: TupleHasher,
}

impl StrongOuter {
    pub fn new(shape: KeyShape) -> Result<Self, ConfigError> {
        shape.require_strong_only("strong outer level")?;
        Ok(Self {
            hasher: shape.hasher(),
            shape,
        })
    }
}

impl OuterIndex for StrongOuter {
    type RootKey = TupleKey;

    fn shape(&self) -> &KeyShape {
        &self.shape
    }

    fn compose(&mut self, keys: &[Key]) -> Result<TupleKey, CompositeError> {
        self.shape.validate(keys)?;
        Ok(self.hasher.build_key(keys))
    }

    fn peek(&self, keys: &[Key]) -> Option<TupleKey> {
        if keys.len() != self.shape.arity() {
            return None;
        }
        self.hasher.build_key_if_present(keys)
    }

    fn retain(&self, keys: &[Key]) -> Option<Box<[Key]>> {
        Some(keys.into())
    }

    fn release(&mut self, _key: &TupleKey, retained: Option<Box<[Key]>>) {
        if let Some(keys) = retained {
            release_keys(&mut self.hasher, keys);
        }
    }

    fn purge(&mut self) -> Vec<TupleKey> {
        Vec::new()
    }

    fn clear(&mut self) {
        self.hasher = self.shape.hasher();
    }
}

/// Outer level with at least one weakly held argument.
#[derive(Debug)]
pub struct WeakOuter {
    cache: CompositeWeakKeyCache,
}

impl WeakOuter {
    pub fn new(shape: KeyShape) -> Result<Self, ConfigError> {
        Ok(Self {
            cache: CompositeWeakKeyCache::new(shape)?,
        })
    }

    pub fn cache(&self) -> &CompositeWeakKeyCache {
        &self.cache
    }
}

impl OuterIndex for WeakOuter {
    type RootKey = CompositeKey;

    fn shape(&self) -> &KeyShape {
        self.cache.shape()
    }

    fn compose(&mut self, keys: &[Key]) -> Result<CompositeKey, CompositeError> {
        self.cache.compose(keys)
    }

    fn peek(&self, keys: &[Key]) -> Option<CompositeKey> {
        self.cache.peek(keys)
    }

    fn retain(&self, _keys: &[Key]) -> Option<Box<[Key]>> {
        None
    }

    fn release(&mut self, key: &CompositeKey, _retained: Option<Box<[Key]>>) {
        self.cache.remove_key(key);
    }

    fn purge(&mut self) -> Vec<CompositeKey> {
        self.cache.purge()
    }

    fn clear(&mut self) {
        self.cache.clear();
    }

    fn check_invariants(&self) -> Result<(), InvariantError> {
        self.cache.check_invariants()
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct InnerEntry<V> {
    keys: Box<[Key]>,
    value: V,
}

type InnerMap<V> = IndexMap<TupleKey, InnerEntry<V>, FxBuildHasher>;

#[derive(Debug)]
struct OuterEntry<V> {
    keys: Option<Box<[Key]>>,
    inner: InnerMap<V>,
}

// ---------------------------------------------------------------------------
// TwoLevelCollection
// ---------------------------------------------------------------------------

/// Outer key tuple → inner map (or set, with `V = ()`) of inner key tuples.
pub struct TwoLevelCollection<O: OuterIndex, V = ()> {
    outer: O,
    inner_shape: KeyShape,
    inner_hasher: TupleHasher,
    root: IndexMap<O::RootKey, OuterEntry<V>, FxBuildHasher>,
    size: usize,
    value_validator: Option<ValueValidator<V>>,
}

/// Strong outer tuple → set of strong inner tuples.
pub type StrongMapOfStrongSets = TwoLevelCollection<StrongOuter, ()>;
/// Weak outer tuple → set of strong inner tuples.
pub type WeakMapOfStrongSets = TwoLevelCollection<WeakOuter, ()>;
/// Strong outer tuple → map of strong inner tuples to values.
pub type StrongMapOfStrongMaps<V> = TwoLevelCollection<StrongOuter, V>;
/// Weak outer tuple → map of strong inner tuples to values.
pub type WeakMapOfStrongMaps<V> = TwoLevelCollection<WeakOuter, V>;

impl<V> TwoLevelCollection<StrongOuter, V> {
    /// Creates an empty collection. Both shapes must be strong-only.
    pub fn new(outer_shape: KeyShape, inner_shape: KeyShape) -> Result<Self, ConfigError> {
        Self::with_outer(StrongOuter::new(outer_shape)?, inner_shape)
    }
}

impl<V> TwoLevelCollection<WeakOuter, V> {
    /// Creates an empty collection. `outer_shape` must declare at least one
    /// weak slot; `inner_shape` must be strong-only.
    pub fn new(outer_shape: KeyShape, inner_shape: KeyShape) -> Result<Self, ConfigError> {
        Self::with_outer(WeakOuter::new(outer_shape)?, inner_shape)
    }

    /// The cache minting this collection's outer keys.
    pub fn cache(&self) -> &CompositeWeakKeyCache {
        self.outer.cache()
    }
}

impl<O: OuterIndex, V> TwoLevelCollection<O, V> {
    /// Creates an empty collection over an existing outer index.
    pub fn with_outer(outer: O, inner_shape: KeyShape) -> Result<Self, ConfigError> {
        inner_shape.require_strong_only("inner level")?;
        Ok(Self {
            outer,
            inner_hasher: inner_shape.hasher(),
            inner_shape,
            root: IndexMap::default(),
            size: 0,
            value_validator: None,
        })
    }

    /// Rejects values for which `f` returns `false`.
    pub fn with_value_validator(mut self, f: impl Fn(&V) -> bool + 'static) -> Self {
        self.value_validator = Some(Rc::new(f));
        self
    }

    /// Applies `insert` to each `(outer, inner, value)` triple; the first
    /// invalid triple aborts with its error.
    pub fn with_entries<I>(mut self, entries: I) -> Result<Self, CompositeError>
    where
        I: IntoIterator<Item = (Vec<Key>, Vec<Key>, V)>,
    {
        for (outer, inner, value) in entries {
            self.insert(&outer, &inner, value)?;
        }
        Ok(self)
    }

    pub fn outer_shape(&self) -> &KeyShape {
        self.outer.shape()
    }

    pub fn inner_shape(&self) -> &KeyShape {
        &self.inner_shape
    }

    fn validate(&self, outer: &[Key], inner: &[Key]) -> Result<(), CompositeError> {
        self.outer.shape().validate(outer)?;
        self.inner_shape.validate(inner)?;
        Ok(())
    }

    fn inner_tuple(&self, inner: &[Key]) -> Option<TupleKey> {
        if inner.len() != self.inner_shape.arity() {
            return None;
        }
        self.inner_hasher.build_key_if_present(inner)
    }

    fn entry(&self, outer: &[Key]) -> Option<&OuterEntry<V>> {
        let key = self.outer.peek(outer)?;
        self.root.get(&key)
    }

    /// Inserts `value` under `(outer, inner)`.
    ///
    /// Returns `false` without touching the stored value if the inner key is
    /// already present.
    pub fn insert(&mut self, outer: &[Key], inner: &[Key], value: V) -> Result<bool, CompositeError> {
        self.validate(outer, inner)?;
        check_value(self.value_validator.as_ref(), &value)?;
        self.purge();

        let key = self.outer.compose(outer)?;
        let tuple = self.inner_hasher.build_key(inner);
        let retained = &self.outer;
        let entry = self.root.entry(key).or_insert_with(|| OuterEntry {
            keys: retained.retain(outer),
            inner: InnerMap::default(),
        });
        if entry.inner.contains_key(&tuple) {
            return Ok(false);
        }
        entry.inner.insert(
            tuple,
            InnerEntry {
                keys: inner.into(),
                value,
            },
        );
        self.size += 1;
        Ok(true)
    }

    /// Removes `(outer, inner)`. An inner collection drained to zero takes
    /// its outer entry with it.
    pub fn delete(&mut self, outer: &[Key], inner: &[Key]) -> bool {
        self.purge();
        let Some(key) = self.outer.peek(outer) else {
            return false;
        };
        let Some(tuple) = self.inner_tuple(inner) else {
            return false;
        };
        let Some(entry) = self.root.get_mut(&key) else {
            return false;
        };
        let Some(removed) = entry.inner.shift_remove(&tuple) else {
            return false;
        };
        self.size -= 1;
        let drained = entry.inner.is_empty();
        release_keys(&mut self.inner_hasher, removed.keys);

        if drained {
            if let Some(entry) = self.root.shift_remove(&key) {
                self.outer.release(&key, entry.keys);
            }
        }
        true
    }

    pub fn has(&self, outer: &[Key], inner: &[Key]) -> bool {
        self.get(outer, inner).is_some()
    }

    pub fn get(&self, outer: &[Key], inner: &[Key]) -> Option<&V> {
        let entry = self.entry(outer)?;
        let tuple = self.inner_tuple(inner)?;
        entry.inner.get(&tuple).map(|e| &e.value)
    }

    /// Number of inner entries under `outer`; 0 if it is not indexed.
    pub fn get_size_of_set(&self, outer: &[Key]) -> usize {
        self.entry(outer).map_or(0, |entry| entry.inner.len())
    }

    /// Returns `true` if `outer` is indexed, even with an empty inner
    /// collection left by [`clear_sets`](Self::clear_sets).
    pub fn has_sets(&self, outer: &[Key]) -> bool {
        self.entry(outer).is_some()
    }

    /// Empties the inner collection of `outer` but keeps the outer entry.
    pub fn clear_sets(&mut self, outer: &[Key]) {
        self.purge();
        let Some(key) = self.outer.peek(outer) else {
            return;
        };
        let Some(entry) = self.root.get_mut(&key) else {
            return;
        };
        self.size -= entry.inner.len();
        for (_, removed) in entry.inner.drain(..) {
            release_keys(&mut self.inner_hasher, removed.keys);
        }
    }

    /// Removes `outer` and its inner collection.
    pub fn delete_sets(&mut self, outer: &[Key]) -> bool {
        self.purge();
        let Some(key) = self.outer.peek(outer) else {
            return false;
        };
        let Some(entry) = self.root.shift_remove(&key) else {
            return false;
        };
        self.discard(entry.inner);
        self.outer.release(&key, entry.keys);
        true
    }

    fn discard(&mut self, inner: InnerMap<V>) {
        self.size -= inner.len();
        for (_, removed) in inner {
            release_keys(&mut self.inner_hasher, removed.keys);
        }
    }

    /// Calls `f` with `outer ++ inner` and the value of each entry under
    /// `outer`, in insertion order. Does nothing if `outer` is not indexed.
    pub fn for_each_set(&self, outer: &[Key], mut f: impl FnMut(&[Key], &V)) {
        let Some(entry) = self.entry(outer) else {
            return;
        };
        let mut buf: Vec<Key> = outer.to_vec();
        for inner in entry.inner.values() {
            buf.truncate(outer.len());
            buf.extend_from_slice(&inner.keys);
            f(&buf, &inner.value);
        }
    }

    /// `(outer ++ inner, value)` for each entry under `outer`.
    pub fn entries_set(&self, outer: &[Key]) -> Vec<(Vec<Key>, &V)> {
        let Some(entry) = self.entry(outer) else {
            return Vec::new();
        };
        entry
            .inner
            .values()
            .map(|inner| {
                let mut keys = outer.to_vec();
                keys.extend_from_slice(&inner.keys);
                (keys, &inner.value)
            })
            .collect()
    }

    /// Total number of inner entries.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of indexed outer keys.
    pub fn map_size(&self) -> usize {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn clear(&mut self) {
        self.root.clear();
        self.size = 0;
        self.outer.clear();
        self.inner_hasher = self.inner_shape.hasher();
    }

    /// Drops outer entries whose weak outer argument was reclaimed.
    ///
    /// Returns the number of outer entries removed. Always 0 for a strong
    /// outer level.
    pub fn purge(&mut self) -> usize {
        let evicted = self.outer.purge();
        let mut removed = 0;
        for key in &evicted {
            if let Some(entry) = self.root.shift_remove(key) {
                self.discard(entry.inner);
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(
                removed,
                remaining = self.root.len(),
                size = self.size,
                "purged reclaimed outer entries"
            );
        }
        removed
    }

    pub fn is_valid_key(&self, outer: &[Key], inner: &[Key]) -> bool {
        self.validate(outer, inner).is_ok()
    }

    pub fn is_valid_value(&self, value: &V) -> bool {
        check_value(self.value_validator.as_ref(), value).is_ok()
    }

    /// Verifies the incremental size against the inner collections.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.outer.check_invariants()?;
        let total: usize = self.root.values().map(|entry| entry.inner.len()).sum();
        if total != self.size {
            return Err(InvariantError::new(format!(
                "size is {} but inner collections hold {}",
                self.size, total
            )));
        }
        Ok(())
    }
}

impl<O: OuterIndex> TwoLevelCollection<O, ()> {
    /// Adds `(outer, inner)`. Returns `false` if already present.
    pub fn add(&mut self, outer: &[Key], inner: &[Key]) -> Result<bool, CompositeError> {
        self.insert(outer, inner, ())
    }

    /// Adds every inner tuple under `outer`.
    ///
    /// All tuples are validated before anything is added, so an invalid
    /// tuple leaves the collection unchanged. Returns the number added.
    pub fn add_sets<T: AsRef<[Key]>>(
        &mut self,
        outer: &[Key],
        tuples: &[T],
    ) -> Result<usize, CompositeError> {
        self.outer.shape().validate(outer)?;
        for inner in tuples {
            self.inner_shape.validate(inner.as_ref())?;
        }
        let mut added = 0;
        for inner in tuples {
            if self.insert(outer, inner.as_ref(), ())? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// `outer ++ inner` for each entry under `outer`.
    pub fn values_set(&self, outer: &[Key]) -> Vec<Vec<Key>> {
        self.entries_set(outer)
            .into_iter()
            .map(|(keys, _)| keys)
            .collect()
    }
}

impl<V> TwoLevelCollection<StrongOuter, V> {
    /// Calls `f` with `outer ++ inner` and the value of every entry, in
    /// insertion order.
    pub fn for_each(&self, mut f: impl FnMut(&[Key], &V)) {
        let mut buf = Vec::new();
        for entry in self.root.values() {
            let outer = entry.keys.as_deref().unwrap_or_default();
            for inner in entry.inner.values() {
                buf.clear();
                buf.extend_from_slice(outer);
                buf.extend_from_slice(&inner.keys);
                f(&buf, &inner.value);
            }
        }
    }

    /// `(outer ++ inner, value)` for every entry.
    pub fn entries(&self) -> Vec<(Vec<Key>, &V)> {
        let mut out = Vec::with_capacity(self.size);
        for entry in self.root.values() {
            let outer = entry.keys.as_deref().unwrap_or_default();
            for inner in entry.inner.values() {
                let mut keys = outer.to_vec();
                keys.extend_from_slice(&inner.keys);
                out.push((keys, &inner.value));
            }
        }
        out
    }
}

impl TwoLevelCollection<StrongOuter, ()> {
    /// `outer ++ inner` for every entry.
    pub fn values(&self) -> Vec<Vec<Key>> {
        self.entries().into_iter().map(|(keys, _)| keys).collect()
    }
}

impl<O: OuterIndex, V> fmt::Debug for TwoLevelCollection<O, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwoLevelCollection")
            .field("map_size", &self.root.len())
            .field("size", &self.size)
            .field("outer_shape", self.outer.shape())
            .field("inner_shape", &self.inner_shape)
            .finish()
    }
}
