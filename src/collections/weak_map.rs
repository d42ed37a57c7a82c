//! Map and set keyed by tuples containing at least one weak argument.
//!
//! Each collection owns a [`CompositeWeakKeyCache`]. An entry is stored
//! under the tuple's [`CompositeKey`], so the collection never holds the
//! tuple's weak arguments. When one of them is reclaimed the entry is
//! dropped by the next mutating call or an explicit [`WeakMap::purge`].
//!
//! ## Architecture
//!
//! ```text
//!   keys ──► cache.compose(keys) ──► CompositeKey
//!                                         │
//!   root: FxHashMap<CompositeKey, V>      ▼
//!     key#1 ─► value
//!     key#2 ─► value
//!
//!   objA reclaimed ──► cache queue ──► purge() ──► root.remove(key#1)
//! ```
//!
//! Weak collections cannot be iterated: listing their keys would mean
//! handing out strong references to the weak arguments.
//!
//! A weak argument is reclaimed only when its last [`ObjectRef`] drops.
//! A value that holds the weak argument, directly or through a cycle,
//! therefore pins its own entry: the entry stays until it is removed
//! explicitly with [`WeakMap::remove`], [`WeakMap::delete`] or
//! [`WeakMap::clear`].
//!
//! [`ObjectRef`]: crate::key::ObjectRef
//!
//! ## Example Usage
//!
//! ```
//! use compositekit::collections::WeakMap;
//! use compositekit::key::{Key, ObjectRef};
//! use compositekit::shape::KeyShape;
//!
//! let shape = KeyShape::weak_strong(&["node"], &["attr"]).unwrap();
//! let mut attrs = WeakMap::new(shape).unwrap();
//!
//! let node = ObjectRef::new("div");
//! attrs.set(&[Key::from(&node), Key::from("class")], "wide").unwrap();
//! assert_eq!(attrs.get(&[Key::from(&node), Key::from("class")]), Some(&"wide"));
//!
//! drop(node);
//! assert_eq!(attrs.purge(), 1);
//! assert!(attrs.is_empty());
//! ```

use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::collections::{check_value, ValueValidator};
use crate::composer::{CompositeKey, CompositeWeakKeyCache};
use crate::error::{CompositeError, ConfigError, InvariantError};
use crate::key::Key;
use crate::shape::KeyShape;
use crate::traits::{CompositeMap, CompositeSet, KeyedCollection};

/// Map from a tuple with weakly held arguments to a value.
pub struct WeakMap<V> {
    cache: CompositeWeakKeyCache,
    root: FxHashMap<CompositeKey, V>,
    value_validator: Option<ValueValidator<V>>,
}

impl<V> WeakMap<V> {
    /// Creates an empty map. `shape` must declare at least one weak slot.
    pub fn new(shape: KeyShape) -> Result<Self, ConfigError> {
        Ok(Self {
            cache: CompositeWeakKeyCache::new(shape)?,
            root: FxHashMap::default(),
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
        self.cache.shape()
    }

    /// The cache minting this map's keys.
    pub fn cache(&self) -> &CompositeWeakKeyCache {
        &self.cache
    }

    pub fn set(&mut self, keys: &[Key], value: V) -> Result<Option<V>, CompositeError> {
        self.cache.shape().validate(keys)?;
        check_value(self.value_validator.as_ref(), &value)?;
        self.purge();

        let key = self.cache.compose(keys)?;
        Ok(self.root.insert(key, value))
    }

    pub fn get(&self, keys: &[Key]) -> Option<&V> {
        let key = self.cache.peek(keys)?;
        self.root.get(&key)
    }

    pub fn get_mut(&mut self, keys: &[Key]) -> Option<&mut V> {
        let key = self.cache.peek(keys)?;
        self.root.get_mut(&key)
    }

    pub fn has(&self, keys: &[Key]) -> bool {
        self.cache
            .peek(keys)
            .is_some_and(|key| self.root.contains_key(&key))
    }

    /// Removes the tuple and returns its value.
    pub fn remove(&mut self, keys: &[Key]) -> Option<V> {
        self.purge();
        let key = self.cache.peek(keys)?;
        let value = self.root.remove(&key)?;
        self.cache.remove_key(&key);
        Some(value)
    }

    pub fn delete(&mut self, keys: &[Key]) -> bool {
        self.remove(keys).is_some()
    }

    /// Number of entries, including any whose eviction is still pending.
    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn clear(&mut self) {
        self.root.clear();
        self.cache.clear();
    }

    /// Drops every entry whose weak argument has been reclaimed.
    ///
    /// Returns the number of entries removed.
    pub fn purge(&mut self) -> usize {
        let evicted = self.cache.purge();
        let removed = evicted
            .iter()
            .filter(|key| self.root.remove(*key).is_some())
            .count();
        if removed > 0 {
            debug!(removed, remaining = self.root.len(), "purged weak map entries");
        }
        removed
    }

    pub fn is_valid_key(&self, keys: &[Key]) -> bool {
        self.cache.is_valid(keys)
    }

    pub fn is_valid_value(&self, value: &V) -> bool {
        check_value(self.value_validator.as_ref(), value).is_ok()
    }

    /// Verifies that every entry's key is still indexed by the cache, unless
    /// its eviction is pending.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.cache.check_invariants()?;
        if self.cache.pending_evictions() > 0 {
            return Ok(());
        }
        match self.root.keys().find(|key| !self.cache.contains_key(key)) {
            Some(key) => Err(InvariantError::new(format!(
                "entry {key:?} has no cache record"
            ))),
            None => Ok(()),
        }
    }
}

impl<V> fmt::Debug for WeakMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakMap")
            .field("len", &self.root.len())
            .field("cache", &self.cache)
            .finish()
    }
}

impl<V> KeyedCollection for WeakMap<V> {
    fn shape(&self) -> &KeyShape {
        self.cache.shape()
    }

    fn has(&self, keys: &[Key]) -> bool {
        WeakMap::has(self, keys)
    }

    fn delete(&mut self, keys: &[Key]) -> bool {
        WeakMap::delete(self, keys)
    }

    fn len(&self) -> usize {
        self.root.len()
    }

    fn clear(&mut self) {
        WeakMap::clear(self)
    }
}

impl<V> CompositeMap<V> for WeakMap<V> {
    fn set(&mut self, keys: &[Key], value: V) -> Result<Option<V>, CompositeError> {
        WeakMap::set(self, keys, value)
    }

    fn get(&self, keys: &[Key]) -> Option<&V> {
        WeakMap::get(self, keys)
    }

    fn is_valid_value(&self, value: &V) -> bool {
        WeakMap::is_valid_value(self, value)
    }
}

// ---------------------------------------------------------------------------
// WeakSet
// ---------------------------------------------------------------------------

/// Set of tuples with weakly held arguments.
#[derive(Debug)]
pub struct WeakSet {
    map: WeakMap<()>,
}

impl WeakSet {
    /// Creates an empty set. `shape` must declare at least one weak slot.
    pub fn new(shape: KeyShape) -> Result<Self, ConfigError> {
        WeakMap::new(shape).map(|map| Self { map })
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

    pub fn purge(&mut self) -> usize {
        self.map.purge()
    }

    pub fn is_valid_key(&self, keys: &[Key]) -> bool {
        self.map.is_valid_key(keys)
    }

    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.map.check_invariants()
    }
}

impl KeyedCollection for WeakSet {
    fn shape(&self) -> &KeyShape {
        self.map.shape()
    }

    fn has(&self, keys: &[Key]) -> bool {
        WeakSet::has(self, keys)
    }

    fn delete(&mut self, keys: &[Key]) -> bool {
        WeakSet::delete(self, keys)
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn clear(&mut self) {
        WeakSet::clear(self)
    }
}

impl CompositeSet for WeakSet {
    fn add(&mut self, keys: &[Key]) -> Result<bool, CompositeError> {
        WeakSet::add(self, keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShapeViolation;
    use crate::key::ObjectRef;

    fn pair_set() -> WeakSet {
        WeakSet::new(KeyShape::weak(&["a", "b"]).unwrap()).unwrap()
    }

    // ==============================================
    // WeakSet
    // ==============================================

    mod set {
        use super::*;

        #[test]
        fn add_has_and_order() {
            let mut set = pair_set();
            let a = ObjectRef::new('a');
            let b = ObjectRef::new('b');
            assert!(set.add(&[Key::from(&a), Key::from(&b)]).unwrap());
            assert!(!set.add(&[Key::from(&a), Key::from(&b)]).unwrap());
            assert!(set.has(&[Key::from(&a), Key::from(&b)]));
            assert!(!set.has(&[Key::from(&b), Key::from(&a)]));
            assert_eq!(set.len(), 1);
        }

        #[test]
        fn primitive_weak_argument_is_rejected() {
            let mut set = pair_set();
            let a = ObjectRef::new(());
            let err = set.add(&[Key::from(&a), Key::from(1)]).unwrap_err();
            assert_eq!(
                err,
                CompositeError::InvalidArgumentShape(ShapeViolation::NotReferenceable {
                    slot: "b".into()
                })
            );
            assert!(set.is_empty());
            assert!(set.map.cache().is_empty());
            assert!(!set.is_valid_key(&[Key::from(&a), Key::from(1)]));
        }

        #[test]
        fn reclaiming_either_argument_drops_the_entry() {
            let mut set = pair_set();
            let a = ObjectRef::new(());
            let b = ObjectRef::new(());
            let c = ObjectRef::new(());
            set.add(&[Key::from(&a), Key::from(&b)]).unwrap();
            set.add(&[Key::from(&c), Key::from(&b)]).unwrap();

            drop(a);
            assert_eq!(set.len(), 2);
            assert_eq!(set.purge(), 1);
            assert_eq!(set.len(), 1);
            assert!(set.has(&[Key::from(&c), Key::from(&b)]));
            set.check_invariants().unwrap();
        }

        #[test]
        fn does_not_keep_weak_arguments_alive() {
            let mut set = pair_set();
            let a = ObjectRef::new(());
            let b = ObjectRef::new(());
            let probe = a.downgrade();
            set.add(&[Key::from(&a), Key::from(&b)]).unwrap();
            drop(a);
            assert!(probe.is_reclaimed());
        }

        #[test]
        fn delete_then_reclaim_is_quiet() {
            let mut set = pair_set();
            let a = ObjectRef::new(());
            let b = ObjectRef::new(());
            set.add(&[Key::from(&a), Key::from(&b)]).unwrap();
            assert!(set.delete(&[Key::from(&a), Key::from(&b)]));
            assert!(!set.delete(&[Key::from(&a), Key::from(&b)]));
            assert_eq!(a.watcher_count(), 0);

            drop(a);
            assert_eq!(set.purge(), 0);
            set.check_invariants().unwrap();
        }

        #[test]
        fn rejects_strong_only_shapes() {
            assert!(WeakSet::new(KeyShape::strong(&["k"]).unwrap()).is_err());
        }
    }

    // ==============================================
    // WeakMap
    // ==============================================

    mod map {
        use super::*;

        fn attr_map() -> WeakMap<i32> {
            WeakMap::new(KeyShape::weak_strong(&["node"], &["attr"]).unwrap()).unwrap()
        }

        #[test]
        fn set_replaces_value() {
            let mut map = attr_map();
            let n = ObjectRef::new(());
            let keys = [Key::from(&n), Key::from("x")];
            assert_eq!(map.set(&keys, 1).unwrap(), None);
            assert_eq!(map.set(&keys, 2).unwrap(), Some(1));
            assert_eq!(map.get(&keys), Some(&2));
            assert_eq!(map.cache().len(), 1);
        }

        #[test]
        fn get_mut_updates_in_place() {
            let mut map = attr_map();
            let n = ObjectRef::new(());
            let keys = [Key::from(&n), Key::from("x")];
            map.set(&keys, 1).unwrap();
            if let Some(v) = map.get_mut(&keys) {
                *v += 10;
            }
            assert_eq!(map.get(&keys), Some(&11));
        }

        #[test]
        fn strong_arguments_live_until_eviction() {
            let mut map = attr_map();
            let n = ObjectRef::new(());
            let strong = ObjectRef::new("attr");
            let probe = strong.downgrade();
            map.set(&[Key::from(&n), Key::from(strong)], 0).unwrap();
            assert!(!probe.is_reclaimed());

            drop(n);
            map.purge();
            assert!(probe.is_reclaimed());
            assert!(map.is_empty());
        }

        #[test]
        fn mutation_purges_first() {
            let mut map = attr_map();
            let n1 = ObjectRef::new(());
            let n2 = ObjectRef::new(());
            map.set(&[Key::from(&n1), Key::from("x")], 1).unwrap();
            drop(n1);

            map.set(&[Key::from(&n2), Key::from("x")], 2).unwrap();
            assert_eq!(map.len(), 1);
            assert_eq!(map.cache().len(), 1);
        }

        #[test]
        fn value_validator_and_with_entries() {
            let n = ObjectRef::new(());
            let map = WeakMap::new(KeyShape::weak_strong(&["node"], &["attr"]).unwrap())
                .unwrap()
                .with_value_validator(|v: &i32| *v != 0)
                .with_entries(vec![
                    (vec![Key::from(&n), Key::from("a")], 1),
                    (vec![Key::from(&n), Key::from("b")], 0),
                ]);
            assert!(matches!(map, Err(CompositeError::InvalidValue(_))));
        }

        #[test]
        fn clear_unwatches_everything() {
            let mut map = attr_map();
            let n = ObjectRef::new(());
            map.set(&[Key::from(&n), Key::from("x")], 1).unwrap();
            map.clear();
            assert!(map.is_empty());
            assert_eq!(n.watcher_count(), 0);
            assert!(!map.has(&[Key::from(&n), Key::from("x")]));
        }

        #[test]
        fn value_holding_its_key_pins_entry() {
            let mut map = WeakMap::new(KeyShape::weak(&["owner"]).unwrap()).unwrap();
            let owner = ObjectRef::new("owner");
            let weak = owner.downgrade();
            map.set(&[Key::from(&owner)], owner.clone()).unwrap();

            drop(owner);
            assert_eq!(map.purge(), 0);
            assert_eq!(map.len(), 1);
            assert!(!weak.is_reclaimed());

            let owner = weak.upgrade().unwrap();
            let value = map.remove(&[Key::from(&owner)]).unwrap();
            assert!(ObjectRef::ptr_eq(&value, &owner));
            drop(value);
            drop(owner);
            assert!(weak.is_reclaimed());
            assert!(map.is_empty());
        }

        #[test]
        fn usable_through_trait() {
            let mut map = attr_map();
            let n = ObjectRef::new(());
            let coll: &mut dyn CompositeMap<i32> = &mut map;
            coll.set(&[Key::from(&n), Key::from("x")], 5).unwrap();
            assert_eq!(coll.get(&[Key::from(&n), Key::from("x")]), Some(&5));
            assert!(coll.delete(&[Key::from(&n), Key::from("x")]));
            assert!(coll.is_empty());
        }
    }
}
