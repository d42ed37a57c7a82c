//! # Collection Trait Hierarchy
//!
//! Shared operation surface of the single-level composite collections.
//! Every collection is keyed by a positional argument list checked against
//! its declared [`KeyShape`]; the traits below let code work with any of
//! them without caring whether the keys are held weakly or strongly.
//!
//! ## Architecture
//!
//! ```text
//!                      ┌──────────────────────────────────────────┐
//!                      │            KeyedCollection               │
//!                      │                                          │
//!                      │  shape(&) → &KeyShape                    │
//!                      │  has(&, &[Key]) → bool                   │
//!                      │  delete(&mut, &[Key]) → bool             │
//!                      │  len(&) → usize                          │
//!                      │  is_empty(&) → bool                      │
//!                      │  clear(&mut)                             │
//!                      │  is_valid_key(&, &[Key]) → bool          │
//!                      └────────────────────┬─────────────────────┘
//!                                           │
//!                 ┌─────────────────────────┴─────────────────────────┐
//!                 ▼                                                   ▼
//!   ┌──────────────────────────────────┐          ┌──────────────────────────────────┐
//!   │        CompositeMap<V>           │          │          CompositeSet            │
//!   │                                  │          │                                  │
//!   │  set(&mut, &[Key], V)            │          │  add(&mut, &[Key])               │
//!   │    → Result<Option<V>, _>        │          │    → Result<bool, _>             │
//!   │  get(&, &[Key]) → Option<&V>     │          │                                  │
//!   │  is_valid_value(&, &V) → bool    │          │                                  │
//!   └──────────────────────────────────┘          └──────────────────────────────────┘
//!        StrongMap<V>, WeakMap<V>                        StrongSet, WeakSet
//! ```
//!
//! ## Trait Summary
//!
//! | Trait             | Implemented by               | Adds                    |
//! |-------------------|------------------------------|-------------------------|
//! | `KeyedCollection` | all four collections         | lookups, delete, clear  |
//! | `CompositeMap<V>` | `StrongMap<V>`, `WeakMap<V>` | values, value validator |
//! | `CompositeSet`    | `StrongSet`, `WeakSet`       | membership insert       |
//!
//! Iteration is not part of the traits: only strong collections can be
//! iterated, since a weak collection cannot hand out its weak arguments.
//!
//! ## Example Usage
//!
//! ```
//! use compositekit::collections::{StrongMap, WeakMap};
//! use compositekit::key::{Key, ObjectRef};
//! use compositekit::shape::KeyShape;
//! use compositekit::traits::{CompositeMap, KeyedCollection};
//!
//! fn count_hits<M: CompositeMap<u32>>(map: &mut M, keys: &[Key]) {
//!     let next = map.get(keys).copied().unwrap_or(0) + 1;
//!     map.set(keys, next).unwrap();
//! }
//!
//! let mut strong = StrongMap::new(KeyShape::strong(&["a", "b"]).unwrap()).unwrap();
//! count_hits(&mut strong, &[Key::from("x"), Key::from(1)]);
//! count_hits(&mut strong, &[Key::from("x"), Key::from(1)]);
//! assert_eq!(strong.get(&[Key::from("x"), Key::from(1)]), Some(&2));
//!
//! let owner = ObjectRef::new(());
//! let mut weak = WeakMap::new(KeyShape::weak(&["owner"]).unwrap()).unwrap();
//! count_hits(&mut weak, &[Key::from(&owner)]);
//! assert_eq!(weak.len(), 1);
//! ```
//!
//! ## Thread Safety
//!
//! None of the implementors are `Send` or `Sync`.

use crate::error::CompositeError;
use crate::key::Key;
use crate::shape::KeyShape;

/// Operations every composite collection supports.
pub trait KeyedCollection {
    /// The declared key shape.
    fn shape(&self) -> &KeyShape;

    /// Returns `true` if an entry exists for the tuple.
    ///
    /// Invalid tuples are never present, so this returns `false` for them
    /// rather than failing.
    fn has(&self, keys: &[Key]) -> bool;

    /// Removes the entry for the tuple. Returns `false` if it was absent.
    fn delete(&mut self, keys: &[Key]) -> bool;

    /// Number of entries.
    ///
    /// For weak collections this may still count entries whose weak
    /// argument was reclaimed but not yet purged.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry.
    fn clear(&mut self);

    /// Pure check of the argument list against the shape.
    fn is_valid_key(&self, keys: &[Key]) -> bool {
        self.shape().is_valid(keys)
    }
}

/// A collection mapping key tuples to values.
pub trait CompositeMap<V>: KeyedCollection {
    /// Inserts or replaces the value for the tuple, returning the previous
    /// value.
    ///
    /// # Errors
    ///
    /// [`CompositeError::InvalidArgumentShape`] for a malformed tuple and
    /// [`CompositeError::InvalidValue`] when the value validator rejects
    /// `value`. The collection is unchanged on error.
    fn set(&mut self, keys: &[Key], value: V) -> Result<Option<V>, CompositeError>;

    fn get(&self, keys: &[Key]) -> Option<&V>;

    /// Pure check of `value` against the collection's value validator.
    fn is_valid_value(&self, value: &V) -> bool;
}

/// A collection of key tuples.
pub trait CompositeSet: KeyedCollection {
    /// Adds the tuple. Returns `true` if it was not already present.
    ///
    /// # Errors
    ///
    /// [`CompositeError::InvalidArgumentShape`] for a malformed tuple.
    fn add(&mut self, keys: &[Key]) -> Result<bool, CompositeError>;
}
