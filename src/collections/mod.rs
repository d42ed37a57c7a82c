//! Composite-key collections.
//!
//! | Type                       | Key slots            | Iterable | Backing index            |
//! |----------------------------|----------------------|----------|--------------------------|
//! | [`StrongMap`], [`StrongSet`] | strong only        | yes      | `TupleKey` → entry       |
//! | [`WeakMap`], [`WeakSet`]   | ≥1 weak, any strong  | no       | `CompositeKey` → value   |
//! | [`TwoLevelCollection`]     | outer (weak/strong) + strong inner | per outer key | outer key → inner map |
//!
//! Weak collections own a [`CompositeWeakKeyCache`](crate::composer::CompositeWeakKeyCache)
//! and purge it at the start of every mutating operation; entries whose weak
//! argument was reclaimed disappear then, or on an explicit `purge()`.

use std::rc::Rc;

use crate::ds::tuple_hasher::TupleHasher;
use crate::error::CompositeError;
use crate::key::{Key, ObjectRef, WeakObjectRef};

pub mod strong_map;
pub mod two_level;
pub mod weak_map;

pub use strong_map::{StrongMap, StrongSet};
pub use two_level::{
    OuterIndex, StrongMapOfStrongMaps, StrongMapOfStrongSets, StrongOuter, TwoLevelCollection,
    WeakMapOfStrongMaps, WeakMapOfStrongSets, WeakOuter,
};
pub use weak_map::{WeakMap, WeakSet};

/// Predicate applied to map values before they are stored.
pub type ValueValidator<V> = Rc<dyn Fn(&V) -> bool>;

pub(crate) fn check_value<V>(
    validator: Option<&ValueValidator<V>>,
    value: &V,
) -> Result<(), CompositeError> {
    match validator {
        Some(f) if !f(value) => Err(CompositeError::invalid_value(
            "value rejected by the collection's validator",
        )),
        _ => Ok(()),
    }
}

/// Drops retained key arguments and forgets any object tokens that became
/// stale as a result. Objects still alive elsewhere are left for a later
/// batched sweep.
pub(crate) fn release_keys(hasher: &mut TupleHasher, keys: Box<[Key]>) {
    let objects: Vec<WeakObjectRef> = keys
        .iter()
        .filter_map(Key::as_object)
        .map(ObjectRef::downgrade)
        .collect();
    drop(keys);
    let surviving = objects
        .iter()
        .filter(|object| !hasher.forget_reclaimed(object))
        .count();
    hasher.note_released(surviving);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_forgets_only_reclaimed_objects() {
        let mut hasher = TupleHasher::new();
        let kept = ObjectRef::new(());
        let keys: Box<[Key]> = vec![Key::from(&kept), Key::object(()), Key::from(1)].into();
        hasher.build_key(keys.iter());
        assert_eq!(hasher.object_tokens(), 2);

        release_keys(&mut hasher, keys);
        assert_eq!(hasher.object_tokens(), 1);
        assert_eq!(hasher.primitive_tokens(), 1);
        assert!(hasher.token_if_present(&Key::from(&kept)).is_some());
    }

    #[test]
    fn value_check_uses_validator() {
        let positive: ValueValidator<i32> = Rc::new(|v| *v > 0);
        assert!(check_value(Some(&positive), &1).is_ok());
        assert!(matches!(
            check_value(Some(&positive), &0),
            Err(CompositeError::InvalidValue(_))
        ));
        assert!(check_value::<i32>(None, &0).is_ok());
    }
}
