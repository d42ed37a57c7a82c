pub use crate::collections::{
    StrongMap, StrongMapOfStrongMaps, StrongMapOfStrongSets, StrongSet, TwoLevelCollection,
    WeakMap, WeakMapOfStrongMaps, WeakMapOfStrongSets, WeakSet,
};
pub use crate::composer::{CompositeKey, CompositeWeakKeyCache};
pub use crate::ds::{SlotArena, SlotId, TupleHasher, TupleKey};
pub use crate::error::{CompositeError, ConfigError, InvariantError, ShapeViolation};
pub use crate::key::{Key, ObjectRef, Primitive, WeakObjectRef};
pub use crate::shape::{KeyShape, ShapeBuilder, SlotKind};
pub use crate::traits::{CompositeMap, CompositeSet, KeyedCollection};

#[cfg(feature = "metrics")]
pub use crate::metrics::snapshot::ComposerMetricsSnapshot;
