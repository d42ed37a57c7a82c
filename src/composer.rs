//! Composite weak-key cache.
//!
//! Turns a tuple of weak and strong key arguments into one canonical
//! [`CompositeKey`], usable as a single key in an ordinary map or set.
//! The same tuple always yields the same key while the key is alive, and the
//! key's bookkeeping is evicted once any weak argument is reclaimed.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                      CompositeWeakKeyCache Layout                           │
//! │                                                                             │
//! │   hasher: TupleHasher             by_tuple: FxHashMap<TupleKey, AnchorId>   │
//! │     objA ─► 0   "x" ─► 1             "0,1" ─────────────┐                   │
//! │                                                         ▼                   │
//! │   records: SlotArena<KeyRecord>   ┌───────────────────────────────────┐     │
//! │     (indexed by anchor)           │ anchor {idx 3, gen 0}             │     │
//! │                                   │   key:         Weak<KeyCell> ─────┼──┐  │
//! │                                   │   tuple:       "0,1"              │  │  │
//! │                                   │   weak_args:   [Weak objA]        │  │  │
//! │                                   │   strong_args: ["x"]              │  │  │
//! │                                   └───────────────────────────────────┘  │  │
//! │                                                                          │  │
//! │   CompositeKey(Rc<KeyCell { anchor }>) ◄─────────────────────────────────┘  │
//! │     held strongly only by callers (collection roots)                        │
//! │                                                                             │
//! │   objA.watchers: { (queue, anchor) }   queue: Rc<ReclaimQueue>              │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The three indexes are: by tuple key (`by_tuple`), by anchor (`records`),
//! and by composite key (each key carries its anchor; the record's weak
//! handle confirms the key belongs to this cache).
//!
//! ## Eviction Flow
//!
//! ```text
//!   last ObjectRef to objA dropped
//!     └─► objA's watchers push anchor onto queue           (no index touched)
//!
//!   purge():
//!     loop until queue empty:
//!       for anchor in queue.take():
//!         records.remove(anchor) ── None ─► stale notification, skip
//!           └─► by_tuple.remove(tuple)
//!               unwatch surviving weak args
//!               drop strong args (may enqueue more anchors)
//!               forget reclaimed objects in hasher
//!               return key if some collection still holds it
//! ```
//!
//! ## Operations
//!
//! | Operation     | Time | Notes                                         |
//! |---------------|------|-----------------------------------------------|
//! | `compose_key` | O(n) | n = arity; allocates tokens on first sight    |
//! | `peek_key`    | O(n) | Never allocates                               |
//! | `key_exists`  | O(n) | Never allocates                               |
//! | `delete_key`  | O(n) | Unregisters reclamation watchers              |
//! | `purge`       | O(e) | e = pending notifications (amortized)         |
//!
//! ## Example Usage
//!
//! ```
//! use compositekit::composer::CompositeWeakKeyCache;
//! use compositekit::key::{Key, ObjectRef};
//! use compositekit::shape::KeyShape;
//!
//! let shape = KeyShape::weak_strong(&["owner"], &["field"]).unwrap();
//! let mut cache = CompositeWeakKeyCache::new(shape).unwrap();
//!
//! let owner = ObjectRef::new("doc");
//! let k1 = cache.compose_key(&[Key::from(&owner)], &[Key::from("title")]).unwrap();
//! let k2 = cache.compose_key(&[Key::from(&owner)], &[Key::from("title")]).unwrap();
//! assert_eq!(k1, k2);
//! assert_eq!(cache.len(), 1);
//!
//! drop(owner);
//! let evicted = cache.purge();
//! assert_eq!(evicted, vec![k1]);
//! assert!(cache.is_empty());
//! ```
//!
//! ## Retention
//!
//! Weak arguments are reclaimed by reference counting, not tracing. A
//! record is never evicted while something reachable from the cache or its
//! callers keeps a weak argument alive. This includes passing the same
//! object in both a weak and a strong slot, since the record's strong
//! arguments hold it. Such records leave only through `delete_key`,
//! `remove_key` or `clear`.
//!
//! ## Thread Safety
//!
//! Single-threaded. All state lives behind `Rc`/`RefCell`; the cache is
//! `!Send` and `!Sync`.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::ds::slot_arena::SlotArena;
use crate::ds::tuple_hasher::{TupleHasher, TupleKey};
use crate::error::{CompositeError, ConfigError, InvariantError, ShapeViolation};
use crate::key::{Key, ObjectRef, WeakObjectRef};
use crate::reclaim::{AnchorId, ReclaimQueue, WatchId};
use crate::shape::KeyShape;

#[cfg(feature = "metrics")]
use crate::metrics::metrics_impl::ComposerMetrics;
#[cfg(feature = "metrics")]
use crate::metrics::snapshot::ComposerMetricsSnapshot;
#[cfg(feature = "metrics")]
use crate::metrics::traits::{
    ComposerMetricsReadRecorder, ComposerMetricsRecorder, MetricsSnapshotProvider,
};

// ---------------------------------------------------------------------------
// CompositeKey
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct KeyCell {
    anchor: AnchorId,
}

/// Canonical token for one key tuple.
///
/// Equality and hashing are by identity. Only
/// [`CompositeWeakKeyCache::compose_key`] creates these. Holding a
/// `CompositeKey` does not keep any of its tuple's arguments alive.
#[derive(Clone)]
pub struct CompositeKey(Rc<KeyCell>);

impl CompositeKey {
    #[inline]
    fn anchor(&self) -> AnchorId {
        self.0.anchor
    }

    fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Returns `true` if both handles are the same token.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Rc::ptr_eq(&this.0, &other.0)
    }
}

impl PartialEq for CompositeKey {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for CompositeKey {}

impl Hash for CompositeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CompositeKey({}:{})",
            self.0.anchor.index(),
            self.0.anchor.generation()
        )
    }
}

// ---------------------------------------------------------------------------
// KeyRecord
// ---------------------------------------------------------------------------

/// Bookkeeping for one live tuple. Stored at its anchor in the arena.
#[derive(Debug)]
struct KeyRecord {
    key: Weak<KeyCell>,
    tuple: TupleKey,
    weak_args: Box<[WeakObjectRef]>,
    strong_args: Box<[Key]>,
}

impl KeyRecord {
    fn is_key(&self, key: &CompositeKey) -> bool {
        self.key.as_ptr() == Rc::as_ptr(&key.0)
    }
}

// ---------------------------------------------------------------------------
// CompositeWeakKeyCache
// ---------------------------------------------------------------------------

/// Hash-consing cache of composite keys with automatic eviction.
pub struct CompositeWeakKeyCache {
    shape: KeyShape,
    hasher: TupleHasher,
    records: SlotArena<KeyRecord>,
    by_tuple: FxHashMap<TupleKey, AnchorId>,
    queue: Rc<ReclaimQueue>,
    #[cfg(feature = "metrics")]
    metrics: ComposerMetrics,
}

impl CompositeWeakKeyCache {
    /// Creates a cache for `shape`, which must declare at least one weak slot.
    pub fn new(shape: KeyShape) -> Result<Self, ConfigError> {
        shape.require_weak("CompositeWeakKeyCache")?;
        Ok(Self {
            hasher: shape.hasher(),
            shape,
            records: SlotArena::new(),
            by_tuple: FxHashMap::default(),
            queue: ReclaimQueue::new(),
            #[cfg(feature = "metrics")]
            metrics: ComposerMetrics::default(),
        })
    }

    pub fn shape(&self) -> &KeyShape {
        &self.shape
    }

    /// The hasher backing tuple keys.
    pub fn hasher(&self) -> &TupleHasher {
        &self.hasher
    }

    /// Number of live key records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of reclamation notifications waiting for [`purge`](Self::purge).
    pub fn pending_evictions(&self) -> usize {
        self.queue.len()
    }

    fn watch_id(&self, anchor: AnchorId) -> WatchId {
        WatchId {
            queue: ReclaimQueue::id(&self.queue),
            anchor,
        }
    }

    /// Returns the canonical key for the tuple, creating it on first request.
    ///
    /// # Errors
    ///
    /// [`CompositeError::InvalidArgumentShape`] if the argument counts do not
    /// match the shape, a weak argument is a primitive, or a slot validator
    /// rejects its argument. Nothing is allocated in that case.
    pub fn compose_key(
        &mut self,
        weak: &[Key],
        strong: &[Key],
    ) -> Result<CompositeKey, CompositeError> {
        #[cfg(feature = "metrics")]
        self.metrics.record_compose_call();

        if let Err(violation) = self.shape.validate_split(weak, strong) {
            #[cfg(feature = "metrics")]
            self.metrics.record_compose_rejected();
            return Err(violation.into());
        }

        let tuple = self.hasher.build_key(weak.iter().chain(strong));

        if let Some(&anchor) = self.by_tuple.get(&tuple) {
            if let Some(record) = self.records.get_mut(anchor) {
                if let Some(cell) = record.key.upgrade() {
                    #[cfg(feature = "metrics")]
                    self.metrics.record_compose_hit();
                    return Ok(CompositeKey(cell));
                }
                // Every holder dropped the previous token; the record is
                // still live because its weak arguments are.
                let cell = Rc::new(KeyCell { anchor });
                record.key = Rc::downgrade(&cell);
                #[cfg(feature = "metrics")]
                self.metrics.record_compose_reminted();
                trace!(anchor = anchor.index(), "reminted composite key");
                return Ok(CompositeKey(cell));
            }
        }

        let anchor = self.records.vacant_id();
        let cell = Rc::new(KeyCell { anchor });
        let record = KeyRecord {
            key: Rc::downgrade(&cell),
            tuple: tuple.clone(),
            weak_args: weak
                .iter()
                .filter_map(Key::as_object)
                .map(ObjectRef::downgrade)
                .collect(),
            strong_args: strong.into(),
        };
        let inserted = self.records.insert(record);
        debug_assert_eq!(inserted, anchor);

        let watch = self.watch_id(anchor);
        for object in weak.iter().filter_map(Key::as_object) {
            object.watch(watch, &self.queue);
        }
        self.by_tuple.insert(tuple, anchor);

        #[cfg(feature = "metrics")]
        self.metrics.record_compose_new();
        trace!(anchor = anchor.index(), records = self.records.len(), "minted composite key");
        Ok(CompositeKey(cell))
    }

    fn locate(&self, weak: &[Key], strong: &[Key]) -> Option<AnchorId> {
        if !self.shape.is_valid_split(weak, strong) {
            return None;
        }
        let tuple = self.hasher.build_key_if_present(weak.iter().chain(strong))?;
        self.by_tuple.get(&tuple).copied()
    }

    /// Returns `true` if a record exists for the tuple. Never allocates.
    pub fn key_exists(&self, weak: &[Key], strong: &[Key]) -> bool {
        self.locate(weak, strong).is_some()
    }

    /// Returns the tuple's key if one is live. Never allocates.
    pub fn peek_key(&self, weak: &[Key], strong: &[Key]) -> Option<CompositeKey> {
        #[cfg(feature = "metrics")]
        self.metrics.record_peek_call();

        let anchor = self.locate(weak, strong)?;
        let cell = self.records.get(anchor)?.key.upgrade()?;

        #[cfg(feature = "metrics")]
        self.metrics.record_peek_found();
        Some(CompositeKey(cell))
    }

    /// Removes the tuple's record and its reclamation watchers.
    ///
    /// Returns `false` if no record exists.
    pub fn delete_key(&mut self, weak: &[Key], strong: &[Key]) -> bool {
        #[cfg(feature = "metrics")]
        self.metrics.record_delete_call();

        let Some(anchor) = self.locate(weak, strong) else {
            return false;
        };
        if self.remove_record(anchor).is_none() {
            return false;
        }

        #[cfg(feature = "metrics")]
        self.metrics.record_delete_found();
        debug!(anchor = anchor.index(), records = self.records.len(), "deleted composite key");
        true
    }

    /// Removes the record `key` was minted for.
    ///
    /// Returns `false` if the key belongs to another cache or its record is
    /// already gone.
    pub fn remove_key(&mut self, key: &CompositeKey) -> bool {
        if !self.contains_key(key) {
            return false;
        }
        #[cfg(feature = "metrics")]
        self.metrics.record_delete_call();

        let removed = self.remove_record(key.anchor()).is_some();
        #[cfg(feature = "metrics")]
        if removed {
            self.metrics.record_delete_found();
        }
        removed
    }

    /// Arity, referenceability and validator checks only.
    pub fn is_valid_tuple(&self, weak: &[Key], strong: &[Key]) -> bool {
        self.shape.is_valid_split(weak, strong)
    }

    /// Tears down every index entry for `anchor`.
    ///
    /// Returns the record's key handle, or `None` if the anchor is no longer
    /// indexed (already deleted or evicted).
    fn remove_record(&mut self, anchor: AnchorId) -> Option<Weak<KeyCell>> {
        let KeyRecord {
            key,
            tuple,
            weak_args,
            strong_args,
        } = self.records.remove(anchor)?;
        self.by_tuple.remove(&tuple);

        let watch = self.watch_id(anchor);
        for object in weak_args.iter().filter_map(WeakObjectRef::upgrade) {
            object.unwatch(watch);
        }

        let strong_objects: Vec<WeakObjectRef> = strong_args
            .iter()
            .filter_map(Key::as_object)
            .map(ObjectRef::downgrade)
            .collect();
        // May drop the last handle to an object watched by this cache; its
        // anchor lands on the queue and is handled by the next purge round.
        drop(strong_args);

        let surviving = weak_args
            .iter()
            .chain(&strong_objects)
            .filter(|object| !self.hasher.forget_reclaimed(object))
            .count();
        self.hasher.note_released(surviving);
        Some(key)
    }

    /// Runs the eviction path for every pending reclamation notification.
    ///
    /// Returns the keys of evicted records that are still held somewhere, so
    /// collections keyed by them can drop their entries. Notifications for
    /// records that were already deleted are ignored.
    pub fn purge(&mut self) -> Vec<CompositeKey> {
        #[cfg(feature = "metrics")]
        self.metrics.record_purge_call();

        let mut evicted = Vec::new();
        let mut records = 0usize;
        loop {
            let pending = self.queue.take();
            if pending.is_empty() {
                break;
            }
            for anchor in pending {
                match self.remove_record(anchor) {
                    Some(key) => {
                        records += 1;
                        #[cfg(feature = "metrics")]
                        self.metrics.record_evicted_record();
                        if let Some(cell) = key.upgrade() {
                            evicted.push(CompositeKey(cell));
                        }
                    },
                    None => {
                        #[cfg(feature = "metrics")]
                        self.metrics.record_stale_notification();
                        trace!(anchor = anchor.index(), "stale reclamation notification");
                    },
                }
            }
        }

        if records > 0 {
            debug!(
                evicted = records,
                remaining = self.records.len(),
                "purged reclaimed composite keys"
            );
        }
        evicted
    }

    /// Removes every record and unregisters every watcher.
    pub fn clear(&mut self) {
        self.unwatch_all();
        self.by_tuple.clear();
        self.queue.clear();
        self.hasher.sweep();

        #[cfg(feature = "metrics")]
        self.metrics.record_clear();
    }

    fn unwatch_all(&mut self) {
        let queue = ReclaimQueue::id(&self.queue);
        for (anchor, record) in self.records.drain() {
            let watch = WatchId { queue, anchor };
            for object in record.weak_args.iter().filter_map(WeakObjectRef::upgrade) {
                object.unwatch(watch);
            }
        }
    }

    // -- Lookups by composite key -------------------------------------------

    /// Returns `true` if `key` was minted by this cache and is still indexed.
    pub fn contains_key(&self, key: &CompositeKey) -> bool {
        self.records
            .get(key.anchor())
            .is_some_and(|record| record.is_key(key))
    }

    /// The strong arguments retained for `key`.
    pub fn strong_args(&self, key: &CompositeKey) -> Option<&[Key]> {
        self.records
            .get(key.anchor())
            .filter(|record| record.is_key(key))
            .map(|record| &*record.strong_args)
    }

    /// The weak arguments of `key` that are still alive.
    pub fn weak_args(&self, key: &CompositeKey) -> Option<Vec<ObjectRef>> {
        self.records
            .get(key.anchor())
            .filter(|record| record.is_key(key))
            .map(|record| {
                record
                    .weak_args
                    .iter()
                    .filter_map(WeakObjectRef::upgrade)
                    .collect()
            })
    }

    // -- Positional helpers -------------------------------------------------

    fn split(&self, keys: &[Key]) -> Result<(Vec<Key>, Vec<Key>), ShapeViolation> {
        self.shape
            .split(keys)
            .ok_or(ShapeViolation::ArgumentCount {
                expected: self.shape.arity(),
                actual: keys.len(),
            })
    }

    /// [`compose_key`](Self::compose_key) over a declaration-order argument list.
    pub fn compose(&mut self, keys: &[Key]) -> Result<CompositeKey, CompositeError> {
        let (weak, strong) = self.split(keys)?;
        self.compose_key(&weak, &strong)
    }

    /// [`peek_key`](Self::peek_key) over a declaration-order argument list.
    pub fn peek(&self, keys: &[Key]) -> Option<CompositeKey> {
        let (weak, strong) = self.shape.split(keys)?;
        self.peek_key(&weak, &strong)
    }

    /// [`key_exists`](Self::key_exists) over a declaration-order argument list.
    pub fn contains(&self, keys: &[Key]) -> bool {
        self.shape
            .split(keys)
            .is_some_and(|(weak, strong)| self.key_exists(&weak, &strong))
    }

    /// [`delete_key`](Self::delete_key) over a declaration-order argument list.
    pub fn delete(&mut self, keys: &[Key]) -> bool {
        match self.shape.split(keys) {
            Some((weak, strong)) => self.delete_key(&weak, &strong),
            None => false,
        }
    }

    /// Positional [`is_valid_tuple`](Self::is_valid_tuple).
    pub fn is_valid(&self, keys: &[Key]) -> bool {
        self.shape.is_valid(keys)
    }

    // -- Debugging ----------------------------------------------------------

    /// Verifies that the three indexes agree and every live weak argument is
    /// watched.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        if self.by_tuple.len() != self.records.len() {
            return Err(InvariantError::new(format!(
                "tuple index has {} entries but {} records exist",
                self.by_tuple.len(),
                self.records.len()
            )));
        }
        for (anchor, record) in self.records.iter() {
            match self.by_tuple.get(&record.tuple) {
                Some(&indexed) if indexed == anchor => {},
                other => {
                    return Err(InvariantError::new(format!(
                        "record {:?} (tuple {}) indexed as {:?}",
                        anchor, record.tuple, other
                    )));
                },
            }
            if let Some(cell) = record.key.upgrade() {
                if cell.anchor != anchor {
                    return Err(InvariantError::new(format!(
                        "key for record {:?} carries anchor {:?}",
                        anchor, cell.anchor
                    )));
                }
            }
            if record.weak_args.len() != self.shape.weak_arity()
                || record.strong_args.len() != self.shape.strong_arity()
            {
                return Err(InvariantError::new(format!(
                    "record {:?} has {} weak / {} strong args",
                    anchor,
                    record.weak_args.len(),
                    record.strong_args.len()
                )));
            }
            let watch = self.watch_id(anchor);
            for object in record.weak_args.iter().filter_map(WeakObjectRef::upgrade) {
                if !object.is_watched_by(watch) {
                    return Err(InvariantError::new(format!(
                        "live weak argument of record {:?} is not watched",
                        anchor
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Drop for CompositeWeakKeyCache {
    fn drop(&mut self) {
        self.unwatch_all();
    }
}

impl fmt::Debug for CompositeWeakKeyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeWeakKeyCache")
            .field("shape", &self.shape)
            .field("records", &self.records.len())
            .field("pending_evictions", &self.queue.len())
            .field("tokens", &self.hasher.len())
            .finish()
    }
}

#[cfg(feature = "metrics")]
impl CompositeWeakKeyCache {
    /// Returns a snapshot of cache metrics.
    pub fn metrics_snapshot(&self) -> ComposerMetricsSnapshot {
        ComposerMetricsSnapshot {
            compose_calls: self.metrics.compose_calls,
            compose_hits: self.metrics.compose_hits,
            compose_new: self.metrics.compose_new,
            compose_reminted: self.metrics.compose_reminted,
            compose_rejected: self.metrics.compose_rejected,
            peek_calls: self.metrics.peek_calls.get(),
            peek_found: self.metrics.peek_found.get(),
            delete_calls: self.metrics.delete_calls,
            delete_found: self.metrics.delete_found,
            purge_calls: self.metrics.purge_calls,
            evicted_records: self.metrics.evicted_records,
            stale_notifications: self.metrics.stale_notifications,
            clears: self.metrics.clears,
            records: self.records.len(),
            object_tokens: self.hasher.object_tokens(),
            primitive_tokens: self.hasher.primitive_tokens(),
            pending_evictions: self.queue.len(),
        }
    }
}

#[cfg(feature = "metrics")]
impl MetricsSnapshotProvider<ComposerMetricsSnapshot> for CompositeWeakKeyCache {
    fn snapshot(&self) -> ComposerMetricsSnapshot {
        self.metrics_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weak_strong_cache() -> CompositeWeakKeyCache {
        CompositeWeakKeyCache::new(KeyShape::weak_strong(&["owner"], &["field"]).unwrap()).unwrap()
    }

    fn two_weak_cache() -> CompositeWeakKeyCache {
        CompositeWeakKeyCache::new(KeyShape::weak(&["left", "right"]).unwrap()).unwrap()
    }

    // ==============================================
    // Construction
    // ==============================================

    #[test]
    fn requires_a_weak_slot() {
        let shape = KeyShape::strong(&["a"]).unwrap();
        assert!(CompositeWeakKeyCache::new(shape).is_err());
    }

    // ==============================================
    // Hash-consing
    // ==============================================

    mod hash_consing {
        use super::*;

        #[test]
        fn same_tuple_same_key() {
            let mut cache = CompositeWeakKeyCache::new(KeyShape::weak(&["a"]).unwrap()).unwrap();
            let a = ObjectRef::new(());
            let k1 = cache.compose_key(&[Key::from(&a)], &[]).unwrap();
            let k2 = cache.compose_key(&[Key::from(&a)], &[]).unwrap();
            assert!(CompositeKey::ptr_eq(&k1, &k2));
            assert_eq!(cache.len(), 1);
            assert!(cache.key_exists(&[Key::from(&a)], &[]));
        }

        #[test]
        fn different_tuples_different_keys() {
            let mut cache = weak_strong_cache();
            let a = ObjectRef::new(());
            let k1 = cache.compose_key(&[Key::from(&a)], &[Key::from("x")]).unwrap();
            let k2 = cache.compose_key(&[Key::from(&a)], &[Key::from("y")]).unwrap();
            assert_ne!(k1, k2);
            assert_eq!(cache.len(), 2);
        }

        #[test]
        fn argument_order_matters() {
            let mut cache = two_weak_cache();
            let a = ObjectRef::new(());
            let b = ObjectRef::new(());
            let ab = cache.compose_key(&[Key::from(&a), Key::from(&b)], &[]).unwrap();
            let ba = cache.compose_key(&[Key::from(&b), Key::from(&a)], &[]).unwrap();
            assert_ne!(ab, ba);
        }

        #[test]
        fn order_independent_shape_merges_permutations() {
            let shape = KeyShape::builder()
                .weak("left")
                .weak("right")
                .order_independent()
                .build()
                .unwrap();
            let mut cache = CompositeWeakKeyCache::new(shape).unwrap();
            let a = ObjectRef::new(());
            let b = ObjectRef::new(());
            let ab = cache.compose_key(&[Key::from(&a), Key::from(&b)], &[]).unwrap();
            let ba = cache.compose_key(&[Key::from(&b), Key::from(&a)], &[]).unwrap();
            assert_eq!(ab, ba);
        }

        #[test]
        fn dropped_key_is_reminted_for_live_record() {
            let mut cache = weak_strong_cache();
            let a = ObjectRef::new(());
            let tuple = ([Key::from(&a)], [Key::from(1)]);

            let first = cache.compose_key(&tuple.0, &tuple.1).unwrap();
            drop(first);
            assert!(cache.key_exists(&tuple.0, &tuple.1));
            assert!(cache.peek_key(&tuple.0, &tuple.1).is_none());

            let second = cache.compose_key(&tuple.0, &tuple.1).unwrap();
            assert_eq!(cache.len(), 1);
            assert!(cache.contains_key(&second));
            assert_eq!(cache.peek_key(&tuple.0, &tuple.1), Some(second));
            cache.check_invariants().unwrap();
        }
    }

    // ==============================================
    // Validation
    // ==============================================

    mod validation {
        use super::*;

        #[test]
        fn arity_mismatch_is_rejected_without_allocation() {
            let mut cache = weak_strong_cache();
            let a = ObjectRef::new(());
            let err = cache.compose_key(&[Key::from(&a)], &[]).unwrap_err();
            assert!(err.is_shape_error());
            assert!(cache.is_empty());
            assert!(cache.hasher().is_empty());
        }

        #[test]
        fn primitive_in_weak_slot_is_rejected() {
            let mut cache = weak_strong_cache();
            let err = cache
                .compose_key(&[Key::from("nope")], &[Key::from(1)])
                .unwrap_err();
            assert_eq!(
                err,
                CompositeError::InvalidArgumentShape(ShapeViolation::NotReferenceable {
                    slot: "owner".into()
                })
            );
            assert!(!cache.is_valid_tuple(&[Key::from("nope")], &[Key::from(1)]));
        }

        #[test]
        fn objects_are_allowed_in_strong_slots() {
            let mut cache = weak_strong_cache();
            let a = ObjectRef::new(());
            let s = ObjectRef::new(());
            assert!(cache.is_valid_tuple(&[Key::from(&a)], &[Key::from(&s)]));
            assert!(cache.compose_key(&[Key::from(&a)], &[Key::from(&s)]).is_ok());
        }

        #[test]
        fn lookups_never_allocate_tokens() {
            let cache = weak_strong_cache();
            let a = ObjectRef::new(());
            assert!(!cache.key_exists(&[Key::from(&a)], &[Key::from("x")]));
            assert!(cache.peek_key(&[Key::from(&a)], &[Key::from("x")]).is_none());
            assert!(cache.hasher().is_empty());
        }

        #[test]
        fn positional_helpers_split_by_slot_kind() {
            let shape = KeyShape::builder()
                .strong("field")
                .weak("owner")
                .build()
                .unwrap();
            let mut cache = CompositeWeakKeyCache::new(shape).unwrap();
            let a = ObjectRef::new(());
            let keys = [Key::from("x"), Key::from(&a)];

            let key = cache.compose(&keys).unwrap();
            assert_eq!(cache.peek(&keys), Some(key.clone()));
            assert_eq!(
                cache.peek_key(&[Key::from(&a)], &[Key::from("x")]),
                Some(key)
            );
            assert!(cache.contains(&keys));
            assert!(cache.is_valid(&keys));
            assert!(cache.compose(&keys[..1]).is_err());
            assert!(cache.delete(&keys));
            assert!(!cache.contains(&keys));
        }
    }

    // ==============================================
    // Explicit deletion
    // ==============================================

    mod deletion {
        use super::*;

        #[test]
        fn delete_removes_record_and_watchers() {
            let mut cache = weak_strong_cache();
            let a = ObjectRef::new(());
            let key = cache.compose_key(&[Key::from(&a)], &[Key::from(1)]).unwrap();
            assert_eq!(a.watcher_count(), 1);

            assert!(cache.delete_key(&[Key::from(&a)], &[Key::from(1)]));
            assert!(!cache.delete_key(&[Key::from(&a)], &[Key::from(1)]));
            assert!(!cache.contains_key(&key));
            assert_eq!(a.watcher_count(), 0);
            assert!(cache.is_empty());
            cache.check_invariants().unwrap();
        }

        #[test]
        fn reclamation_after_delete_is_a_noop() {
            let mut cache = weak_strong_cache();
            let a = ObjectRef::new(());
            cache.compose_key(&[Key::from(&a)], &[Key::from(1)]).unwrap();
            cache.delete_key(&[Key::from(&a)], &[Key::from(1)]);

            drop(a);
            assert_eq!(cache.pending_evictions(), 0);
            assert!(cache.purge().is_empty());
        }

        #[test]
        fn remove_key_by_handle() {
            let mut c1 = weak_strong_cache();
            let mut c2 = weak_strong_cache();
            let a = ObjectRef::new(());
            let key = c1.compose_key(&[Key::from(&a)], &[Key::from(1)]).unwrap();

            assert!(!c2.remove_key(&key));
            assert!(c1.remove_key(&key));
            assert!(!c1.remove_key(&key));
            assert_eq!(a.watcher_count(), 0);
        }

        #[test]
        fn delete_unknown_tuple_returns_false() {
            let mut cache = weak_strong_cache();
            let a = ObjectRef::new(());
            assert!(!cache.delete_key(&[Key::from(&a)], &[Key::from(1)]));
            assert!(!cache.delete_key(&[], &[]));
        }
    }

    // ==============================================
    // Eviction
    // ==============================================

    mod eviction {
        use super::*;

        #[test]
        fn reclaiming_weak_arg_evicts_record() {
            let mut cache = weak_strong_cache();
            let a = ObjectRef::new(());
            let b = ObjectRef::new(());
            let ka = cache.compose_key(&[Key::from(&a)], &[Key::from(1)]).unwrap();
            let _kb = cache.compose_key(&[Key::from(&b)], &[Key::from(1)]).unwrap();
            assert_eq!(cache.len(), 2);

            drop(a);
            assert_eq!(cache.pending_evictions(), 1);
            assert_eq!(cache.len(), 2);

            let evicted = cache.purge();
            assert_eq!(evicted, vec![ka.clone()]);
            assert_eq!(cache.len(), 1);
            assert!(!cache.contains_key(&ka));
            assert_eq!(cache.hasher().object_tokens(), 1);
            cache.check_invariants().unwrap();
        }

        #[test]
        fn object_in_both_slots_is_retained() {
            let mut cache = weak_strong_cache();
            let a = ObjectRef::new(());
            let weak = a.downgrade();
            cache.compose_key(&[Key::from(&a)], &[Key::from(&a)]).unwrap();

            drop(a);
            assert!(cache.purge().is_empty());
            assert_eq!(cache.len(), 1);
            assert!(!weak.is_reclaimed());

            let a = weak.upgrade().unwrap();
            assert!(cache.delete_key(&[Key::from(&a)], &[Key::from(&a)]));
            drop(a);
            assert!(weak.is_reclaimed());
            assert!(cache.is_empty());
            cache.check_invariants().unwrap();
        }

        #[test]
        fn unheld_keys_are_not_returned() {
            let mut cache = weak_strong_cache();
            let a = ObjectRef::new(());
            drop(cache.compose_key(&[Key::from(&a)], &[Key::from(1)]).unwrap());
            drop(a);
            assert!(cache.purge().is_empty());
            assert!(cache.is_empty());
        }

        #[test]
        fn second_notification_for_same_record_is_stale() {
            let mut cache = two_weak_cache();
            let a = ObjectRef::new(());
            let b = ObjectRef::new(());
            let key = cache.compose_key(&[Key::from(&a), Key::from(&b)], &[]).unwrap();

            drop(a);
            drop(b);
            assert_eq!(cache.pending_evictions(), 2);
            assert_eq!(cache.purge(), vec![key]);
            assert!(cache.is_empty());
            assert!(cache.purge().is_empty());
        }

        #[test]
        fn surviving_weak_arg_is_unwatched_on_eviction() {
            let mut cache = two_weak_cache();
            let a = ObjectRef::new(());
            let b = ObjectRef::new(());
            cache.compose_key(&[Key::from(&a), Key::from(&b)], &[]).unwrap();
            assert_eq!(b.watcher_count(), 1);

            drop(a);
            cache.purge();
            assert_eq!(b.watcher_count(), 0);
        }

        #[test]
        fn strong_args_are_retained_until_eviction() {
            let mut cache = weak_strong_cache();
            let a = ObjectRef::new(());
            let s = ObjectRef::new("strong");
            let s_probe = s.downgrade();
            let key = cache.compose_key(&[Key::from(&a)], &[Key::from(s)]).unwrap();

            assert!(!s_probe.is_reclaimed());
            let retained = cache.strong_args(&key).unwrap();
            assert!(matches!(&retained[0], Key::Object(o) if s_probe.refers_to(o)));

            drop(a);
            cache.purge();
            assert!(s_probe.is_reclaimed());
        }

        #[test]
        fn weak_args_are_not_retained() {
            let mut cache = weak_strong_cache();
            let a = ObjectRef::new(());
            let probe = a.downgrade();
            let key = cache.compose_key(&[Key::from(&a)], &[Key::from(1)]).unwrap();
            assert_eq!(cache.weak_args(&key).map(|v| v.len()), Some(1));

            drop(a);
            assert!(probe.is_reclaimed());
        }

        #[test]
        fn eviction_cascades_through_strong_args() {
            let mut cache = weak_strong_cache();
            let x = ObjectRef::new("x");
            let y = ObjectRef::new("y");
            cache.compose_key(&[Key::from(&x)], &[Key::from(&y)]).unwrap();
            cache.compose_key(&[Key::from(&y)], &[Key::from(0)]).unwrap();
            drop(y);
            assert_eq!(cache.len(), 2);

            drop(x);
            cache.purge();
            assert!(cache.is_empty());
            assert_eq!(cache.pending_evictions(), 0);
            cache.check_invariants().unwrap();
        }

        #[test]
        fn independent_caches_both_evict() {
            let mut c1 = weak_strong_cache();
            let mut c2 = weak_strong_cache();
            let a = ObjectRef::new(());
            c1.compose_key(&[Key::from(&a)], &[Key::from(1)]).unwrap();
            c2.compose_key(&[Key::from(&a)], &[Key::from(1)]).unwrap();
            assert_eq!(a.watcher_count(), 2);

            drop(a);
            c1.purge();
            c2.purge();
            assert!(c1.is_empty());
            assert!(c2.is_empty());
        }
    }

    // ==============================================
    // Teardown
    // ==============================================

    mod teardown {
        use super::*;

        #[test]
        fn clear_unwatches_and_empties() {
            let mut cache = weak_strong_cache();
            let a = ObjectRef::new(());
            let key = cache.compose_key(&[Key::from(&a)], &[Key::from(1)]).unwrap();
            cache.clear();
            assert!(cache.is_empty());
            assert!(!cache.contains_key(&key));
            assert_eq!(a.watcher_count(), 0);
            cache.check_invariants().unwrap();

            let again = cache.compose_key(&[Key::from(&a)], &[Key::from(1)]).unwrap();
            assert_ne!(again, key);
        }

        #[test]
        fn dropping_cache_unwatches_objects() {
            let a = ObjectRef::new(());
            {
                let mut cache = weak_strong_cache();
                cache.compose_key(&[Key::from(&a)], &[Key::from(1)]).unwrap();
                assert_eq!(a.watcher_count(), 1);
            }
            assert_eq!(a.watcher_count(), 0);
        }

        #[test]
        fn foreign_key_is_not_contained() {
            let mut c1 = weak_strong_cache();
            let mut c2 = weak_strong_cache();
            let a = ObjectRef::new(());
            let k1 = c1.compose_key(&[Key::from(&a)], &[Key::from(1)]).unwrap();
            let _k2 = c2.compose_key(&[Key::from(&a)], &[Key::from(1)]).unwrap();
            assert!(c1.contains_key(&k1));
            assert!(!c2.contains_key(&k1));
            assert!(c2.strong_args(&k1).is_none());
        }
    }

    #[cfg(feature = "metrics")]
    mod metrics {
        use super::*;

        #[test]
        fn snapshot_counts_compose_and_evictions() {
            let mut cache = weak_strong_cache();
            let a = ObjectRef::new(());
            let _k = cache.compose_key(&[Key::from(&a)], &[Key::from(1)]).unwrap();
            let _k = cache.compose_key(&[Key::from(&a)], &[Key::from(1)]).unwrap();
            let _ = cache.compose_key(&[Key::from(1)], &[Key::from(1)]);
            drop(a);
            cache.purge();

            let snap = cache.snapshot();
            assert_eq!(snap.compose_calls, 3);
            assert_eq!(snap.compose_new, 1);
            assert_eq!(snap.compose_hits, 1);
            assert_eq!(snap.compose_rejected, 1);
            assert_eq!(snap.evicted_records, 1);
            assert_eq!(snap.records, 0);
        }
    }
}
