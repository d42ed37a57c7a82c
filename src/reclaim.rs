//! Reclamation notification plumbing between objects and caches.
//!
//! Every [`CompositeWeakKeyCache`](crate::composer::CompositeWeakKeyCache)
//! owns one [`ReclaimQueue`]. When a tuple is composed, each weak argument
//! receives a watcher `(queue, anchor)`; the object only holds the queue
//! weakly. When the last [`ObjectRef`](crate::key::ObjectRef) to that object
//! drops, its drop glue pushes the anchor onto every queue still alive. The
//! cache drains the queue in `purge()`, so index mutation always happens on
//! the cache's own call stack, never inside a destructor.
//!
//! ```text
//!   ObjectRef dropped ──► ObjectCell::drop
//!                             │  for each watcher (queue, anchor)
//!                             ▼
//!                       ReclaimQueue.pending.push(anchor)
//!                             │
//!   cache.purge() ────────────┘  take() ──► evict(anchor) for each
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use crate::ds::slot_arena::SlotId;

/// Handle of a finalizer anchor: the arena slot of a key record.
///
/// Generational, so a notification for a record that was already deleted
/// (and whose slot may have been reused) resolves to nothing.
pub type AnchorId = SlotId;

/// Identifies one watcher registration on an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct WatchId {
    pub(crate) queue: usize,
    pub(crate) anchor: AnchorId,
}

/// Pending anchors whose weak arguments were reclaimed.
#[derive(Debug, Default)]
pub(crate) struct ReclaimQueue {
    pending: RefCell<Vec<AnchorId>>,
}

impl ReclaimQueue {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Address used to tell queues apart inside an object's watcher table.
    pub(crate) fn id(this: &Rc<Self>) -> usize {
        Rc::as_ptr(this) as usize
    }

    pub(crate) fn notify(&self, anchor: AnchorId) {
        self.pending.borrow_mut().push(anchor);
    }

    /// Takes every pending anchor. The borrow is released before returning,
    /// so evictions that drop further objects can enqueue again.
    pub(crate) fn take(&self) -> Vec<AnchorId> {
        std::mem::take(&mut *self.pending.borrow_mut())
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    pub(crate) fn clear(&self) {
        self.pending.borrow_mut().clear();
    }
}
