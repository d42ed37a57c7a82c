//! Key model: referenceable objects and primitives.
//!
//! Every argument handed to a composite collection is a [`Key`]:
//!
//! - [`Key::Object`] wraps an [`ObjectRef`], a reference-counted value with
//!   its own identity. Two `ObjectRef`s are equal only if they point at the
//!   same allocation. Objects can be held weakly via [`WeakObjectRef`].
//! - [`Key::Primitive`] wraps a [`Primitive`] (null, bool, integer, float,
//!   string). Primitives are compared by value and can never be held weakly.
//!
//! ## Reclamation
//!
//! An object carries a watcher table. Caches that use the object as a weak
//! argument register `(queue, anchor)` pairs there; when the last strong
//! `ObjectRef` drops, the object notifies those queues. See
//! [`reclaim`](crate::reclaim).
//!
//! ## Example
//!
//! ```
//! use compositekit::key::{Key, ObjectRef};
//!
//! let a = ObjectRef::new("config");
//! let b = ObjectRef::new("config");
//!
//! // Identity, not payload, decides equality.
//! assert_eq!(Key::from(&a), Key::from(&a));
//! assert_ne!(Key::from(&a), Key::from(&b));
//!
//! // Primitives compare by value.
//! assert_eq!(Key::from("x"), Key::from(String::from("x")));
//!
//! let weak = a.downgrade();
//! drop(a);
//! assert!(weak.is_reclaimed());
//! ```

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use crate::reclaim::{ReclaimQueue, WatchId};

// ---------------------------------------------------------------------------
// ObjectRef
// ---------------------------------------------------------------------------

struct ObjectCell {
    payload: Box<dyn Any>,
    watchers: RefCell<FxHashMap<WatchId, Weak<ReclaimQueue>>>,
}

impl Drop for ObjectCell {
    fn drop(&mut self) {
        for (watch, queue) in self.watchers.get_mut().drain() {
            if let Some(queue) = queue.upgrade() {
                queue.notify(watch.anchor);
            }
        }
    }
}

/// Strong handle to a referenceable value.
///
/// Cloning is cheap (reference count bump). Equality and hashing use the
/// allocation address, so two objects with equal payloads are distinct keys.
#[derive(Clone)]
pub struct ObjectRef(Rc<ObjectCell>);

impl ObjectRef {
    /// Wraps `payload` in a new object with a fresh identity.
    pub fn new<T: Any>(payload: T) -> Self {
        Self(Rc::new(ObjectCell {
            payload: Box::new(payload),
            watchers: RefCell::new(FxHashMap::default()),
        }))
    }

    /// Returns the payload if it is of type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.payload.downcast_ref::<T>()
    }

    /// Returns `true` if the payload is of type `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.0.payload.is::<T>()
    }

    /// Creates a non-owning handle to this object.
    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef(Rc::downgrade(&self.0))
    }

    /// Returns `true` if both handles point at the same object.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Rc::ptr_eq(&this.0, &other.0)
    }

    /// Number of strong handles, including this one.
    pub fn strong_count(this: &Self) -> usize {
        Rc::strong_count(&this.0)
    }

    /// Number of cache registrations waiting for this object to be reclaimed.
    pub fn watcher_count(&self) -> usize {
        self.0.watchers.borrow().len()
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn watch(&self, id: WatchId, queue: &Rc<ReclaimQueue>) {
        self.0
            .watchers
            .borrow_mut()
            .insert(id, Rc::downgrade(queue));
    }

    pub(crate) fn unwatch(&self, id: WatchId) {
        self.0.watchers.borrow_mut().remove(&id);
    }

    pub(crate) fn is_watched_by(&self, id: WatchId) -> bool {
        self.0.watchers.borrow().contains_key(&id)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:#x})", self.addr())
    }
}

/// Non-owning handle to an [`ObjectRef`].
///
/// Holding a `WeakObjectRef` keeps the allocation's address reserved (no
/// other object can be placed there) without keeping the payload alive.
#[derive(Clone)]
pub struct WeakObjectRef(Weak<ObjectCell>);

impl WeakObjectRef {
    /// Returns a strong handle if the object is still alive.
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.0.upgrade().map(ObjectRef)
    }

    /// Returns `true` once the last strong handle has been dropped.
    pub fn is_reclaimed(&self) -> bool {
        self.0.strong_count() == 0
    }

    /// Returns `true` if this handle refers to `object`.
    pub fn refers_to(&self, object: &ObjectRef) -> bool {
        self.addr() == object.addr()
    }

    pub(crate) fn addr(&self) -> usize {
        Weak::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for WeakObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakObjectRef({:#x}", self.addr())?;
        if self.is_reclaimed() {
            f.write_str(", reclaimed")?;
        }
        f.write_str(")")
    }
}

// ---------------------------------------------------------------------------
// Primitive
// ---------------------------------------------------------------------------

/// Float stored by canonical bit pattern so it can be hashed.
///
/// `-0.0` and `0.0` are the same key, and every NaN is the same key.
/// Integers and floats never unify: `Key::from(1)` and `Key::from(1.0)`
/// are distinct keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FloatKey(u64);

impl FloatKey {
    pub fn new(value: f64) -> Self {
        let canonical = if value == 0.0 {
            0.0
        } else if value.is_nan() {
            f64::NAN
        } else {
            value
        };
        Self(canonical.to_bits())
    }

    pub fn get(self) -> f64 {
        f64::from_bits(self.0)
    }
}

/// A value without identity of its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Primitive {
    Null,
    Bool(bool),
    Int(i64),
    Float(FloatKey),
    Str(Rc<str>),
}

// ---------------------------------------------------------------------------
// Key
// ---------------------------------------------------------------------------

/// One argument of a composite key tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Object(ObjectRef),
    Primitive(Primitive),
}

impl Key {
    /// The null primitive.
    pub fn null() -> Self {
        Key::Primitive(Primitive::Null)
    }

    /// Wraps `payload` in a new object and returns it as a key.
    pub fn object<T: Any>(payload: T) -> Self {
        Key::Object(ObjectRef::new(payload))
    }

    /// Returns `true` if this key can be held weakly.
    #[inline]
    pub fn is_referenceable(&self) -> bool {
        matches!(self, Key::Object(_))
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Key::Object(object) => Some(object),
            Key::Primitive(_) => None,
        }
    }

    pub fn as_primitive(&self) -> Option<&Primitive> {
        match self {
            Key::Object(_) => None,
            Key::Primitive(primitive) => Some(primitive),
        }
    }
}

impl From<ObjectRef> for Key {
    fn from(object: ObjectRef) -> Self {
        Key::Object(object)
    }
}

impl From<&ObjectRef> for Key {
    fn from(object: &ObjectRef) -> Self {
        Key::Object(object.clone())
    }
}

impl From<Primitive> for Key {
    fn from(primitive: Primitive) -> Self {
        Key::Primitive(primitive)
    }
}

impl From<bool> for Key {
    fn from(value: bool) -> Self {
        Key::Primitive(Primitive::Bool(value))
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Primitive(Primitive::Int(value))
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::Primitive(Primitive::Int(i64::from(value)))
    }
}

impl From<u32> for Key {
    fn from(value: u32) -> Self {
        Key::Primitive(Primitive::Int(i64::from(value)))
    }
}

impl From<f64> for Key {
    fn from(value: f64) -> Self {
        Key::Primitive(Primitive::Float(FloatKey::new(value)))
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Primitive(Primitive::Str(Rc::from(value)))
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Primitive(Primitive::Str(Rc::from(value)))
    }
}

impl From<()> for Key {
    fn from(_: ()) -> Self {
        Key::null()
    }
}
