//! Declared key shapes.
//!
//! A [`KeyShape`] fixes, once per collection, how many key arguments a call
//! takes, what each one is called, and whether each is held weakly or
//! strongly. Positional argument lists passed to collections are checked
//! against it before anything is mutated.
//!
//! ## Example
//!
//! ```rust
//! use compositekit::key::{Key, ObjectRef};
//! use compositekit::shape::KeyShape;
//!
//! let shape = KeyShape::builder()
//!     .weak("owner")
//!     .strong("label")
//!     .validate("label", |k| k.as_primitive().is_some())
//!     .build()
//!     .unwrap();
//!
//! let owner = ObjectRef::new("doc");
//! assert!(shape.is_valid(&[Key::from(&owner), Key::from("title")]));
//! assert!(!shape.is_valid(&[Key::from("not-an-object"), Key::from("title")]));
//! assert!(!shape.is_valid(&[Key::from(&owner)]));
//! ```

use std::fmt;
use std::rc::Rc;

use crate::ds::tuple_hasher::TupleHasher;
use crate::error::{ConfigError, ShapeViolation};
use crate::key::Key;

/// How a slot holds its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// Must be a referenceable object; never kept alive by the collection.
    Weak,
    /// Any key; kept alive while its entry exists.
    Strong,
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKind::Weak => f.write_str("weak"),
            SlotKind::Strong => f.write_str("strong"),
        }
    }
}

/// Predicate applied to one key argument.
pub type KeyValidator = Rc<dyn Fn(&Key) -> bool>;

/// One declared key argument.
#[derive(Clone)]
pub struct KeySlot {
    name: Rc<str>,
    kind: SlotKind,
    validator: Option<KeyValidator>,
}

impl KeySlot {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SlotKind {
        self.kind
    }

    fn check(&self, key: &Key) -> Result<(), ShapeViolation> {
        if self.kind == SlotKind::Weak && !key.is_referenceable() {
            return Err(ShapeViolation::NotReferenceable {
                slot: self.name.to_string(),
            });
        }
        if let Some(validator) = &self.validator {
            if !validator(key) {
                return Err(ShapeViolation::Rejected {
                    slot: self.name.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for KeySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySlot")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("validated", &self.validator.is_some())
            .finish()
    }
}

/// Fixed arity, names and kinds of a collection's key arguments.
///
/// Cheap to clone; slots are shared.
#[derive(Debug, Clone)]
pub struct KeyShape {
    slots: Rc<[KeySlot]>,
    weak: Rc<[usize]>,
    strong: Rc<[usize]>,
    order_independent: bool,
}

impl KeyShape {
    pub fn builder() -> ShapeBuilder {
        ShapeBuilder::default()
    }

    /// Shape whose slots are all weak.
    pub fn weak(names: &[&str]) -> Result<Self, ConfigError> {
        names
            .iter()
            .fold(Self::builder(), |b, name| b.weak(*name))
            .build()
    }

    /// Shape whose slots are all strong.
    pub fn strong(names: &[&str]) -> Result<Self, ConfigError> {
        names
            .iter()
            .fold(Self::builder(), |b, name| b.strong(*name))
            .build()
    }

    /// Weak slots followed by strong slots.
    pub fn weak_strong(weak: &[&str], strong: &[&str]) -> Result<Self, ConfigError> {
        let builder = weak.iter().fold(Self::builder(), |b, name| b.weak(*name));
        strong
            .iter()
            .fold(builder, |b, name| b.strong(*name))
            .build()
    }

    pub fn slots(&self) -> &[KeySlot] {
        &self.slots
    }

    pub fn arity(&self) -> usize {
        self.slots.len()
    }

    pub fn weak_arity(&self) -> usize {
        self.weak.len()
    }

    pub fn strong_arity(&self) -> usize {
        self.strong.len()
    }

    pub fn has_weak_slots(&self) -> bool {
        !self.weak.is_empty()
    }

    pub fn is_order_independent(&self) -> bool {
        self.order_independent
    }

    /// Checks a positional argument list (declaration order).
    pub fn validate(&self, keys: &[Key]) -> Result<(), ShapeViolation> {
        if keys.len() != self.slots.len() {
            return Err(ShapeViolation::ArgumentCount {
                expected: self.slots.len(),
                actual: keys.len(),
            });
        }
        self.slots
            .iter()
            .zip(keys)
            .try_for_each(|(slot, key)| slot.check(key))
    }

    pub fn is_valid(&self, keys: &[Key]) -> bool {
        self.validate(keys).is_ok()
    }

    /// Checks arguments already separated into weak and strong parts, each
    /// in slot declaration order.
    pub fn validate_split(&self, weak: &[Key], strong: &[Key]) -> Result<(), ShapeViolation> {
        if weak.len() != self.weak.len() {
            return Err(ShapeViolation::Arity {
                kind: SlotKind::Weak,
                expected: self.weak.len(),
                actual: weak.len(),
            });
        }
        if strong.len() != self.strong.len() {
            return Err(ShapeViolation::Arity {
                kind: SlotKind::Strong,
                expected: self.strong.len(),
                actual: strong.len(),
            });
        }
        let weak_slots = self.weak.iter().zip(weak);
        let strong_slots = self.strong.iter().zip(strong);
        weak_slots
            .chain(strong_slots)
            .try_for_each(|(&slot, key)| self.slots[slot].check(key))
    }

    pub fn is_valid_split(&self, weak: &[Key], strong: &[Key]) -> bool {
        self.validate_split(weak, strong).is_ok()
    }

    /// Separates a positional argument list into its weak and strong parts.
    ///
    /// Only the argument count is checked.
    pub fn split(&self, keys: &[Key]) -> Option<(Vec<Key>, Vec<Key>)> {
        if keys.len() != self.slots.len() {
            return None;
        }
        let weak = self.weak.iter().map(|&i| keys[i].clone()).collect();
        let strong = self.strong.iter().map(|&i| keys[i].clone()).collect();
        Some((weak, strong))
    }

    /// A fresh hasher honoring this shape's ordering.
    pub fn hasher(&self) -> TupleHasher {
        if self.order_independent {
            TupleHasher::order_independent()
        } else {
            TupleHasher::new()
        }
    }

    pub(crate) fn require_weak(&self, owner: &str) -> Result<(), ConfigError> {
        if self.weak.is_empty() {
            return Err(ConfigError::new(format!(
                "{owner} requires at least one weak key slot"
            )));
        }
        Ok(())
    }

    pub(crate) fn require_strong_only(&self, owner: &str) -> Result<(), ConfigError> {
        if let Some(&i) = self.weak.first() {
            return Err(ConfigError::new(format!(
                "{owner} cannot hold slot `{}` weakly",
                self.slots[i].name
            )));
        }
        Ok(())
    }
}

/// Builder for [`KeyShape`].
#[derive(Default)]
pub struct ShapeBuilder {
    slots: Vec<(String, SlotKind)>,
    validators: Vec<(String, KeyValidator)>,
    order_independent: bool,
}

impl ShapeBuilder {
    /// Appends a weak slot.
    pub fn weak(mut self, name: impl Into<String>) -> Self {
        self.slots.push((name.into(), SlotKind::Weak));
        self
    }

    /// Appends a strong slot.
    pub fn strong(mut self, name: impl Into<String>) -> Self {
        self.slots.push((name.into(), SlotKind::Strong));
        self
    }

    /// Attaches a validator to the slot called `name`.
    pub fn validate(mut self, name: impl Into<String>, f: impl Fn(&Key) -> bool + 'static) -> Self {
        self.validators.push((name.into(), Rc::new(f)));
        self
    }

    /// Makes tuple keys independent of argument order.
    ///
    /// Two tuples holding the same values in different positions then name
    /// the same entry.
    pub fn order_independent(mut self) -> Self {
        self.order_independent = true;
        self
    }

    pub fn build(self) -> Result<KeyShape, ConfigError> {
        if self.slots.is_empty() {
            return Err(ConfigError::new("a key shape needs at least one slot"));
        }
        let mut slots: Vec<KeySlot> = Vec::with_capacity(self.slots.len());
        for (name, kind) in self.slots {
            if slots.iter().any(|s| *s.name == *name) {
                return Err(ConfigError::new(format!("duplicate slot `{name}`")));
            }
            slots.push(KeySlot {
                name: Rc::from(name),
                kind,
                validator: None,
            });
        }
        for (name, validator) in self.validators {
            let slot = slots
                .iter_mut()
                .find(|s| *s.name == *name)
                .ok_or_else(|| ConfigError::new(format!("validator for unknown slot `{name}`")))?;
            slot.validator = Some(validator);
        }

        let weak = slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.kind == SlotKind::Weak)
            .map(|(i, _)| i)
            .collect();
        let strong = slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.kind == SlotKind::Strong)
            .map(|(i, _)| i)
            .collect();

        Ok(KeyShape {
            slots: slots.into(),
            weak,
            strong,
            order_independent: self.order_independent,
        })
    }
}
