//! Error types for the compositekit library.
//!
//! ## Key Components
//!
//! - [`CompositeError`]: Returned by validating operations (`compose_key`,
//!   `set`, `add`, `insert`) when a key tuple or value is rejected. Always
//!   raised before any state is touched.
//! - [`ShapeViolation`]: The reason a key tuple does not fit its declared
//!   [`KeyShape`](crate::shape::KeyShape).
//! - [`ConfigError`]: Returned when a shape declaration is invalid
//!   (no slots, duplicate names, weak slots where none are allowed).
//! - [`InvariantError`]: Returned when internal bookkeeping invariants are
//!   violated (debug `check_invariants` methods).
//!
//! ## Example Usage
//!
//! ```
//! use compositekit::error::{CompositeError, ShapeViolation};
//! use compositekit::key::Key;
//! use compositekit::shape::KeyShape;
//! use compositekit::collections::WeakSet;
//!
//! let mut set = WeakSet::new(KeyShape::weak(&["owner"]).unwrap()).unwrap();
//!
//! // A primitive can never be held weakly.
//! let err = set.add(&[Key::from(7)]).unwrap_err();
//! assert!(matches!(
//!     err,
//!     CompositeError::InvalidArgumentShape(ShapeViolation::NotReferenceable { .. })
//! ));
//! assert!(set.is_empty());
//! ```

use thiserror::Error;

use crate::shape::SlotKind;

// ---------------------------------------------------------------------------
// CompositeError
// ---------------------------------------------------------------------------

/// Error returned by operations that validate a key tuple or a value.
///
/// There are no partial failures: when an operation returns an error the
/// collection (and its cache) is exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompositeError {
    /// The key tuple does not match the declared shape.
    #[error("invalid argument shape: {0}")]
    InvalidArgumentShape(#[from] ShapeViolation),

    /// A map value was rejected by the collection's value validator.
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

impl CompositeError {
    /// Creates an [`CompositeError::InvalidValue`] with the given description.
    pub fn invalid_value(msg: impl Into<String>) -> Self {
        Self::InvalidValue(msg.into())
    }

    /// Returns `true` for [`CompositeError::InvalidArgumentShape`].
    pub fn is_shape_error(&self) -> bool {
        matches!(self, Self::InvalidArgumentShape(_))
    }
}

/// Why a key tuple was rejected by a [`KeyShape`](crate::shape::KeyShape).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeViolation {
    /// Wrong total number of positional arguments.
    #[error("expected {expected} argument(s), got {actual}")]
    ArgumentCount { expected: usize, actual: usize },

    /// Wrong number of arguments for one kind of slot.
    #[error("expected {expected} {kind} argument(s), got {actual}")]
    Arity {
        kind: SlotKind,
        expected: usize,
        actual: usize,
    },

    /// A primitive was supplied to a slot that holds its argument weakly.
    #[error("argument `{slot}` must be a referenceable object to be held weakly")]
    NotReferenceable { slot: String },

    /// A slot validator returned `false`.
    #[error("argument `{slot}` was rejected by its validator")]
    Rejected { slot: String },
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when a shape declaration is invalid.
///
/// Produced by [`ShapeBuilder::build`](crate::shape::ShapeBuilder::build) and
/// by collection constructors that require a particular mix of weak and
/// strong slots.
///
/// # Example
///
/// ```
/// use compositekit::shape::KeyShape;
///
/// let err = KeyShape::builder().build().unwrap_err();
/// assert!(err.to_string().contains("at least one"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// Error returned when internal bookkeeping invariants are violated.
///
/// Produced by `check_invariants` methods
/// (e.g. [`CompositeWeakKeyCache::check_invariants`](crate::composer::CompositeWeakKeyCache::check_invariants)).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct InvariantError(String);

impl InvariantError {
    /// Creates a new `InvariantError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
