//! compositekit: composite weak-key caches and the collections built on them.
//!
//! A [`CompositeWeakKeyCache`](composer::CompositeWeakKeyCache) maps a tuple
//! of weak and strong key arguments to one canonical
//! [`CompositeKey`](composer::CompositeKey), evicting it once a weak argument
//! is reclaimed. The [`collections`] module layers single-level maps/sets and
//! two-level map-of-sets/map-of-maps on top.
//!
//! See `DESIGN.md` for internal architecture and invariants.

pub mod collections;
pub mod composer;
pub mod ds;
pub mod error;
pub mod key;
pub mod reclaim;
pub mod shape;

#[cfg(feature = "metrics")]
pub mod metrics;

pub mod prelude;
pub mod traits;
