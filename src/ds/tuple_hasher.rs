//! Tuple hasher: assigns tokens to values and joins them into tuple keys.
//!
//! Each distinct value seen gets a [`Token`] from a monotonic counter owned
//! by the hasher. A tuple of values is then represented by the
//! comma-joined base-36 rendering of its tokens, a [`TupleKey`].
//!
//! ## Architecture
//!
//! ```text
//!   objects:    FxHashMap<addr, (WeakObjectRef, Token)>   weak association
//!   primitives: FxHashMap<Primitive, Token>               strong, never expires
//!   next:       u64                                       never reused
//!
//!   build_key([objA, "x", 7]) ──► tokens [0, 1, 2] ──► "0,1,2"
//!   order-independent:              sort ─► "0,1,2" for any permutation
//! ```
//!
//! Object entries hold only a [`WeakObjectRef`], so tokenizing an object
//! never extends its lifetime. The weak handle also keeps the object's
//! address reserved, which is what makes the address a safe lookup key.
//!
//! ## Operations
//!
//! | Operation              | Time | Notes                                  |
//! |------------------------|------|----------------------------------------|
//! | `token`                | O(1) | Allocates on first sight               |
//! | `token_if_present`     | O(1) | Never allocates                        |
//! | `build_key`            | O(n) | O(n log n) when order-independent      |
//! | `build_key_if_present` | O(n) | `None` if any value is unseen          |
//! | `sweep`                | O(m) | m = object entries                     |

use std::fmt;

use rustc_hash::FxHashMap;

use crate::key::{Key, Primitive, WeakObjectRef};

/// Separator between tokens in a [`TupleKey`].
pub const SEPARATOR: char = ',';

/// Process-unique identifier of a value seen by one [`TupleHasher`].
///
/// Displays as base-36.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(u64);

impl Token {
    fn write_base36(self, out: &mut String) {
        const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let mut buf = [0u8; 13];
        let mut n = self.0;
        let mut i = buf.len();
        loop {
            i -= 1;
            buf[i] = DIGITS[(n % 36) as usize];
            n /= 36;
            if n == 0 {
                break;
            }
        }
        out.extend(buf[i..].iter().map(|&b| b as char));
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = String::new();
        self.write_base36(&mut s);
        f.write_str(&s)
    }
}

/// String key representing a whole tuple.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TupleKey(String);

impl TupleKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TupleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Assigns tokens to values and builds tuple keys from them.
#[derive(Debug, Default)]
pub struct TupleHasher {
    next: u64,
    objects: FxHashMap<usize, (WeakObjectRef, Token)>,
    primitives: FxHashMap<Primitive, Token>,
    released: usize,
    order_independent: bool,
}

/// Minimum number of released objects before [`TupleHasher::note_released`]
/// sweeps.
const SWEEP_MIN_RELEASED: usize = 64;

impl TupleHasher {
    /// Creates a hasher whose keys depend on argument order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a hasher that sorts tokens before joining, so every
    /// permutation of a tuple yields the same key.
    pub fn order_independent() -> Self {
        Self {
            order_independent: true,
            ..Self::default()
        }
    }

    pub fn is_order_independent(&self) -> bool {
        self.order_independent
    }

    /// Returns the token for `key`, allocating one on first sight.
    pub fn token(&mut self, key: &Key) -> Token {
        let next = &mut self.next;
        let mut allocate = || {
            let token = Token(*next);
            *next += 1;
            token
        };
        match key {
            Key::Object(object) => {
                let entry = self
                    .objects
                    .entry(object.addr())
                    .or_insert_with(|| (object.downgrade(), allocate()));
                debug_assert!(entry.0.refers_to(object));
                entry.1
            },
            Key::Primitive(primitive) => *self
                .primitives
                .entry(primitive.clone())
                .or_insert_with(allocate),
        }
    }

    /// Returns the token for `key` if it has been seen.
    pub fn token_if_present(&self, key: &Key) -> Option<Token> {
        match key {
            Key::Object(object) => self.objects.get(&object.addr()).map(|(_, token)| *token),
            Key::Primitive(primitive) => self.primitives.get(primitive).copied(),
        }
    }

    /// Builds the tuple key for `keys`, allocating tokens as needed.
    pub fn build_key<'a, I>(&mut self, keys: I) -> TupleKey
    where
        I: IntoIterator<Item = &'a Key>,
    {
        let tokens: Vec<Token> = keys.into_iter().map(|key| self.token(key)).collect();
        self.join(tokens)
    }

    /// Builds the tuple key for `keys` without allocating.
    ///
    /// Returns `None` if any value has never been tokenized, which also
    /// proves no entry can exist for the tuple.
    pub fn build_key_if_present<'a, I>(&self, keys: I) -> Option<TupleKey>
    where
        I: IntoIterator<Item = &'a Key>,
    {
        let tokens = keys
            .into_iter()
            .map(|key| self.token_if_present(key))
            .collect::<Option<Vec<Token>>>()?;
        Some(self.join(tokens))
    }

    fn join(&self, mut tokens: Vec<Token>) -> TupleKey {
        if self.order_independent {
            tokens.sort_unstable();
        }
        let mut out = String::with_capacity(tokens.len() * 3);
        for (i, token) in tokens.into_iter().enumerate() {
            if i > 0 {
                out.push(SEPARATOR);
            }
            token.write_base36(&mut out);
        }
        TupleKey(out)
    }

    /// Drops the entry for `object` if it has been reclaimed.
    ///
    /// Returns `true` if an entry was removed.
    pub fn forget_reclaimed(&mut self, object: &WeakObjectRef) -> bool {
        if !object.is_reclaimed() {
            return false;
        }
        self.objects.remove(&object.addr()).is_some()
    }

    /// Records that `count` tokenized objects were released by their owner
    /// while still alive elsewhere.
    ///
    /// Their entries go stale once those objects are reclaimed. After enough
    /// releases, proportional to the table size, a [`sweep`](Self::sweep)
    /// runs. Returns the number of entries swept.
    pub fn note_released(&mut self, count: usize) -> usize {
        self.released += count;
        if self.released < SWEEP_MIN_RELEASED.max(self.objects.len() / 2) {
            return 0;
        }
        self.sweep()
    }

    /// Drops every entry whose object has been reclaimed.
    pub fn sweep(&mut self) -> usize {
        self.released = 0;
        let before = self.objects.len();
        self.objects.retain(|_, (weak, _)| !weak.is_reclaimed());
        before - self.objects.len()
    }

    /// Number of objects with a token.
    pub fn object_tokens(&self) -> usize {
        self.objects.len()
    }

    /// Number of primitives with a token.
    pub fn primitive_tokens(&self) -> usize {
        self.primitives.len()
    }

    /// Total number of tokens currently recorded.
    pub fn len(&self) -> usize {
        self.objects.len() + self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
