pub mod slot_arena;
pub mod tuple_hasher;

pub use slot_arena::{SlotArena, SlotId};
pub use tuple_hasher::{Token, TupleHasher, TupleKey, SEPARATOR};
