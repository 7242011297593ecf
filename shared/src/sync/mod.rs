//! Visibility policies, synchronizable fields and the snapshot engine.
//!
//! Runtime cycle per round: mutate fields (marking them dirty) →
//! `snapshot_for_sync` for every viewer → `clear_dirty`. No mutation may
//! happen between the snapshot and the clear, otherwise it is lost from the
//! next round.

pub mod field;
pub mod node;
pub mod policy;
pub mod value;

pub use field::{FieldSlot, SyncField};
pub use node::{StateNode, SyncSnapshots};
pub use policy::{PlayerId, PlayerSlice, SyncPolicy, ValueMask, ViewerFilter, Visibility};
pub use value::{MapKey, SplitValue, SyncValue, ViewerParts};
