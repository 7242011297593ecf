//! # State sync core
//!
//! Schema derivation and per-viewer snapshot generation for server-authoritative
//! multiplayer state.
//!
//! A land (one game instance) owns a tree of [`sync::StateNode`]s. Each field
//! of a node carries a [`sync::SyncPolicy`] deciding who sees it. From the
//! static description of that tree ([`descriptor::Describe`]) the
//! [`schema`] module derives a structural schema, a path-hash table and a
//! content hash that clients compare against at connect. At runtime the
//! [`sync`] module turns the tree into a broadcast snapshot plus one
//! per-player part per viewer, tracks dirty fields between rounds, and the
//! [`metrics`] module estimates how much of the state changes per round.
//!
//! ## Modules
//!
//! - [`value`]: the shared value model used by snapshots and schema defaults
//! - [`descriptor`]: static type descriptions
//! - [`schema`]: converter, extractor, path flattener, protocol document and hash
//! - [`sync`]: policies, fields, state nodes and the snapshot engine
//! - [`metrics`]: change-rate EMA and sync mode selection
//! - [`math`]: atomic vector and angle types

pub mod descriptor;
pub mod error;
pub mod math;
pub mod metrics;
pub mod schema;
pub mod sync;
pub mod value;

pub use error::{SchemaError, SnapshotError};
pub use metrics::SyncMode;
pub use sync::PlayerId;
pub use value::{SnapshotValue, StateSnapshot};

use serde::{Deserialize, Serialize};

/// UDP wire messages, encoded with bincode.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect {
        schema_hash: String,
        player_id: PlayerId,
    },
    Action {
        sequence: u32,
        action_id: String,
        payload: SnapshotValue,
    },
    Disconnect,
    /// Keeps a watching client alive between actions.
    Heartbeat,

    Connected {
        player_id: PlayerId,
        schema_hash: String,
        snapshot: StateSnapshot,
    },
    Rejected {
        reason: String,
    },
    /// One round for one viewer: the shared broadcast part and the viewer's
    /// own per-player part.
    StateSync {
        tick: u32,
        mode: SyncMode,
        broadcast: StateSnapshot,
        per_player: StateSnapshot,
    },
    Disconnected {
        reason: String,
    },
}
