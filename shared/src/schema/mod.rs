//! Structural schema derivation.
//!
//! Startup flow, one direction only: type descriptions → schema nodes and
//! definitions (`converter`) → per-land schema (`extractor`) → path-hash
//! table (`flatten`) → protocol document and content hash (`protocol`).

pub mod converter;
pub mod diff;
pub mod extractor;
pub mod flatten;
pub mod hash;
pub mod node;
pub mod protocol;

pub use converter::{is_atomic_type, SchemaBuildContext, ATOMIC_TYPES};
pub use diff::{state_diff_schema, PatchOp, StateDiff, StatePatch, STATE_DIFF_DEF};
pub use extractor::{extract_land, message_id, LandDefinition};
pub use flatten::{flatten, PathHashes, WILDCARD};
pub use hash::{canonical_json, fnv1a_32, fnv1a_64, path_hash};
pub use node::{AdditionalProperties, NodeMeta, PrimitiveOrContainer, SchemaNode, SyncMeta};
pub use protocol::{
    Compatibility, LandSchema, ProtocolSchema, ProtocolSchemaBuilder, SyncSchema,
    PROTOCOL_VERSION,
};
