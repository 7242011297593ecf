//! The protocol schema document and its deterministic content hash.

use super::converter::SchemaBuildContext;
use super::extractor::{extract_land, LandDefinition};
use super::flatten::PathHashes;
use super::hash::{canonical_json, hex_digest};
use super::node::SchemaNode;
use crate::error::SchemaError;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Snapshot and diff shapes of one land.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSchema {
    pub snapshot: SchemaNode,
    pub diff: SchemaNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandSchema {
    pub state_type: String,
    #[serde(default)]
    pub actions: BTreeMap<String, SchemaNode>,
    #[serde(default)]
    pub client_events: BTreeMap<String, SchemaNode>,
    #[serde(default)]
    pub events: BTreeMap<String, SchemaNode>,
    pub sync: SyncSchema,
    #[serde(default)]
    pub path_hashes: PathHashes,
}

/// The top-level document shared by servers, code generators and clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolSchema {
    pub version: String,
    pub schema_hash: String,
    pub lands: BTreeMap<String, LandSchema>,
    pub defs: BTreeMap<String, SchemaNode>,
}

/// The hashed subset of the document: everything but `schemaHash`.
#[derive(Serialize)]
struct HashedContent<'a> {
    version: &'a str,
    lands: &'a BTreeMap<String, LandSchema>,
    defs: &'a BTreeMap<String, SchemaNode>,
}

/// Result of comparing a client's schema hash with the server's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compatibility {
    Match,
    Mismatch { server: String, client: String },
}

impl Compatibility {
    pub fn is_match(&self) -> bool {
        matches!(self, Compatibility::Match)
    }
}

impl ProtocolSchema {
    pub fn builder() -> ProtocolSchemaBuilder {
        ProtocolSchemaBuilder::new()
    }

    /// Computes the content hash over `{version, lands, defs}`.
    pub fn compute_hash(&self) -> Result<String, SchemaError> {
        content_hash(&self.version, &self.lands, &self.defs)
    }

    /// Recomputes the hash and compares it with the stored one.
    pub fn verify(&self) -> Result<bool, SchemaError> {
        Ok(self.compute_hash()? == self.schema_hash)
    }

    pub fn check_compatibility(&self, client_hash: &str) -> Compatibility {
        if client_hash.eq_ignore_ascii_case(&self.schema_hash) {
            Compatibility::Match
        } else {
            Compatibility::Mismatch {
                server: self.schema_hash.clone(),
                client: client_hash.to_string(),
            }
        }
    }

    pub fn land(&self, land_id: &str) -> Option<&LandSchema> {
        self.lands.get(land_id)
    }

    /// Wire hash of a normalized path in one land.
    pub fn path_hash(&self, land_id: &str, path: &str) -> Option<u32> {
        self.lands.get(land_id)?.path_hashes.get(path).copied()
    }

    pub fn to_json_pretty(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(input: &str) -> Result<Self, SchemaError> {
        serde_json::from_str(input).map_err(SchemaError::Decoding)
    }
}

fn content_hash(
    version: &str,
    lands: &BTreeMap<String, LandSchema>,
    defs: &BTreeMap<String, SchemaNode>,
) -> Result<String, SchemaError> {
    let content = serde_json::to_value(HashedContent {
        version,
        lands,
        defs,
    })?;
    let canonical = canonical_json(&content);
    let digest = hex_digest(canonical.as_bytes());
    debug!("Schema hash {} over {} bytes", digest, canonical.len());
    Ok(digest)
}

enum Registration {
    Land(LandDefinition),
    Schema(ProtocolSchema),
}

/// Assembles one document from any number of lands and existing documents.
///
/// Lands are unioned by ID and definitions by name; the first registration
/// of either wins.
pub struct ProtocolSchemaBuilder {
    version: String,
    registrations: Vec<Registration>,
}

impl Default for ProtocolSchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolSchemaBuilder {
    pub fn new() -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            registrations: Vec::new(),
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn land(mut self, land: LandDefinition) -> Self {
        self.registrations.push(Registration::Land(land));
        self
    }

    pub fn merge(mut self, schema: ProtocolSchema) -> Self {
        self.registrations.push(Registration::Schema(schema));
        self
    }

    pub fn build(self) -> Result<ProtocolSchema, SchemaError> {
        let mut ctx = SchemaBuildContext::new();
        let mut lands: BTreeMap<String, LandSchema> = BTreeMap::new();

        for registration in self.registrations {
            match registration {
                Registration::Land(land) => {
                    if lands.contains_key(&land.id) {
                        warn!("Land '{}' registered twice, keeping the first", land.id);
                        continue;
                    }
                    let schema = extract_land(&land, &mut ctx)?;
                    lands.insert(land.id, schema);
                }
                Registration::Schema(schema) => {
                    for (id, land) in schema.lands {
                        if lands.contains_key(&id) {
                            warn!("Merged land '{}' already present, keeping the first", id);
                            continue;
                        }
                        lands.insert(id, land);
                    }
                    for (name, def) in schema.defs {
                        ctx.insert_def(&name, def);
                    }
                }
            }
        }

        let defs = ctx.into_defs();
        let schema_hash = content_hash(&self.version, &lands, &defs)?;

        Ok(ProtocolSchema {
            version: self.version,
            schema_hash,
            lands,
            defs,
        })
    }
}
