//! Type description → schema node conversion.
//!
//! Conversion is total. Anything the converter cannot classify degrades to an
//! open schema instead of failing, so a partially described type never stops
//! a server from starting.

use super::node::{NodeMeta, SchemaNode, SyncMeta};
use crate::descriptor::{
    short_type_name, CompositeDesc, FieldDescriptor, NodeKind, TypeDesc,
};
use log::{debug, warn};
use std::collections::{BTreeMap, HashSet};

/// Small value types that are structurally composite but always sync as a
/// single unit.
pub const ATOMIC_TYPES: &[&str] = &["IVec2", "IVec3", "Vec2", "Vec3", "Position2", "Angle"];

pub fn is_atomic_type(name: &str) -> bool {
    ATOMIC_TYPES.contains(&short_type_name(name))
}

/// Definitions table and cycle guard threaded through one conversion run.
#[derive(Debug, Default, Clone)]
pub struct SchemaBuildContext {
    defs: BTreeMap<String, SchemaNode>,
    visited: HashSet<String>,
}

impl SchemaBuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defs(&self) -> &BTreeMap<String, SchemaNode> {
        &self.defs
    }

    pub fn into_defs(self) -> BTreeMap<String, SchemaNode> {
        self.defs
    }

    pub fn has_def(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }

    /// Registers a definition unless the name is already taken.
    ///
    /// Returns whether the definition was inserted.
    pub fn insert_def(&mut self, name: &str, node: SchemaNode) -> bool {
        if self.defs.contains_key(name) {
            return false;
        }
        self.defs.insert(name.to_string(), node);
        true
    }

    /// Converts a type description, optionally in the context of a field.
    pub fn convert(&mut self, desc: &TypeDesc, field: Option<&FieldDescriptor>) -> SchemaNode {
        let explicit_kind = field.and_then(|f| f.node_kind);
        let node = self.convert_shape(desc, explicit_kind);

        match field {
            Some(field) => apply_field_context(node, field),
            None => node,
        }
    }

    fn convert_shape(&mut self, desc: &TypeDesc, explicit_kind: Option<NodeKind>) -> SchemaNode {
        match desc {
            TypeDesc::Primitive(primitive) => SchemaNode::leaf(*primitive),
            TypeDesc::Composite(composite) => self.convert_composite(composite),
            TypeDesc::Optional(inner) => {
                let mut node = self.convert_shape(inner, explicit_kind);
                let kind = node.node_kind().unwrap_or_else(|| inner.inferred_node_kind());
                let meta = node.meta_mut(kind);
                meta.optional = true;
                meta.inner_type = Some(inner.display_name());
                node
            }
            TypeDesc::Enum { variants, .. } => SchemaNode::string_enum(variants.clone()),
            TypeDesc::Ref(name) => {
                let mut node = SchemaNode::reference(short_type_name(name));
                node.node_meta = Some(NodeMeta::new(NodeKind::Object));
                node
            }
            _ => {
                let kind = explicit_kind.unwrap_or_else(|| desc.inferred_node_kind());
                match (kind, desc) {
                    (NodeKind::Array, TypeDesc::Array(element)) => {
                        let items = self.convert_shape(element, None);
                        SchemaNode::array(items)
                    }
                    (NodeKind::Array, _) => SchemaNode::array(SchemaNode::any()),
                    (NodeKind::Map, TypeDesc::Map { key, value }) => {
                        let values = self.convert_shape(value, None);
                        let mut node = SchemaNode::map(values);
                        node.meta_mut(NodeKind::Map).key_type = Some(key.display_name());
                        node
                    }
                    (NodeKind::Map, _) => SchemaNode::map(SchemaNode::any()),
                    _ => {
                        if !matches!(desc, TypeDesc::Opaque(name) if name == "Any") {
                            warn!(
                                "No structural schema for '{}', using an untyped schema",
                                desc.display_name()
                            );
                        }
                        SchemaNode::any()
                    }
                }
            }
        }
    }

    /// Converts a composite into a definition and returns a `$ref` to it.
    fn convert_composite(&mut self, composite: &CompositeDesc) -> SchemaNode {
        let name = composite.short_name();
        let atomic = is_atomic_type(name);

        let mut reference = SchemaNode::reference(name);
        let mut ref_meta = NodeMeta::new(if atomic {
            NodeKind::Leaf
        } else {
            NodeKind::Object
        });
        ref_meta.atomic = atomic;
        reference.node_meta = Some(ref_meta.clone());

        if self.visited.contains(name) || self.defs.contains_key(name) {
            return reference;
        }
        self.visited.insert(name.to_string());

        let properties: BTreeMap<String, SchemaNode> = (composite.fields)()
            .iter()
            .map(|field| {
                let desc = field.describe_type();
                (field.name.clone(), self.convert(&desc, Some(field)))
            })
            .collect();

        let mut definition = SchemaNode::object(properties);
        definition.node_meta = Some(ref_meta);

        debug!(
            "Converted {} '{}' ({} fields)",
            if atomic { "atomic type" } else { "composite" },
            name,
            definition.required.len()
        );
        self.insert_def(name, definition);

        reference
    }
}

fn apply_field_context(mut node: SchemaNode, field: &FieldDescriptor) -> SchemaNode {
    let kind = node.node_kind().unwrap_or_else(|| field.resolved_node_kind());
    let meta = node.meta_mut(kind);
    if let Some(policy) = field.policy {
        meta.sync_policy = Some(SyncMeta { policy });
    }
    if let Some(default) = &field.default_value {
        node.default_value = Some(default.clone());
    }
    node
}
