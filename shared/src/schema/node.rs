use crate::descriptor::{NodeKind, PolicyKind, PrimitiveType};
use crate::value::{json_option, SnapshotValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const DEFS_PREFIX: &str = "#/defs/";

/// One node of the structural schema.
///
/// Serialises to the JSON-schema subset consumed by code generators, with the
/// state-tree extension block under `x-stateTree`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaNode {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<PrimitiveOrContainer>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, SchemaNode>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<SchemaNode>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<AdditionalProperties>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub required: BTreeSet<String>,

    #[serde(rename = "$ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,

    #[serde(
        rename = "default",
        default,
        with = "json_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_value: Option<SnapshotValue>,

    #[serde(rename = "x-stateTree", default, skip_serializing_if = "Option::is_none")]
    pub node_meta: Option<NodeMeta>,
}

/// The `type` keyword: a primitive or one of the two container types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveOrContainer {
    String,
    Integer,
    Number,
    Boolean,
    Null,
    Array,
    Object,
    /// Any other `type` value, such as a type list. Kept verbatim and read
    /// as an open value downstream.
    #[serde(untagged)]
    Other(serde_json::Value),
}

impl From<PrimitiveType> for PrimitiveOrContainer {
    fn from(value: PrimitiveType) -> Self {
        match value {
            PrimitiveType::String => PrimitiveOrContainer::String,
            PrimitiveType::Integer => PrimitiveOrContainer::Integer,
            PrimitiveType::Number => PrimitiveOrContainer::Number,
            PrimitiveType::Boolean => PrimitiveOrContainer::Boolean,
            PrimitiveType::Null => PrimitiveOrContainer::Null,
        }
    }
}

/// `additionalProperties`: either a flag or the schema of map values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(Box<SchemaNode>),
}

/// Sync policy as written into the extension block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMeta {
    pub policy: PolicyKind,
}

/// The `x-stateTree` extension block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMeta {
    pub node_kind: NodeKind,
    #[serde(rename = "sync", default, skip_serializing_if = "Option::is_none")]
    pub sync_policy: Option<SyncMeta>,
    #[serde(default)]
    pub atomic: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_type: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl NodeMeta {
    pub fn new(node_kind: NodeKind) -> Self {
        Self {
            node_kind,
            sync_policy: None,
            atomic: false,
            optional: false,
            inner_type: None,
            key_type: None,
        }
    }
}

impl SchemaNode {
    pub fn leaf(primitive: PrimitiveType) -> Self {
        Self {
            schema_type: Some(primitive.into()),
            node_meta: Some(NodeMeta::new(NodeKind::Leaf)),
            ..Self::default()
        }
    }

    /// An open schema that accepts any value.
    pub fn any() -> Self {
        Self {
            node_meta: Some(NodeMeta::new(NodeKind::Leaf)),
            ..Self::default()
        }
    }

    pub fn reference(name: &str) -> Self {
        Self {
            reference: Some(format!("{}{}", DEFS_PREFIX, name)),
            ..Self::default()
        }
    }

    pub fn object(properties: BTreeMap<String, SchemaNode>) -> Self {
        let required = properties.keys().cloned().collect();
        Self {
            schema_type: Some(PrimitiveOrContainer::Object),
            properties: Some(properties),
            required,
            node_meta: Some(NodeMeta::new(NodeKind::Object)),
            ..Self::default()
        }
    }

    pub fn array(items: SchemaNode) -> Self {
        Self {
            schema_type: Some(PrimitiveOrContainer::Array),
            items: Some(Box::new(items)),
            node_meta: Some(NodeMeta::new(NodeKind::Array)),
            ..Self::default()
        }
    }

    pub fn map(values: SchemaNode) -> Self {
        Self {
            schema_type: Some(PrimitiveOrContainer::Object),
            additional_properties: Some(AdditionalProperties::Schema(Box::new(values))),
            node_meta: Some(NodeMeta::new(NodeKind::Map)),
            ..Self::default()
        }
    }

    pub fn string_enum(variants: Vec<String>) -> Self {
        Self {
            schema_type: Some(PrimitiveOrContainer::String),
            enum_values: Some(variants),
            node_meta: Some(NodeMeta::new(NodeKind::Leaf)),
            ..Self::default()
        }
    }

    /// Name of the referenced definition, if this node is a `$ref`.
    pub fn ref_name(&self) -> Option<&str> {
        self.reference
            .as_deref()
            .map(|r| r.strip_prefix(DEFS_PREFIX).unwrap_or(r))
    }

    pub fn is_atomic(&self) -> bool {
        self.node_meta.as_ref().map_or(false, |m| m.atomic)
    }

    pub fn node_kind(&self) -> Option<NodeKind> {
        self.node_meta.as_ref().map(|m| m.node_kind)
    }

    pub fn policy(&self) -> Option<PolicyKind> {
        self.node_meta
            .as_ref()
            .and_then(|m| m.sync_policy)
            .map(|s| s.policy)
    }

    /// Schema of map values, when `additionalProperties` is a schema.
    pub fn map_values(&self) -> Option<&SchemaNode> {
        match &self.additional_properties {
            Some(AdditionalProperties::Schema(schema)) => Some(schema),
            _ => None,
        }
    }

    /// Mutable access to the extension block, creating it if absent.
    pub fn meta_mut(&mut self, fallback_kind: NodeKind) -> &mut NodeMeta {
        self.node_meta
            .get_or_insert_with(|| NodeMeta::new(fallback_kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_serialises_with_extension_block() {
        let mut props = BTreeMap::new();
        props.insert("hp".to_string(), SchemaNode::leaf(PrimitiveType::Integer));
        let mut node = SchemaNode::object(props);
        node.meta_mut(NodeKind::Object).sync_policy = Some(SyncMeta {
            policy: PolicyKind::Broadcast,
        });

        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], json!("object"));
        assert_eq!(json["required"], json!(["hp"]));
        assert_eq!(json["properties"]["hp"]["type"], json!("integer"));
        assert_eq!(
            json["x-stateTree"],
            json!({"nodeKind": "object", "sync": {"policy": "broadcast"}, "atomic": false})
        );
    }

    #[test]
    fn test_reference_and_map_shapes() {
        let node = SchemaNode::map(SchemaNode::reference("Player"));
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(
            json["additionalProperties"]["$ref"],
            json!("#/defs/Player")
        );
        assert_eq!(node.map_values().and_then(|v| v.ref_name()), Some("Player"));
    }

    #[test]
    fn test_default_value_is_plain_json() {
        let node = SchemaNode {
            default_value: Some(SnapshotValue::Int(100)),
            ..SchemaNode::leaf(PrimitiveType::Integer)
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["default"], json!(100));

        let back: SchemaNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_additional_properties_accepts_boolean() {
        let node: SchemaNode =
            serde_json::from_value(json!({"type": "object", "additionalProperties": true}))
                .unwrap();
        assert_eq!(
            node.additional_properties,
            Some(AdditionalProperties::Allowed(true))
        );
        assert!(node.map_values().is_none());
    }
}
