//! Static type descriptions.
//!
//! Every synchronizable type supplies a [`TypeDesc`] through the [`Describe`]
//! trait. Composite types hand out their field list through a function
//! pointer, so a type can mention itself (directly or through containers)
//! without the description recursing forever while it is being built.

use crate::value::SnapshotValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

/// JSON-schema primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    String,
    Integer,
    Number,
    Boolean,
    Null,
}

impl PrimitiveType {
    pub fn display_name(self) -> &'static str {
        match self {
            PrimitiveType::String => "String",
            PrimitiveType::Integer => "Int",
            PrimitiveType::Number => "Double",
            PrimitiveType::Boolean => "Bool",
            PrimitiveType::Null => "Null",
        }
    }
}

/// Structural classification of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Object,
    Array,
    Map,
    Leaf,
}

/// Data-only name of a field's sync policy.
///
/// The runtime policy (`sync::SyncPolicy`) carries the filter functions;
/// this is what schemas and generated clients see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PolicyKind {
    Broadcast,
    ServerOnly,
    PerPlayer,
    #[serde(alias = "perPlayerDictionaryValue")]
    PerPlayerSlice,
    Masked,
    Custom,
}

impl PolicyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyKind::Broadcast => "broadcast",
            PolicyKind::ServerOnly => "serverOnly",
            PolicyKind::PerPlayer => "perPlayer",
            PolicyKind::PerPlayerSlice => "perPlayerSlice",
            PolicyKind::Masked => "masked",
            PolicyKind::Custom => "custom",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a composite takes part in the synchronized state graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeKind {
    /// A synchronizable state node: fields carry sync policies
    StateNode,
    /// An action, event or plain value struct
    Payload,
}

/// A composite type with named fields.
#[derive(Debug, Clone)]
pub struct CompositeDesc {
    pub name: &'static str,
    pub fields: fn() -> Vec<FieldDescriptor>,
    pub kind: CompositeKind,
}

impl CompositeDesc {
    /// The type name without any module path.
    pub fn short_name(&self) -> &'static str {
        short_type_name(self.name)
    }
}

/// Shape of a type, as seen by the schema converter.
#[derive(Debug, Clone)]
pub enum TypeDesc {
    Primitive(PrimitiveType),
    Composite(CompositeDesc),
    Array(Box<TypeDesc>),
    Map {
        key: Box<TypeDesc>,
        value: Box<TypeDesc>,
    },
    Optional(Box<TypeDesc>),
    Enum {
        name: String,
        variants: Vec<String>,
    },
    /// A composite that has already been converted elsewhere
    Ref(String),
    /// Anything the converter has no structural knowledge about
    Opaque(String),
}

impl TypeDesc {
    pub fn state_node(name: &'static str, fields: fn() -> Vec<FieldDescriptor>) -> Self {
        TypeDesc::Composite(CompositeDesc {
            name,
            fields,
            kind: CompositeKind::StateNode,
        })
    }

    pub fn payload(name: &'static str, fields: fn() -> Vec<FieldDescriptor>) -> Self {
        TypeDesc::Composite(CompositeDesc {
            name,
            fields,
            kind: CompositeKind::Payload,
        })
    }

    pub fn enumeration(name: &str, variants: &[&str]) -> Self {
        TypeDesc::Enum {
            name: short_type_name(name).to_string(),
            variants: variants.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn array_of(element: TypeDesc) -> Self {
        TypeDesc::Array(Box::new(element))
    }

    pub fn map_of(key: TypeDesc, value: TypeDesc) -> Self {
        TypeDesc::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    /// Node kind inferred from the shape alone.
    pub fn inferred_node_kind(&self) -> NodeKind {
        match self {
            TypeDesc::Composite(_) | TypeDesc::Ref(_) => NodeKind::Object,
            TypeDesc::Array(_) => NodeKind::Array,
            TypeDesc::Map { .. } => NodeKind::Map,
            TypeDesc::Optional(inner) => inner.inferred_node_kind(),
            TypeDesc::Primitive(_) | TypeDesc::Enum { .. } | TypeDesc::Opaque(_) => NodeKind::Leaf,
        }
    }

    /// Human-readable name used for `innerType`/`keyType` documentation.
    pub fn display_name(&self) -> String {
        match self {
            TypeDesc::Primitive(p) => p.display_name().to_string(),
            TypeDesc::Composite(c) => c.short_name().to_string(),
            TypeDesc::Array(elem) => format!("Array<{}>", elem.display_name()),
            TypeDesc::Map { key, value } => {
                format!("Map<{}, {}>", key.display_name(), value.display_name())
            }
            TypeDesc::Optional(inner) => format!("Optional<{}>", inner.display_name()),
            TypeDesc::Enum { name, .. } => name.clone(),
            TypeDesc::Ref(name) | TypeDesc::Opaque(name) => short_type_name(name).to_string(),
        }
    }
}

/// Strips any `module::` or `module.` prefix from a type name.
pub fn short_type_name(name: &str) -> &str {
    let after_colons = name.rsplit("::").next().unwrap_or(name);
    after_colons.rsplit('.').next().unwrap_or(after_colons)
}

/// The externally supplied description of one field.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub type_desc: fn() -> TypeDesc,
    pub policy: Option<PolicyKind>,
    pub node_kind: Option<NodeKind>,
    pub default_value: Option<SnapshotValue>,
}

impl FieldDescriptor {
    pub fn new<T: Describe>(name: impl Into<String>) -> Self {
        Self::with_type(name, T::describe)
    }

    pub fn with_type(name: impl Into<String>, type_desc: fn() -> TypeDesc) -> Self {
        Self {
            name: name.into(),
            type_desc,
            policy: None,
            node_kind: None,
            default_value: None,
        }
    }

    pub fn policy(mut self, policy: PolicyKind) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn node_kind(mut self, kind: NodeKind) -> Self {
        self.node_kind = Some(kind);
        self
    }

    pub fn default_value(mut self, value: impl Into<SnapshotValue>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn describe_type(&self) -> TypeDesc {
        (self.type_desc)()
    }

    /// Explicit node kind if one was given, otherwise the inferred one.
    pub fn resolved_node_kind(&self) -> NodeKind {
        self.node_kind
            .unwrap_or_else(|| self.describe_type().inferred_node_kind())
    }
}

/// Supplies a static description of a type.
pub trait Describe {
    fn describe() -> TypeDesc;
}

macro_rules! describe_primitive {
    ($kind:expr => $($ty:ty),+ $(,)?) => {
        $(
            impl Describe for $ty {
                fn describe() -> TypeDesc {
                    TypeDesc::Primitive($kind)
                }
            }
        )+
    };
}

describe_primitive!(PrimitiveType::Boolean => bool);
describe_primitive!(PrimitiveType::Integer => i8, i16, i32, i64, u8, u16, u32, u64, isize, usize);
describe_primitive!(PrimitiveType::Number => f32, f64);
describe_primitive!(PrimitiveType::String => String, char);
describe_primitive!(PrimitiveType::Null => ());

impl Describe for SnapshotValue {
    fn describe() -> TypeDesc {
        TypeDesc::Opaque("Any".to_string())
    }
}

impl Describe for serde_json::Value {
    fn describe() -> TypeDesc {
        TypeDesc::Opaque("Any".to_string())
    }
}

impl<T: Describe> Describe for Box<T> {
    fn describe() -> TypeDesc {
        T::describe()
    }
}

impl<T: Describe> Describe for Option<T> {
    fn describe() -> TypeDesc {
        TypeDesc::Optional(Box::new(T::describe()))
    }
}

impl<T: Describe> Describe for Vec<T> {
    fn describe() -> TypeDesc {
        TypeDesc::array_of(T::describe())
    }
}

impl<T: Describe> Describe for VecDeque<T> {
    fn describe() -> TypeDesc {
        TypeDesc::array_of(T::describe())
    }
}

impl<T: Describe> Describe for HashSet<T> {
    fn describe() -> TypeDesc {
        TypeDesc::array_of(T::describe())
    }
}

impl<T: Describe> Describe for BTreeSet<T> {
    fn describe() -> TypeDesc {
        TypeDesc::array_of(T::describe())
    }
}

impl<K: Describe, V: Describe> Describe for HashMap<K, V> {
    fn describe() -> TypeDesc {
        TypeDesc::map_of(K::describe(), V::describe())
    }
}

impl<K: Describe, V: Describe> Describe for BTreeMap<K, V> {
    fn describe() -> TypeDesc {
        TypeDesc::map_of(K::describe(), V::describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tree;

    impl Describe for Tree {
        fn describe() -> TypeDesc {
            TypeDesc::state_node("game::Tree", || {
                vec![
                    FieldDescriptor::new::<String>("label").policy(PolicyKind::Broadcast),
                    FieldDescriptor::new::<Vec<Tree>>("children").policy(PolicyKind::Broadcast),
                ]
            })
        }
    }

    #[test]
    fn test_self_referential_description_is_lazy() {
        let TypeDesc::Composite(tree) = Tree::describe() else {
            panic!("expected composite");
        };
        assert_eq!(tree.short_name(), "Tree");

        let fields = (tree.fields)();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].resolved_node_kind(), NodeKind::Array);
    }

    #[test]
    fn test_inferred_node_kinds() {
        assert_eq!(i64::describe().inferred_node_kind(), NodeKind::Leaf);
        assert_eq!(Vec::<u8>::describe().inferred_node_kind(), NodeKind::Array);
        assert_eq!(
            HashMap::<String, bool>::describe().inferred_node_kind(),
            NodeKind::Map
        );
        assert_eq!(
            Option::<Vec<u8>>::describe().inferred_node_kind(),
            NodeKind::Array
        );
        assert_eq!(
            SnapshotValue::describe().inferred_node_kind(),
            NodeKind::Leaf
        );
    }

    #[test]
    fn test_explicit_node_kind_wins() {
        let field = FieldDescriptor::new::<SnapshotValue>("blob").node_kind(NodeKind::Map);
        assert_eq!(field.resolved_node_kind(), NodeKind::Map);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(
            HashMap::<String, Option<f64>>::describe().display_name(),
            "Map<String, Optional<Double>>"
        );
        assert_eq!(short_type_name("a::b::Name"), "Name");
        assert_eq!(short_type_name("Module.Name"), "Name");
        assert_eq!(short_type_name("Plain"), "Plain");
    }

    #[test]
    fn test_policy_kind_legacy_alias() {
        let kind: PolicyKind = serde_json::from_str("\"perPlayerDictionaryValue\"").unwrap();
        assert_eq!(kind, PolicyKind::PerPlayerSlice);
        assert_eq!(
            serde_json::to_string(&PolicyKind::ServerOnly).unwrap(),
            "\"serverOnly\""
        );
    }
}
