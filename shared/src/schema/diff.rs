//! Wire shape of incremental state updates.
//!
//! Only the shape is fixed here; producing patches from two snapshots is left
//! to whoever sends them.

use super::node::SchemaNode;
use crate::descriptor::PrimitiveType;
use crate::value::SnapshotValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const STATE_DIFF_DEF: &str = "StateDiff";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
}

impl PatchOp {
    pub const ALL: [PatchOp; 3] = [PatchOp::Add, PatchOp::Remove, PatchOp::Replace];

    pub fn as_str(self) -> &'static str {
        match self {
            PatchOp::Add => "add",
            PatchOp::Remove => "remove",
            PatchOp::Replace => "replace",
        }
    }
}

/// One entry of a `StateDiff`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatePatch {
    pub op: PatchOp,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<SnapshotValue>,
}

impl StatePatch {
    pub fn replace(path: impl Into<String>, value: SnapshotValue) -> Self {
        Self {
            op: PatchOp::Replace,
            path: path.into(),
            value: Some(value),
        }
    }

    pub fn add(path: impl Into<String>, value: SnapshotValue) -> Self {
        Self {
            op: PatchOp::Add,
            path: path.into(),
            value: Some(value),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Remove,
            path: path.into(),
            value: None,
        }
    }
}

/// A batch of patches as sent on the wire.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateDiff {
    pub patches: Vec<StatePatch>,
}

/// Schema of [`StateDiff`]: `{ patches: [{ op, path, value? }] }`.
pub fn state_diff_schema() -> SchemaNode {
    let mut entry_props = BTreeMap::new();
    entry_props.insert(
        "op".to_string(),
        SchemaNode::string_enum(PatchOp::ALL.iter().map(|op| op.as_str().to_string()).collect()),
    );
    entry_props.insert("path".to_string(), SchemaNode::leaf(PrimitiveType::String));
    entry_props.insert("value".to_string(), SchemaNode::any());

    let mut entry = SchemaNode::object(entry_props);
    entry.required.remove("value");

    let mut diff_props = BTreeMap::new();
    diff_props.insert("patches".to_string(), SchemaNode::array(entry));
    SchemaNode::object(diff_props)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_diff_schema_shape() {
        let schema = serde_json::to_value(state_diff_schema()).unwrap();
        assert_eq!(schema["required"], json!(["patches"]));

        let entry = &schema["properties"]["patches"]["items"];
        assert_eq!(entry["required"], json!(["op", "path"]));
        assert_eq!(entry["properties"]["op"]["enum"], json!(["add", "remove", "replace"]));
    }

    #[test]
    fn test_patch_json_omits_missing_value() {
        let json = serde_json::to_value(StatePatch::remove("players.p1")).unwrap();
        assert_eq!(json, json!({"op": "remove", "path": "players.p1"}));
    }
}
