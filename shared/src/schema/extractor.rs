//! Drives the converter over a land's state, actions and events.

use super::converter::SchemaBuildContext;
use super::diff::{state_diff_schema, STATE_DIFF_DEF};
use super::flatten::flatten;
use super::protocol::{LandSchema, SyncSchema};
use super::node::SchemaNode;
use crate::descriptor::{short_type_name, Describe, TypeDesc};
use crate::error::SchemaError;
use log::{debug, warn};
use std::collections::BTreeMap;

/// Everything registered for one land type.
#[derive(Debug, Clone)]
pub struct LandDefinition {
    pub id: String,
    pub state: TypeDesc,
    pub actions: Vec<TypeDesc>,
    pub client_events: Vec<TypeDesc>,
    pub server_events: Vec<TypeDesc>,
}

impl LandDefinition {
    pub fn new<S: Describe>(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: S::describe(),
            actions: Vec::new(),
            client_events: Vec::new(),
            server_events: Vec::new(),
        }
    }

    pub fn action<A: Describe>(mut self) -> Self {
        self.actions.push(A::describe());
        self
    }

    /// An event sent from clients to the server.
    pub fn client_event<E: Describe>(mut self) -> Self {
        self.client_events.push(E::describe());
        self
    }

    /// An event sent from the server to clients.
    pub fn server_event<E: Describe>(mut self) -> Self {
        self.server_events.push(E::describe());
        self
    }
}

/// Wire identifier of an action or event type.
///
/// Drops any module prefix and a trailing `Action`/`Event`, then lower-cases
/// the first character: `game::MoveAction` → `move`.
pub fn message_id(type_name: &str) -> String {
    let short = short_type_name(type_name);
    let stripped = ["Action", "Event"]
        .iter()
        .find_map(|suffix| short.strip_suffix(suffix).filter(|rest| !rest.is_empty()))
        .unwrap_or(short);

    let mut chars = stripped.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Converts one land into its schema, adding definitions to `ctx`.
pub fn extract_land(
    land: &LandDefinition,
    ctx: &mut SchemaBuildContext,
) -> Result<LandSchema, SchemaError> {
    let TypeDesc::Composite(root) = &land.state else {
        return Err(SchemaError::InvalidRoot {
            land: land.id.clone(),
            type_name: land.state.display_name(),
        });
    };
    let state_type = root.short_name().to_string();

    let snapshot = ctx.convert(&land.state, None);
    let actions = convert_messages(&land.id, "action", &land.actions, ctx);
    let client_events = convert_messages(&land.id, "client event", &land.client_events, ctx);
    let events = convert_messages(&land.id, "event", &land.server_events, ctx);

    ctx.insert_def(STATE_DIFF_DEF, state_diff_schema());

    let path_hashes = flatten(&state_type, ctx.defs());
    debug!(
        "Extracted land '{}': state {}, {} actions, {} client events, {} events, {} paths",
        land.id,
        state_type,
        actions.len(),
        client_events.len(),
        events.len(),
        path_hashes.len()
    );

    Ok(LandSchema {
        state_type,
        actions,
        client_events,
        events,
        sync: SyncSchema {
            snapshot,
            diff: SchemaNode::reference(STATE_DIFF_DEF),
        },
        path_hashes,
    })
}

fn convert_messages(
    land: &str,
    label: &str,
    messages: &[TypeDesc],
    ctx: &mut SchemaBuildContext,
) -> BTreeMap<String, SchemaNode> {
    let mut converted = BTreeMap::new();
    for desc in messages {
        let id = message_id(&desc.display_name());
        if converted.contains_key(&id) {
            warn!(
                "Land '{}' registers {} '{}' twice, keeping the first",
                land, label, id
            );
            continue;
        }
        let node = ctx.convert(desc, None);
        converted.insert(id, node);
    }
    converted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FieldDescriptor, PolicyKind};

    struct Counter;
    impl Describe for Counter {
        fn describe() -> TypeDesc {
            TypeDesc::state_node("Counter", || {
                vec![FieldDescriptor::new::<i64>("count").policy(PolicyKind::Broadcast)]
            })
        }
    }

    struct IncrementAction;
    impl Describe for IncrementAction {
        fn describe() -> TypeDesc {
            TypeDesc::payload("demo::IncrementAction", || {
                vec![FieldDescriptor::new::<i64>("amount")]
            })
        }
    }

    struct PingEvent;
    impl Describe for PingEvent {
        fn describe() -> TypeDesc {
            TypeDesc::payload("PingEvent", Vec::new)
        }
    }

    #[test]
    fn test_message_ids() {
        assert_eq!(message_id("MoveAction"), "move");
        assert_eq!(message_id("game::ChatEvent"), "chat");
        assert_eq!(message_id("Module.ResetGameAction"), "resetGame");
        assert_eq!(message_id("Action"), "action");
        assert_eq!(message_id("Heartbeat"), "heartbeat");
    }

    #[test]
    fn test_extract_land_registers_everything() {
        let land = LandDefinition::new::<Counter>("counter")
            .action::<IncrementAction>()
            .client_event::<PingEvent>()
            .server_event::<PingEvent>();

        let mut ctx = SchemaBuildContext::new();
        let schema = extract_land(&land, &mut ctx).unwrap();

        assert_eq!(schema.state_type, "Counter");
        assert_eq!(
            schema.actions["increment"].ref_name(),
            Some("IncrementAction")
        );
        assert!(schema.client_events.contains_key("ping"));
        assert!(schema.events.contains_key("ping"));
        assert_eq!(schema.sync.snapshot.ref_name(), Some("Counter"));
        assert_eq!(schema.sync.diff.ref_name(), Some(STATE_DIFF_DEF));

        assert!(ctx.has_def("Counter"));
        assert!(ctx.has_def("IncrementAction"));
        assert!(ctx.has_def(STATE_DIFF_DEF));

        // actions are not part of the state graph
        let paths: Vec<&str> = schema.path_hashes.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["count"]);
    }

    #[test]
    fn test_non_composite_root_is_rejected() {
        let land = LandDefinition::new::<i64>("broken");
        let mut ctx = SchemaBuildContext::new();
        let err = extract_land(&land, &mut ctx).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidRoot { .. }));
    }

    #[test]
    fn test_duplicate_actions_keep_first() {
        let land = LandDefinition::new::<Counter>("counter")
            .action::<IncrementAction>()
            .action::<IncrementAction>();
        let mut ctx = SchemaBuildContext::new();
        let schema = extract_land(&land, &mut ctx).unwrap();
        assert_eq!(schema.actions.len(), 1);
    }
}
