//! `<landId>.ts`: a typed client store per land, optionally wrapped in a
//! Vue composable or a React hook.

use crate::error::CodegenError;
use crate::typescript::{pascal_case, string_literal, type_name, HEADER};
use crate::Framework;
use shared::schema::{LandSchema, ProtocolSchema};

/// File name of a land's wrapper. Land ids become file names, so anything
/// that could escape the output directory is refused.
pub fn wrapper_file_name(land_id: &str) -> Result<String, CodegenError> {
    let valid = !land_id.is_empty()
        && land_id != "."
        && land_id != ".."
        && land_id != "schema"
        && !land_id.contains(['/', '\\', '\0']);
    if valid {
        Ok(format!("{}.ts", land_id))
    } else {
        Err(CodegenError::InvalidLandId(land_id.to_string()))
    }
}

fn state_type(schema: &ProtocolSchema, land: &LandSchema) -> Option<String> {
    schema
        .defs
        .contains_key(&land.state_type)
        .then(|| type_name(&land.state_type))
}

fn store_class(land_id: &str, prefix: &str, state: &str) -> String {
    let id = string_literal(land_id);
    format!(
        r#"export type {prefix}View = Partial<{state}>;
type Listener = (state: {prefix}View) => void;

export interface {prefix}ActionPacket<K extends keyof {prefix}Actions = keyof {prefix}Actions> {{
  sequence: number;
  actionId: K;
  payload: {prefix}Actions[K];
}}

/** Client-side view of the "{land_id}" land. */
export class {prefix}Store {{
  readonly landId = {id};
  readonly schemaHash = SCHEMA_HASH;

  private state: {prefix}View = {{}};
  private sequence = 0;
  private listeners = new Set<Listener>();

  get snapshot(): {prefix}View {{
    return this.state;
  }}

  /** Replaces the view with the snapshot received on join. */
  reset(snapshot: {prefix}View): void {{
    this.state = {{ ...snapshot }};
    this.emit();
  }}

  /** Applies one sync round: the shared broadcast part and this player's own part. */
  applySync(mode: SyncMode, broadcast: {prefix}View, perPlayer: {prefix}View): void {{
    this.state = applySyncParts<{state}>(this.state, mode, broadcast, perPlayer);
    this.emit();
  }}

  /** Builds the next action packet; sequences start at 1. */
  action<K extends keyof {prefix}Actions>(actionId: K, payload: {prefix}Actions[K]): {prefix}ActionPacket<K> {{
    this.sequence += 1;
    return {{ sequence: this.sequence, actionId, payload }};
  }}

  subscribe(listener: Listener): () => void {{
    this.listeners.add(listener);
    return () => {{
      this.listeners.delete(listener);
    }};
  }}

  private emit(): void {{
    for (const listener of this.listeners) {{
      listener(this.state);
    }}
  }}
}}
"#
    )
}

fn vue_composable(prefix: &str) -> String {
    format!(
        r#"
export function use{prefix}(store: {prefix}Store = new {prefix}Store()): {{
  state: ShallowRef<{prefix}View>;
  store: {prefix}Store;
}} {{
  const state = shallowRef<{prefix}View>(store.snapshot);
  const unsubscribe = store.subscribe((next) => {{
    state.value = next;
  }});
  onScopeDispose(unsubscribe);
  return {{ state, store }};
}}
"#
    )
}

fn react_hook(prefix: &str) -> String {
    format!(
        r#"
export function use{prefix}(store?: {prefix}Store): {{ state: {prefix}View; store: {prefix}Store }} {{
  const instance = useMemo(() => store ?? new {prefix}Store(), [store]);
  const [state, setState] = useState<{prefix}View>(instance.snapshot);
  useEffect(() => instance.subscribe(setState), [instance]);
  return {{ state, store: instance }};
}}
"#
    )
}

/// Renders the wrapper module of one land.
pub fn render_land_module(
    schema: &ProtocolSchema,
    land_id: &str,
    land: &LandSchema,
    framework: Option<Framework>,
) -> String {
    let prefix = pascal_case(land_id);
    let state = state_type(schema, land);

    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');

    match framework {
        Some(Framework::Vue) => {
            out.push_str("import { onScopeDispose, shallowRef, type ShallowRef } from \"vue\";\n")
        }
        Some(Framework::React) => {
            out.push_str("import { useEffect, useMemo, useState } from \"react\";\n")
        }
        None => {}
    }

    let mut imports = vec![
        "SCHEMA_HASH".to_string(),
        "applySyncParts".to_string(),
        "type SyncMode".to_string(),
        format!("type {}Actions", prefix),
        format!("type {}ClientEvents", prefix),
        format!("type {}Events", prefix),
    ];
    if let Some(state) = &state {
        imports.push(format!("type {}", state));
    }
    out.push_str(&format!(
        "import {{ {} }} from \"./schema\";\n\n",
        imports.join(", ")
    ));

    out.push_str(&format!(
        "export type {{ {prefix}Actions, {prefix}ClientEvents, {prefix}Events }};\n\n"
    ));

    let state = state.unwrap_or_else(|| "Record<string, unknown>".to_string());
    out.push_str(&store_class(land_id, &prefix, &state));

    match framework {
        Some(Framework::Vue) => out.push_str(&vue_composable(&prefix)),
        Some(Framework::React) => out.push_str(&react_hook(&prefix)),
        None => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::descriptor::{Describe, FieldDescriptor, PolicyKind, TypeDesc};
    use shared::schema::LandDefinition;

    struct Room;
    impl Describe for Room {
        fn describe() -> TypeDesc {
            TypeDesc::state_node("RoomState", || {
                vec![FieldDescriptor::new::<String>("topic").policy(PolicyKind::Broadcast)]
            })
        }
    }

    fn schema() -> ProtocolSchema {
        ProtocolSchema::builder()
            .land(LandDefinition::new::<Room>("chat-room"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_wrapper_file_name() {
        assert_eq!(wrapper_file_name("arena").unwrap(), "arena.ts");
        assert!(wrapper_file_name("../etc").is_err());
        assert!(wrapper_file_name("").is_err());
        assert!(wrapper_file_name("schema").is_err());
    }

    #[test]
    fn test_plain_store() {
        let schema = schema();
        let land = schema.land("chat-room").unwrap();
        let module = render_land_module(&schema, "chat-room", land, None);

        assert!(module.contains("type RoomState } from \"./schema\";"));
        assert!(module.contains("export type ChatRoomView = Partial<RoomState>;"));
        assert!(module.contains("export class ChatRoomStore {"));
        assert!(module.contains("readonly landId = \"chat-room\";"));
        assert!(!module.contains("from \"vue\""));
        assert!(!module.contains("export function useChatRoom"));
    }

    #[test]
    fn test_framework_wrappers() {
        let schema = schema();
        let land = schema.land("chat-room").unwrap();

        let vue = render_land_module(&schema, "chat-room", land, Some(Framework::Vue));
        assert!(vue.contains("from \"vue\";"));
        assert!(vue.contains("export function useChatRoom(store: ChatRoomStore = new ChatRoomStore())"));

        let react = render_land_module(&schema, "chat-room", land, Some(Framework::React));
        assert!(react.contains("from \"react\";"));
        assert!(react.contains("export function useChatRoom(store?: ChatRoomStore)"));
    }
}
