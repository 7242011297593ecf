//! `schema.ts`: TypeScript declarations for every definition plus the
//! schema hash, protocol version and wire path-hash tables.

use shared::descriptor::PolicyKind;
use shared::schema::{PrimitiveOrContainer, ProtocolSchema, SchemaNode};
use std::collections::BTreeMap;

pub const HEADER: &str = "// Generated by statesync codegen. Do not edit.";

/// A JS string literal for `value`.
pub fn string_literal(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Turns a definition name into a valid TypeScript identifier.
pub fn type_name(name: &str) -> String {
    let mut ident: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}

/// `my-land` → `MyLand`
pub fn pascal_case(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    let mut upper = true;
    for c in id.chars() {
        if c.is_ascii_alphanumeric() {
            if upper {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
            upper = false;
        } else {
            upper = true;
        }
    }
    type_name(&out)
}

fn property_key(name: &str) -> String {
    let is_ident = name
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if is_ident {
        name.to_string()
    } else {
        string_literal(name)
    }
}

fn is_optional(node: &SchemaNode) -> bool {
    node.node_meta.as_ref().map_or(false, |meta| meta.optional)
}

/// TypeScript type expression for a schema node.
pub fn ts_type(node: &SchemaNode) -> String {
    let base = base_type(node);
    if is_optional(node) {
        format!("{} | null", base)
    } else {
        base
    }
}

fn base_type(node: &SchemaNode) -> String {
    if let Some(name) = node.ref_name() {
        return type_name(name);
    }
    if let Some(variants) = &node.enum_values {
        if variants.is_empty() {
            return "never".to_string();
        }
        return variants
            .iter()
            .map(|v| string_literal(v))
            .collect::<Vec<_>>()
            .join(" | ");
    }

    match node.schema_type {
        Some(PrimitiveOrContainer::String) => "string".to_string(),
        Some(PrimitiveOrContainer::Integer) | Some(PrimitiveOrContainer::Number) => {
            "number".to_string()
        }
        Some(PrimitiveOrContainer::Boolean) => "boolean".to_string(),
        Some(PrimitiveOrContainer::Null) => "null".to_string(),
        Some(PrimitiveOrContainer::Array) => {
            let element = node.items.as_deref().map_or_else(|| "unknown".to_string(), ts_type);
            if element.contains(' ') {
                format!("({})[]", element)
            } else {
                format!("{}[]", element)
            }
        }
        Some(PrimitiveOrContainer::Object) => match (&node.properties, node.map_values()) {
            (Some(properties), _) => inline_object(properties, &node.required),
            (None, Some(values)) => format!("Record<string, {}>", ts_type(values)),
            (None, None) => "Record<string, unknown>".to_string(),
        },
        Some(PrimitiveOrContainer::Other(_)) | None => "unknown".to_string(),
    }
}

fn inline_object(
    properties: &BTreeMap<String, SchemaNode>,
    required: &std::collections::BTreeSet<String>,
) -> String {
    let fields: Vec<String> = properties
        .iter()
        .filter(|(_, node)| node.policy() != Some(PolicyKind::ServerOnly))
        .map(|(name, node)| {
            let marker = if field_is_optional(name, node, required) { "?" } else { "" };
            format!("{}{}: {}", property_key(name), marker, ts_type(node))
        })
        .collect();
    if fields.is_empty() {
        "{}".to_string()
    } else {
        format!("{{ {} }}", fields.join("; "))
    }
}

/// A field may be absent from what a client receives: filtered policies
/// hide it from some viewers, optionals are omitted when empty.
fn field_is_optional(
    name: &str,
    node: &SchemaNode,
    required: &std::collections::BTreeSet<String>,
) -> bool {
    let filtered = matches!(
        node.policy(),
        Some(PolicyKind::PerPlayer)
            | Some(PolicyKind::PerPlayerSlice)
            | Some(PolicyKind::Masked)
            | Some(PolicyKind::Custom)
    );
    filtered || is_optional(node) || !required.contains(name)
}

fn push_interface(out: &mut String, name: &str, node: &SchemaNode) {
    let Some(properties) = &node.properties else {
        out.push_str(&format!("export type {} = {};\n\n", type_name(name), ts_type(node)));
        return;
    };

    out.push_str(&format!("export interface {} {{\n", type_name(name)));
    for (field, child) in properties {
        match child.policy() {
            Some(PolicyKind::ServerOnly) => continue,
            Some(policy) if policy != PolicyKind::Broadcast => {
                out.push_str(&format!("  /** sync: {} */\n", policy.as_str()));
            }
            _ => {}
        }
        let marker = if field_is_optional(field, child, &node.required) {
            "?"
        } else {
            ""
        };
        out.push_str(&format!(
            "  {}{}: {};\n",
            property_key(field),
            marker,
            ts_type(child)
        ));
    }
    out.push_str("}\n\n");
}

fn push_message_map(out: &mut String, name: &str, messages: &BTreeMap<String, SchemaNode>) {
    if messages.is_empty() {
        out.push_str(&format!("export type {} = Record<string, never>;\n\n", name));
        return;
    }
    out.push_str(&format!("export interface {} {{\n", name));
    for (id, node) in messages {
        out.push_str(&format!("  {}: {};\n", property_key(id), ts_type(node)));
    }
    out.push_str("}\n\n");
}

const MERGE_HELPERS: &str = r#"function isPlainObject(value: unknown): value is Record<string, unknown> {
  return typeof value === "object" && value !== null && !Array.isArray(value);
}

/** Deep-merges `part` into `target`; objects merge, everything else replaces. */
export function mergeSnapshot(
  target: Record<string, unknown>,
  part: Record<string, unknown>,
): Record<string, unknown> {
  const out: Record<string, unknown> = { ...target };
  for (const [key, value] of Object.entries(part)) {
    const current = out[key];
    out[key] = isPlainObject(current) && isPlainObject(value) ? mergeSnapshot(current, value) : value;
  }
  return out;
}

/**
 * Applies one sync round to a client view. Broadcast fields replace the
 * previous value; the viewer's own part is merged on top of them.
 */
export function applySyncParts<T extends object>(
  base: Partial<T>,
  mode: SyncMode,
  broadcast: Partial<T>,
  perPlayer: Partial<T>,
): Partial<T> {
  const next: Record<string, unknown> = mode === "full" ? { ...broadcast } : { ...base, ...broadcast };
  for (const [key, value] of Object.entries(perPlayer)) {
    const shared = (broadcast as Record<string, unknown>)[key];
    next[key] = isPlainObject(shared) && isPlainObject(value) ? mergeSnapshot(shared, value) : value;
  }
  return next as Partial<T>;
}
"#;

/// Renders the whole `schema.ts` module.
pub fn render_schema_module(schema: &ProtocolSchema) -> String {
    let mut out = String::new();
    out.push_str(HEADER);
    out.push_str("\n\n");
    out.push_str(&format!(
        "export const PROTOCOL_VERSION = {};\n",
        string_literal(&schema.version)
    ));
    out.push_str(&format!(
        "export const SCHEMA_HASH = {};\n\n",
        string_literal(&schema.schema_hash)
    ));
    out.push_str("export type SyncMode = \"incremental\" | \"full\";\n\n");

    for (name, node) in &schema.defs {
        push_interface(&mut out, name, node);
    }

    for (land_id, land) in &schema.lands {
        let prefix = pascal_case(land_id);
        push_message_map(&mut out, &format!("{}Actions", prefix), &land.actions);
        push_message_map(&mut out, &format!("{}ClientEvents", prefix), &land.client_events);
        push_message_map(&mut out, &format!("{}Events", prefix), &land.events);
    }

    let land_ids: Vec<String> = schema.lands.keys().map(|id| string_literal(id)).collect();
    out.push_str(&format!(
        "export const LAND_IDS = [{}] as const;\n",
        land_ids.join(", ")
    ));
    out.push_str("export type LandId = (typeof LAND_IDS)[number];\n\n");

    out.push_str("export const PATH_HASHES: Record<LandId, Record<string, number>> = {\n");
    for (land_id, land) in &schema.lands {
        out.push_str(&format!("  {}: {{\n", string_literal(land_id)));
        for (path, hash) in &land.path_hashes {
            out.push_str(&format!("    {}: {},\n", string_literal(path), hash));
        }
        out.push_str("  },\n");
    }
    out.push_str("};\n\n");

    out.push_str(
        "export function pathHash(landId: LandId, path: string): number | undefined {\n  \
         return PATH_HASHES[landId][path];\n}\n\n",
    );
    out.push_str(MERGE_HELPERS);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::descriptor::{Describe, FieldDescriptor, PolicyKind, TypeDesc};
    use shared::schema::LandDefinition;

    struct Hero;
    impl Describe for Hero {
        fn describe() -> TypeDesc {
            TypeDesc::state_node("Hero", || {
                vec![
                    FieldDescriptor::new::<String>("name").policy(PolicyKind::Broadcast),
                    FieldDescriptor::new::<Option<i64>>("level").policy(PolicyKind::Broadcast),
                    FieldDescriptor::new::<Vec<String>>("bag").policy(PolicyKind::PerPlayer),
                    FieldDescriptor::new::<u64>("seed").policy(PolicyKind::ServerOnly),
                    FieldDescriptor::with_type("class", || {
                        TypeDesc::enumeration("Class", &["mage", "rogue"])
                    })
                    .policy(PolicyKind::Broadcast),
                ]
            })
        }
    }

    struct HealAction;
    impl Describe for HealAction {
        fn describe() -> TypeDesc {
            TypeDesc::payload("HealAction", || vec![FieldDescriptor::new::<i64>("amount")])
        }
    }

    fn schema() -> ProtocolSchema {
        ProtocolSchema::builder()
            .land(LandDefinition::new::<Hero>("hero-land").action::<HealAction>())
            .build()
            .unwrap()
    }

    #[test]
    fn test_names() {
        assert_eq!(type_name("Player State"), "Player_State");
        assert_eq!(type_name("3d"), "_3d");
        assert_eq!(pascal_case("hero-land"), "HeroLand");
        assert_eq!(pascal_case("arena"), "Arena");
        assert_eq!(property_key("hp"), "hp");
        assert_eq!(property_key("max-hp"), "\"max-hp\"");
    }

    #[test]
    fn test_ts_type_mapping() {
        assert_eq!(ts_type(&SchemaNode::reference("Hero")), "Hero");
        assert_eq!(
            ts_type(&SchemaNode::string_enum(vec!["a".into(), "b".into()])),
            "\"a\" | \"b\""
        );
        assert_eq!(
            ts_type(&SchemaNode::array(SchemaNode::string_enum(vec!["a".into(), "b".into()]))),
            "(\"a\" | \"b\")[]"
        );
        assert_eq!(
            ts_type(&SchemaNode::map(SchemaNode::reference("Hero"))),
            "Record<string, Hero>"
        );
        assert_eq!(ts_type(&SchemaNode::any()), "unknown");
    }

    #[test]
    fn test_schema_module() {
        let schema = schema();
        let module = render_schema_module(&schema);

        assert!(module.starts_with(HEADER));
        assert!(module.contains(&format!("export const SCHEMA_HASH = \"{}\";", schema.schema_hash)));
        assert!(module.contains("export const PROTOCOL_VERSION = \"0.1.0\";"));
        assert!(module.contains("export interface Hero {"));
        assert!(module.contains("  name: string;"));
        assert!(module.contains("  level?: number | null;"));
        assert!(module.contains("  /** sync: perPlayer */\n  bag?: string[];"));
        assert!(module.contains("  class: \"mage\" | \"rogue\";"));
        assert!(!module.contains("  seed:"));
        assert!(module.contains("export interface HeroLandActions {\n  heal: HealAction;\n}"));
        assert!(module.contains("export type HeroLandEvents = Record<string, never>;"));

        let hash = schema.path_hash("hero-land", "name").unwrap();
        assert!(module.contains(&format!("    \"name\": {},", hash)));
    }
}
