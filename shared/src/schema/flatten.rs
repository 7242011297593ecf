//! Enumerates every statically addressable field path of a state type.
//!
//! Map and array children contribute a single `*` segment; literal keys and
//! indices never appear in the table.

use super::hash::path_hash;
use super::node::SchemaNode;
use std::collections::{BTreeMap, HashSet};

pub const WILDCARD: &str = "*";

/// Path string → 32-bit FNV-1a hash, ordered by path.
pub type PathHashes = BTreeMap<String, u32>;

/// Flattens `root` against `defs`. Unknown roots yield an empty table.
pub fn flatten(root: &str, defs: &BTreeMap<String, SchemaNode>) -> PathHashes {
    let mut walker = PathWalker {
        defs,
        hashes: PathHashes::new(),
        seen: HashSet::new(),
        descent: Vec::new(),
    };
    let mut segments = Vec::new();
    walker.visit(&SchemaNode::reference(root), &mut segments);
    walker.hashes
}

struct PathWalker<'a> {
    defs: &'a BTreeMap<String, SchemaNode>,
    hashes: PathHashes,
    /// `(type name, joined path)` pairs already expanded
    seen: HashSet<(String, String)>,
    /// Definitions currently being expanded on this branch
    descent: Vec<&'a str>,
}

impl<'a> PathWalker<'a> {
    fn visit(&mut self, node: &SchemaNode, segments: &mut Vec<String>) {
        if let Some(name) = node.ref_name() {
            self.visit_definition(name, segments);
            return;
        }
        if node.is_atomic() {
            return;
        }

        if let Some(properties) = &node.properties {
            for (name, child) in properties {
                segments.push(name.clone());
                self.emit(segments);
                self.visit(child, segments);
                segments.pop();
            }
        }

        let element = node.map_values().or(node.items.as_deref());
        if let Some(element) = element {
            segments.push(WILDCARD.to_string());
            self.emit(segments);
            self.visit(element, segments);
            segments.pop();
        }
    }

    fn visit_definition(&mut self, name: &str, segments: &mut Vec<String>) {
        let defs = self.defs;
        let Some((def_name, definition)) = defs.get_key_value(name) else {
            return;
        };
        if definition.is_atomic() || self.descent.contains(&def_name.as_str()) {
            return;
        }
        if !self.seen.insert((name.to_string(), segments.join("."))) {
            return;
        }

        self.descent.push(def_name.as_str());
        self.visit(definition, segments);
        self.descent.pop();
    }

    fn emit(&mut self, segments: &[String]) {
        let path = segments.join(".");
        let hash = path_hash(&path);
        self.hashes.insert(path, hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Describe, FieldDescriptor, PolicyKind, TypeDesc};
    use crate::schema::converter::SchemaBuildContext;
    use std::collections::HashMap;

    struct PlayerState;
    impl Describe for PlayerState {
        fn describe() -> TypeDesc {
            TypeDesc::state_node("PlayerState", || {
                vec![FieldDescriptor::new::<i64>("hp").policy(PolicyKind::Broadcast)]
            })
        }
    }

    struct State;
    impl Describe for State {
        fn describe() -> TypeDesc {
            TypeDesc::state_node("State", || {
                vec![
                    FieldDescriptor::new::<i64>("round").policy(PolicyKind::Broadcast),
                    FieldDescriptor::new::<HashMap<String, PlayerState>>("players")
                        .policy(PolicyKind::Broadcast),
                ]
            })
        }
    }

    struct Pair;
    impl Describe for Pair {
        fn describe() -> TypeDesc {
            TypeDesc::state_node("Pair", || {
                vec![
                    FieldDescriptor::new::<PlayerState>("left"),
                    FieldDescriptor::new::<PlayerState>("right"),
                    FieldDescriptor::new::<Vec<Vec<i32>>>("grid"),
                ]
            })
        }
    }

    struct Tree;
    impl Describe for Tree {
        fn describe() -> TypeDesc {
            TypeDesc::state_node("Tree", || {
                vec![
                    FieldDescriptor::new::<String>("label"),
                    FieldDescriptor::new::<Vec<Tree>>("children"),
                ]
            })
        }
    }

    fn defs_for(desc: TypeDesc) -> BTreeMap<String, SchemaNode> {
        let mut ctx = SchemaBuildContext::new();
        ctx.convert(&desc, None);
        ctx.into_defs()
    }

    #[test]
    fn test_map_of_nodes_enumerates_exact_paths() {
        let defs = defs_for(State::describe());
        let hashes = flatten("State", &defs);

        let paths: Vec<&str> = hashes.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["players", "players.*", "players.*.hp", "round"]);
        for (path, hash) in &hashes {
            assert_eq!(*hash, path_hash(path));
        }
    }

    #[test]
    fn test_flatten_is_deterministic() {
        let defs = defs_for(State::describe());
        assert_eq!(flatten("State", &defs), flatten("State", &defs));
    }

    #[test]
    fn test_same_type_at_two_paths_is_flattened_twice() {
        let defs = defs_for(Pair::describe());
        let hashes = flatten("Pair", &defs);

        assert!(hashes.contains_key("left.hp"));
        assert!(hashes.contains_key("right.hp"));
        assert!(hashes.contains_key("grid.*"));
        assert!(hashes.contains_key("grid.*.*"));
        assert_eq!(hashes.len(), 7);
    }

    #[test]
    fn test_recursive_type_terminates() {
        let defs = defs_for(Tree::describe());
        let hashes = flatten("Tree", &defs);

        let paths: Vec<&str> = hashes.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["children", "children.*", "label"]);
    }

    #[test]
    fn test_unknown_root_is_empty() {
        let defs = defs_for(State::describe());
        assert!(flatten("Missing", &defs).is_empty());
    }
}
