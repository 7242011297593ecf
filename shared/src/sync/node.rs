//! State nodes and the snapshot engine.
//!
//! A state node lists its synchronizable fields; every snapshot operation is
//! a provided method driven by that list. `snapshot_for_sync` walks the tree
//! once per round and produces the broadcast snapshot together with each
//! viewer's per-player part, so the cost grows with the tree rather than with
//! tree size times viewer count.

use super::field::FieldSlot;
use super::policy::PlayerId;
use crate::descriptor::PolicyKind;
use crate::error::SnapshotError;
use crate::value::StateSnapshot;
use std::collections::{BTreeSet, HashMap};

/// Output of one sync round.
///
/// Per-player snapshots carry only what the broadcast one lacks, so
/// `broadcast.merged_with(&per_player[v])` is the full view of `v`. Each
/// viewer's result is independent of the others.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSnapshots {
    pub broadcast: Result<StateSnapshot, SnapshotError>,
    pub per_player: HashMap<PlayerId, Result<StateSnapshot, SnapshotError>>,
}

impl SyncSnapshots {
    /// The complete view of one viewer, if both parts succeeded.
    pub fn full_view(&self, viewer: &PlayerId) -> Option<Result<StateSnapshot, SnapshotError>> {
        let part = self.per_player.get(viewer)?;
        Some(match (&self.broadcast, part) {
            (Ok(broadcast), Ok(part)) => Ok(broadcast.merged_with(part)),
            (Err(e), _) | (_, Err(e)) => Err(e.clone()),
        })
    }
}

fn includes(dirty: Option<&BTreeSet<String>>, name: &str) -> bool {
    dirty.map_or(true, |set| set.contains(name))
}

/// A synchronizable composite: the root of a land's state or a nested
/// sub-tree.
///
/// Implement with [`state_node!`](crate::state_node).
pub trait StateNode {
    fn sync_fields(&self) -> Vec<(&'static str, &dyn FieldSlot)>;

    fn sync_fields_mut(&mut self) -> Vec<(&'static str, &mut dyn FieldSlot)>;

    fn is_dirty(&self) -> bool {
        self.sync_fields().iter().any(|(_, field)| field.is_dirty())
    }

    /// Names of top-level fields that are dirty themselves or hold dirty
    /// nested nodes.
    fn dirty_fields(&self) -> BTreeSet<String> {
        self.sync_fields()
            .into_iter()
            .filter(|(_, field)| field.is_dirty())
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Dotted paths of every dirty field, nested ones included, e.g.
    /// `players.alice.hp`.
    fn dirty_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (name, field) in self.sync_fields() {
            field.collect_dirty_paths(name, &mut out);
        }
        out
    }

    fn clear_dirty(&mut self) {
        for (_, field) in self.sync_fields_mut() {
            field.clear_dirty();
        }
    }

    /// Every field visible to `viewer`, restricted to `dirty` when given.
    ///
    /// Unknown names in `dirty` are ignored.
    fn snapshot(
        &self,
        viewer: &PlayerId,
        dirty: Option<&BTreeSet<String>>,
    ) -> Result<StateSnapshot, SnapshotError> {
        let mut snapshot = StateSnapshot::new();
        for (name, field) in self.sync_fields() {
            if !includes(dirty, name) {
                continue;
            }
            if let Some(value) = field.visible_value(viewer) {
                snapshot.insert(name, value.map_err(|e| e.within(name))?);
            }
        }
        Ok(snapshot)
    }

    /// The broadcast-policy fields, identical for every viewer.
    fn broadcast_snapshot(
        &self,
        dirty: Option<&BTreeSet<String>>,
    ) -> Result<StateSnapshot, SnapshotError> {
        let mut snapshot = StateSnapshot::new();
        for (name, field) in self.sync_fields() {
            if !includes(dirty, name) {
                continue;
            }
            if let Some(value) = field.broadcast_part() {
                snapshot.insert(name, value.map_err(|e| e.within(name))?);
            }
        }
        Ok(snapshot)
    }

    /// Broadcast snapshot and per-player parts for all `viewers` in one walk.
    fn snapshot_for_sync(
        &self,
        viewers: &[PlayerId],
        dirty: Option<&BTreeSet<String>>,
    ) -> SyncSnapshots {
        let mut broadcast = Ok(StateSnapshot::new());
        let mut per_player: HashMap<PlayerId, Result<StateSnapshot, SnapshotError>> = viewers
            .iter()
            .map(|viewer| (viewer.clone(), Ok(StateSnapshot::new())))
            .collect();

        for (name, field) in self.sync_fields() {
            if !includes(dirty, name) || field.policy_kind() == PolicyKind::ServerOnly {
                continue;
            }

            let split = match field.sync_parts(viewers) {
                Ok(split) => split,
                Err(e) => {
                    if broadcast.is_ok() {
                        broadcast = Err(e.within(name));
                    }
                    continue;
                }
            };

            if let (Some(shared), Ok(snapshot)) = (split.shared, broadcast.as_mut()) {
                snapshot.insert(name, shared);
            }

            for (viewer, part) in split.per_viewer {
                let Some(slot) = per_player.get_mut(&viewer) else {
                    continue;
                };
                match part {
                    Ok(value) => {
                        if let Ok(snapshot) = slot {
                            snapshot.insert(name, value);
                        }
                    }
                    Err(e) => {
                        if slot.is_ok() {
                            *slot = Err(e.within(name));
                        }
                    }
                }
            }
        }

        SyncSnapshots {
            broadcast,
            per_player,
        }
    }
}

/// Implements [`StateNode`] for a struct of [`SyncField`](super::SyncField)s
/// and makes it usable as a nested value.
///
/// ```ignore
/// state_node!(PlayerState { hp, position, inventory });
/// ```
///
/// Field names double as wire names.
#[macro_export]
macro_rules! state_node {
    ($ty:ident { $($field:ident),* $(,)? }) => {
        impl $crate::sync::StateNode for $ty {
            fn sync_fields(&self) -> Vec<(&'static str, &dyn $crate::sync::FieldSlot)> {
                vec![$((stringify!($field), &self.$field as &dyn $crate::sync::FieldSlot)),*]
            }

            fn sync_fields_mut(
                &mut self,
            ) -> Vec<(&'static str, &mut dyn $crate::sync::FieldSlot)> {
                vec![$((stringify!($field), &mut self.$field as &mut dyn $crate::sync::FieldSlot)),*]
            }
        }

        $crate::state_node_value!($ty);
    };
}

/// Implements [`SyncValue`](super::SyncValue) for a type that already
/// implements [`StateNode`], so it can sit inside other fields.
#[macro_export]
macro_rules! state_node_value {
    ($ty:ty) => {
        impl $crate::sync::SyncValue for $ty {
            fn broadcast_value(
                &self,
            ) -> ::std::result::Result<$crate::SnapshotValue, $crate::SnapshotError> {
                <$ty as $crate::sync::StateNode>::broadcast_snapshot(self, None)
                    .map($crate::StateSnapshot::into_value)
            }

            fn viewer_value(
                &self,
                viewer: &$crate::sync::PlayerId,
            ) -> ::std::result::Result<$crate::SnapshotValue, $crate::SnapshotError> {
                <$ty as $crate::sync::StateNode>::snapshot(self, viewer, None)
                    .map($crate::StateSnapshot::into_value)
            }

            fn split_value(
                &self,
                viewers: &[$crate::sync::PlayerId],
            ) -> ::std::result::Result<$crate::sync::SplitValue, $crate::SnapshotError> {
                let snapshots = <$ty as $crate::sync::StateNode>::snapshot_for_sync(self, viewers, None);
                let shared = snapshots.broadcast?.into_value();
                let per_viewer = snapshots
                    .per_player
                    .into_iter()
                    .filter(|(_, part)| !matches!(part, Ok(snapshot) if snapshot.is_empty()))
                    .map(|(viewer, part)| (viewer, part.map($crate::StateSnapshot::into_value)))
                    .collect();
                Ok($crate::sync::SplitValue {
                    shared: Some(shared),
                    per_viewer,
                })
            }

            fn is_nested_dirty(&self) -> bool {
                <$ty as $crate::sync::StateNode>::is_dirty(self)
            }

            fn clear_nested_dirty(&mut self) {
                <$ty as $crate::sync::StateNode>::clear_dirty(self)
            }

            fn collect_dirty_paths(&self, path: &str, out: &mut Vec<String>) {
                for nested in <$ty as $crate::sync::StateNode>::dirty_paths(self) {
                    out.push(format!("{}.{}", path, nested));
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{SyncField, SyncPolicy};
    use serde_json::json;
    use std::collections::BTreeMap;

    struct Hero {
        hp: SyncField<i64>,
        secret: SyncField<String>,
    }
    crate::state_node!(Hero { hp, secret });

    impl Hero {
        fn new(owner: &str, hp: i64) -> Self {
            let owner = PlayerId::new(owner);
            Self {
                hp: SyncField::broadcast(hp),
                secret: SyncField::new(
                    format!("{}-plan", owner),
                    SyncPolicy::per_player(move |v: &String, viewer: &PlayerId| {
                        (viewer == &owner).then(|| v.clone())
                    }),
                ),
            }
        }
    }

    struct Arena {
        round: SyncField<i64>,
        heroes: SyncField<BTreeMap<PlayerId, Hero>>,
        hands: SyncField<BTreeMap<PlayerId, Vec<i64>>>,
        seed: SyncField<u64>,
        score: SyncField<i64>,
    }
    crate::state_node!(Arena { round, heroes, hands, seed, score });

    fn p(id: &str) -> PlayerId {
        PlayerId::new(id)
    }

    fn arena() -> Arena {
        let mut heroes = BTreeMap::new();
        heroes.insert(p("alice"), Hero::new("alice", 100));
        heroes.insert(p("bob"), Hero::new("bob", 80));

        let mut hands = BTreeMap::new();
        hands.insert(p("alice"), vec![1, 2]);
        hands.insert(p("bob"), vec![9]);

        Arena {
            round: SyncField::broadcast(1),
            heroes: SyncField::broadcast(heroes),
            hands: SyncField::new(hands, SyncPolicy::per_player_slice()),
            seed: SyncField::server_only(42),
            score: SyncField::new(57, SyncPolicy::masked(|v: &i64| v / 10 * 10)),
        }
    }

    #[test]
    fn test_dirty_round_trip() {
        let mut state = arena();
        assert!(!state.is_dirty());

        state.round.set(2);
        let dirty = state.dirty_fields();
        assert_eq!(dirty, BTreeSet::from(["round".to_string()]));

        let snapshot = state.snapshot(&p("alice"), Some(&dirty)).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("round").and_then(|v| v.as_i64()), Some(2));

        state.clear_dirty();
        assert!(!state.is_dirty());
    }

    #[test]
    fn test_nested_dirty_propagates() {
        let mut state = arena();
        if let Some(hero) = state.heroes.nested_mut().get_mut(&p("bob")) {
            hero.hp.set(70);
        }

        assert!(state.is_dirty());
        assert_eq!(state.dirty_fields(), BTreeSet::from(["heroes".to_string()]));
        assert_eq!(state.dirty_paths(), vec!["heroes.bob.hp".to_string()]);

        state.clear_dirty();
        assert!(!state.is_dirty());
        assert!(state.dirty_paths().is_empty());
    }

    #[test]
    fn test_viewer_snapshot_applies_policies() {
        let state = arena();
        let view = state.snapshot(&p("alice"), None).unwrap().to_json();

        assert_eq!(view["round"], json!(1));
        assert_eq!(view["hands"], json!({"alice": [1, 2]}));
        assert_eq!(view["score"], json!(50));
        assert!(view.get("seed").is_none());
        assert_eq!(view["heroes"]["alice"], json!({"hp": 100, "secret": "alice-plan"}));
        assert_eq!(view["heroes"]["bob"], json!({"hp": 80}));
    }

    #[test]
    fn test_broadcast_snapshot_only_has_broadcast_fields() {
        let state = arena();
        let broadcast = state.broadcast_snapshot(None).unwrap().to_json();
        assert_eq!(
            broadcast,
            json!({
                "round": 1,
                "heroes": {"alice": {"hp": 100}, "bob": {"hp": 80}}
            })
        );
    }

    #[test]
    fn test_snapshot_for_sync_merges_to_viewer_view() {
        let state = arena();
        let viewers = vec![p("alice"), p("bob"), p("carol")];
        let snapshots = state.snapshot_for_sync(&viewers, None);

        let broadcast = snapshots.broadcast.clone().unwrap();
        assert_eq!(broadcast, state.broadcast_snapshot(None).unwrap());

        for viewer in &viewers {
            let part = snapshots.per_player[viewer].as_ref().unwrap();
            assert!(!part.contains("round"));
            assert_eq!(
                broadcast.merged_with(part),
                state.snapshot(viewer, None).unwrap(),
                "view of {}",
                viewer
            );
        }

        let carol = snapshots.per_player[&p("carol")].as_ref().unwrap();
        assert!(!carol.contains("hands"));
        assert!(!carol.contains("heroes"));
    }

    #[test]
    fn test_dirty_set_restricts_and_ignores_unknown_names() {
        let state = arena();
        let dirty = BTreeSet::from(["score".to_string(), "nope".to_string()]);

        let snapshots = state.snapshot_for_sync(&[p("alice")], Some(&dirty));
        assert!(snapshots.broadcast.as_ref().unwrap().is_empty());
        let part = snapshots.per_player[&p("alice")].as_ref().unwrap();
        assert_eq!(part.fields().collect::<Vec<_>>(), vec!["score"]);
    }

    struct Party {
        members: SyncField<Vec<Hero>>,
    }
    crate::state_node!(Party { members });

    #[test]
    fn test_sequence_of_nodes_splits_per_viewer() {
        let party = Party {
            members: SyncField::broadcast(vec![Hero::new("alice", 100), Hero::new("bob", 80)]),
        };
        let viewers = vec![p("alice"), p("bob")];
        let snapshots = party.snapshot_for_sync(&viewers, None);

        let broadcast = snapshots.broadcast.clone().unwrap();
        assert_eq!(broadcast.to_json()["members"], json!([{"hp": 100}, {"hp": 80}]));

        for viewer in &viewers {
            let part = snapshots.per_player[viewer].as_ref().unwrap();
            assert_eq!(
                broadcast.merged_with(part),
                party.snapshot(viewer, None).unwrap(),
                "view of {}",
                viewer
            );
        }

        let alice = snapshots.per_player[&p("alice")].as_ref().unwrap().to_json();
        assert_eq!(
            alice["members"],
            json!([{"hp": 100, "secret": "alice-plan"}, {"hp": 80}])
        );
    }

    struct Ledger {
        balance: SyncField<u64>,
        owner: SyncField<u64>,
    }
    crate::state_node!(Ledger { balance, owner });

    #[test]
    fn test_conversion_failure_is_scoped_per_viewer() {
        let whale = p("whale");
        let ledger = Ledger {
            balance: SyncField::new(
                u64::MAX,
                SyncPolicy::per_player(move |v: &u64, viewer: &PlayerId| {
                    (viewer == &whale).then_some(*v)
                }),
            ),
            owner: SyncField::new(7, SyncPolicy::per_player(|v: &u64, _: &PlayerId| Some(*v))),
        };

        let snapshots = ledger.snapshot_for_sync(&[p("whale"), p("minnow")], None);
        assert!(snapshots.broadcast.is_ok());
        match &snapshots.per_player[&p("whale")] {
            Err(SnapshotError::Conversion { field, .. }) => assert_eq!(field, "balance"),
            other => panic!("unexpected {:?}", other),
        }
        let minnow = snapshots.per_player[&p("minnow")].as_ref().unwrap();
        assert_eq!(minnow.get("owner").and_then(|v| v.as_i64()), Some(7));
        assert!(snapshots.full_view(&p("whale")).unwrap().is_err());
    }
}
