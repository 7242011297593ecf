//! Synchronizable fields: a value, its policy and a dirty flag.

use super::policy::{PlayerId, SyncPolicy, Visibility};
use super::value::{SplitValue, SyncValue};
use crate::descriptor::PolicyKind;
use crate::error::SnapshotError;
use crate::value::SnapshotValue;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;
use std::ops::Deref;

/// One field of a state node.
///
/// Every mutating accessor marks the field dirty, whether or not the value
/// actually changed. Freshly constructed fields start clean.
#[derive(Debug, Clone)]
pub struct SyncField<T> {
    value: T,
    policy: SyncPolicy<T>,
    dirty: bool,
}

impl<T> SyncField<T> {
    pub fn new(value: T, policy: SyncPolicy<T>) -> Self {
        Self {
            value,
            policy,
            dirty: false,
        }
    }

    pub fn broadcast(value: T) -> Self {
        Self::new(value, SyncPolicy::Broadcast)
    }

    pub fn server_only(value: T) -> Self {
        Self::new(value, SyncPolicy::ServerOnly)
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn set(&mut self, value: T) {
        self.value = value;
        self.dirty = true;
    }

    /// Mutates the value in place and marks the field dirty.
    pub fn modify<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> R {
        self.dirty = true;
        f(&mut self.value)
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.dirty = true;
        &mut self.value
    }

    /// Mutable access that leaves this field's own flag alone.
    ///
    /// For values holding nested state nodes, which track their own dirty
    /// fields; structural changes still need `get_mut` or a container helper.
    pub fn nested_mut(&mut self) -> &mut T {
        &mut self.value
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn policy(&self) -> &SyncPolicy<T> {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: SyncPolicy<T>) {
        self.policy = policy;
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: SyncValue> SyncField<T> {
    /// Own flag or any nested node's dirty state.
    pub fn is_dirty(&self) -> bool {
        self.dirty || self.value.is_nested_dirty()
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
        self.value.clear_nested_dirty();
    }
}

impl<T> Deref for SyncField<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Default> Default for SyncField<T> {
    fn default() -> Self {
        Self::broadcast(T::default())
    }
}

impl<E> SyncField<Vec<E>> {
    pub fn push(&mut self, item: E) {
        self.get_mut().push(item);
    }

    pub fn insert(&mut self, index: usize, item: E) {
        self.get_mut().insert(index, item);
    }

    pub fn remove(&mut self, index: usize) -> E {
        self.get_mut().remove(index)
    }

    pub fn clear(&mut self) {
        self.get_mut().clear();
    }

    pub fn retain(&mut self, f: impl FnMut(&E) -> bool) {
        self.get_mut().retain(f);
    }
}

impl<K: Ord, V> SyncField<BTreeMap<K, V>> {
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.get_mut().insert(key, value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.get_mut().remove(key)
    }

    pub fn clear(&mut self) {
        self.get_mut().clear();
    }

    pub fn retain(&mut self, f: impl FnMut(&K, &mut V) -> bool) {
        self.get_mut().retain(f);
    }
}

impl<K: Hash + Eq, V> SyncField<HashMap<K, V>> {
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.get_mut().insert(key, value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.get_mut().remove(key)
    }

    pub fn clear(&mut self) {
        self.get_mut().clear();
    }

    pub fn retain(&mut self, f: impl FnMut(&K, &mut V) -> bool) {
        self.get_mut().retain(f);
    }
}

impl<E: Ord> SyncField<BTreeSet<E>> {
    pub fn insert(&mut self, item: E) -> bool {
        self.get_mut().insert(item)
    }

    pub fn remove(&mut self, item: &E) -> bool {
        self.get_mut().remove(item)
    }

    pub fn clear(&mut self) {
        self.get_mut().clear();
    }
}

impl<E: Hash + Eq> SyncField<HashSet<E>> {
    pub fn insert(&mut self, item: E) -> bool {
        self.get_mut().insert(item)
    }

    pub fn remove(&mut self, item: &E) -> bool {
        self.get_mut().remove(item)
    }

    pub fn clear(&mut self) {
        self.get_mut().clear();
    }
}

/// Type-erased view of a [`SyncField`], as listed by a state node.
pub trait FieldSlot {
    fn policy_kind(&self) -> PolicyKind;

    fn is_dirty(&self) -> bool;

    fn clear_dirty(&mut self);

    /// Appends `path` if the field itself is dirty, then any dirty nested
    /// paths below it.
    fn collect_dirty_paths(&self, path: &str, out: &mut Vec<String>);

    /// The field's value in the broadcast snapshot, `None` unless the
    /// policy is broadcast.
    fn broadcast_part(&self) -> Option<Result<SnapshotValue, SnapshotError>>;

    /// The field's value as `viewer` sees it, `None` when hidden.
    fn visible_value(&self, viewer: &PlayerId) -> Option<Result<SnapshotValue, SnapshotError>>;

    /// Shared and per-viewer parts for a whole round of viewers.
    ///
    /// An `Err` means the shared part failed; per-viewer failures are kept
    /// inside the returned parts.
    fn sync_parts(&self, viewers: &[PlayerId]) -> Result<SplitValue, SnapshotError>;
}

impl<T: SyncValue> FieldSlot for SyncField<T> {
    fn policy_kind(&self) -> PolicyKind {
        self.policy.kind()
    }

    fn is_dirty(&self) -> bool {
        SyncField::is_dirty(self)
    }

    fn clear_dirty(&mut self) {
        SyncField::clear_dirty(self)
    }

    fn collect_dirty_paths(&self, path: &str, out: &mut Vec<String>) {
        if self.dirty {
            out.push(path.to_string());
        }
        self.value.collect_dirty_paths(path, out);
    }

    fn broadcast_part(&self) -> Option<Result<SnapshotValue, SnapshotError>> {
        match self.policy {
            SyncPolicy::Broadcast => Some(self.value.broadcast_value()),
            _ => None,
        }
    }

    fn visible_value(&self, viewer: &PlayerId) -> Option<Result<SnapshotValue, SnapshotError>> {
        match self.policy.apply(&self.value, viewer) {
            Visibility::Raw(value) => Some(value.viewer_value(viewer)),
            Visibility::Transformed(value) => Some(value.viewer_value(viewer)),
            Visibility::Hidden => None,
        }
    }

    fn sync_parts(&self, viewers: &[PlayerId]) -> Result<SplitValue, SnapshotError> {
        match &self.policy {
            SyncPolicy::Broadcast => self.value.split_value(viewers),
            SyncPolicy::ServerOnly => Ok(SplitValue::hidden()),
            SyncPolicy::Masked(mask) => {
                let masked = mask(&self.value);
                Ok(SplitValue {
                    shared: None,
                    per_viewer: viewers
                        .iter()
                        .map(|viewer| (viewer.clone(), masked.viewer_value(viewer)))
                        .collect(),
                })
            }
            SyncPolicy::PerPlayer(filter)
            | SyncPolicy::PerPlayerSlice(filter)
            | SyncPolicy::Custom(filter) => Ok(SplitValue {
                shared: None,
                per_viewer: viewers
                    .iter()
                    .filter_map(|viewer| {
                        let visible = filter(&self.value, viewer)?;
                        Some((viewer.clone(), visible.viewer_value(viewer)))
                    })
                    .collect(),
            }),
        }
    }
}
