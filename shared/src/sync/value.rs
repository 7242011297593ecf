//! How raw field values become snapshot values.
//!
//! Plain values convert the same way for every viewer. Nested state nodes
//! apply their own field policies, so a container of nodes splits into a
//! shared part and per-viewer parts.

use super::policy::PlayerId;
use crate::error::SnapshotError;
use crate::value::SnapshotValue;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// Per-viewer result of a split; a missing entry means nothing to add.
pub type ViewerParts = HashMap<PlayerId, Result<SnapshotValue, SnapshotError>>;

/// A value divided into what every viewer shares and what each viewer
/// additionally sees.
///
/// Deep-merging `per_viewer[v]` onto `shared` reproduces the value as seen by
/// `v`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SplitValue {
    pub shared: Option<SnapshotValue>,
    pub per_viewer: ViewerParts,
}

impl SplitValue {
    pub fn shared(value: SnapshotValue) -> Self {
        Self {
            shared: Some(value),
            per_viewer: HashMap::new(),
        }
    }

    pub fn hidden() -> Self {
        Self::default()
    }
}

/// Conversion of a field's value into the shared value model.
pub trait SyncValue {
    /// The part every viewer shares.
    fn broadcast_value(&self) -> Result<SnapshotValue, SnapshotError>;

    /// The value as seen by `viewer`.
    fn viewer_value(&self, _viewer: &PlayerId) -> Result<SnapshotValue, SnapshotError> {
        self.broadcast_value()
    }

    /// Shared and per-viewer parts for all `viewers` in one pass.
    fn split_value(&self, _viewers: &[PlayerId]) -> Result<SplitValue, SnapshotError> {
        Ok(SplitValue::shared(self.broadcast_value()?))
    }

    /// Whether a nested state node inside this value has dirty fields.
    fn is_nested_dirty(&self) -> bool {
        false
    }

    fn clear_nested_dirty(&mut self) {}

    /// Appends dotted paths of dirty nested fields below `path`.
    fn collect_dirty_paths(&self, _path: &str, _out: &mut Vec<String>) {}
}

/// Keys of maps that convert to snapshot objects.
pub trait MapKey {
    fn to_key(&self) -> Result<String, SnapshotError>;
}

impl MapKey for String {
    fn to_key(&self) -> Result<String, SnapshotError> {
        Ok(self.clone())
    }
}

impl MapKey for PlayerId {
    fn to_key(&self) -> Result<String, SnapshotError> {
        Ok(self.as_str().to_string())
    }
}

impl MapKey for bool {
    fn to_key(&self) -> Result<String, SnapshotError> {
        Ok(self.to_string())
    }
}

macro_rules! integer_map_key {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl MapKey for $ty {
                fn to_key(&self) -> Result<String, SnapshotError> {
                    Ok(self.to_string())
                }
            }
        )+
    };
}

integer_map_key!(i8, i16, i32, i64, u8, u16, u32, u64, isize, usize);

pub(crate) fn join_path(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{}.{}", parent, child)
    }
}

impl SyncValue for bool {
    fn broadcast_value(&self) -> Result<SnapshotValue, SnapshotError> {
        Ok(SnapshotValue::Bool(*self))
    }
}

macro_rules! lossless_integer {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl SyncValue for $ty {
                fn broadcast_value(&self) -> Result<SnapshotValue, SnapshotError> {
                    Ok(SnapshotValue::Int(*self as i64))
                }
            }
        )+
    };
}

lossless_integer!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! checked_integer {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl SyncValue for $ty {
                fn broadcast_value(&self) -> Result<SnapshotValue, SnapshotError> {
                    i64::try_from(*self)
                        .map(SnapshotValue::Int)
                        .map_err(|e| SnapshotError::Conversion {
                            field: String::new(),
                            type_name: stringify!($ty).to_string(),
                            reason: e.to_string(),
                        })
                }
            }
        )+
    };
}

checked_integer!(u64, usize, isize);

impl SyncValue for f32 {
    fn broadcast_value(&self) -> Result<SnapshotValue, SnapshotError> {
        Ok(SnapshotValue::Double(*self as f64))
    }
}

impl SyncValue for f64 {
    fn broadcast_value(&self) -> Result<SnapshotValue, SnapshotError> {
        Ok(SnapshotValue::Double(*self))
    }
}

impl SyncValue for String {
    fn broadcast_value(&self) -> Result<SnapshotValue, SnapshotError> {
        Ok(SnapshotValue::String(self.clone()))
    }
}

impl SyncValue for char {
    fn broadcast_value(&self) -> Result<SnapshotValue, SnapshotError> {
        Ok(SnapshotValue::String(self.to_string()))
    }
}

impl SyncValue for PlayerId {
    fn broadcast_value(&self) -> Result<SnapshotValue, SnapshotError> {
        Ok(SnapshotValue::String(self.as_str().to_string()))
    }
}

impl SyncValue for SnapshotValue {
    fn broadcast_value(&self) -> Result<SnapshotValue, SnapshotError> {
        Ok(self.clone())
    }
}

impl SyncValue for serde_json::Value {
    fn broadcast_value(&self) -> Result<SnapshotValue, SnapshotError> {
        Ok(SnapshotValue::from_json(self.clone()))
    }
}

impl<T: SyncValue> SyncValue for Box<T> {
    fn broadcast_value(&self) -> Result<SnapshotValue, SnapshotError> {
        (**self).broadcast_value()
    }

    fn viewer_value(&self, viewer: &PlayerId) -> Result<SnapshotValue, SnapshotError> {
        (**self).viewer_value(viewer)
    }

    fn split_value(&self, viewers: &[PlayerId]) -> Result<SplitValue, SnapshotError> {
        (**self).split_value(viewers)
    }

    fn is_nested_dirty(&self) -> bool {
        (**self).is_nested_dirty()
    }

    fn clear_nested_dirty(&mut self) {
        (**self).clear_nested_dirty()
    }

    fn collect_dirty_paths(&self, path: &str, out: &mut Vec<String>) {
        (**self).collect_dirty_paths(path, out)
    }
}

impl<T: SyncValue> SyncValue for Option<T> {
    fn broadcast_value(&self) -> Result<SnapshotValue, SnapshotError> {
        match self {
            Some(value) => value.broadcast_value(),
            None => Ok(SnapshotValue::Null),
        }
    }

    fn viewer_value(&self, viewer: &PlayerId) -> Result<SnapshotValue, SnapshotError> {
        match self {
            Some(value) => value.viewer_value(viewer),
            None => Ok(SnapshotValue::Null),
        }
    }

    fn split_value(&self, viewers: &[PlayerId]) -> Result<SplitValue, SnapshotError> {
        match self {
            Some(value) => value.split_value(viewers),
            None => Ok(SplitValue::shared(SnapshotValue::Null)),
        }
    }

    fn is_nested_dirty(&self) -> bool {
        self.as_ref().map_or(false, |v| v.is_nested_dirty())
    }

    fn clear_nested_dirty(&mut self) {
        if let Some(value) = self {
            value.clear_nested_dirty();
        }
    }

    fn collect_dirty_paths(&self, path: &str, out: &mut Vec<String>) {
        if let Some(value) = self {
            value.collect_dirty_paths(path, out);
        }
    }
}

/// Sequence conversion shared by `Vec`, `VecDeque` and sets.
///
/// Arrays cannot be merged element-wise, so when any element has a
/// per-viewer part the viewer receives the complete array as they see it,
/// assembled from the element splits already computed.
fn split_sequence<'a, T, I>(items: I, viewers: &[PlayerId]) -> Result<SplitValue, SnapshotError>
where
    T: SyncValue + 'a,
    I: Iterator<Item = &'a T>,
{
    let mut splits = Vec::new();
    for (index, item) in items.enumerate() {
        let split = item
            .split_value(viewers)
            .map_err(|e| e.within(&index.to_string()))?;
        splits.push(split);
    }

    let mut per_viewer = HashMap::new();
    if splits.iter().any(|split| !split.per_viewer.is_empty()) {
        for viewer in viewers {
            per_viewer.insert(viewer.clone(), assemble_viewer_sequence(&splits, viewer));
        }
    }

    let shared = splits
        .into_iter()
        .map(|split| split.shared.unwrap_or(SnapshotValue::Null))
        .collect();
    Ok(SplitValue {
        shared: Some(SnapshotValue::Array(shared)),
        per_viewer,
    })
}

/// One viewer's array: each element's shared part with that viewer's part
/// merged on top.
fn assemble_viewer_sequence(
    splits: &[SplitValue],
    viewer: &PlayerId,
) -> Result<SnapshotValue, SnapshotError> {
    splits
        .iter()
        .enumerate()
        .map(|(index, split)| {
            let part = match split.per_viewer.get(viewer) {
                Some(Ok(part)) => Some(part.clone()),
                Some(Err(e)) => return Err(e.clone().within(&index.to_string())),
                None => None,
            };
            Ok(match (split.shared.clone(), part) {
                (Some(mut shared), Some(part)) => {
                    shared.merge(part);
                    shared
                }
                (Some(shared), None) => shared,
                (None, Some(part)) => part,
                (None, None) => SnapshotValue::Null,
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(SnapshotValue::Array)
}

fn sequence_viewer_value<'a, T, I>(items: I, viewer: &PlayerId) -> Result<SnapshotValue, SnapshotError>
where
    T: SyncValue + 'a,
    I: Iterator<Item = &'a T>,
{
    items
        .enumerate()
        .map(|(index, item)| {
            item.viewer_value(viewer)
                .map_err(|e| e.within(&index.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(SnapshotValue::Array)
}

fn sequence_broadcast_value<'a, T, I>(items: I) -> Result<SnapshotValue, SnapshotError>
where
    T: SyncValue + 'a,
    I: Iterator<Item = &'a T>,
{
    items
        .enumerate()
        .map(|(index, item)| item.broadcast_value().map_err(|e| e.within(&index.to_string())))
        .collect::<Result<Vec<_>, _>>()
        .map(SnapshotValue::Array)
}

fn sequence_dirty_paths<'a, T, I>(items: I, path: &str, out: &mut Vec<String>)
where
    T: SyncValue + 'a,
    I: Iterator<Item = &'a T>,
{
    for (index, item) in items.enumerate() {
        item.collect_dirty_paths(&join_path(path, &index.to_string()), out);
    }
}

macro_rules! sequence_sync_value {
    ($container:ident) => {
        impl<T: SyncValue> SyncValue for $container<T> {
            fn broadcast_value(&self) -> Result<SnapshotValue, SnapshotError> {
                sequence_broadcast_value(self.iter())
            }

            fn viewer_value(&self, viewer: &PlayerId) -> Result<SnapshotValue, SnapshotError> {
                sequence_viewer_value(self.iter(), viewer)
            }

            fn split_value(&self, viewers: &[PlayerId]) -> Result<SplitValue, SnapshotError> {
                split_sequence(self.iter(), viewers)
            }

            fn is_nested_dirty(&self) -> bool {
                self.iter().any(|item| item.is_nested_dirty())
            }

            fn collect_dirty_paths(&self, path: &str, out: &mut Vec<String>) {
                sequence_dirty_paths(self.iter(), path, out)
            }

            fn clear_nested_dirty(&mut self) {
                self.iter_mut().for_each(|item| item.clear_nested_dirty());
            }
        }
    };
}

sequence_sync_value!(Vec);
sequence_sync_value!(VecDeque);

// Set elements cannot be mutated in place, so sets never hold dirty nodes.
impl<T: SyncValue + Ord> SyncValue for BTreeSet<T> {
    fn broadcast_value(&self) -> Result<SnapshotValue, SnapshotError> {
        sequence_broadcast_value(self.iter())
    }

    fn viewer_value(&self, viewer: &PlayerId) -> Result<SnapshotValue, SnapshotError> {
        sequence_viewer_value(self.iter(), viewer)
    }

    fn split_value(&self, viewers: &[PlayerId]) -> Result<SplitValue, SnapshotError> {
        split_sequence(self.iter(), viewers)
    }
}

impl<T: SyncValue + Ord> SyncValue for HashSet<T> {
    fn broadcast_value(&self) -> Result<SnapshotValue, SnapshotError> {
        let mut items: Vec<&T> = self.iter().collect();
        items.sort();
        sequence_broadcast_value(items.into_iter())
    }

    fn viewer_value(&self, viewer: &PlayerId) -> Result<SnapshotValue, SnapshotError> {
        let mut items: Vec<&T> = self.iter().collect();
        items.sort();
        sequence_viewer_value(items.into_iter(), viewer)
    }

    fn split_value(&self, viewers: &[PlayerId]) -> Result<SplitValue, SnapshotError> {
        let mut items: Vec<&T> = self.iter().collect();
        items.sort();
        split_sequence(items.into_iter(), viewers)
    }
}

/// Map conversion shared by `HashMap` and `BTreeMap`.
fn split_map<'a, K, V, I>(entries: I, viewers: &[PlayerId]) -> Result<SplitValue, SnapshotError>
where
    K: MapKey + 'a,
    V: SyncValue + 'a,
    I: Iterator<Item = (&'a K, &'a V)>,
{
    let mut shared = BTreeMap::new();
    let mut per_viewer: HashMap<PlayerId, Result<BTreeMap<String, SnapshotValue>, SnapshotError>> =
        HashMap::new();

    for (key, value) in entries {
        let key = key.to_key()?;
        let split = value.split_value(viewers).map_err(|e| e.within(&key))?;
        shared.insert(key.clone(), split.shared.unwrap_or(SnapshotValue::Null));

        for (viewer, part) in split.per_viewer {
            let slot = per_viewer.entry(viewer).or_insert_with(|| Ok(BTreeMap::new()));
            match part {
                Ok(part) => {
                    if let Ok(parts) = slot {
                        parts.insert(key.clone(), part);
                    }
                }
                Err(e) => {
                    if slot.is_ok() {
                        *slot = Err(e.within(&key));
                    }
                }
            }
        }
    }

    Ok(SplitValue {
        shared: Some(SnapshotValue::Object(shared)),
        per_viewer: per_viewer
            .into_iter()
            .map(|(viewer, parts)| (viewer, parts.map(SnapshotValue::Object)))
            .collect(),
    })
}

fn map_value<'a, K, V, I, F>(entries: I, convert: F) -> Result<SnapshotValue, SnapshotError>
where
    K: MapKey + 'a,
    V: SyncValue + 'a,
    I: Iterator<Item = (&'a K, &'a V)>,
    F: Fn(&V) -> Result<SnapshotValue, SnapshotError>,
{
    let mut object = BTreeMap::new();
    for (key, value) in entries {
        let key = key.to_key()?;
        let converted = convert(value).map_err(|e| e.within(&key))?;
        object.insert(key, converted);
    }
    Ok(SnapshotValue::Object(object))
}

fn map_dirty_paths<'a, K, V, I>(entries: I, path: &str, out: &mut Vec<String>)
where
    K: MapKey + 'a,
    V: SyncValue + 'a,
    I: Iterator<Item = (&'a K, &'a V)>,
{
    for (key, value) in entries {
        if let Ok(key) = key.to_key() {
            value.collect_dirty_paths(&join_path(path, &key), out);
        }
    }
}

macro_rules! map_sync_value {
    ($map:ident) => {
        impl<K: MapKey, V: SyncValue> SyncValue for $map<K, V> {
            fn broadcast_value(&self) -> Result<SnapshotValue, SnapshotError> {
                map_value(self.iter(), |v: &V| v.broadcast_value())
            }

            fn viewer_value(&self, viewer: &PlayerId) -> Result<SnapshotValue, SnapshotError> {
                map_value(self.iter(), |v: &V| v.viewer_value(viewer))
            }

            fn split_value(&self, viewers: &[PlayerId]) -> Result<SplitValue, SnapshotError> {
                split_map(self.iter(), viewers)
            }

            fn is_nested_dirty(&self) -> bool {
                self.values().any(|v| v.is_nested_dirty())
            }

            fn clear_nested_dirty(&mut self) {
                self.values_mut().for_each(|v| v.clear_nested_dirty());
            }

            fn collect_dirty_paths(&self, path: &str, out: &mut Vec<String>) {
                map_dirty_paths(self.iter(), path, out)
            }
        }
    };
}

map_sync_value!(HashMap);
map_sync_value!(BTreeMap);

/// Implements [`SyncValue`] for serde types that sync as whole values.
///
/// Conversion goes through the type's JSON form; failures name the type.
#[macro_export]
macro_rules! serde_sync_value {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::sync::SyncValue for $ty {
                fn broadcast_value(
                    &self,
                ) -> ::std::result::Result<$crate::SnapshotValue, $crate::SnapshotError> {
                    $crate::SnapshotValue::from_serialize(self, stringify!($ty))
                }
            }
        )+
    };
}
