//! Per-field visibility rules.

use crate::descriptor::{Describe, PolicyKind, PrimitiveType, TypeDesc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Identity of a connected viewer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PlayerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Describe for PlayerId {
    fn describe() -> TypeDesc {
        TypeDesc::Primitive(PrimitiveType::String)
    }
}

/// `(raw value, viewer) -> transformed value`, `None` hides the field.
pub type ViewerFilter<T> = Arc<dyn Fn(&T, &PlayerId) -> Option<T> + Send + Sync>;

/// Viewer-independent redaction.
pub type ValueMask<T> = Arc<dyn Fn(&T) -> T + Send + Sync>;

/// A field's sync policy, carrying its filter function where it has one.
pub enum SyncPolicy<T> {
    /// Identical for every viewer
    Broadcast,
    /// Never leaves the server
    ServerOnly,
    /// Computed per viewer
    PerPlayer(ViewerFilter<T>),
    /// Keyed subset relevant to the viewer
    PerPlayerSlice(ViewerFilter<T>),
    /// Redacted before it is sent to anyone
    Masked(ValueMask<T>),
    /// Arbitrary filter
    Custom(ViewerFilter<T>),
}

/// What a policy lets a viewer see of a value.
pub enum Visibility<'a, T> {
    /// The raw value, unchanged
    Raw(&'a T),
    /// A value produced by the policy's filter or mask
    Transformed(T),
    Hidden,
}

impl<'a, T> Visibility<'a, T> {
    pub fn as_ref(&self) -> Option<&T> {
        match self {
            Visibility::Raw(value) => Some(value),
            Visibility::Transformed(value) => Some(value),
            Visibility::Hidden => None,
        }
    }

    pub fn is_hidden(&self) -> bool {
        matches!(self, Visibility::Hidden)
    }
}

impl<T> SyncPolicy<T> {
    pub fn broadcast() -> Self {
        SyncPolicy::Broadcast
    }

    pub fn server_only() -> Self {
        SyncPolicy::ServerOnly
    }

    pub fn per_player<F>(filter: F) -> Self
    where
        F: Fn(&T, &PlayerId) -> Option<T> + Send + Sync + 'static,
    {
        SyncPolicy::PerPlayer(Arc::new(filter))
    }

    pub fn masked<F>(mask: F) -> Self
    where
        F: Fn(&T) -> T + Send + Sync + 'static,
    {
        SyncPolicy::Masked(Arc::new(mask))
    }

    pub fn custom<F>(filter: F) -> Self
    where
        F: Fn(&T, &PlayerId) -> Option<T> + Send + Sync + 'static,
    {
        SyncPolicy::Custom(Arc::new(filter))
    }

    pub fn kind(&self) -> PolicyKind {
        match self {
            SyncPolicy::Broadcast => PolicyKind::Broadcast,
            SyncPolicy::ServerOnly => PolicyKind::ServerOnly,
            SyncPolicy::PerPlayer(_) => PolicyKind::PerPlayer,
            SyncPolicy::PerPlayerSlice(_) => PolicyKind::PerPlayerSlice,
            SyncPolicy::Masked(_) => PolicyKind::Masked,
            SyncPolicy::Custom(_) => PolicyKind::Custom,
        }
    }

    /// Applies the policy to `value` for one viewer.
    pub fn apply<'a>(&self, value: &'a T, viewer: &PlayerId) -> Visibility<'a, T> {
        match self {
            SyncPolicy::Broadcast => Visibility::Raw(value),
            SyncPolicy::ServerOnly => Visibility::Hidden,
            SyncPolicy::PerPlayer(filter)
            | SyncPolicy::PerPlayerSlice(filter)
            | SyncPolicy::Custom(filter) => match filter(value, viewer) {
                Some(filtered) => Visibility::Transformed(filtered),
                None => Visibility::Hidden,
            },
            SyncPolicy::Masked(mask) => Visibility::Transformed(mask(value)),
        }
    }
}

impl<T: PlayerSlice + 'static> SyncPolicy<T> {
    /// Shows each viewer only their own entry of a player-keyed map.
    pub fn per_player_slice() -> Self {
        SyncPolicy::PerPlayerSlice(Arc::new(|value: &T, viewer: &PlayerId| value.slice_for(viewer)))
    }

    #[deprecated(note = "use `per_player_slice`")]
    pub fn per_player_dictionary_value() -> Self {
        Self::per_player_slice()
    }
}

impl<T> Clone for SyncPolicy<T> {
    fn clone(&self) -> Self {
        match self {
            SyncPolicy::Broadcast => SyncPolicy::Broadcast,
            SyncPolicy::ServerOnly => SyncPolicy::ServerOnly,
            SyncPolicy::PerPlayer(f) => SyncPolicy::PerPlayer(Arc::clone(f)),
            SyncPolicy::PerPlayerSlice(f) => SyncPolicy::PerPlayerSlice(Arc::clone(f)),
            SyncPolicy::Masked(f) => SyncPolicy::Masked(Arc::clone(f)),
            SyncPolicy::Custom(f) => SyncPolicy::Custom(Arc::clone(f)),
        }
    }
}

impl<T> fmt::Debug for SyncPolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyncPolicy::{}", self.kind())
    }
}

/// Containers that can be narrowed to the entries one viewer may see.
pub trait PlayerSlice: Sized {
    fn slice_for(&self, viewer: &PlayerId) -> Option<Self>;
}

impl<V: Clone> PlayerSlice for HashMap<PlayerId, V> {
    fn slice_for(&self, viewer: &PlayerId) -> Option<Self> {
        let value = self.get(viewer)?;
        let mut slice = HashMap::with_capacity(1);
        slice.insert(viewer.clone(), value.clone());
        Some(slice)
    }
}

impl<V: Clone> PlayerSlice for BTreeMap<PlayerId, V> {
    fn slice_for(&self, viewer: &PlayerId) -> Option<Self> {
        let value = self.get(viewer)?;
        let mut slice = BTreeMap::new();
        slice.insert(viewer.clone(), value.clone());
        Some(slice)
    }
}
