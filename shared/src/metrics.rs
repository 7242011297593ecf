//! Change-rate estimation for choosing between incremental and full sync.
//!
//! Pure functions over plain state; the runtime calls
//! [`compute_change_metrics`] once per round and feeds the EMA into a
//! [`SyncModeSelector`].

use crate::value::{SnapshotValue, StateSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const DEFAULT_EMA_ALPHA: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsConfig {
    /// Weight of the newest sample, in `(0, 1]`
    pub alpha: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_EMA_ALPHA,
        }
    }
}

/// Per-land estimator state, kept for the lifetime of the land.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeRateState {
    pub sync_count: u64,
    pub ema: f64,
    pub seeded: bool,
}

impl ChangeRateState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one sample into the EMA. The first sample seeds it directly.
    pub fn record(&mut self, rate: f64, alpha: f64) -> f64 {
        self.ema = if self.seeded {
            alpha * rate + (1.0 - alpha) * self.ema
        } else {
            rate
        };
        self.seeded = true;
        self.sync_count += 1;
        self.ema
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeMetrics {
    pub changed_objects: usize,
    pub unchanged_objects: usize,
    pub estimated_total_objects: usize,
    pub change_rate: f64,
    pub change_rate_ema: f64,
}

/// Identity of the object an update path belongs to: the path without its
/// last segment, or the root for top-level fields.
pub fn object_identity(path: &str) -> &str {
    match path.rsplit_once('.') {
        Some((parent, _)) => parent,
        None => "",
    }
}

/// Counts the root plus every nested object value in `snapshot`.
pub fn estimate_object_count(snapshot: &StateSnapshot) -> usize {
    fn count(value: &SnapshotValue) -> usize {
        match value {
            SnapshotValue::Object(map) => 1 + map.values().map(count).sum::<usize>(),
            SnapshotValue::Array(items) => items.iter().map(count).sum(),
            _ => 0,
        }
    }
    1 + snapshot.iter().map(|(_, value)| count(value)).sum::<usize>()
}

/// Computes this round's change metrics and advances `state`.
///
/// Changed objects are counted by distinct identity, so an object with many
/// co-changing fields weighs the same as one with a single change.
pub fn compute_change_metrics<S, F>(
    update_paths: &[S],
    snapshot: &StateSnapshot,
    state: &mut ChangeRateState,
    config: &MetricsConfig,
    estimator: F,
) -> ChangeMetrics
where
    S: AsRef<str>,
    F: Fn(&StateSnapshot) -> usize,
{
    let changed_objects = update_paths
        .iter()
        .map(|path| object_identity(path.as_ref()))
        .collect::<HashSet<_>>()
        .len();

    let estimated_total_objects = estimator(snapshot).max(changed_objects);
    let unchanged_objects = estimated_total_objects - changed_objects;
    let change_rate = changed_objects as f64 / estimated_total_objects.max(1) as f64;
    let change_rate_ema = state.record(change_rate, config.alpha);

    ChangeMetrics {
        changed_objects,
        unchanged_objects,
        estimated_total_objects,
        change_rate,
        change_rate_ema,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Incremental,
    Full,
}

/// Falls back to full snapshots once most of the state changes every round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncModeSelector {
    pub threshold: f64,
}

impl Default for SyncModeSelector {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl SyncModeSelector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn select(&self, change_rate_ema: f64) -> SyncMode {
        if change_rate_ema > self.threshold {
            SyncMode::Full
        } else {
            SyncMode::Incremental
        }
    }
}
