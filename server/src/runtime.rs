//! Drives one land through its per-tick sync cycle.
//!
//! A round is: apply queued actions → land tick → `snapshot_for_sync` for
//! every viewer → `clear_dirty` → change metrics → sync mode for the next
//! round. The runtime is the single writer of the state tree; nothing
//! mutates it between the snapshot and the clear.

use crate::config::{MismatchPolicy, ServerConfig};
use crate::error::{ActionError, ServerError};
use crate::land::Land;
use log::{debug, error, info, warn};
use shared::metrics::{
    compute_change_metrics, estimate_object_count, ChangeMetrics, ChangeRateState,
    MetricsConfig, SyncModeSelector,
};
use shared::schema::{Compatibility, ProtocolSchema};
use shared::sync::StateNode;
use shared::{PlayerId, SnapshotError, SnapshotValue, StateSnapshot, SyncMode};
use std::collections::{HashMap, HashSet};

/// Result of checking a connecting client's schema hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    Accepted,
    /// Hashes differ but the server is configured to let clients in
    AcceptedWithMismatch { server: String, client: String },
    Rejected { reason: String },
}

impl Handshake {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Handshake::Rejected { .. })
    }
}

/// Everything produced by one sync round.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRound {
    pub tick: u32,
    pub mode: SyncMode,
    pub broadcast: StateSnapshot,
    /// Per-player parts of the viewers whose snapshot succeeded
    pub per_player: HashMap<PlayerId, StateSnapshot>,
    pub metrics: ChangeMetrics,
}

pub struct LandRuntime<L: Land> {
    land: L,
    state: L::State,
    schema: ProtocolSchema,
    land_id: String,
    mismatch_policy: MismatchPolicy,
    metrics_config: MetricsConfig,
    metrics_state: ChangeRateState,
    selector: SyncModeSelector,
    mode: SyncMode,
    tick: u32,
    /// Viewers whose last part failed; they get their full view next round
    resync: HashSet<PlayerId>,
}

impl<L: Land> LandRuntime<L> {
    pub fn new(mut land: L, config: &ServerConfig) -> Result<Self, ServerError> {
        let definition = land.definition();
        let land_id = definition.id.clone();
        let schema = ProtocolSchema::builder().land(definition).build()?;
        info!(
            "Land '{}' ready, schema hash {} ({} definitions)",
            land_id,
            schema.schema_hash,
            schema.defs.len()
        );

        let state = land.initial_state();
        Ok(Self {
            land,
            state,
            schema,
            land_id,
            mismatch_policy: config.schema_mismatch,
            metrics_config: config.metrics_config(),
            metrics_state: ChangeRateState::new(),
            selector: config.mode_selector(),
            mode: SyncMode::Incremental,
            tick: 0,
            resync: HashSet::new(),
        })
    }

    pub fn schema(&self) -> &ProtocolSchema {
        &self.schema
    }

    pub fn schema_hash(&self) -> &str {
        &self.schema.schema_hash
    }

    pub fn land_id(&self) -> &str {
        &self.land_id
    }

    pub fn state(&self) -> &L::State {
        &self.state
    }

    pub fn tick_count(&self) -> u32 {
        self.tick
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn metrics_state(&self) -> &ChangeRateState {
        &self.metrics_state
    }

    /// Compares a client's schema hash with ours under the mismatch policy.
    pub fn handshake(&self, client_hash: &str) -> Handshake {
        match self.schema.check_compatibility(client_hash) {
            Compatibility::Match => Handshake::Accepted,
            Compatibility::Mismatch { server, client } => match self.mismatch_policy {
                MismatchPolicy::Reject => {
                    warn!("Rejecting client with schema hash {} (server {})", client, server);
                    Handshake::Rejected {
                        reason: format!(
                            "schema mismatch: server {}, client {}",
                            server, client
                        ),
                    }
                }
                MismatchPolicy::Warn => {
                    warn!(
                        "Client schema hash {} differs from server {}, continuing",
                        client, server
                    );
                    Handshake::AcceptedWithMismatch { server, client }
                }
            },
        }
    }

    /// Adds a player and returns their initial full snapshot.
    ///
    /// The join itself marks state dirty, so everybody else learns about the
    /// newcomer in the next round.
    pub fn join(&mut self, player: &PlayerId) -> Result<StateSnapshot, SnapshotError> {
        self.resync.remove(player);
        self.land.on_join(&mut self.state, player);
        self.state.snapshot(player, None)
    }

    pub fn leave(&mut self, player: &PlayerId) {
        self.resync.remove(player);
        self.land.on_leave(&mut self.state, player);
    }

    pub fn apply_action(
        &mut self,
        player: &PlayerId,
        action_id: &str,
        payload: &SnapshotValue,
    ) -> Result<(), ActionError> {
        self.land
            .apply_action(&mut self.state, player, action_id, payload)
    }

    /// Advances the tick counter and runs the land's tick hook.
    pub fn tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);
        self.land.tick(&mut self.state, self.tick);
    }

    /// Snapshots every viewer, clears dirty state and updates the metrics.
    ///
    /// Returns `Ok(None)` when nothing changed and no viewer is owed a
    /// resync. A failing broadcast snapshot aborts the round and leaves dirty
    /// state in place. A failing per-player snapshot drops that viewer from
    /// the round; the next round sends them their full view instead of a
    /// dirty-only part.
    pub fn sync_round(&mut self, viewers: &[PlayerId]) -> Result<Option<SyncRound>, ServerError> {
        let dirty = self.state.dirty_fields();
        let owed: Vec<&PlayerId> = viewers
            .iter()
            .filter(|viewer| self.resync.contains(*viewer))
            .collect();
        if dirty.is_empty() && owed.is_empty() {
            return Ok(None);
        }
        let dirty_paths = self.state.dirty_paths();

        let mode = self.mode;
        let filter = match mode {
            SyncMode::Incremental => Some(&dirty),
            SyncMode::Full => None,
        };

        let snapshots = self.state.snapshot_for_sync(viewers, filter);
        let broadcast = snapshots.broadcast.map_err(|e| {
            error!("Broadcast snapshot failed on tick {}: {}", self.tick, e);
            e
        })?;

        let mut per_player = HashMap::with_capacity(viewers.len());
        let mut failed = Vec::new();
        // with nothing dirty the round only carries resyncs
        let parts = snapshots
            .per_player
            .into_iter()
            .filter(|_| !dirty.is_empty());
        for (viewer, part) in parts {
            match part {
                Ok(part) => {
                    per_player.insert(viewer, part);
                }
                Err(e) => {
                    error!("Snapshot for {} failed on tick {}: {}", viewer, self.tick, e);
                    failed.push(viewer);
                }
            }
        }

        // a full view merged over any broadcast part is still the full view
        for viewer in owed {
            match self.state.snapshot(viewer, None) {
                Ok(view) => {
                    debug!("Resynced {} with a full view", viewer);
                    per_player.insert(viewer.clone(), view);
                }
                Err(e) => {
                    error!("Resync of {} failed on tick {}: {}", viewer, self.tick, e);
                    per_player.remove(viewer);
                    failed.push(viewer.clone());
                }
            }
        }
        self.resync.retain(|viewer| !per_player.contains_key(viewer));
        self.resync.extend(failed);

        let metrics = if dirty.is_empty() {
            ChangeMetrics {
                changed_objects: 0,
                unchanged_objects: 0,
                estimated_total_objects: 0,
                change_rate: 0.0,
                change_rate_ema: self.metrics_state.ema,
            }
        } else {
            let full_broadcast = match mode {
                SyncMode::Full => broadcast.clone(),
                SyncMode::Incremental => self
                    .state
                    .broadcast_snapshot(None)
                    .unwrap_or_else(|_| broadcast.clone()),
            };

            self.state.clear_dirty();

            let metrics = compute_change_metrics(
                dirty_paths.as_slice(),
                &full_broadcast,
                &mut self.metrics_state,
                &self.metrics_config,
                estimate_object_count,
            );

            let next = self.selector.select(metrics.change_rate_ema);
            if next != self.mode {
                info!(
                    "Switching to {:?} sync (change rate EMA {:.3})",
                    next, metrics.change_rate_ema
                );
                self.mode = next;
            }
            metrics
        };

        debug!(
            "Tick {}: {} dirty fields, {} changed objects of {}, {} viewers",
            self.tick,
            dirty.len(),
            metrics.changed_objects,
            metrics.estimated_total_objects,
            per_player.len()
        );

        Ok(Some(SyncRound {
            tick: self.tick,
            mode,
            broadcast,
            per_player,
            metrics,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{ArenaLand, ARENA_ID};
    use crate::config::ServerConfig;
    use shared::descriptor::{Describe, FieldDescriptor, PolicyKind, TypeDesc};
    use shared::schema::LandDefinition;
    use shared::sync::{SyncField, SyncPolicy};

    fn p(id: &str) -> PlayerId {
        PlayerId::new(id)
    }

    fn runtime(config: ServerConfig) -> LandRuntime<ArenaLand> {
        LandRuntime::new(ArenaLand::new(11, 1000), &config).unwrap()
    }

    #[test]
    fn test_schema_is_built_on_startup() {
        let runtime = runtime(ServerConfig::default());
        assert_eq!(runtime.land_id(), ARENA_ID);
        assert!(runtime.schema().verify().unwrap());
        assert_eq!(runtime.schema_hash().len(), 16);
    }

    #[test]
    fn test_handshake_policies() {
        let strict = runtime(ServerConfig::default());
        let hash = strict.schema_hash().to_string();
        assert_eq!(strict.handshake(&hash), Handshake::Accepted);
        assert!(!strict.handshake("deadbeefdeadbeef").is_accepted());

        let lenient = runtime(ServerConfig {
            schema_mismatch: MismatchPolicy::Warn,
            ..Default::default()
        });
        match lenient.handshake("deadbeefdeadbeef") {
            Handshake::AcceptedWithMismatch { client, .. } => {
                assert_eq!(client, "deadbeefdeadbeef")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_join_returns_full_view() {
        let mut runtime = runtime(ServerConfig::default());
        let snapshot = runtime.join(&p("alice")).unwrap();

        assert!(snapshot.contains("round"));
        assert!(snapshot.value_at("players.alice.goal").is_some());
        assert!(!snapshot.contains("rng_seed"));
    }

    #[test]
    fn test_sync_round_clears_dirty_state() {
        let mut runtime = runtime(ServerConfig::default());
        runtime.join(&p("alice")).unwrap();
        runtime.join(&p("bob")).unwrap();
        let viewers = vec![p("alice"), p("bob")];

        let round = runtime.sync_round(&viewers).unwrap().unwrap();
        assert_eq!(round.per_player.len(), 2);
        assert!(round.broadcast.contains("players"));
        assert!(!runtime.state().is_dirty());
        assert_eq!(runtime.metrics_state().sync_count, 1);

        // nothing changed since
        assert!(runtime.sync_round(&viewers).unwrap().is_none());
    }

    #[test]
    fn test_incremental_round_only_carries_dirty_fields() {
        let mut runtime = runtime(ServerConfig {
            full_sync_threshold: 1.1,
            ..Default::default()
        });
        runtime.join(&p("alice")).unwrap();
        runtime.sync_round(&[p("alice")]).unwrap();

        runtime
            .apply_action(
                &p("alice"),
                "turn",
                &SnapshotValue::from_json(serde_json::json!({"degrees": 90.0})),
            )
            .unwrap();
        let round = runtime.sync_round(&[p("alice")]).unwrap().unwrap();

        assert_eq!(round.mode, SyncMode::Incremental);
        assert_eq!(round.broadcast.fields().collect::<Vec<_>>(), vec!["players"]);
        assert_eq!(round.metrics.changed_objects, 1);
    }

    #[test]
    fn test_high_change_rate_switches_to_full_sync() {
        let mut runtime = runtime(ServerConfig {
            full_sync_threshold: 0.0,
            ..Default::default()
        });
        runtime.join(&p("alice")).unwrap();

        let first = runtime.sync_round(&[p("alice")]).unwrap().unwrap();
        assert_eq!(first.mode, SyncMode::Incremental);
        assert_eq!(runtime.mode(), SyncMode::Full);

        runtime.tick();
        runtime
            .apply_action(
                &p("alice"),
                "turn",
                &SnapshotValue::from_json(serde_json::json!({"degrees": 45.0})),
            )
            .unwrap();
        let second = runtime.sync_round(&[p("alice")]).unwrap().unwrap();
        assert_eq!(second.mode, SyncMode::Full);
        assert!(second.broadcast.contains("round"));
        assert_eq!(second.tick, 1);
    }

    struct Vault {
        balance: SyncField<u64>,
        counter: SyncField<i64>,
    }
    shared::state_node!(Vault { balance, counter });

    impl Describe for Vault {
        fn describe() -> TypeDesc {
            TypeDesc::state_node("Vault", || {
                vec![
                    FieldDescriptor::new::<u64>("balance").policy(PolicyKind::PerPlayer),
                    FieldDescriptor::new::<i64>("counter").policy(PolicyKind::Broadcast),
                ]
            })
        }
    }

    /// Only the whale sees the balance; a balance above `i64::MAX` cannot be
    /// converted, so the whale's part fails while everyone else's succeeds.
    struct VaultLand;

    impl Land for VaultLand {
        type State = Vault;

        fn definition(&self) -> LandDefinition {
            LandDefinition::new::<Vault>("vault")
        }

        fn initial_state(&mut self) -> Vault {
            Vault {
                balance: SyncField::new(
                    0,
                    SyncPolicy::per_player(|v: &u64, viewer: &PlayerId| {
                        (viewer.as_str() == "whale").then_some(*v)
                    }),
                ),
                counter: SyncField::broadcast(0),
            }
        }

        fn on_join(&mut self, _state: &mut Vault, _player: &PlayerId) {}

        fn on_leave(&mut self, _state: &mut Vault, _player: &PlayerId) {}

        fn apply_action(
            &mut self,
            state: &mut Vault,
            _player: &PlayerId,
            action_id: &str,
            payload: &SnapshotValue,
        ) -> Result<(), ActionError> {
            match action_id {
                "deposit" => {
                    state.balance.set(payload.as_i64().map_or(u64::MAX, |v| v as u64));
                    state.counter.modify(|c| *c += 1);
                    Ok(())
                }
                other => Err(ActionError::Unknown(other.to_string())),
            }
        }
    }

    #[test]
    fn test_failed_viewer_gets_full_view_next_round() {
        let mut runtime = LandRuntime::new(VaultLand, &ServerConfig::default()).unwrap();
        let viewers = vec![p("whale"), p("minnow")];
        runtime.join(&p("whale")).unwrap();
        runtime.join(&p("minnow")).unwrap();

        runtime
            .apply_action(&p("whale"), "deposit", &SnapshotValue::Null)
            .unwrap();
        let first = runtime.sync_round(&viewers).unwrap().unwrap();
        assert!(!first.per_player.contains_key(&p("whale")));
        assert!(first.per_player.contains_key(&p("minnow")));

        // the whale missed counter 1; its full view brings it up to date
        runtime
            .apply_action(&p("whale"), "deposit", &SnapshotValue::Int(5))
            .unwrap();
        let second = runtime.sync_round(&viewers).unwrap().unwrap();
        let whale = &second.per_player[&p("whale")];
        assert_eq!(whale.get("counter"), Some(&SnapshotValue::Int(2)));
        assert_eq!(whale.get("balance"), Some(&SnapshotValue::Int(5)));
        assert_eq!(
            second.broadcast.merged_with(whale),
            runtime.state().snapshot(&p("whale"), None).unwrap()
        );

        assert!(runtime.sync_round(&viewers).unwrap().is_none());
    }

    #[test]
    fn test_resync_round_without_changes() {
        let mut runtime = LandRuntime::new(VaultLand, &ServerConfig::default()).unwrap();
        let viewers = vec![p("whale"), p("minnow")];
        runtime.join(&p("whale")).unwrap();
        runtime.join(&p("minnow")).unwrap();
        runtime
            .apply_action(&p("whale"), "deposit", &SnapshotValue::Null)
            .unwrap();
        runtime.sync_round(&viewers).unwrap().unwrap();

        // still unconvertible, so the whale stays owed
        let retry = runtime.sync_round(&viewers).unwrap().unwrap();
        assert!(retry.per_player.is_empty());
        assert!(retry.broadcast.is_empty());
        assert_eq!(runtime.metrics_state().sync_count, 1);

        // a departed viewer is no longer owed anything
        runtime.leave(&p("whale"));
        assert!(runtime.sync_round(&[p("minnow")]).unwrap().is_none());
    }

    #[test]
    fn test_leave_is_synced() {
        let mut runtime = runtime(ServerConfig::default());
        runtime.join(&p("alice")).unwrap();
        runtime.join(&p("bob")).unwrap();
        runtime.sync_round(&[p("alice"), p("bob")]).unwrap();

        runtime.leave(&p("bob"));
        let round = runtime.sync_round(&[p("alice")]).unwrap().unwrap();
        let players = round.broadcast.get("players").unwrap().as_object().unwrap();
        assert!(players.contains_key("alice"));
        assert!(!players.contains_key("bob"));
    }
}
