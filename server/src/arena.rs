//! Demo land: players wander a square arena chasing private goals.
//!
//! The state uses every sync policy:
//! - `round`, `players` broadcast to everyone; each player's `goal` inside
//!   is visible to its owner only
//! - `inventories` is sliced per player
//! - `bounties` uses a custom filter hiding the bounty on yourself
//! - `match_seed` is masked down to its high byte
//! - `rng_seed` never leaves the server

use crate::error::ActionError;
use crate::land::{decode_payload, Land};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use shared::descriptor::{Describe, FieldDescriptor, PolicyKind, TypeDesc};
use shared::math::{Angle, Position2};
use shared::schema::LandDefinition;
use shared::sync::{SyncField, SyncPolicy};
use shared::{state_node, PlayerId, SnapshotValue};
use std::collections::BTreeMap;

pub const ARENA_ID: &str = "arena";
/// Positions stay within `[-ARENA_HALF_SIZE, ARENA_HALF_SIZE]` on both axes
pub const ARENA_HALF_SIZE: i32 = 20;
pub const MAX_STEP: i32 = 1;
pub const START_HP: i32 = 100;
pub const MAX_INVENTORY: usize = 8;

pub struct PlayerState {
    pub name: SyncField<String>,
    pub position: SyncField<Position2>,
    pub facing: SyncField<Angle>,
    pub hp: SyncField<i32>,
    pub score: SyncField<u32>,
    pub goal: SyncField<Position2>,
}
state_node!(PlayerState { name, position, facing, hp, score, goal });

impl PlayerState {
    fn new(owner: &PlayerId, position: Position2, goal: Position2) -> Self {
        let viewer_owner = owner.clone();
        Self {
            name: SyncField::broadcast(owner.to_string()),
            position: SyncField::broadcast(position),
            facing: SyncField::broadcast(Angle::default()),
            hp: SyncField::broadcast(START_HP),
            score: SyncField::broadcast(0),
            goal: SyncField::new(
                goal,
                SyncPolicy::per_player(move |goal: &Position2, viewer: &PlayerId| {
                    (viewer == &viewer_owner).then_some(*goal)
                }),
            ),
        }
    }
}

impl Describe for PlayerState {
    fn describe() -> TypeDesc {
        TypeDesc::state_node("PlayerState", || {
            vec![
                FieldDescriptor::new::<String>("name").policy(PolicyKind::Broadcast),
                FieldDescriptor::new::<Position2>("position").policy(PolicyKind::Broadcast),
                FieldDescriptor::new::<Angle>("facing").policy(PolicyKind::Broadcast),
                FieldDescriptor::new::<i32>("hp")
                    .policy(PolicyKind::Broadcast)
                    .default_value(SnapshotValue::Int(START_HP as i64)),
                FieldDescriptor::new::<u32>("score")
                    .policy(PolicyKind::Broadcast)
                    .default_value(SnapshotValue::Int(0)),
                FieldDescriptor::new::<Position2>("goal").policy(PolicyKind::PerPlayer),
            ]
        })
    }
}

pub struct ArenaState {
    pub round: SyncField<u32>,
    pub players: SyncField<BTreeMap<PlayerId, PlayerState>>,
    pub inventories: SyncField<BTreeMap<PlayerId, Vec<String>>>,
    pub bounties: SyncField<BTreeMap<PlayerId, u32>>,
    pub match_seed: SyncField<u32>,
    pub rng_seed: SyncField<u64>,
}
state_node!(ArenaState { round, players, inventories, bounties, match_seed, rng_seed });

impl ArenaState {
    pub fn new(match_seed: u32, rng_seed: u64) -> Self {
        Self {
            round: SyncField::broadcast(1),
            players: SyncField::broadcast(BTreeMap::new()),
            inventories: SyncField::new(BTreeMap::new(), SyncPolicy::per_player_slice()),
            bounties: SyncField::new(
                BTreeMap::new(),
                SyncPolicy::custom(|bounties: &BTreeMap<PlayerId, u32>, viewer: &PlayerId| {
                    let mut visible = bounties.clone();
                    visible.remove(viewer);
                    Some(visible)
                }),
            ),
            match_seed: SyncField::new(
                match_seed,
                SyncPolicy::masked(|seed: &u32| seed & 0xFF00_0000),
            ),
            rng_seed: SyncField::server_only(rng_seed),
        }
    }

    pub fn player(&self, id: &PlayerId) -> Option<&PlayerState> {
        self.players.get().get(id)
    }
}

impl Describe for ArenaState {
    fn describe() -> TypeDesc {
        TypeDesc::state_node("ArenaState", || {
            vec![
                FieldDescriptor::new::<u32>("round")
                    .policy(PolicyKind::Broadcast)
                    .default_value(SnapshotValue::Int(1)),
                FieldDescriptor::new::<BTreeMap<PlayerId, PlayerState>>("players")
                    .policy(PolicyKind::Broadcast),
                FieldDescriptor::new::<BTreeMap<PlayerId, Vec<String>>>("inventories")
                    .policy(PolicyKind::PerPlayerSlice),
                FieldDescriptor::new::<BTreeMap<PlayerId, u32>>("bounties")
                    .policy(PolicyKind::Custom),
                FieldDescriptor::new::<u32>("match_seed").policy(PolicyKind::Masked),
                FieldDescriptor::new::<u64>("rng_seed").policy(PolicyKind::ServerOnly),
            ]
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoveAction {
    pub dx: i32,
    pub dy: i32,
}

impl Describe for MoveAction {
    fn describe() -> TypeDesc {
        TypeDesc::payload("MoveAction", || {
            vec![
                FieldDescriptor::new::<i32>("dx"),
                FieldDescriptor::new::<i32>("dy"),
            ]
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TurnAction {
    pub degrees: f32,
}

impl Describe for TurnAction {
    fn describe() -> TypeDesc {
        TypeDesc::payload("TurnAction", || vec![FieldDescriptor::new::<f32>("degrees")])
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PickupAction {
    pub item: String,
}

impl Describe for PickupAction {
    fn describe() -> TypeDesc {
        TypeDesc::payload("PickupAction", || vec![FieldDescriptor::new::<String>("item")])
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceBountyAction {
    pub target: PlayerId,
    pub amount: u32,
}

impl Describe for PlaceBountyAction {
    fn describe() -> TypeDesc {
        TypeDesc::payload("PlaceBountyAction", || {
            vec![
                FieldDescriptor::new::<PlayerId>("target"),
                FieldDescriptor::new::<u32>("amount"),
            ]
        })
    }
}

/// Chat line sent by a client
pub struct ChatEvent;

impl Describe for ChatEvent {
    fn describe() -> TypeDesc {
        TypeDesc::payload("ChatEvent", || vec![FieldDescriptor::new::<String>("text")])
    }
}

/// Announced by the server when a new round starts
pub struct RoundStartedEvent;

impl Describe for RoundStartedEvent {
    fn describe() -> TypeDesc {
        TypeDesc::payload("RoundStartedEvent", || vec![FieldDescriptor::new::<u32>("round")])
    }
}

pub struct ArenaLand {
    rng: StdRng,
    ticks_per_round: u32,
}

impl ArenaLand {
    pub fn new(seed: u64, ticks_per_round: u32) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ticks_per_round: ticks_per_round.max(1),
        }
    }

    fn random_cell(&mut self) -> Position2 {
        Position2::new(
            self.rng.gen_range(-ARENA_HALF_SIZE..=ARENA_HALF_SIZE),
            self.rng.gen_range(-ARENA_HALF_SIZE..=ARENA_HALF_SIZE),
        )
    }

    fn move_player(
        &mut self,
        state: &mut ArenaState,
        player: &PlayerId,
        action: MoveAction,
    ) -> Result<(), ActionError> {
        let next_goal = self.random_cell();
        let entry = state
            .players
            .nested_mut()
            .get_mut(player)
            .ok_or_else(|| ActionError::NotJoined(player.to_string()))?;

        let step_x = action.dx.clamp(-MAX_STEP, MAX_STEP);
        let step_y = action.dy.clamp(-MAX_STEP, MAX_STEP);
        let moved = Position2 {
            v: entry
                .position
                .v
                .offset_clamped(step_x, step_y, -ARENA_HALF_SIZE, ARENA_HALF_SIZE),
        };
        entry.position.set(moved);

        if moved == *entry.goal.get() {
            entry.score.modify(|score| *score += 1);
            entry.goal.set(next_goal);
            debug!("{} reached their goal", player);
        }
        Ok(())
    }
}

impl Default for ArenaLand {
    fn default() -> Self {
        Self::new(rand::random(), 600)
    }
}

impl Land for ArenaLand {
    type State = ArenaState;

    fn definition(&self) -> LandDefinition {
        LandDefinition::new::<ArenaState>(ARENA_ID)
            .action::<MoveAction>()
            .action::<TurnAction>()
            .action::<PickupAction>()
            .action::<PlaceBountyAction>()
            .client_event::<ChatEvent>()
            .server_event::<RoundStartedEvent>()
    }

    fn initial_state(&mut self) -> ArenaState {
        ArenaState::new(self.rng.gen(), self.rng.gen())
    }

    fn on_join(&mut self, state: &mut ArenaState, player: &PlayerId) {
        let position = self.random_cell();
        let goal = self.random_cell();
        state
            .players
            .insert(player.clone(), PlayerState::new(player, position, goal));
        state.inventories.insert(player.clone(), Vec::new());
    }

    fn on_leave(&mut self, state: &mut ArenaState, player: &PlayerId) {
        state.players.remove(player);
        state.inventories.remove(player);
        if state.bounties.contains_key(player) {
            state.bounties.remove(player);
        }
    }

    fn apply_action(
        &mut self,
        state: &mut ArenaState,
        player: &PlayerId,
        action_id: &str,
        payload: &SnapshotValue,
    ) -> Result<(), ActionError> {
        if !state.players.contains_key(player) {
            return Err(ActionError::NotJoined(player.to_string()));
        }

        match action_id {
            "move" => {
                let action: MoveAction = decode_payload(action_id, payload)?;
                self.move_player(state, player, action)
            }
            "turn" => {
                let action: TurnAction = decode_payload(action_id, payload)?;
                if let Some(entry) = state.players.nested_mut().get_mut(player) {
                    entry.facing.set(Angle::from_degrees(action.degrees));
                }
                Ok(())
            }
            "pickup" => {
                let action: PickupAction = decode_payload(action_id, payload)?;
                let full = state
                    .inventories
                    .get()
                    .get(player)
                    .map_or(false, |items| items.len() >= MAX_INVENTORY);
                if full {
                    return Err(ActionError::InvalidPayload {
                        action: action_id.to_string(),
                        reason: "inventory full".to_string(),
                    });
                }
                state.inventories.modify(|inventories| {
                    inventories
                        .entry(player.clone())
                        .or_default()
                        .push(action.item)
                });
                Ok(())
            }
            "placeBounty" => {
                let action: PlaceBountyAction = decode_payload(action_id, payload)?;
                if !state.players.contains_key(&action.target) {
                    return Err(ActionError::NotJoined(action.target.to_string()));
                }
                state.bounties.modify(|bounties| {
                    let total = bounties.entry(action.target).or_insert(0);
                    *total = total.saturating_add(action.amount);
                });
                Ok(())
            }
            other => Err(ActionError::Unknown(other.to_string())),
        }
    }

    fn tick(&mut self, state: &mut ArenaState, tick: u32) {
        if tick == 0 || tick % self.ticks_per_round != 0 {
            return;
        }
        state.round.modify(|round| *round += 1);
        state.match_seed.set(self.rng.gen());
        state.rng_seed.set(self.rng.gen());
        info!("Round {} started", state.round.get());
    }
}
