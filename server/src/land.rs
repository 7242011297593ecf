//! The game logic hosted by a runtime.

use crate::error::ActionError;
use serde::de::DeserializeOwned;
use shared::schema::LandDefinition;
use shared::sync::StateNode;
use shared::{PlayerId, SnapshotValue};

/// One kind of game instance.
///
/// The land owns its rules; the runtime owns the state tree and drives the
/// mutate → snapshot → clear cycle around these hooks.
pub trait Land: Send + 'static {
    type State: StateNode + Send;

    /// Static registration of the state type, actions and events
    fn definition(&self) -> LandDefinition;

    fn initial_state(&mut self) -> Self::State;

    fn on_join(&mut self, state: &mut Self::State, player: &PlayerId);

    fn on_leave(&mut self, state: &mut Self::State, player: &PlayerId);

    fn apply_action(
        &mut self,
        state: &mut Self::State,
        player: &PlayerId,
        action_id: &str,
        payload: &SnapshotValue,
    ) -> Result<(), ActionError>;

    /// Called once per server tick before the sync round.
    fn tick(&mut self, _state: &mut Self::State, _tick: u32) {}
}

/// Decodes an action payload into its typed form.
pub fn decode_payload<T: DeserializeOwned>(
    action_id: &str,
    payload: &SnapshotValue,
) -> Result<T, ActionError> {
    serde_json::from_value(payload.to_json()).map_err(|e| ActionError::InvalidPayload {
        action: action_id.to_string(),
        reason: e.to_string(),
    })
}
