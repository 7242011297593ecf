use shared::{SchemaError, SnapshotError};
use thiserror::Error;

/// Failures of the land runtime and its network loop.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("network error: {0}")]
    Io(#[from] std::io::Error),

    #[error("packet encoding failed: {0}")]
    Encode(#[from] bincode::Error),

    #[error("protocol schema could not be built: {0}")]
    Schema(#[from] SchemaError),

    #[error("schema document could not be written: {0}")]
    Json(#[from] serde_json::Error),

    #[error("broadcast snapshot failed: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Rejections of a single client action. The action is dropped, the client
/// stays connected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("unknown action '{0}'")]
    Unknown(String),

    #[error("invalid payload for '{action}': {reason}")]
    InvalidPayload { action: String, reason: String },

    #[error("player '{0}' is not in this land")]
    NotJoined(String),
}
