use thiserror::Error;

/// Errors raised while materialising snapshots.
///
/// A failure is scoped to one snapshot call for one viewer; callers keep
/// computing other viewers' snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    /// A raw value could not be converted to the shared value model
    #[error("cannot convert field '{field}' of type {type_name}: {reason}")]
    Conversion {
        field: String,
        type_name: String,
        reason: String,
    },

    /// A map key could not be rendered as a snapshot object key
    #[error("unsupported map key in field '{field}': {reason}")]
    UnsupportedKey { field: String, reason: String },
}

impl SnapshotError {
    /// Prefixes the failing field with its parent's name, producing a
    /// dotted path such as `players.p1.inventory`.
    pub fn within(self, parent: &str) -> Self {
        let join = |field: String| {
            if field.is_empty() {
                parent.to_string()
            } else {
                format!("{}.{}", parent, field)
            }
        };
        match self {
            SnapshotError::Conversion {
                field,
                type_name,
                reason,
            } => SnapshotError::Conversion {
                field: join(field),
                type_name,
                reason,
            },
            SnapshotError::UnsupportedKey { field, reason } => SnapshotError::UnsupportedKey {
                field: join(field),
                reason,
            },
        }
    }
}

/// Errors raised while assembling a protocol schema document.
///
/// Field conversion itself never fails; these only abort document assembly.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The canonical encoding used for hashing could not be produced
    #[error("failed to encode schema document: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The input is not a valid schema document
    #[error("failed to decode schema document: {0}")]
    Decoding(#[source] serde_json::Error),

    /// A land's root state type is not a composite with fields
    #[error("land '{land}' has root type '{type_name}' which is not a state node")]
    InvalidRoot { land: String, type_name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_builds_dotted_path() {
        let err = SnapshotError::Conversion {
            field: "gold".to_string(),
            type_name: "u64".to_string(),
            reason: "too large".to_string(),
        };

        let err = err.within("p1").within("players");
        assert_eq!(
            err.to_string(),
            "cannot convert field 'players.p1.gold' of type u64: too large"
        );
    }

    #[test]
    fn test_within_fills_empty_field() {
        let err = SnapshotError::UnsupportedKey {
            field: String::new(),
            reason: "tuple key".to_string(),
        };
        match err.within("grid") {
            SnapshotError::UnsupportedKey { field, .. } => assert_eq!(field, "grid"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
