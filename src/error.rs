use thiserror::Error;

use crate::domain::EntityId;

/// Errors returned by the mutation gate and its collaborators.
///
/// None of these are retried inside the engine; they go straight back to the
/// caller that issued the operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("Entity {0} already exists")]
    DuplicateId(EntityId),

    #[error("Entity {0} not found")]
    NotFound(EntityId),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Slot {slot} is already occupied by entity {occupant}")]
    SlotOccupied { slot: usize, occupant: EntityId },

    #[error("Nothing to undo")]
    EmptyStack,

    #[error("Measurement log failure: {0}")]
    PersistenceFailure(String),

    #[error("Engine task is no longer running")]
    EngineClosed,
}

impl CoreError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        CoreError::InvalidArgument(msg.into())
    }

    /// Stable name of the error kind, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::DuplicateId(_) => "DuplicateId",
            CoreError::NotFound(_) => "NotFound",
            CoreError::InvalidArgument(_) => "InvalidArgument",
            CoreError::SlotOccupied { .. } => "SlotOccupied",
            CoreError::EmptyStack => "EmptyStack",
            CoreError::PersistenceFailure(_) => "PersistenceFailure",
            CoreError::EngineClosed => "EngineClosed",
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(error: std::io::Error) -> Self {
        CoreError::PersistenceFailure(error.to_string())
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
