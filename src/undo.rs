use crate::domain::{Entity, EntityFields, EntityId};
use crate::error::{CoreError, CoreResult};

/// Inverse of one store mutation, holding plain data only.
#[derive(Debug, Clone, PartialEq)]
pub enum UndoEntry {
    /// Inverse of `Add`
    RemoveEntity { id: EntityId },
    /// Inverse of `Edit`: the full prior field tuple
    RestoreEntity { id: EntityId, prior: EntityFields },
    /// Inverse of `Remove`: put the entity back where it was
    ReinsertEntity { position: usize, entity: Entity },
}

impl UndoEntry {
    pub fn entity_id(&self) -> EntityId {
        match self {
            UndoEntry::RemoveEntity { id } | UndoEntry::RestoreEntity { id, .. } => *id,
            UndoEntry::ReinsertEntity { entity, .. } => entity.id(),
        }
    }
}

/// LIFO stack of inverse operations
#[derive(Debug, Clone, Default)]
pub struct UndoManager {
    stack: Vec<UndoEntry>,
}

impl UndoManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: UndoEntry) {
        self.stack.push(entry);
    }

    /// Takes the most recent entry. The caller executes it exactly once;
    /// a failed execution does not put it back.
    pub fn pop(&mut self) -> CoreResult<UndoEntry> {
        self.stack.pop().ok_or(CoreError::EmptyStack)
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}
