//! # Entity Store
//!
//! Authoritative, insertion-ordered collection of entities. Every structural
//! mutation reports a [`StoreChange`] that the derived views consume; the
//! store itself performs no argument validation (that is the mutation gate's
//! job in [`crate::engine`]).

use crate::domain::{Category, Entity, EntityFields, EntityId};

/// Notification emitted by the store after a mutation that can affect the
/// category views. Value-only updates produce no notification.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    Inserted {
        id: EntityId,
        name: String,
        category: Category,
    },
    Removed {
        id: EntityId,
        category: Category,
    },
    Renamed {
        id: EntityId,
        category: Category,
        name: String,
    },
    Recategorized {
        id: EntityId,
        from: Category,
        to: Category,
        name: String,
    },
    /// The whole store was replaced; views must rebuild from scratch.
    Reset,
}

#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    entities: Vec<Entity>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.position(id).is_some()
    }

    pub fn position(&self, id: EntityId) -> Option<usize> {
        self.entities.iter().position(|e| e.id() == id)
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id() == id)
    }

    /// All entities in insertion order
    pub fn all(&self) -> &[Entity] {
        &self.entities
    }

    /// Inserts at `position`, clamped to the current length.
    pub fn insert(&mut self, position: usize, entity: Entity) -> StoreChange {
        let change = StoreChange::Inserted {
            id: entity.id(),
            name: entity.name().to_string(),
            category: entity.category(),
        };
        let position = position.min(self.entities.len());
        self.entities.insert(position, entity);
        change
    }

    pub fn push(&mut self, entity: Entity) -> StoreChange {
        let end = self.entities.len();
        self.insert(end, entity)
    }

    /// Removes the entity, returning its former position alongside it.
    pub fn remove(&mut self, id: EntityId) -> Option<(usize, Entity, StoreChange)> {
        let position = self.position(id)?;
        let entity = self.entities.remove(position);
        let change = StoreChange::Removed {
            id,
            category: entity.category(),
        };
        Some((position, entity, change))
    }

    /// Sets the measured value; validity follows.
    pub fn set_value(&mut self, id: EntityId, value: f64) -> Option<&Entity> {
        let entity = self.entities.iter_mut().find(|e| e.id() == id)?;
        entity.set_value(value);
        Some(entity)
    }

    /// Applies name/category/value together and reports the resulting view
    /// change, if any.
    pub fn update(
        &mut self,
        id: EntityId,
        name: Option<String>,
        category: Option<Category>,
        value: Option<f64>,
    ) -> Option<Option<StoreChange>> {
        let entity = self.entities.iter_mut().find(|e| e.id() == id)?;
        let old_name = entity.name().to_string();
        let old_category = entity.category();

        if let Some(name) = name {
            entity.set_name(name);
        }
        if let Some(category) = category {
            entity.set_category(category);
        }
        if let Some(value) = value {
            entity.set_value(value);
        }
        Some(classify_change(entity, &old_name, old_category))
    }

    /// Puts back a previously captured field tuple.
    pub fn restore(&mut self, id: EntityId, fields: EntityFields) -> Option<Option<StoreChange>> {
        let entity = self.entities.iter_mut().find(|e| e.id() == id)?;
        let old_name = entity.name().to_string();
        let old_category = entity.category();
        entity.restore(fields);
        Some(classify_change(entity, &old_name, old_category))
    }

    /// Replaces every entity at once.
    pub fn replace_all(&mut self, entities: Vec<Entity>) -> StoreChange {
        self.entities = entities;
        StoreChange::Reset
    }
}

fn classify_change(entity: &Entity, old_name: &str, old_category: Category) -> Option<StoreChange> {
    if entity.category() != old_category {
        Some(StoreChange::Recategorized {
            id: entity.id(),
            from: old_category,
            to: entity.category(),
            name: entity.name().to_string(),
        })
    } else if entity.name() != old_name {
        Some(StoreChange::Renamed {
            id: entity.id(),
            category: entity.category(),
            name: entity.name().to_string(),
        })
    } else {
        None
    }
}
