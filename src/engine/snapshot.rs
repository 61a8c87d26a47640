use serde::Serialize;

use crate::domain::{Category, Entity, EntityId};
use crate::topology::{Link, Slot};
use crate::views::ViewEntry;

/// Which entity attribute a search matches against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Name,
    Category,
}

/// Immutable copy of the engine state taken between two mutations
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    /// Store order, not category-sorted
    pub entities: Vec<Entity>,
    pub solar: Vec<ViewEntry>,
    pub wind: Vec<ViewEntry>,
    pub slots: Vec<Slot>,
    pub links: Vec<Link>,
    pub pending_connect: Option<EntityId>,
    pub connect_mode: bool,
    pub undo_depth: usize,
}

impl Snapshot {
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id() == id)
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn view(&self, category: Category) -> &[ViewEntry] {
        match category {
            Category::Solar => &self.solar,
            Category::Wind => &self.wind,
        }
    }

    /// Entities of one category in view (name) order
    pub fn sorted(&self, category: Category) -> Vec<&Entity> {
        self.view(category)
            .iter()
            .filter_map(|entry| self.get(entry.id))
            .collect()
    }

    pub fn slot_of(&self, id: EntityId) -> Option<usize> {
        self.slots
            .iter()
            .find(|slot| slot.occupant == Some(id))
            .map(|slot| slot.index)
    }

    /// Case-insensitive substring filter in store order. Blank text matches
    /// everything.
    pub fn search(&self, field: SearchField, text: &str) -> Vec<&Entity> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() {
            return self.entities.iter().collect();
        }
        self.entities
            .iter()
            .filter(|e| match field {
                SearchField::Name => e.name().to_lowercase().contains(&needle),
                SearchField::Category => e.category().to_string().to_lowercase().contains(&needle),
            })
            .collect()
    }

    /// Suggested id for a new entity
    pub fn next_id(&self) -> EntityId {
        self.entities.iter().map(|e| e.id()).max().map_or(1, |max| max + 1)
    }
}
