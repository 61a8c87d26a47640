//! # Category Views
//!
//! Two name-sorted lists (one per [`Category`]) kept equal to the sorted
//! projection of the entity store. They are updated incrementally from
//! [`StoreChange`] notifications and only rebuilt wholesale on
//! [`StoreChange::Reset`].

use serde::Serialize;
use std::cmp::Ordering;

use crate::domain::{Category, Entity, EntityId};
use crate::store::{EntityStore, StoreChange};

/// Entry of a category view: the entity id plus the sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewEntry {
    pub id: EntityId,
    pub name: String,
}

/// Ordinal, case-insensitive name comparison (both sides upper-cased).
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_uppercase)
        .cmp(b.chars().flat_map(char::to_uppercase))
}

#[derive(Debug, Clone, Default)]
pub struct CategoryViews {
    solar: Vec<ViewEntry>,
    wind: Vec<ViewEntry>,
}

impl CategoryViews {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds both views from the given entities.
    pub fn from_entities(entities: &[Entity]) -> Self {
        let mut views = Self::new();
        views.rebuild(entities);
        views
    }

    pub fn list(&self, category: Category) -> &[ViewEntry] {
        match category {
            Category::Solar => &self.solar,
            Category::Wind => &self.wind,
        }
    }

    pub fn ids(&self, category: Category) -> Vec<EntityId> {
        self.list(category).iter().map(|e| e.id).collect()
    }

    fn list_mut(&mut self, category: Category) -> &mut Vec<ViewEntry> {
        match category {
            Category::Solar => &mut self.solar,
            Category::Wind => &mut self.wind,
        }
    }

    /// Applies one store notification.
    pub fn apply(&mut self, change: &StoreChange, store: &EntityStore) {
        match change {
            StoreChange::Inserted { id, name, category } => {
                insert_sorted(self.list_mut(*category), *id, name);
            }
            StoreChange::Removed { id, .. } => {
                self.remove_everywhere(*id);
            }
            StoreChange::Renamed { id, category, name } => {
                let list = self.list_mut(*category);
                if let Some(i) = list.iter().position(|e| e.id == *id) {
                    list.remove(i);
                    insert_sorted(list, *id, name);
                }
            }
            StoreChange::Recategorized { id, from, to, name } => {
                let list = self.list_mut(*from);
                list.retain(|e| e.id != *id);
                insert_sorted(self.list_mut(*to), *id, name);
            }
            StoreChange::Reset => self.rebuild(store.all()),
        }
    }

    fn remove_everywhere(&mut self, id: EntityId) {
        self.solar.retain(|e| e.id != id);
        self.wind.retain(|e| e.id != id);
    }

    /// Clears both lists and re-inserts every entity in store order.
    pub fn rebuild(&mut self, entities: &[Entity]) {
        self.solar.clear();
        self.wind.clear();
        for entity in entities {
            insert_sorted(self.list_mut(entity.category()), entity.id(), entity.name());
        }
    }
}

/// Inserts before the first entry whose name is not less than `name`.
fn insert_sorted(list: &mut Vec<ViewEntry>, id: EntityId, name: &str) {
    let index = list
        .iter()
        .position(|e| compare_names(&e.name, name) != Ordering::Less)
        .unwrap_or(list.len());
    list.insert(
        index,
        ViewEntry {
            id,
            name: name.to_string(),
        },
    );
}
