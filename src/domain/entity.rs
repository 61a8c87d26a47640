use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Externally assigned entity identifier. Valid ids are strictly positive.
pub type EntityId = i64;

/// Lower bound of the valid measurement range (MW, inclusive)
pub const VALID_MIN_MW: f64 = 1.0;
/// Upper bound of the valid measurement range (MW, inclusive)
pub const VALID_MAX_MW: f64 = 5.0;

/// Classify a measured value. Validity is a classification, never a gate.
pub fn is_valid_value(value: f64) -> bool {
    (VALID_MIN_MW..=VALID_MAX_MW).contains(&value)
}

/// Kind of distributed energy resource
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum Category {
    Solar,
    Wind,
}

/// Monitored energy resource with its latest measured value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredEntity")]
pub struct Entity {
    id: EntityId,
    name: String,
    category: Category,
    last_value: f64,
    is_valid: bool,
}

impl Entity {
    pub fn new(id: EntityId, name: impl Into<String>, category: Category, value: f64) -> Self {
        Self {
            id,
            name: name.into(),
            category,
            last_value: value,
            is_valid: is_valid_value(value),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn last_value(&self) -> f64 {
        self.last_value
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// Mutable fields, as captured for undo
    pub fn fields(&self) -> EntityFields {
        EntityFields {
            name: self.name.clone(),
            category: self.category,
            value: self.last_value,
        }
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) fn set_category(&mut self, category: Category) {
        self.category = category;
    }

    /// Updates the value and recomputes validity in one step.
    pub(crate) fn set_value(&mut self, value: f64) {
        self.last_value = value;
        self.is_valid = is_valid_value(value);
    }

    pub(crate) fn restore(&mut self, fields: EntityFields) {
        self.name = fields.name;
        self.category = fields.category;
        self.set_value(fields.value);
    }
}

/// Serialized form read back into an [`Entity`]. Any stored `is_valid` is
/// ignored and recomputed from `last_value`.
#[derive(Deserialize)]
struct StoredEntity {
    id: EntityId,
    name: String,
    category: Category,
    last_value: f64,
}

impl From<StoredEntity> for Entity {
    fn from(stored: StoredEntity) -> Self {
        Entity::new(stored.id, stored.name, stored.category, stored.last_value)
    }
}

/// The caller-editable part of an entity. Validity is derived from `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityFields {
    pub name: String,
    pub category: Category,
    pub value: f64,
}

/// Partial update applied by `Edit`; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityPatch {
    pub name: Option<String>,
    pub category: Option<Category>,
    pub value: Option<f64>,
}

impl EntityPatch {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }
}
