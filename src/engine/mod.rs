//! # Engine
//!
//! The single mutation gate over the entity store and everything derived
//! from it. [`EngineState`] applies one operation at a time synchronously;
//! [`spawn_engine`] wraps it in a task fed by a FIFO channel so that
//! generator ticks and caller operations interleave without racing.
//!
//! ## Flow of one mutation
//!
//! 1. Validate arguments against the current store.
//! 2. Append a measurement record when a value is accepted (before any
//!    in-memory change, so a persistence failure leaves state untouched).
//! 3. Apply the change to the store and forward the resulting
//!    [`crate::store::StoreChange`] to the category views.
//! 4. Cascade into the topology graph on removal.
//! 5. Push the inverse onto the undo stack (value updates from the
//!    generator are never undoable).
//! 6. Broadcast [`EngineEvent`]s and publish a fresh [`Snapshot`].

pub mod handle;
pub mod snapshot;
pub mod state;

pub use handle::{spawn_engine, EngineHandle};
pub use snapshot::{SearchField, Snapshot};
pub use state::EngineState;

use serde::Serialize;

use crate::domain::EntityId;

/// Notifications for external presentation layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineEvent {
    /// A value update for this entity was committed
    MeasurementArrived { entity_id: EntityId },
    /// Entities were added, removed, renamed, recategorized or reset
    EntityStoreChanged,
    /// A slot or link changed
    TopologyChanged,
}
