use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{EngineEvent, Snapshot};
use crate::domain::{is_valid_value, Category, Entity, EntityId, EntityPatch};
use strum::IntoEnumIterator;
use crate::error::{CoreError, CoreResult};
use crate::measurement::{MeasurementLog, MeasurementRecord};
use crate::store::{EntityStore, StoreChange};
use crate::topology::{ConnectOutcome, TopologyGraph};
use crate::undo::{UndoEntry, UndoManager};
use crate::views::{compare_names, CategoryViews};

/// Authoritative state plus every view derived from it.
///
/// All mutations go through `&mut self` methods, so exclusive access is the
/// single-writer discipline; [`super::spawn_engine`] provides that access
/// from one task.
pub struct EngineState {
    store: EntityStore,
    views: CategoryViews,
    topology: TopologyGraph,
    undo: UndoManager,
    log: Arc<dyn MeasurementLog>,
    events: broadcast::Sender<EngineEvent>,
    /// Events buffered between `hold_events` and `release_events`
    held: Option<Vec<EngineEvent>>,
}

impl EngineState {
    pub fn new(log: Arc<dyn MeasurementLog>, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            store: EntityStore::new(),
            views: CategoryViews::new(),
            topology: TopologyGraph::new(),
            undo: UndoManager::new(),
            log,
            events,
            held: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<EngineEvent> {
        self.events.clone()
    }

    pub fn log(&self) -> Arc<dyn MeasurementLog> {
        Arc::clone(&self.log)
    }

    fn emit(&mut self, event: EngineEvent) {
        match &mut self.held {
            Some(held) => held.push(event),
            // no subscribers is fine
            None => {
                let _ = self.events.send(event);
            }
        }
    }

    /// Buffers events until [`Self::release_events`], so the mutation task
    /// can publish a snapshot before subscribers hear about the change.
    pub(crate) fn hold_events(&mut self) {
        self.held.get_or_insert_with(Vec::new);
    }

    pub(crate) fn release_events(&mut self) {
        for event in self.held.take().unwrap_or_default() {
            let _ = self.events.send(event);
        }
    }

    fn record(&self, id: EntityId, value: f64) -> CoreResult<()> {
        self.log.append(&MeasurementRecord {
            timestamp: Utc::now(),
            entity_id: id,
            value,
            is_valid: is_valid_value(value),
        })
    }

    fn notify_views(&mut self, change: &StoreChange) {
        self.views.apply(change, &self.store);
    }

    // ------------------------------------------------------------------
    // Entity store
    // ------------------------------------------------------------------

    pub fn get(&self, id: EntityId) -> CoreResult<&Entity> {
        self.store.get(id).ok_or(CoreError::NotFound(id))
    }

    /// Entities in insertion order
    pub fn all(&self) -> &[Entity] {
        self.store.all()
    }

    pub fn add(
        &mut self,
        id: EntityId,
        name: &str,
        category: Category,
        value: f64,
    ) -> CoreResult<Entity> {
        validate_id(id)?;
        let name = validate_name(name)?;
        if self.store.contains(id) {
            return Err(CoreError::DuplicateId(id));
        }
        self.record(id, value)?;

        let entity = Entity::new(id, name, category, value);
        let change = self.store.push(entity.clone());
        self.notify_views(&change);
        self.undo.push(UndoEntry::RemoveEntity { id });

        info!(entity_id = id, %category, value, valid = entity.is_valid(), "entity added");
        self.emit(EngineEvent::EntityStoreChanged);
        Ok(entity)
    }

    pub fn edit(&mut self, id: EntityId, patch: EntityPatch) -> CoreResult<Entity> {
        let current = self.get(id)?;
        let prior = current.fields();
        let name = patch.name.as_deref().map(validate_name).transpose()?;
        let value_changed = patch.value.is_some_and(|v| v != prior.value);
        if let Some(value) = patch.value.filter(|_| value_changed) {
            self.record(id, value)?;
        }

        let change = self
            .store
            .update(id, name, patch.category, patch.value)
            .ok_or(CoreError::NotFound(id))?;
        if let Some(change) = &change {
            self.notify_views(change);
        }
        self.undo.push(UndoEntry::RestoreEntity { id, prior });

        let entity = self.get(id)?.clone();
        debug!(entity_id = id, value_changed, "entity edited");
        if change.is_some() {
            self.emit(EngineEvent::EntityStoreChanged);
        }
        if value_changed {
            self.emit(EngineEvent::MeasurementArrived { entity_id: id });
        }
        Ok(entity)
    }

    pub fn remove(&mut self, id: EntityId) -> CoreResult<Entity> {
        let (position, entity) = self.detach(id)?;
        self.undo.push(UndoEntry::ReinsertEntity {
            position,
            entity: entity.clone(),
        });
        info!(entity_id = id, position, "entity removed");
        Ok(entity)
    }

    /// Value update from the measurement source. Logged, never undoable.
    pub fn apply_measurement(&mut self, id: EntityId, value: f64) -> CoreResult<Entity> {
        if !self.store.contains(id) {
            return Err(CoreError::NotFound(id));
        }
        self.record(id, value)?;
        let entity = self
            .store
            .set_value(id, value)
            .ok_or(CoreError::NotFound(id))?
            .clone();
        debug!(entity_id = id, value, valid = entity.is_valid(), "measurement applied");
        self.emit(EngineEvent::MeasurementArrived { entity_id: id });
        Ok(entity)
    }

    /// Replaces the whole store, rebuilds both views and forgets undo
    /// history.
    pub fn reset(&mut self, entities: Vec<Entity>) -> CoreResult<()> {
        let mut seen = HashSet::new();
        for entity in &entities {
            validate_id(entity.id())?;
            validate_name(entity.name())?;
            if !seen.insert(entity.id()) {
                return Err(CoreError::DuplicateId(entity.id()));
            }
        }

        // validity is always rederived from the value
        let entities = entities
            .into_iter()
            .map(|e| Entity::new(e.id(), e.name(), e.category(), e.last_value()))
            .collect();
        let change = self.store.replace_all(entities);
        self.notify_views(&change);
        let store = &self.store;
        let evicted = self.topology.retain_occupants(|id| store.contains(id));
        self.undo.clear();

        info!(entities = self.store.len(), evicted, "entity store reset");
        self.emit(EngineEvent::EntityStoreChanged);
        if evicted {
            self.emit(EngineEvent::TopologyChanged);
        }
        Ok(())
    }

    /// Truncates the measurement log back to its header. Not undoable.
    pub fn clear_log(&mut self) -> CoreResult<()> {
        self.log.clear()?;
        info!("measurement log cleared");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Topology
    // ------------------------------------------------------------------

    pub fn assign_to_slot(&mut self, slot: usize, id: EntityId) -> CoreResult<()> {
        if !self.store.contains(id) {
            return Err(CoreError::NotFound(id));
        }
        if self.topology.assign_to_slot(slot, id)? {
            debug!(slot, entity_id = id, "slot assigned");
            self.emit(EngineEvent::TopologyChanged);
        }
        Ok(())
    }

    pub fn vacate_slot(&mut self, slot: usize) -> CoreResult<Option<EntityId>> {
        let evicted = self.topology.vacate_slot(slot)?;
        if let Some(id) = evicted {
            debug!(slot, entity_id = id, "slot vacated");
            self.emit(EngineEvent::TopologyChanged);
        }
        Ok(evicted)
    }

    pub fn toggle_connect(&mut self, id: EntityId) -> CoreResult<ConnectOutcome> {
        if !self.store.contains(id) {
            return Err(CoreError::NotFound(id));
        }
        let outcome = self.topology.toggle_connect(id)?;
        if let ConnectOutcome::Linked(link) = outcome {
            debug!(source = link.source, target = link.target, "link created");
            self.emit(EngineEvent::TopologyChanged);
        }
        Ok(outcome)
    }

    pub fn toggle_connect_mode(&mut self) -> bool {
        self.topology.toggle_connect_mode()
    }

    pub fn topology(&self) -> &TopologyGraph {
        &self.topology
    }

    pub fn views(&self) -> &CategoryViews {
        &self.views
    }

    // ------------------------------------------------------------------
    // Undo
    // ------------------------------------------------------------------

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// Pops and executes the most recent inverse. A failing inverse is
    /// still consumed.
    pub fn undo(&mut self) -> CoreResult<UndoEntry> {
        let entry = self.undo.pop()?;
        match self.apply_inverse(entry.clone()) {
            Ok(()) => {
                info!(entity_id = entry.entity_id(), remaining = self.undo.len(), "undo applied");
                Ok(entry)
            }
            Err(e) => {
                warn!(entity_id = entry.entity_id(), error = %e, kind = e.kind(), "undo entry failed and was discarded");
                Err(e)
            }
        }
    }

    fn apply_inverse(&mut self, entry: UndoEntry) -> CoreResult<()> {
        match entry {
            UndoEntry::RemoveEntity { id } => {
                self.detach(id)?;
            }
            UndoEntry::RestoreEntity { id, prior } => {
                let before = self.get(id)?.last_value();
                let restored_value = prior.value;
                let change = self
                    .store
                    .restore(id, prior)
                    .ok_or(CoreError::NotFound(id))?;
                if let Some(change) = &change {
                    self.notify_views(change);
                    self.emit(EngineEvent::EntityStoreChanged);
                }
                if before != restored_value {
                    self.emit(EngineEvent::MeasurementArrived { entity_id: id });
                }
            }
            UndoEntry::ReinsertEntity { position, entity } => {
                if self.store.contains(entity.id()) {
                    return Err(CoreError::DuplicateId(entity.id()));
                }
                let change = self.store.insert(position, entity);
                self.notify_views(&change);
                self.emit(EngineEvent::EntityStoreChanged);
            }
        }
        Ok(())
    }

    /// Removes an entity with every cascade but without touching the undo
    /// stack.
    fn detach(&mut self, id: EntityId) -> CoreResult<(usize, Entity)> {
        let (position, entity, change) = self.store.remove(id).ok_or(CoreError::NotFound(id))?;
        self.notify_views(&change);
        if self.topology.evict(id) {
            self.emit(EngineEvent::TopologyChanged);
        }
        self.emit(EngineEvent::EntityStoreChanged);
        Ok((position, entity))
    }

    // ------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            entities: self.store.all().to_vec(),
            solar: self.views.list(Category::Solar).to_vec(),
            wind: self.views.list(Category::Wind).to_vec(),
            slots: self.topology.slots(),
            links: self.topology.links().to_vec(),
            pending_connect: self.topology.pending(),
            connect_mode: self.topology.connect_mode(),
            undo_depth: self.undo.len(),
        }
    }

    /// Describes every broken cross-structure invariant; empty when the
    /// state is consistent.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for slot in self.topology.slots() {
            if let Some(id) = slot.occupant {
                if !self.store.contains(id) {
                    problems.push(format!("slot {} holds unknown entity {id}", slot.index));
                }
                let count = self
                    .topology
                    .slots()
                    .iter()
                    .filter(|s| s.occupant == Some(id))
                    .count();
                if count > 1 {
                    problems.push(format!("entity {id} occupies {count} slots"));
                }
            }
        }

        for link in self.topology.links() {
            for end in [link.source, link.target] {
                if self.topology.slot_of(end).is_none() {
                    problems.push(format!("link endpoint {end} occupies no slot"));
                }
            }
        }

        for category in Category::iter() {
            let view = self.views.list(category);
            let mut expected: Vec<_> = self
                .store
                .all()
                .iter()
                .filter(|e| e.category() == category)
                .map(|e| e.id())
                .collect();
            let mut actual: Vec<_> = view.iter().map(|e| e.id).collect();
            expected.sort_unstable();
            actual.sort_unstable();
            if expected != actual {
                problems.push(format!("{category} view members differ from store"));
            }
            for entry in view {
                match self.store.get(entry.id) {
                    Some(e) if e.name() == entry.name => {}
                    _ => problems.push(format!("{category} view entry {} is stale", entry.id)),
                }
            }
            if view
                .windows(2)
                .any(|w| compare_names(&w[0].name, &w[1].name) == std::cmp::Ordering::Greater)
            {
                problems.push(format!("{category} view is out of order"));
            }
        }

        for entity in self.store.all() {
            if entity.is_valid() != is_valid_value(entity.last_value()) {
                problems.push(format!("entity {} has stale validity", entity.id()));
            }
        }

        problems
    }
}

fn validate_id(id: EntityId) -> CoreResult<()> {
    if id <= 0 {
        return Err(CoreError::invalid(format!("entity id must be positive, got {id}")));
    }
    Ok(())
}

fn validate_name(name: &str) -> CoreResult<String> {
    if name.trim().is_empty() {
        return Err(CoreError::invalid("entity name must not be empty"));
    }
    Ok(name.to_string())
}
