//! # Topology Graph
//!
//! Twelve fixed display slots, each holding at most one entity, plus a set of
//! undirected links between slot occupants. Links are created through a
//! two-click protocol ([`TopologyGraph::toggle_connect`]) and are cascaded
//! away whenever an endpoint leaves its slot by eviction.

use serde::Serialize;

use crate::domain::EntityId;
use crate::error::{CoreError, CoreResult};

/// Number of slots, fixed for the lifetime of the graph
pub const SLOT_COUNT: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Slot {
    /// 1-based slot index
    pub index: usize,
    pub occupant: Option<EntityId>,
}

/// Undirected link; `(a, b)` and `(b, a)` denote the same link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Link {
    pub source: EntityId,
    pub target: EntityId,
}

impl Link {
    pub fn touches(&self, id: EntityId) -> bool {
        self.source == id || self.target == id
    }

    pub fn joins(&self, a: EntityId, b: EntityId) -> bool {
        (self.source == a && self.target == b) || (self.source == b && self.target == a)
    }
}

/// Result of one [`TopologyGraph::toggle_connect`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// First endpoint recorded, waiting for the second click
    Pending(EntityId),
    /// Same id clicked twice; pending endpoint cleared
    Cancelled,
    Linked(Link),
    /// Pair was already linked; nothing added
    AlreadyLinked,
}

#[derive(Debug, Clone)]
pub struct TopologyGraph {
    slots: [Option<EntityId>; SLOT_COUNT],
    links: Vec<Link>,
    pending: Option<EntityId>,
    connect_mode: bool,
}

impl Default for TopologyGraph {
    fn default() -> Self {
        Self {
            slots: [None; SLOT_COUNT],
            links: Vec::new(),
            pending: None,
            connect_mode: false,
        }
    }
}

impl TopologyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slots(&self) -> Vec<Slot> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, occupant)| Slot {
                index: i + 1,
                occupant: *occupant,
            })
            .collect()
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn pending(&self) -> Option<EntityId> {
        self.pending
    }

    pub fn occupant(&self, slot_index: usize) -> CoreResult<Option<EntityId>> {
        Ok(self.slots[to_offset(slot_index)?])
    }

    /// 1-based index of the slot holding `id`
    pub fn slot_of(&self, id: EntityId) -> Option<usize> {
        self.slots
            .iter()
            .position(|occupant| *occupant == Some(id))
            .map(|i| i + 1)
    }

    /// Places `id` into the slot. An entity moving from another slot keeps
    /// its links; only eviction cascades.
    pub fn assign_to_slot(&mut self, slot_index: usize, id: EntityId) -> CoreResult<bool> {
        let offset = to_offset(slot_index)?;
        match self.slots[offset] {
            Some(current) if current == id => return Ok(false),
            Some(occupant) => {
                return Err(CoreError::SlotOccupied {
                    slot: slot_index,
                    occupant,
                })
            }
            None => {}
        }
        if let Some(previous) = self.slot_of(id) {
            self.slots[previous - 1] = None;
        }
        self.slots[offset] = Some(id);
        Ok(true)
    }

    /// Clears the slot and removes every link of its former occupant.
    /// Returns the evicted id, if there was one.
    pub fn vacate_slot(&mut self, slot_index: usize) -> CoreResult<Option<EntityId>> {
        let offset = to_offset(slot_index)?;
        let evicted = self.slots[offset].take();
        if let Some(id) = evicted {
            self.drop_links_of(id);
            if self.pending == Some(id) {
                self.pending = None;
            }
        }
        Ok(evicted)
    }

    /// Evicts `id` from whatever slot it occupies. Returns whether anything
    /// changed.
    pub fn evict(&mut self, id: EntityId) -> bool {
        let mut changed = false;
        if let Some(slot) = self.slot_of(id) {
            self.slots[slot - 1] = None;
            changed = true;
        }
        changed |= self.drop_links_of(id);
        if self.pending == Some(id) {
            self.pending = None;
            changed = true;
        }
        changed
    }

    fn drop_links_of(&mut self, id: EntityId) -> bool {
        let before = self.links.len();
        self.links.retain(|link| !link.touches(id));
        self.links.len() != before
    }

    /// Two-click link protocol. The first call records a pending endpoint;
    /// the second either cancels (same id) or links the pair, and always
    /// clears the pending endpoint.
    pub fn toggle_connect(&mut self, id: EntityId) -> CoreResult<ConnectOutcome> {
        if self.slot_of(id).is_none() {
            return Err(CoreError::invalid(format!(
                "entity {id} does not occupy a slot"
            )));
        }
        let Some(first) = self.pending.take() else {
            self.pending = Some(id);
            return Ok(ConnectOutcome::Pending(id));
        };
        if first == id {
            return Ok(ConnectOutcome::Cancelled);
        }
        if self.links.iter().any(|link| link.joins(first, id)) {
            return Ok(ConnectOutcome::AlreadyLinked);
        }
        let link = Link {
            source: first,
            target: id,
        };
        self.links.push(link);
        Ok(ConnectOutcome::Linked(link))
    }

    pub fn connect_mode(&self) -> bool {
        self.connect_mode
    }

    /// Flips the connect-mode flag. Callers use it to gate `toggle_connect`;
    /// the graph never consults it.
    pub fn toggle_connect_mode(&mut self) -> bool {
        self.connect_mode = !self.connect_mode;
        self.connect_mode
    }

    /// Evicts every occupant for which `keep` is false.
    pub fn retain_occupants(&mut self, keep: impl Fn(EntityId) -> bool) -> bool {
        let gone: Vec<EntityId> = self
            .slots
            .iter()
            .flatten()
            .copied()
            .filter(|id| !keep(*id))
            .collect();
        let mut changed = false;
        for id in gone {
            changed |= self.evict(id);
        }
        if let Some(pending) = self.pending {
            if !keep(pending) {
                self.pending = None;
                changed = true;
            }
        }
        changed
    }
}

fn to_offset(slot_index: usize) -> CoreResult<usize> {
    if (1..=SLOT_COUNT).contains(&slot_index) {
        Ok(slot_index - 1)
    } else {
        Err(CoreError::invalid(format!(
            "slot index {slot_index} outside 1..={SLOT_COUNT}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn graph_with(pairs: &[(usize, EntityId)]) -> TopologyGraph {
        let mut g = TopologyGraph::new();
        for (slot, id) in pairs {
            g.assign_to_slot(*slot, *id).unwrap();
        }
        g
    }

    #[rstest]
    #[case(0)]
    #[case(13)]
    fn test_slot_index_out_of_range(#[case] slot: usize) {
        let mut g = TopologyGraph::new();
        assert_eq!(g.assign_to_slot(slot, 1).unwrap_err().kind(), "InvalidArgument");
        assert!(g.vacate_slot(slot).is_err());
    }

    #[test]
    fn test_twelve_slots() {
        let g = TopologyGraph::new();
        let slots = g.slots();
        assert_eq!(slots.len(), 12);
        assert_eq!(slots[0].index, 1);
        assert_eq!(slots[11].index, 12);
        assert!(slots.iter().all(|s| s.occupant.is_none()));
    }

    #[test]
    fn test_assign_to_occupied_slot_fails() {
        let mut g = graph_with(&[(3, 12)]);
        assert_eq!(
            g.assign_to_slot(3, 27),
            Err(CoreError::SlotOccupied {
                slot: 3,
                occupant: 12
            })
        );
        // same occupant again is a no-op
        assert_eq!(g.assign_to_slot(3, 12), Ok(false));
    }

    #[test]
    fn test_reassignment_moves_and_keeps_links() {
        let mut g = graph_with(&[(3, 12), (5, 27)]);
        g.toggle_connect(12).unwrap();
        g.toggle_connect(27).unwrap();
        assert!(g.assign_to_slot(7, 12).unwrap());
        assert_eq!(g.occupant(3).unwrap(), None);
        assert_eq!(g.slot_of(12), Some(7));
        assert_eq!(g.links().len(), 1);
    }

    #[test]
    fn test_link_then_vacate_removes_link() {
        let mut g = graph_with(&[(3, 12), (5, 27)]);
        assert_eq!(g.toggle_connect(12).unwrap(), ConnectOutcome::Pending(12));
        let outcome = g.toggle_connect(27).unwrap();
        assert_eq!(
            outcome,
            ConnectOutcome::Linked(Link {
                source: 12,
                target: 27
            })
        );
        assert_eq!(g.pending(), None);

        assert_eq!(g.vacate_slot(3).unwrap(), Some(12));
        assert!(g.links().is_empty());
        assert_eq!(g.occupant(3).unwrap(), None);
    }

    #[test]
    fn test_vacate_removes_only_touching_links() {
        let mut g = graph_with(&[(1, 1), (2, 2), (3, 3)]);
        for (a, b) in [(1, 2), (2, 3), (1, 3)] {
            g.toggle_connect(a).unwrap();
            g.toggle_connect(b).unwrap();
        }
        assert_eq!(g.links().len(), 3);
        g.vacate_slot(1).unwrap();
        assert_eq!(
            g.links(),
            &[Link {
                source: 2,
                target: 3
            }]
        );
    }

    #[test]
    fn test_toggle_same_id_cancels() {
        let mut g = graph_with(&[(1, 12)]);
        g.toggle_connect(12).unwrap();
        assert_eq!(g.toggle_connect(12).unwrap(), ConnectOutcome::Cancelled);
        assert_eq!(g.pending(), None);
        assert!(g.links().is_empty());
    }

    #[test]
    fn test_duplicate_link_ignored_in_either_direction() {
        let mut g = graph_with(&[(1, 12), (2, 27)]);
        g.toggle_connect(12).unwrap();
        g.toggle_connect(27).unwrap();
        g.toggle_connect(27).unwrap();
        assert_eq!(g.toggle_connect(12).unwrap(), ConnectOutcome::AlreadyLinked);
        assert_eq!(g.links().len(), 1);
        assert_eq!(g.pending(), None);
    }

    #[test]
    fn test_toggle_requires_slot() {
        let mut g = TopologyGraph::new();
        assert!(g.toggle_connect(12).is_err());
        assert_eq!(g.pending(), None);
    }

    #[test]
    fn test_evict_clears_pending() {
        let mut g = graph_with(&[(1, 12)]);
        g.toggle_connect(12).unwrap();
        assert!(g.evict(12));
        assert_eq!(g.pending(), None);
        assert_eq!(g.slot_of(12), None);
        assert!(!g.evict(12));
    }

    #[test]
    fn test_connect_mode_flag_is_not_interpreted() {
        let mut g = graph_with(&[(1, 1), (2, 2)]);
        assert!(!g.connect_mode());
        g.toggle_connect(1).unwrap();
        g.toggle_connect(2).unwrap();
        assert_eq!(g.links().len(), 1);
        assert!(g.toggle_connect_mode());
        assert!(!g.toggle_connect_mode());
    }

    #[test]
    fn test_retain_occupants() {
        let mut g = graph_with(&[(1, 1), (2, 2), (3, 3)]);
        g.toggle_connect(1).unwrap();
        g.toggle_connect(2).unwrap();
        g.toggle_connect(3).unwrap();
        assert!(g.retain_occupants(|id| id != 2 && id != 3));
        assert_eq!(g.slot_of(1), Some(1));
        assert_eq!(g.slot_of(2), None);
        assert!(g.links().is_empty());
        assert_eq!(g.pending(), None);
    }
}
