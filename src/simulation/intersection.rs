//! Occupancy of the intersection box
//!
//! Tracks which vehicles are currently crossing and for which conflict
//! group. Only one group may hold the box at a time.

use std::collections::{BTreeMap, BTreeSet};

use super::types::{ConflictGroup, VehicleId};

#[derive(Debug, Clone, Default)]
pub struct SimIntersection {
    /// Vehicles in `Crossing` state and the group they claimed
    occupants: BTreeMap<VehicleId, ConflictGroup>,
}

impl SimIntersection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a vehicle of `group` may enter without sharing the box
    /// with a different group
    pub fn can_enter(&self, group: ConflictGroup) -> bool {
        self.occupants.values().all(|held| *held == group)
    }

    /// Acquire a claim on the box for a vehicle
    /// Returns false (and claims nothing) if another group holds the box
    pub fn claim(&mut self, vehicle_id: VehicleId, group: ConflictGroup) -> bool {
        if !self.can_enter(group) {
            return false;
        }
        self.occupants.insert(vehicle_id, group);
        true
    }

    /// Release the claim held by a vehicle
    pub fn release(&mut self, vehicle_id: VehicleId) {
        self.occupants.remove(&vehicle_id);
    }

    /// The group currently holding the box, if any
    pub fn active_group(&self) -> Option<ConflictGroup> {
        self.occupants.values().next().copied()
    }

    /// Every group with at least one crossing vehicle
    pub fn active_groups(&self) -> BTreeSet<ConflictGroup> {
        self.occupants.values().copied().collect()
    }

    pub fn occupant_count(&self) -> usize {
        self.occupants.len()
    }

    pub fn clear(&mut self) {
        self.occupants.clear();
    }
}
