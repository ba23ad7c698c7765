//! Runtime state of a single approach lane

use std::collections::VecDeque;

use super::types::{ConflictGroup, LaneId, VehicleId};

/// A lane with its vehicles ordered front-to-back
#[derive(Debug, Clone)]
pub struct SimLane {
    pub id: LaneId,
    pub conflict_group: ConflictGroup,
    /// Vehicles per simulated second drawn by the spawner
    pub spawn_rate: f64,
    /// Front (closest to the far edge) first; spawn order is preserved
    vehicles: VecDeque<VehicleId>,
}

impl SimLane {
    pub fn new(id: LaneId, conflict_group: ConflictGroup, spawn_rate: f64) -> Self {
        Self {
            id,
            conflict_group,
            spawn_rate,
            vehicles: VecDeque::new(),
        }
    }

    /// Append a newly spawned vehicle at the back of the lane
    pub fn push_back(&mut self, vehicle_id: VehicleId) {
        self.vehicles.push_back(vehicle_id);
    }

    /// The most recently spawned vehicle still in the lane
    pub fn back(&self) -> Option<VehicleId> {
        self.vehicles.back().copied()
    }

    /// Vehicle ids front-to-back
    pub fn vehicle_ids(&self) -> impl Iterator<Item = VehicleId> + '_ {
        self.vehicles.iter().copied()
    }

    pub fn remove(&mut self, vehicle_id: VehicleId) -> bool {
        match self.vehicles.iter().position(|id| *id == vehicle_id) {
            Some(index) => {
                self.vehicles.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn clear(&mut self) {
        self.vehicles.clear();
    }
}
