//! Vehicles and their lifecycle state machine

use log::warn;
use ordered_float::OrderedFloat;

use super::types::{LaneId, VehicleId, VehicleState, VehicleType};

impl VehicleState {
    /// Guarded transition table
    pub fn can_transition_to(self, next: VehicleState) -> bool {
        use VehicleState::*;
        matches!(
            (self, next),
            (Approaching, Queued)
                | (Approaching, Crossing)
                | (Queued, Crossing)
                | (Crossing, Departed)
        )
    }

    /// Vehicles that have not yet entered the intersection box
    pub fn is_before_stop_line(self) -> bool {
        matches!(self, VehicleState::Approaching | VehicleState::Queued)
    }
}

/// A vehicle in the simulation
#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: VehicleId,
    pub vehicle_type: VehicleType,
    /// The vehicle keeps this lane for its whole lifetime
    pub lane: LaneId,
    /// Distance travelled from the lane's spawn point
    pub position: OrderedFloat<f32>,
    /// Displacement per tick actually achieved in the last step
    pub speed: f32,
    /// Configured displacement per tick
    pub max_speed: f32,
    pub state: VehicleState,
    pub spawned_at_tick: u64,
}

impl Vehicle {
    pub fn new(
        id: VehicleId,
        vehicle_type: VehicleType,
        lane: LaneId,
        max_speed: f32,
        spawned_at_tick: u64,
    ) -> Self {
        Self {
            id,
            vehicle_type,
            lane,
            position: OrderedFloat(0.0),
            speed: max_speed,
            max_speed,
            state: VehicleState::Approaching,
            spawned_at_tick,
        }
    }

    /// Move to `next` if the transition table allows it
    ///
    /// A refused transition is logged and leaves the state untouched.
    pub fn transition(&mut self, next: VehicleState) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(next) {
            warn!(
                "Vehicle {} refused transition {:?} -> {:?}",
                self.id, self.state, next
            );
            return;
        }
        self.state = next;
    }

    /// Remaining distance to the stop line (negative once past it)
    pub fn distance_to_stop_line(&self, stop_line: f32) -> f32 {
        stop_line - self.position.into_inner()
    }

    pub fn is_emergency(&self) -> bool {
        self.vehicle_type.is_emergency()
    }
}
