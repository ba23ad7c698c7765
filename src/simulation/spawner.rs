//! Vehicle spawning
//!
//! Every tick each lane draws independently against its spawn probability.
//! Manual spawns skip the draw but still wait for a clear lane entry; a
//! blocked manual spawn is retried on the following ticks.

use log::debug;
use rand::Rng;
use std::collections::{BTreeMap, VecDeque};

use super::lane::SimLane;
use super::types::{LaneId, VehicleId, VehicleType};
use super::vehicle::Vehicle;

/// A vehicle waiting to be placed at a lane entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnRequest {
    pub lane: LaneId,
    pub vehicle_type: VehicleType,
}

#[derive(Debug, Clone)]
pub struct SpawnManager {
    emergency_vehicle_probability: f64,
    manual: VecDeque<SpawnRequest>,
}

/// Chance of a spawn in one tick for a lane
///
/// `rate` is in vehicles per simulated second; one tick covers
/// `tick_duration_secs * speed_multiplier` simulated seconds.
pub fn spawn_probability(rate: f64, tick_duration_secs: f32, speed_multiplier: f32) -> f64 {
    (rate * f64::from(tick_duration_secs) * f64::from(speed_multiplier)).clamp(0.0, 1.0)
}

/// Whether position 0 of the lane is at least `min_following_distance`
/// behind the last vehicle
pub fn lane_entry_clear(
    lane: &SimLane,
    vehicles: &BTreeMap<VehicleId, Vehicle>,
    min_following_distance: f32,
) -> bool {
    match lane.back().and_then(|id| vehicles.get(&id)) {
        Some(last) => last.position.into_inner() >= min_following_distance,
        None => true,
    }
}

impl SpawnManager {
    pub fn new(emergency_vehicle_probability: f64) -> Self {
        Self {
            emergency_vehicle_probability,
            manual: VecDeque::new(),
        }
    }

    /// Queue a manual spawn for the next tick boundary
    pub fn request(&mut self, request: SpawnRequest) {
        self.manual.push_back(request);
    }

    pub fn pending_manual(&self) -> usize {
        self.manual.len()
    }

    pub fn clear(&mut self) {
        self.manual.clear();
    }

    /// Pick the type of a randomly spawned vehicle
    pub fn draw_vehicle_type(&self, rng: &mut impl Rng) -> VehicleType {
        if self.emergency_vehicle_probability > 0.0
            && rng.random_bool(self.emergency_vehicle_probability)
        {
            if rng.random_bool(0.5) {
                VehicleType::Ambulance
            } else {
                VehicleType::Firetruck
            }
        } else {
            VehicleType::Normal
        }
    }

    /// Decide what, if anything, enters `lane` this tick
    ///
    /// Manual requests for the lane take precedence over the random draw.
    pub fn decide(
        &mut self,
        lane: &SimLane,
        entry_clear: bool,
        probability: f64,
        rng: &mut impl Rng,
    ) -> Option<VehicleType> {
        let manual_index = self.manual.iter().position(|r| r.lane == lane.id);

        if !entry_clear {
            if manual_index.is_some() {
                debug!("Manual spawn in lane {} delayed: entry occupied", lane.id);
            }
            return None;
        }

        if let Some(index) = manual_index {
            return self.manual.remove(index).map(|r| r.vehicle_type);
        }

        if probability > 0.0 && rng.random_bool(probability) {
            return Some(self.draw_vehicle_type(rng));
        }

        None
    }
}
