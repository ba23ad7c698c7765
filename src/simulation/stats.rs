//! Counters exposed to external statistics consumers

use super::types::VehicleType;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationStats {
    pub vehicles_spawned: usize,
    pub vehicles_departed: usize,
    pub ambulances_served: usize,
    pub firetrucks_served: usize,
    /// Emergency vehicles that asked for right-of-way
    pub preemptions_requested: usize,
    pub preemptions_started: usize,
    /// Preemptions that ended on the time limit instead of a departure
    pub preemptions_timed_out: usize,
    pub collisions_avoided: usize,
    pub invariant_violations: usize,
}

impl SimulationStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an emergency vehicle that departed under its own preemption
    pub fn record_served(&mut self, vehicle_type: VehicleType) {
        match vehicle_type {
            VehicleType::Ambulance => self.ambulances_served += 1,
            VehicleType::Firetruck => self.firetrucks_served += 1,
            VehicleType::Normal => {}
        }
    }

    pub fn emergency_vehicles_served(&self) -> usize {
        self.ambulances_served + self.firetrucks_served
    }

    /// Share of spawned vehicles that have departed, in percent
    pub fn throughput_percent(&self) -> f32 {
        if self.vehicles_spawned == 0 {
            0.0
        } else {
            self.vehicles_departed as f32 / self.vehicles_spawned as f32 * 100.0
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Spawned: {} | Departed: {} | Ambulances served: {} | Firetrucks served: {} | Preemptions: {} | Collisions avoided: {}",
            self.vehicles_spawned,
            self.vehicles_departed,
            self.ambulances_served,
            self.firetrucks_served,
            self.preemptions_started,
            self.collisions_avoided
        )
    }
}
