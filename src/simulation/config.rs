//! Load-time configuration for the simulation
//!
//! All options have defaults so a partial JSON document is enough to
//! override a handful of values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use super::error::{SimError, SimResult};
use super::types::{ConflictGroup, VehicleType};

/// Maximum displacement per tick for each vehicle type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaxSpeeds {
    pub normal: f32,
    pub ambulance: f32,
    pub firetruck: f32,
}

impl Default for MaxSpeeds {
    fn default() -> Self {
        Self {
            normal: 2.5,
            ambulance: 4.0,
            firetruck: 3.5,
        }
    }
}

impl MaxSpeeds {
    pub fn for_type(&self, vehicle_type: VehicleType) -> f32 {
        match vehicle_type {
            VehicleType::Normal => self.normal,
            VehicleType::Ambulance => self.ambulance,
            VehicleType::Firetruck => self.firetruck,
        }
    }
}

/// One green phase of the normal cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    pub group: ConflictGroup,
    pub green_ticks: u32,
}

/// Simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Minimum gap between consecutive vehicles in a lane
    pub min_following_distance: f32,
    pub max_speed: MaxSpeeds,
    /// Green phases in cycle order; the first one is the initial phase
    pub phases: Vec<PhaseConfig>,
    /// Amber interval after each green in normal cycling (0 disables it)
    pub yellow_ticks: u32,
    /// All-red clearance between conflicting greens
    pub clearance_ticks: u32,
    /// Distance before the stop line at which emergency vehicles are detected
    pub detection_distance: f32,
    /// Upper bound on how long a single preemption may hold the signal
    pub max_preemption_ticks: u32,
    /// Default spawn rate for every lane, in vehicles per simulated second
    pub spawn_rate_per_lane: f64,
    /// Chance that a randomly spawned vehicle is an emergency vehicle
    pub emergency_vehicle_probability: f64,
    pub lanes_per_direction: usize,
    /// Distance from the spawn point to the stop line
    pub stop_line_position: f32,
    /// Length of the intersection box
    pub intersection_length: f32,
    /// Simulated seconds represented by one tick at speed multiplier 1.0
    pub tick_duration_secs: f32,
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            min_following_distance: 8.0,
            max_speed: MaxSpeeds::default(),
            phases: vec![
                PhaseConfig {
                    group: ConflictGroup::NorthSouth,
                    green_ticks: 80,
                },
                PhaseConfig {
                    group: ConflictGroup::EastWest,
                    green_ticks: 80,
                },
            ],
            yellow_ticks: 20,
            clearance_ticks: 10,
            detection_distance: 120.0,
            max_preemption_ticks: 80,
            spawn_rate_per_lane: 0.2,
            emergency_vehicle_probability: 0.02,
            lanes_per_direction: 1,
            stop_line_position: 100.0,
            intersection_length: 20.0,
            tick_duration_secs: 0.1,
            seed: None,
        }
    }
}

impl SimConfig {
    /// Read a JSON configuration file and validate it
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_json(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Parse a JSON document and validate it
    pub fn from_json(text: &str) -> SimResult<Self> {
        let config: SimConfig = serde_json::from_str(text)
            .map_err(|e| SimError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Position of the far edge of the intersection box
    pub fn far_edge_position(&self) -> f32 {
        self.stop_line_position + self.intersection_length
    }

    /// Check every option; the simulation refuses to start on error
    pub fn validate(&self) -> SimResult<()> {
        fn positive(name: &str, value: f32) -> SimResult<()> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(SimError::Configuration(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )))
            }
        }

        positive("min_following_distance", self.min_following_distance)?;
        positive("max_speed.normal", self.max_speed.normal)?;
        positive("max_speed.ambulance", self.max_speed.ambulance)?;
        positive("max_speed.firetruck", self.max_speed.firetruck)?;
        positive("stop_line_position", self.stop_line_position)?;
        positive("intersection_length", self.intersection_length)?;
        positive("tick_duration_secs", self.tick_duration_secs)?;

        if !self.detection_distance.is_finite() || self.detection_distance < 0.0 {
            return Err(SimError::Configuration(format!(
                "detection_distance must be non-negative, got {}",
                self.detection_distance
            )));
        }

        if self.phases.is_empty() {
            return Err(SimError::Configuration(
                "phases must list at least one green phase".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for phase in &self.phases {
            if !seen.insert(phase.group) {
                return Err(SimError::Configuration(format!(
                    "conflict group {} appears more than once in phases",
                    phase.group
                )));
            }
            if phase.green_ticks == 0 {
                return Err(SimError::Configuration(format!(
                    "green_ticks for {} must be at least 1",
                    phase.group
                )));
            }
        }

        if self.clearance_ticks == 0 {
            return Err(SimError::Configuration(
                "clearance_ticks must be at least 1".to_string(),
            ));
        }

        if self.max_preemption_ticks <= self.clearance_ticks {
            return Err(SimError::Configuration(format!(
                "max_preemption_ticks ({}) must exceed clearance_ticks ({})",
                self.max_preemption_ticks, self.clearance_ticks
            )));
        }

        if !self.spawn_rate_per_lane.is_finite() || self.spawn_rate_per_lane < 0.0 {
            return Err(SimError::Configuration(format!(
                "spawn_rate_per_lane must be non-negative, got {}",
                self.spawn_rate_per_lane
            )));
        }

        if !(0.0..=1.0).contains(&self.emergency_vehicle_probability) {
            return Err(SimError::Configuration(format!(
                "emergency_vehicle_probability must be within [0, 1], got {}",
                self.emergency_vehicle_probability
            )));
        }

        if self.lanes_per_direction == 0 {
            return Err(SimError::Configuration(
                "lanes_per_direction must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
