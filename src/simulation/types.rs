//! Core types for the intersection simulation
//!
//! Plain identifiers and enums shared by every component of the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A unique identifier for a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VehicleId(pub usize);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Approach direction of a lane, named after the side vehicles arrive from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    /// Fixed processing order for lanes
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    /// The conflict group movements from this direction belong to
    pub fn conflict_group(self) -> ConflictGroup {
        match self {
            Direction::North | Direction::South => ConflictGroup::NorthSouth,
            Direction::East | Direction::West => ConflictGroup::EastWest,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::North => "N",
            Direction::South => "S",
            Direction::East => "E",
            Direction::West => "W",
        };
        write!(f, "{}", name)
    }
}

/// Identifies one approach sub-lane
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LaneId {
    pub direction: Direction,
    pub index: usize,
}

impl LaneId {
    pub fn new(direction: Direction, index: usize) -> Self {
        Self { direction, index }
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.direction, self.index)
    }
}

/// Set of movements that may hold right-of-way together
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConflictGroup {
    NorthSouth,
    EastWest,
}

impl fmt::Display for ConflictGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictGroup::NorthSouth => write!(f, "N/S"),
            ConflictGroup::EastWest => write!(f, "E/W"),
        }
    }
}

/// Type of vehicle in the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleType {
    Normal,
    Ambulance,
    Firetruck,
}

impl VehicleType {
    pub fn is_emergency(self) -> bool {
        matches!(self, VehicleType::Ambulance | VehicleType::Firetruck)
    }
}

/// Lifecycle state of a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VehicleState {
    /// Driving toward the stop line
    Approaching,
    /// Held at the stop line or behind a held vehicle
    Queued,
    /// Inside the intersection box
    Crossing,
    /// Past the far edge of the box, about to be removed
    Departed,
}

/// Small tolerance used when comparing positions
pub const POSITION_EPSILON: f32 = 1e-4;
