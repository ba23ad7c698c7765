//! Four-way intersection simulation core
//!
//! Everything here is headless and deterministic for a given seed: the
//! world advances in discrete ticks and reports what happened as typed
//! events.

mod clock;
mod collision;
mod config;
mod error;
mod events;
mod intersection;
mod lane;
mod preemption;
mod road_network;
mod signal;
mod spawner;
mod stats;
mod types;
mod vehicle;
mod world;

// Re-export public types for external use
pub use clock::Clock;
pub use collision::{
    advance_lane, find_conflicting_crossings, find_overlaps, MotionContext, MotionOutcome,
};
pub use config::{MaxSpeeds, PhaseConfig, SimConfig};
pub use error::{SimError, SimResult};
pub use events::{Event, EventBus, EventSubscriber, LogSubscriber};
pub use intersection::SimIntersection;
pub use lane::SimLane;
pub use preemption::{
    ActivePreemption, PreemptionManager, PreemptionRequest, PreemptionUpdate, Priority,
};
pub use road_network::SimRoadNetwork;
pub use signal::{SignalChange, SignalController, SignalMode, SignalPhase};
pub use spawner::{lane_entry_clear, spawn_probability, SpawnManager, SpawnRequest};
pub use stats::SimulationStats;
pub use types::{
    ConflictGroup, Direction, LaneId, VehicleId, VehicleState, VehicleType, POSITION_EPSILON,
};
pub use vehicle::Vehicle;
pub use world::{Command, SimWorld};
