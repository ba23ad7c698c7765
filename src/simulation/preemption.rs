//! Emergency-vehicle preemption
//!
//! Each tick the manager looks for emergency vehicles within the detection
//! distance of the stop line, queues a request for each (once per vehicle),
//! and when no preemption is active hands the best request to the signal
//! controller. A preemption ends when its vehicle has departed or after
//! `max_preemption_ticks`, whichever comes first.

use log::{debug, info};
use sorted_vec::SortedVec;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use super::config::SimConfig;
use super::lane::SimLane;
use super::road_network::SimRoadNetwork;
use super::signal::{SignalChange, SignalController, SignalMode};
use super::types::{ConflictGroup, Direction, LaneId, VehicleId, VehicleType};
use super::vehicle::Vehicle;

/// Emergency priority; higher wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Ambulance = 1,
    Firetruck = 2,
}

impl Priority {
    pub fn for_vehicle(vehicle_type: VehicleType) -> Option<Priority> {
        match vehicle_type {
            VehicleType::Normal => None,
            VehicleType::Ambulance => Some(Priority::Ambulance),
            VehicleType::Firetruck => Some(Priority::Firetruck),
        }
    }
}

/// A request to preempt the signal for one emergency vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreemptionRequest {
    pub vehicle_id: VehicleId,
    pub vehicle_type: VehicleType,
    pub requested_direction: Direction,
    pub group: ConflictGroup,
    pub priority: Priority,
    pub issued_at_tick: u64,
    /// Arrival order among requests issued in the same tick
    pub sequence: u64,
}

/// Best request first: higher priority, then earlier tick, then arrival order
impl Ord for PreemptionRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then(self.issued_at_tick.cmp(&other.issued_at_tick))
            .then(self.sequence.cmp(&other.sequence))
            .then(self.vehicle_id.cmp(&other.vehicle_id))
    }
}

impl PartialOrd for PreemptionRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivePreemption {
    pub request: PreemptionRequest,
    pub started_at_tick: u64,
}

/// What the manager did during a tick, in order
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PreemptionUpdate {
    Requested(PreemptionRequest),
    Started {
        vehicle_id: VehicleId,
        direction: Direction,
    },
    Ended {
        vehicle_id: VehicleId,
        vehicle_type: VehicleType,
        /// The vehicle departed while the preemption held
        served: bool,
    },
    Signal(SignalChange),
}

#[derive(Debug, Clone)]
pub struct PreemptionManager {
    detection_distance: f32,
    max_preemption_ticks: u32,
    stop_line: f32,
    pending: SortedVec<PreemptionRequest>,
    active: Option<ActivePreemption>,
    /// Vehicles that already issued their one request
    requested: BTreeSet<VehicleId>,
    next_sequence: u64,
}

impl PreemptionManager {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            detection_distance: config.detection_distance,
            max_preemption_ticks: config.max_preemption_ticks,
            stop_line: config.stop_line_position,
            pending: SortedVec::new(),
            active: None,
            requested: BTreeSet::new(),
            next_sequence: 0,
        }
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.active = None;
        self.requested.clear();
        self.next_sequence = 0;
    }

    pub fn active(&self) -> Option<&ActivePreemption> {
        self.active.as_ref()
    }

    /// Requests waiting for the active preemption to finish, best first
    pub fn pending(&self) -> &[PreemptionRequest] {
        &self.pending
    }

    /// Run detection and control for one tick
    pub fn update(
        &mut self,
        tick: u64,
        lanes: &BTreeMap<LaneId, SimLane>,
        vehicles: &BTreeMap<VehicleId, Vehicle>,
        controller: &mut SignalController,
        network: &SimRoadNetwork,
    ) -> Vec<PreemptionUpdate> {
        let mut updates = Vec::new();
        let mut ended = false;

        if let Some(active) = self.active {
            let departed = !vehicles.contains_key(&active.request.vehicle_id);
            let held_for = tick.saturating_sub(active.started_at_tick);
            if departed || held_for >= u64::from(self.max_preemption_ticks) {
                info!(
                    "Preemption for vehicle {} ended after {} ticks ({})",
                    active.request.vehicle_id,
                    held_for,
                    if departed { "departed" } else { "timed out" }
                );
                self.active = None;
                ended = true;
                updates.push(PreemptionUpdate::Ended {
                    vehicle_id: active.request.vehicle_id,
                    vehicle_type: active.request.vehicle_type,
                    served: departed,
                });
            }
        }

        // Drop requests whose vehicle is gone or already in the box
        self.pending.retain(|request| {
            vehicles
                .get(&request.vehicle_id)
                .is_some_and(|v| v.state.is_before_stop_line())
        });
        self.requested.retain(|id| vehicles.contains_key(id));

        self.detect(tick, lanes, vehicles, controller, &mut updates);

        if self.active.is_none() {
            if !self.pending.is_empty() {
                let request = self.pending.remove_index(0);
                let change = controller.preempt(request.group, network);
                info!(
                    "Preemption started for {:?} {} from {} ({} pending)",
                    request.vehicle_type,
                    request.vehicle_id,
                    request.requested_direction,
                    self.pending.len()
                );
                self.active = Some(ActivePreemption {
                    request,
                    started_at_tick: tick,
                });
                updates.push(PreemptionUpdate::Started {
                    vehicle_id: request.vehicle_id,
                    direction: request.requested_direction,
                });
                updates.push(PreemptionUpdate::Signal(change));
            } else if ended {
                updates.push(PreemptionUpdate::Signal(controller.end_preemption()));
            }
        }

        updates
    }

    fn detect(
        &mut self,
        tick: u64,
        lanes: &BTreeMap<LaneId, SimLane>,
        vehicles: &BTreeMap<VehicleId, Vehicle>,
        controller: &SignalController,
        updates: &mut Vec<PreemptionUpdate>,
    ) {
        let served_group = match (controller.mode(), self.active) {
            (SignalMode::Preempted, Some(active)) => Some(active.request.group),
            _ => None,
        };

        for lane in lanes.values() {
            for vehicle_id in lane.vehicle_ids() {
                let Some(vehicle) = vehicles.get(&vehicle_id) else {
                    continue;
                };
                let Some(priority) = Priority::for_vehicle(vehicle.vehicle_type) else {
                    continue;
                };
                if !vehicle.state.is_before_stop_line()
                    || vehicle.distance_to_stop_line(self.stop_line) > self.detection_distance
                    || self.requested.contains(&vehicle_id)
                    || served_group == Some(lane.conflict_group)
                {
                    continue;
                }

                let request = PreemptionRequest {
                    vehicle_id,
                    vehicle_type: vehicle.vehicle_type,
                    requested_direction: lane.id.direction,
                    group: lane.conflict_group,
                    priority,
                    issued_at_tick: tick,
                    sequence: self.next_sequence,
                };
                self.next_sequence += 1;
                self.requested.insert(vehicle_id);
                self.pending.insert(request);
                debug!(
                    "Preemption requested by {:?} {} in lane {}",
                    vehicle.vehicle_type, vehicle_id, lane.id
                );
                updates.push(PreemptionUpdate::Requested(request));
            }
        }
    }
}
