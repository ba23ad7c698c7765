//! Collision avoidance and motion for one lane
//!
//! Vehicles are processed front-to-back so each one sees the position its
//! leader has already moved to this tick. The allowed displacement is
//! `min(step, gap to leader - min_following_distance, distance to stop line)`
//! where the stop line only applies while entry is not granted.

use log::{debug, warn};
use ordered_float::OrderedFloat;
use std::collections::BTreeMap;

use super::intersection::SimIntersection;
use super::lane::SimLane;
use super::road_network::SimRoadNetwork;
use super::types::{ConflictGroup, VehicleId, VehicleState, POSITION_EPSILON};
use super::vehicle::Vehicle;

/// Per-lane inputs for a motion step
#[derive(Debug, Clone, Copy)]
pub struct MotionContext {
    pub group: ConflictGroup,
    /// Whether the current signal phase shows green for this lane
    pub signal_grants: bool,
    pub stop_line: f32,
    pub far_edge: f32,
    pub min_following_distance: f32,
    /// Simulated-time scale of this tick
    pub dt: f32,
}

/// Notable things that happened to a vehicle during a motion step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionOutcome {
    /// Crossed the stop line and claimed the box
    EnteredIntersection(VehicleId),
    /// Signal showed green but a conflicting group still occupies the box
    EntryDenied(VehicleId),
    /// Passed the far edge of the box
    Departed(VehicleId),
    /// Found overlapping its leader; motion dropped for this tick
    Frozen(VehicleId),
}

/// Move every vehicle of a lane one tick forward
pub fn advance_lane(
    lane: &SimLane,
    vehicles: &mut BTreeMap<VehicleId, Vehicle>,
    intersection: &mut SimIntersection,
    ctx: &MotionContext,
) -> Vec<MotionOutcome> {
    let mut outcomes = Vec::new();

    // Position and state of the vehicle directly ahead, after its move
    let mut ahead: Option<(f32, VehicleState)> = None;

    for vehicle_id in lane.vehicle_ids() {
        let Some(vehicle) = vehicles.get_mut(&vehicle_id) else {
            warn!("Lane {} tracks unknown vehicle {}", lane.id, vehicle_id);
            continue;
        };

        let position = vehicle.position.into_inner();
        let step = vehicle.max_speed * ctx.dt;
        let mut allowed = step;
        let mut held_by_queue = false;

        if let Some((ahead_position, ahead_state)) = ahead {
            let gap_limit = ahead_position - ctx.min_following_distance - position;
            if gap_limit < -POSITION_EPSILON {
                warn!(
                    "Vehicle {} in lane {} overlaps its leader ({:.2} < {:.2}); freezing",
                    vehicle_id,
                    lane.id,
                    ahead_position - position,
                    ctx.min_following_distance
                );
                vehicle.speed = 0.0;
                outcomes.push(MotionOutcome::Frozen(vehicle_id));
                ahead = Some((position, vehicle.state));
                continue;
            }
            if gap_limit < allowed {
                allowed = gap_limit.max(0.0);
                held_by_queue = ahead_state == VehicleState::Queued;
            }
        }

        if vehicle.state.is_before_stop_line()
            && position + allowed > ctx.stop_line + POSITION_EPSILON
        {
            let first_in_queue = ahead.is_none_or(|(_, state)| !state.is_before_stop_line());
            let mut may_enter = ctx.signal_grants && first_in_queue;

            if may_enter && !intersection.can_enter(ctx.group) {
                debug!(
                    "Vehicle {} denied entry from lane {}: box held by {:?}",
                    vehicle_id,
                    lane.id,
                    intersection.active_group()
                );
                outcomes.push(MotionOutcome::EntryDenied(vehicle_id));
                may_enter = false;
            }

            if may_enter && intersection.claim(vehicle_id, ctx.group) {
                vehicle.transition(VehicleState::Crossing);
                outcomes.push(MotionOutcome::EnteredIntersection(vehicle_id));
            } else {
                allowed = (ctx.stop_line - position).max(0.0);
            }
        }

        let new_position = position + allowed;
        vehicle.position = OrderedFloat(new_position);
        vehicle.speed = allowed / ctx.dt;

        let held = allowed + POSITION_EPSILON < step;
        match vehicle.state {
            VehicleState::Approaching => {
                let at_stop_line = new_position >= ctx.stop_line - POSITION_EPSILON;
                if (at_stop_line && (!ctx.signal_grants || held)) || (held && held_by_queue) {
                    vehicle.transition(VehicleState::Queued);
                }
            }
            VehicleState::Crossing => {
                if new_position >= ctx.far_edge - POSITION_EPSILON {
                    vehicle.transition(VehicleState::Departed);
                    intersection.release(vehicle_id);
                    outcomes.push(MotionOutcome::Departed(vehicle_id));
                }
            }
            VehicleState::Queued | VehicleState::Departed => {}
        }

        ahead = Some((new_position, vehicle.state));
    }

    outcomes
}

/// Check spacing of every adjacent pair in a lane
///
/// Returns the ids of vehicles found closer than the minimum gap to their
/// leader.
pub fn find_overlaps(
    lane: &SimLane,
    vehicles: &BTreeMap<VehicleId, Vehicle>,
    min_following_distance: f32,
) -> Vec<VehicleId> {
    let mut offenders = Vec::new();
    let mut ahead: Option<OrderedFloat<f32>> = None;

    for vehicle_id in lane.vehicle_ids() {
        let Some(vehicle) = vehicles.get(&vehicle_id) else {
            continue;
        };
        if let Some(ahead_position) = ahead {
            let gap = (ahead_position - vehicle.position).into_inner();
            if gap < min_following_distance - POSITION_EPSILON {
                offenders.push(vehicle_id);
            }
        }
        ahead = Some(vehicle.position);
    }

    offenders
}

/// Crossing vehicles whose group conflicts with the one that entered first
///
/// The earliest entrant (lowest id) is taken as the legitimate holder of
/// the box.
pub fn find_conflicting_crossings(
    vehicles: &BTreeMap<VehicleId, Vehicle>,
    network: &SimRoadNetwork,
) -> Vec<VehicleId> {
    let mut holder: Option<ConflictGroup> = None;
    let mut offenders = Vec::new();

    for vehicle in vehicles
        .values()
        .filter(|v| v.state == VehicleState::Crossing)
    {
        let Ok(group) = network.conflict_group(vehicle.lane) else {
            continue;
        };
        match holder {
            None => holder = Some(group),
            Some(held) if network.groups_conflict(held, group) => offenders.push(vehicle.id),
            Some(_) => {}
        }
    }

    offenders
}
