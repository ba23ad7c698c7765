//! Main simulation world that ties everything together
//!
//! `SimWorld` owns every lane, vehicle, the intersection occupancy, the
//! signal controller and the preemption manager. External collaborators
//! talk to it only through queued [`Command`]s and the event batches
//! returned by [`SimWorld::advance`].

use log::{debug, info, warn};
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::clock::Clock;
use super::collision::{
    advance_lane, find_conflicting_crossings, find_overlaps, MotionContext, MotionOutcome,
};
use super::config::SimConfig;
use super::error::{SimError, SimResult};
use super::events::{Event, EventBus, EventSubscriber};
use super::intersection::SimIntersection;
use super::lane::SimLane;
use super::preemption::{PreemptionManager, PreemptionUpdate};
use super::road_network::SimRoadNetwork;
use super::signal::{SignalChange, SignalController};
use super::spawner::{lane_entry_clear, spawn_probability, SpawnManager, SpawnRequest};
use super::stats::SimulationStats;
use super::types::{ConflictGroup, LaneId, VehicleId, VehicleState, VehicleType};
use super::vehicle::Vehicle;

/// Inputs from external collaborators, applied at the next tick boundary
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Start,
    Stop,
    Reset,
    SetSpawnRate { lane: LaneId, rate: f64 },
    SetSpeedMultiplier(f32),
    SpawnVehicle { lane: LaneId, vehicle_type: VehicleType },
}

/// The simulation state aggregate
pub struct SimWorld {
    config: SimConfig,

    /// Static lane geometry and conflict groups
    road_network: SimRoadNetwork,

    /// Runtime lane queues, in processing order
    lanes: BTreeMap<LaneId, SimLane>,

    /// All active vehicles
    vehicles: BTreeMap<VehicleId, Vehicle>,

    /// Which conflict group currently holds the box
    intersection: SimIntersection,

    signal: SignalController,
    preemption: PreemptionManager,
    spawner: SpawnManager,
    clock: Clock,
    stats: SimulationStats,
    events: EventBus,

    /// Commands waiting for the next tick boundary
    commands: VecDeque<Command>,

    /// Next ID to assign
    next_id: usize,

    /// Effective RNG seed, reused on reset
    seed: u64,
    rng: StdRng,
}

impl SimWorld {
    /// Create a stopped simulation at tick 0
    ///
    /// Fails with `SimError::Configuration` if the config does not validate.
    pub fn new(config: SimConfig) -> SimResult<Self> {
        config.validate()?;

        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let road_network = SimRoadNetwork::new(&config);

        let mut lanes = BTreeMap::new();
        for lane_id in road_network.lane_ids() {
            let group = road_network.conflict_group(lane_id)?;
            lanes.insert(
                lane_id,
                SimLane::new(lane_id, group, config.spawn_rate_per_lane),
            );
        }

        info!(
            "Intersection simulation created: {} lanes, initial phase {:?}, seed {}",
            road_network.lane_count(),
            config.phases.first().map(|p| p.group),
            seed
        );

        Ok(Self {
            signal: SignalController::new(&config),
            preemption: PreemptionManager::new(&config),
            spawner: SpawnManager::new(config.emergency_vehicle_probability),
            clock: Clock::new(config.tick_duration_secs),
            road_network,
            lanes,
            vehicles: BTreeMap::new(),
            intersection: SimIntersection::new(),
            stats: SimulationStats::new(),
            events: EventBus::new(),
            commands: VecDeque::new(),
            next_id: 0,
            seed,
            rng: StdRng::seed_from_u64(seed),
            config,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn road_network(&self) -> &SimRoadNetwork {
        &self.road_network
    }

    pub fn signal(&self) -> &SignalController {
        &self.signal
    }

    pub fn preemption(&self) -> &PreemptionManager {
        &self.preemption
    }

    pub fn intersection(&self) -> &SimIntersection {
        &self.intersection
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn tick(&self) -> u64 {
        self.clock.tick()
    }

    pub fn is_running(&self) -> bool {
        self.clock.is_running()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(&id)
    }

    pub fn vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn lane(&self, lane: LaneId) -> SimResult<&SimLane> {
        self.lanes.get(&lane).ok_or(SimError::InvalidLane(lane))
    }

    /// Vehicles of a lane, front-to-back
    pub fn lane_vehicles(&self, lane: LaneId) -> SimResult<Vec<&Vehicle>> {
        let lane = self.lane(lane)?;
        Ok(lane
            .vehicle_ids()
            .filter_map(|id| self.vehicles.get(&id))
            .collect())
    }

    /// Conflict groups with at least one vehicle in `Crossing` state
    pub fn crossing_groups(&self) -> BTreeSet<ConflictGroup> {
        self.intersection.active_groups()
    }

    pub fn subscribe(&mut self, subscriber: Box<dyn EventSubscriber>) {
        self.events.subscribe(subscriber);
    }

    /// Queue a command for the next tick boundary
    ///
    /// Commands naming an unknown lane or carrying an invalid value are
    /// rejected here and never queued.
    pub fn submit(&mut self, command: Command) -> SimResult<()> {
        let check = match command {
            Command::SetSpawnRate { lane, rate } => {
                self.road_network.validate_lane(lane).and_then(|_| {
                    if rate.is_finite() && rate >= 0.0 {
                        Ok(())
                    } else {
                        Err(SimError::Configuration(format!(
                            "spawn rate must be non-negative, got {}",
                            rate
                        )))
                    }
                })
            }
            Command::SpawnVehicle { lane, .. } => self.road_network.validate_lane(lane),
            Command::SetSpeedMultiplier(factor) if !factor.is_finite() || factor <= 0.0 => {
                Err(SimError::Configuration(format!(
                    "speed multiplier must be a positive number, got {}",
                    factor
                )))
            }
            _ => Ok(()),
        };

        if let Err(e) = check {
            warn!("Rejected command {:?}: {}", command, e);
            return Err(e);
        }

        self.commands.push_back(command);
        Ok(())
    }

    /// Apply queued commands, run one tick if running, and publish the
    /// resulting events
    pub fn advance(&mut self) -> Vec<Event> {
        self.apply_commands();
        if self.clock.is_running() {
            self.run_tick();
        }
        let tick = self.clock.tick();
        self.events.publish(tick)
    }

    /// Call [`advance`](Self::advance) `ticks` times and collect every event
    pub fn run_ticks(&mut self, ticks: u64) -> Vec<Event> {
        let mut events = Vec::new();
        for _ in 0..ticks {
            events.extend(self.advance());
        }
        events
    }

    /// Place a vehicle at an arbitrary position behind the lane's last
    /// vehicle, bypassing the entry spacing check
    ///
    /// Used to set up scenarios; the vehicle starts `Approaching`.
    pub fn insert_vehicle(
        &mut self,
        lane: LaneId,
        vehicle_type: VehicleType,
        position: f32,
    ) -> SimResult<VehicleId> {
        self.road_network.validate_lane(lane)?;

        if !position.is_finite() || position < 0.0 || position > self.config.stop_line_position {
            return Err(SimError::Configuration(format!(
                "vehicle position {} is outside the approach [0, {}]",
                position, self.config.stop_line_position
            )));
        }

        let last_position = self
            .lanes
            .get(&lane)
            .and_then(|l| l.back())
            .and_then(|id| self.vehicles.get(&id))
            .map(|v| v.position.into_inner());
        if let Some(last) = last_position {
            if position > last {
                return Err(SimError::Configuration(format!(
                    "vehicle position {} is ahead of the last vehicle in lane {} at {}",
                    position, lane, last
                )));
            }
        }

        Ok(self.create_vehicle(lane, vehicle_type, position))
    }

    fn apply_commands(&mut self) {
        while let Some(command) = self.commands.pop_front() {
            self.apply(command);
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Start => {
                if !self.clock.is_running() {
                    info!("Simulation started at tick {}", self.clock.tick());
                    self.clock.start();
                }
            }
            Command::Stop => {
                if self.clock.is_running() {
                    info!("Simulation stopped at tick {}", self.clock.tick());
                    self.clock.stop();
                }
            }
            Command::Reset => self.reset(),
            Command::SetSpawnRate { lane, rate } => match self.lanes.get_mut(&lane) {
                Some(lane_state) => {
                    info!("Spawn rate for lane {} set to {}/s", lane, rate);
                    lane_state.spawn_rate = rate;
                }
                None => warn!("{}", SimError::InvalidLane(lane)),
            },
            Command::SetSpeedMultiplier(factor) => {
                match self.clock.set_speed_multiplier(factor) {
                    Ok(()) => info!("Speed multiplier set to {}", factor),
                    Err(e) => warn!("{}", e),
                }
            }
            Command::SpawnVehicle { lane, vehicle_type } => {
                if self.lanes.contains_key(&lane) {
                    self.spawner.request(SpawnRequest { lane, vehicle_type });
                } else {
                    warn!("{}", SimError::InvalidLane(lane));
                }
            }
        }
    }

    /// Destroy every entity and return to the initial, stopped state
    fn reset(&mut self) {
        self.vehicles.clear();
        for lane in self.lanes.values_mut() {
            lane.clear();
        }
        self.intersection.clear();
        self.signal.reset();
        self.preemption.reset();
        self.spawner.clear();
        self.clock.reset();
        self.stats = SimulationStats::new();
        self.events.discard();
        self.next_id = 0;
        self.rng = StdRng::seed_from_u64(self.seed);

        info!("Simulation reset");
        self.emit_signal_change(SignalChange {
            phase: self.signal.phase(),
            mode: self.signal.mode(),
        });
    }

    /// One tick in fixed order: spawn, preemption, signal, motion, checks
    fn run_tick(&mut self) {
        let tick = self.clock.advance();
        let dt = self.clock.speed_multiplier();

        self.spawn_step(dt);
        self.preemption_step(tick);

        if let Some(change) = self.signal.advance() {
            self.emit_signal_change(change);
        }

        let frozen = self.motion_step(dt);
        self.check_invariants(&frozen);
    }

    fn create_vehicle(
        &mut self,
        lane: LaneId,
        vehicle_type: VehicleType,
        position: f32,
    ) -> VehicleId {
        let id = VehicleId(self.next_id);
        self.next_id += 1;

        let max_speed = self.config.max_speed.for_type(vehicle_type);
        let mut vehicle = Vehicle::new(id, vehicle_type, lane, max_speed, self.clock.tick());
        vehicle.position = OrderedFloat(position);
        let emergency = vehicle.is_emergency();

        self.vehicles.insert(id, vehicle);
        if let Some(lane_state) = self.lanes.get_mut(&lane) {
            lane_state.push_back(id);
        }

        self.stats.vehicles_spawned += 1;
        if emergency {
            info!("{:?} {} entered lane {}", vehicle_type, id, lane);
        } else {
            debug!("Spawned {:?} {} in lane {}", vehicle_type, id, lane);
        }
        self.events.emit(Event::VehicleSpawned {
            id,
            vehicle_type,
            lane,
        });
        id
    }

    fn spawn_step(&mut self, dt: f32) {
        let lane_ids: Vec<LaneId> = self.lanes.keys().copied().collect();

        for lane_id in lane_ids {
            let Some(lane) = self.lanes.get(&lane_id) else {
                continue;
            };
            let entry_clear =
                lane_entry_clear(lane, &self.vehicles, self.config.min_following_distance);
            let probability =
                spawn_probability(lane.spawn_rate, self.clock.tick_duration_secs(), dt);

            if let Some(vehicle_type) =
                self.spawner.decide(lane, entry_clear, probability, &mut self.rng)
            {
                self.create_vehicle(lane_id, vehicle_type, 0.0);
            }
        }
    }

    fn preemption_step(&mut self, tick: u64) {
        let updates = self.preemption.update(
            tick,
            &self.lanes,
            &self.vehicles,
            &mut self.signal,
            &self.road_network,
        );

        for update in updates {
            match update {
                PreemptionUpdate::Requested(_) => self.stats.preemptions_requested += 1,
                PreemptionUpdate::Started {
                    vehicle_id,
                    direction,
                } => {
                    self.stats.preemptions_started += 1;
                    self.events.emit(Event::PreemptionStarted {
                        vehicle_id,
                        direction,
                    });
                }
                PreemptionUpdate::Ended {
                    vehicle_id,
                    vehicle_type,
                    served,
                } => {
                    if served {
                        self.stats.record_served(vehicle_type);
                    } else {
                        self.stats.preemptions_timed_out += 1;
                    }
                    self.events.emit(Event::PreemptionEnded { vehicle_id });
                }
                PreemptionUpdate::Signal(change) => self.emit_signal_change(change),
            }
        }
    }

    fn emit_signal_change(&mut self, change: SignalChange) {
        self.events.emit(Event::SignalChanged {
            phase: change.phase,
            mode: change.mode,
        });
    }

    /// Move every lane; returns vehicles frozen for overlapping
    fn motion_step(&mut self, dt: f32) -> Vec<VehicleId> {
        let stop_line = self.road_network.stop_line_position();
        let far_edge = self.road_network.far_edge_position();
        let lane_ids: Vec<LaneId> = self.lanes.keys().copied().collect();
        let mut frozen = Vec::new();

        for lane_id in lane_ids {
            let Some(lane) = self.lanes.get(&lane_id) else {
                continue;
            };
            let ctx = MotionContext {
                group: lane.conflict_group,
                signal_grants: self.signal.grants(lane.conflict_group),
                stop_line,
                far_edge,
                min_following_distance: self.config.min_following_distance,
                dt,
            };

            let outcomes = advance_lane(lane, &mut self.vehicles, &mut self.intersection, &ctx);

            for outcome in outcomes {
                match outcome {
                    MotionOutcome::EnteredIntersection(id) => {
                        debug!("Vehicle {} entered the intersection from {}", id, lane_id);
                    }
                    MotionOutcome::EntryDenied(id) => {
                        self.stats.collisions_avoided += 1;
                        self.events.emit(Event::CollisionAvoided {
                            vehicle_id: id,
                            lane: lane_id,
                        });
                    }
                    MotionOutcome::Frozen(id) => {
                        self.stats.invariant_violations += 1;
                        frozen.push(id);
                        self.events.emit(Event::InvariantViolation {
                            vehicle_id: id,
                            lane: lane_id,
                        });
                    }
                    MotionOutcome::Departed(id) => self.remove_departed(lane_id, id),
                }
            }
        }

        frozen
    }

    fn remove_departed(&mut self, lane: LaneId, id: VehicleId) {
        if let Some(lane_state) = self.lanes.get_mut(&lane) {
            lane_state.remove(id);
        }
        if let Some(vehicle) = self.vehicles.remove(&id) {
            debug!(
                "{:?} {} departed after {} ticks",
                vehicle.vehicle_type,
                id,
                self.clock.tick().saturating_sub(vehicle.spawned_at_tick)
            );
        }
        self.stats.vehicles_departed += 1;
        self.events.emit(Event::VehicleDeparted { id });
    }

    /// Report spacing or occupancy problems not already handled by motion
    fn check_invariants(&mut self, already_reported: &[VehicleId]) {
        let min_gap = self.config.min_following_distance;
        let mut violations = Vec::new();

        for lane in self.lanes.values() {
            for id in find_overlaps(lane, &self.vehicles, min_gap) {
                if !already_reported.contains(&id) {
                    violations.push((id, lane.id));
                }
            }
        }

        for (vehicle_id, lane) in violations {
            self.report_violation(
                vehicle_id,
                lane,
                format!("closer than {} to its leader", min_gap),
            );
        }

        for vehicle_id in find_conflicting_crossings(&self.vehicles, &self.road_network) {
            if let Some(lane) = self.vehicles.get(&vehicle_id).map(|v| v.lane) {
                self.report_violation(
                    vehicle_id,
                    lane,
                    "crossing while a conflicting group holds the box".to_string(),
                );
            }
        }
    }

    fn report_violation(&mut self, vehicle_id: VehicleId, lane: LaneId, detail: String) {
        warn!(
            "{}",
            SimError::InvariantViolation {
                vehicle_id,
                lane,
                detail,
            }
        );
        self.stats.invariant_violations += 1;
        self.events.emit(Event::InvariantViolation { vehicle_id, lane });
    }

    /// Print a summary of the world state
    pub fn print_summary(&self) {
        println!("=== Intersection Simulation Summary ===");
        println!(
            "Tick: {} ({:.1}s simulated, x{:.1})",
            self.clock.tick(),
            self.clock.elapsed_secs(),
            self.clock.speed_multiplier()
        );
        println!(
            "Signal: {} ({:?}) for {} ticks",
            self.signal.phase(),
            self.signal.mode(),
            self.signal.phase_elapsed()
        );
        println!(
            "Vehicles: {} ({} crossing)",
            self.vehicles.len(),
            self.intersection.occupant_count()
        );

        for lane in self.lanes.values() {
            let queued = lane
                .vehicle_ids()
                .filter_map(|id| self.vehicles.get(&id))
                .filter(|v| v.state == VehicleState::Queued)
                .count();
            println!(
                "  Lane {}: {} vehicles, {} queued, rate {:.2}/s",
                lane.id,
                lane.len(),
                queued,
                lane.spawn_rate
            );
        }

        if let Some(active) = self.preemption.active() {
            println!(
                "Preemption: {:?} {} from {} since tick {} ({} pending)",
                active.request.vehicle_type,
                active.request.vehicle_id,
                active.request.requested_direction,
                active.started_at_tick,
                self.preemption.pending().len()
            );
        }

        if self.spawner.pending_manual() > 0 {
            println!("Manual spawns waiting: {}", self.spawner.pending_manual());
        }

        println!("{}", self.stats.summary());
    }
}
