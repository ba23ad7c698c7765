//! Scenario tests for the intersection engine
//!
//! Each test drives a `SimWorld` tick by tick through the public command
//! interface and checks the published events and observable state.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use intersection_sim::simulation::{
    find_conflicting_crossings, Command, ConflictGroup, Direction, Event, EventSubscriber, LaneId,
    PhaseConfig, Priority, PreemptionRequest, SignalMode, SignalPhase, SimConfig, SimError,
    SimRoadNetwork, SimWorld, SimulationStats, Vehicle, VehicleId, VehicleState, VehicleType,
};

/// Deterministic world with no random arrivals
fn quiet_config() -> SimConfig {
    SimConfig {
        spawn_rate_per_lane: 0.0,
        emergency_vehicle_probability: 0.0,
        seed: Some(1),
        ..SimConfig::default()
    }
}

fn lane(direction: Direction) -> LaneId {
    LaneId::new(direction, 0)
}

/// Advance until `tick`, returning every event tagged with its tick
fn run_until(world: &mut SimWorld, tick: u64) -> Vec<(u64, Event)> {
    let mut events = Vec::new();
    while world.tick() < tick {
        for event in world.advance() {
            events.push((world.tick(), event));
        }
    }
    events
}

fn started_world(config: SimConfig) -> SimWorld {
    let mut world = SimWorld::new(config).expect("valid config");
    world.submit(Command::Start).expect("start accepted");
    world
}

fn departure_tick(events: &[(u64, Event)], id: VehicleId) -> Option<u64> {
    events.iter().find_map(|(tick, event)| match event {
        Event::VehicleDeparted { id: departed } if *departed == id => Some(*tick),
        _ => None,
    })
}

fn signal_changes(events: &[(u64, Event)]) -> Vec<(u64, SignalPhase, SignalMode)> {
    events
        .iter()
        .filter_map(|(tick, event)| match event {
            Event::SignalChanged { phase, mode } => Some((*tick, *phase, *mode)),
            _ => None,
        })
        .collect()
}

/// Ten-tick greens and a short detection range
fn short_cycle_config() -> SimConfig {
    let mut config = quiet_config();
    for phase in config.phases.iter_mut() {
        phase.green_ticks = 10;
    }
    config.detection_distance = 30.0;
    config
}

fn preemptions_started(events: &[(u64, Event)]) -> Vec<(u64, VehicleId)> {
    events
        .iter()
        .filter_map(|(tick, event)| match event {
            Event::PreemptionStarted { vehicle_id, .. } => Some((*tick, *vehicle_id)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_basic_crossing_on_green() {
    let mut world = SimWorld::new(quiet_config()).unwrap();
    let id = world
        .insert_vehicle(lane(Direction::North), VehicleType::Normal, 0.0)
        .unwrap();
    world.submit(Command::Start).unwrap();

    let events = run_until(&mut world, 40);
    let vehicle = world.vehicle(id).unwrap();
    assert_eq!(vehicle.position.into_inner(), 100.0);
    assert_eq!(vehicle.state, VehicleState::Approaching);
    assert!(departure_tick(&events, id).is_none());

    run_until(&mut world, 41);
    assert_eq!(world.vehicle(id).unwrap().state, VehicleState::Crossing);
    assert_eq!(world.crossing_groups().len(), 1);

    // 120 units of travel at 2.5 per tick, removed on the departing tick
    let events = run_until(&mut world, 60);
    assert_eq!(departure_tick(&events, id), Some(48));
    assert!(world.vehicle(id).is_none());
    assert_eq!(world.vehicle_count(), 0);
    assert_eq!(world.stats().vehicles_departed, 1);
    assert_eq!(world.stats().collisions_avoided, 0);
}

#[test]
fn test_queue_forms_behind_red_light() {
    let mut world = SimWorld::new(quiet_config()).unwrap();
    let east = lane(Direction::East);
    let ids: Vec<VehicleId> = [80.0, 70.0, 60.0]
        .iter()
        .map(|&position| {
            world
                .insert_vehicle(east, VehicleType::Normal, position)
                .unwrap()
        })
        .collect();
    world.submit(Command::Start).unwrap();

    run_until(&mut world, 20);

    let queued = world.lane_vehicles(east).unwrap();
    let positions: Vec<f32> = queued.iter().map(|v| v.position.into_inner()).collect();
    assert_eq!(positions, vec![100.0, 92.0, 84.0]);
    assert!(queued.iter().all(|v| v.state == VehicleState::Queued));

    // E/W gets green after 80 green + 20 amber + 10 all-red ticks
    let events = run_until(&mut world, 110);
    assert!(ids.iter().all(|&id| departure_tick(&events, id).is_none()));
    assert_eq!(world.lane_vehicles(east).unwrap().len(), 3);

    let events = run_until(&mut world, 160);
    let departures: Vec<u64> = ids
        .iter()
        .map(|&id| departure_tick(&events, id).expect("vehicle departed"))
        .collect();
    assert!(departures.iter().all(|&tick| tick > 110));
    assert!(departures.windows(2).all(|pair| pair[0] < pair[1]));
    assert!(world.lane_vehicles(east).unwrap().is_empty());
}

#[test]
fn test_ambulance_preempts_conflicting_green_once() {
    let mut world = SimWorld::new(quiet_config()).unwrap();
    let ambulance = world
        .insert_vehicle(lane(Direction::East), VehicleType::Ambulance, 0.0)
        .unwrap();
    world.submit(Command::Start).unwrap();

    let events = run_until(&mut world, 1);
    assert_eq!(preemptions_started(&events), vec![(1, ambulance)]);
    assert_eq!(world.signal().phase(), SignalPhase::AllRed);
    assert_eq!(world.signal().mode(), SignalMode::Preempted);

    let mut events = events;
    events.extend(run_until(&mut world, 120));

    let clearance = u64::from(world.config().clearance_ticks);
    let green_tick = events
        .iter()
        .find_map(|(tick, event)| match event {
            Event::SignalChanged {
                phase: SignalPhase::Green(ConflictGroup::EastWest),
                mode: SignalMode::Preempted,
            } => Some(*tick),
            _ => None,
        })
        .expect("E/W green under preemption");
    assert!(green_tick - 1 <= clearance + 1);

    assert_eq!(preemptions_started(&events).len(), 1);
    let ended = events
        .iter()
        .filter(|(_, e)| matches!(e, Event::PreemptionEnded { .. }))
        .count();
    assert_eq!(ended, 1);

    assert_eq!(departure_tick(&events, ambulance), Some(30));
    assert_eq!(world.stats().ambulances_served, 1);
    assert_eq!(world.signal().mode(), SignalMode::Normal);
    assert!(world.preemption().active().is_none());
}

#[test]
fn test_preemption_holds_green_already_serving_vehicle() {
    let mut config = quiet_config();
    config.phases[0].green_ticks = 10;
    let mut world = SimWorld::new(config).unwrap();
    world
        .insert_vehicle(lane(Direction::North), VehicleType::Firetruck, 0.0)
        .unwrap();
    world.submit(Command::Start).unwrap();

    let events = run_until(&mut world, 1);
    assert!(events.iter().any(|(_, e)| *e
        == Event::SignalChanged {
            phase: SignalPhase::Green(ConflictGroup::NorthSouth),
            mode: SignalMode::Preempted,
        }));

    // The 10-tick green no longer expires on its timer
    run_until(&mut world, 30);
    assert_eq!(
        world.signal().phase(),
        SignalPhase::Green(ConflictGroup::NorthSouth)
    );
    assert_eq!(world.signal().mode(), SignalMode::Preempted);

    run_until(&mut world, 40);
    assert_eq!(world.stats().firetrucks_served, 1);
    assert_eq!(world.signal().mode(), SignalMode::Normal);
}

#[test]
fn test_preemption_duration_is_bounded() {
    let mut config = quiet_config();
    config.max_speed.ambulance = 0.5;
    let max_ticks = u64::from(config.max_preemption_ticks);

    let mut world = SimWorld::new(config).unwrap();
    let ambulance = world
        .insert_vehicle(lane(Direction::East), VehicleType::Ambulance, 0.0)
        .unwrap();
    world.submit(Command::Start).unwrap();

    let events = run_until(&mut world, 1 + max_ticks);
    let ended_at = events
        .iter()
        .find_map(|(tick, e)| match e {
            Event::PreemptionEnded { vehicle_id } if *vehicle_id == ambulance => Some(*tick),
            _ => None,
        })
        .expect("preemption ended on its time limit");
    assert_eq!(ended_at, 1 + max_ticks);
    assert_eq!(world.signal().mode(), SignalMode::Normal);
    assert_eq!(world.stats().preemptions_timed_out, 1);
    assert_eq!(world.stats().ambulances_served, 0);

    // No second request for the same vehicle, and it still gets through
    let later = run_until(&mut world, 400);
    assert!(preemptions_started(&later).is_empty());
    assert!(departure_tick(&later, ambulance).is_some());
}

#[test]
fn test_firetruck_outranks_ambulance() {
    let mut world = SimWorld::new(quiet_config()).unwrap();
    let ambulance = world
        .insert_vehicle(lane(Direction::East), VehicleType::Ambulance, 0.0)
        .unwrap();
    let firetruck = world
        .insert_vehicle(lane(Direction::North), VehicleType::Firetruck, 0.0)
        .unwrap();
    world.submit(Command::Start).unwrap();

    let events = run_until(&mut world, 60);
    let started: Vec<VehicleId> = preemptions_started(&events)
        .into_iter()
        .map(|(_, id)| id)
        .collect();
    assert_eq!(started, vec![firetruck, ambulance]);

    // The waiting request chains straight into a new preemption
    let firetruck_gone = departure_tick(&events, firetruck).unwrap();
    assert_eq!(preemptions_started(&events)[1].0, firetruck_gone + 1);

    assert_eq!(world.stats().firetrucks_served, 1);
    assert_eq!(world.stats().ambulances_served, 1);
    assert_eq!(world.stats().emergency_vehicles_served(), 2);
    assert_eq!(world.stats().preemptions_requested, 2);
    assert_eq!(world.stats().preemptions_started, 2);
}

#[test]
fn test_preemption_during_conflicting_amber_then_cycle_restarts() {
    use SignalMode::{Normal, Preempted};

    let mut world = SimWorld::new(short_cycle_config()).unwrap();
    let ambulance = world
        .insert_vehicle(lane(Direction::East), VehicleType::Ambulance, 16.0)
        .unwrap();
    world.submit(Command::Start).unwrap();

    let events = run_until(&mut world, 70);
    assert_eq!(
        signal_changes(&events),
        vec![
            (11, SignalPhase::Yellow(ConflictGroup::NorthSouth), Normal),
            // Detected mid-amber: the rest of the amber is skipped
            (15, SignalPhase::AllRed, Preempted),
            (25, SignalPhase::Green(ConflictGroup::EastWest), Preempted),
            (30, SignalPhase::Yellow(ConflictGroup::EastWest), Normal),
            (50, SignalPhase::AllRed, Normal),
            (60, SignalPhase::Green(ConflictGroup::NorthSouth), Normal),
            (70, SignalPhase::Yellow(ConflictGroup::NorthSouth), Normal),
        ]
    );
    assert_eq!(departure_tick(&events, ambulance), Some(29));

    // The restarted cycle gives N/S its full green
    assert_eq!(70 - 60, world.config().phases[0].green_ticks as u64);
    assert_eq!(world.stats().ambulances_served, 1);
}

#[test]
fn test_preemption_restores_green_from_own_amber() {
    use SignalMode::{Normal, Preempted};

    let mut world = SimWorld::new(short_cycle_config()).unwrap();
    let ambulance = world
        .insert_vehicle(lane(Direction::North), VehicleType::Ambulance, 16.0)
        .unwrap();
    world.submit(Command::Start).unwrap();

    let events = run_until(&mut world, 37);
    assert_eq!(
        signal_changes(&events),
        vec![
            (11, SignalPhase::Yellow(ConflictGroup::NorthSouth), Normal),
            (15, SignalPhase::Green(ConflictGroup::NorthSouth), Preempted),
            (27, SignalPhase::Green(ConflictGroup::NorthSouth), Normal),
            (37, SignalPhase::Yellow(ConflictGroup::NorthSouth), Normal),
        ]
    );
    assert!(!signal_changes(&events)
        .iter()
        .any(|(_, phase, _)| *phase == SignalPhase::AllRed));
    assert_eq!(departure_tick(&events, ambulance), Some(26));
}

#[test]
fn test_preemption_retargets_all_red_in_progress() {
    use SignalMode::{Normal, Preempted};

    let mut config = short_cycle_config();
    config.max_speed.ambulance = 1.0;
    let mut world = SimWorld::new(config).unwrap();
    world
        .insert_vehicle(lane(Direction::North), VehicleType::Ambulance, 36.0)
        .unwrap();
    world.submit(Command::Start).unwrap();

    let events = run_until(&mut world, 45);
    let changes = signal_changes(&events);
    assert_eq!(
        changes,
        vec![
            (11, SignalPhase::Yellow(ConflictGroup::NorthSouth), Normal),
            (31, SignalPhase::AllRed, Normal),
            (35, SignalPhase::AllRed, Preempted),
            (41, SignalPhase::Green(ConflictGroup::NorthSouth), Preempted),
        ]
    );

    // Clearance already elapsed is kept, and E/W never gets its turn
    assert_eq!(41 - 31, world.config().clearance_ticks as u64);
    assert!(!changes
        .iter()
        .any(|(_, phase, _)| *phase == SignalPhase::Green(ConflictGroup::EastWest)));
}

#[test]
fn test_request_ordering() {
    let request = |id: usize, vehicle_type: VehicleType, tick: u64, sequence: u64| {
        PreemptionRequest {
            vehicle_id: VehicleId(id),
            vehicle_type,
            requested_direction: Direction::East,
            group: ConflictGroup::EastWest,
            priority: Priority::for_vehicle(vehicle_type).unwrap(),
            issued_at_tick: tick,
            sequence,
        }
    };

    let mut requests = vec![
        request(1, VehicleType::Ambulance, 5, 0),
        request(2, VehicleType::Firetruck, 9, 3),
        request(3, VehicleType::Ambulance, 3, 1),
        request(4, VehicleType::Firetruck, 9, 2),
    ];
    requests.sort();

    let order: Vec<usize> = requests.iter().map(|r| r.vehicle_id.0).collect();
    assert_eq!(order, vec![4, 2, 3, 1]);
    assert_eq!(Priority::for_vehicle(VehicleType::Normal), None);
}

#[test]
fn test_reset_restores_initial_state() {
    let config = SimConfig {
        spawn_rate_per_lane: 1.0,
        emergency_vehicle_probability: 0.1,
        seed: Some(9),
        ..SimConfig::default()
    };

    let mut world = started_world(config.clone());
    run_until(&mut world, 200);
    assert!(world.stats().vehicles_spawned > 0);

    world.submit(Command::Reset).unwrap();
    let events = world.advance();
    assert_eq!(
        events,
        vec![Event::SignalChanged {
            phase: SignalPhase::Green(ConflictGroup::NorthSouth),
            mode: SignalMode::Normal,
        }]
    );
    assert_eq!(world.signal().phase(), world.signal().initial_phase());
    assert_eq!(world.tick(), 0);
    assert!(!world.is_running());
    assert_eq!(world.vehicle_count(), 0);
    assert_eq!(*world.stats(), SimulationStats::default());
    assert!(world.preemption().active().is_none());
    assert!(world.crossing_groups().is_empty());

    // Same seed, same history
    world.submit(Command::Start).unwrap();
    run_until(&mut world, 200);
    let mut fresh = started_world(config);
    run_until(&mut fresh, 200);

    assert_eq!(world.stats(), fresh.stats());
    let snapshot = |w: &SimWorld| {
        w.vehicles()
            .map(|v| (v.id, v.lane, v.position, v.state))
            .collect::<Vec<_>>()
    };
    assert_eq!(snapshot(&world), snapshot(&fresh));
}

#[test]
fn test_stop_pauses_and_start_resumes() {
    let mut world = SimWorld::new(quiet_config()).unwrap();
    let id = world
        .insert_vehicle(lane(Direction::South), VehicleType::Normal, 0.0)
        .unwrap();
    world.submit(Command::Start).unwrap();
    run_until(&mut world, 10);

    world.submit(Command::Stop).unwrap();
    for _ in 0..5 {
        assert!(world.advance().is_empty());
    }
    assert_eq!(world.tick(), 10);
    assert_eq!(world.vehicle(id).unwrap().position.into_inner(), 25.0);

    world.submit(Command::Start).unwrap();
    world.advance();
    assert_eq!(world.tick(), 11);
    assert_eq!(world.vehicle(id).unwrap().position.into_inner(), 27.5);
}

#[test]
fn test_speed_multiplier_scales_motion() {
    let mut world = SimWorld::new(quiet_config()).unwrap();
    let id = world
        .insert_vehicle(lane(Direction::North), VehicleType::Normal, 0.0)
        .unwrap();
    world.submit(Command::SetSpeedMultiplier(2.0)).unwrap();
    world.submit(Command::Start).unwrap();

    let events = run_until(&mut world, 40);
    assert_eq!(departure_tick(&events, id), Some(24));
    assert_eq!(world.clock().speed_multiplier(), 2.0);
}

#[test]
fn test_manual_spawn_waits_for_clear_entry() {
    let mut world = SimWorld::new(quiet_config()).unwrap();
    let north = lane(Direction::North);
    world
        .insert_vehicle(north, VehicleType::Normal, 3.0)
        .unwrap();
    world
        .submit(Command::SpawnVehicle {
            lane: north,
            vehicle_type: VehicleType::Ambulance,
        })
        .unwrap();
    world.submit(Command::Start).unwrap();

    let events = run_until(&mut world, 5);
    let spawned: Vec<u64> = events
        .iter()
        .filter_map(|(tick, e)| match e {
            Event::VehicleSpawned {
                vehicle_type: VehicleType::Ambulance,
                lane,
                ..
            } if *lane == north => Some(*tick),
            _ => None,
        })
        .collect();
    assert_eq!(spawned, vec![3]);
    assert_eq!(world.lane_vehicles(north).unwrap().len(), 2);
}

#[test]
fn test_set_spawn_rate_applies_to_one_lane() {
    let mut world = started_world(SimConfig {
        seed: Some(3),
        ..quiet_config()
    });
    let west = lane(Direction::West);
    world
        .submit(Command::SetSpawnRate {
            lane: west,
            rate: 10.0,
        })
        .unwrap();

    let events = run_until(&mut world, 50);
    let lanes: Vec<LaneId> = events
        .iter()
        .filter_map(|(_, e)| match e {
            Event::VehicleSpawned { lane, .. } => Some(*lane),
            _ => None,
        })
        .collect();
    assert!(!lanes.is_empty());
    assert!(lanes.iter().all(|&l| l == west));
    assert_eq!(world.lane(west).unwrap().spawn_rate, 10.0);
}

#[test]
fn test_invalid_commands_rejected() {
    let mut world = SimWorld::new(quiet_config()).unwrap();
    let missing = LaneId::new(Direction::North, 3);

    let result = world.submit(Command::SpawnVehicle {
        lane: missing,
        vehicle_type: VehicleType::Normal,
    });
    assert!(matches!(result, Err(SimError::InvalidLane(l)) if l == missing));

    let result = world.submit(Command::SetSpawnRate {
        lane: missing,
        rate: 1.0,
    });
    assert!(matches!(result, Err(SimError::InvalidLane(_))));

    let result = world.submit(Command::SetSpawnRate {
        lane: lane(Direction::North),
        rate: -1.0,
    });
    assert!(matches!(result, Err(SimError::Configuration(_))));

    let result = world.submit(Command::SetSpeedMultiplier(0.0));
    assert!(matches!(result, Err(SimError::Configuration(_))));

    assert!(matches!(
        world.insert_vehicle(missing, VehicleType::Normal, 0.0),
        Err(SimError::InvalidLane(_))
    ));

    // Rejected commands never reach the queue
    world.submit(Command::Start).unwrap();
    run_until(&mut world, 20);
    assert_eq!(world.vehicle_count(), 0);
}

#[test]
fn test_insert_vehicle_keeps_lane_order() {
    let mut world = SimWorld::new(quiet_config()).unwrap();
    let north = lane(Direction::North);
    world.insert_vehicle(north, VehicleType::Normal, 40.0).unwrap();

    assert!(world
        .insert_vehicle(north, VehicleType::Normal, 60.0)
        .is_err());
    assert!(world
        .insert_vehicle(north, VehicleType::Normal, 150.0)
        .is_err());
    assert!(world
        .insert_vehicle(north, VehicleType::Normal, 20.0)
        .is_ok());
}

#[test]
fn test_overlapping_vehicle_frozen_for_one_tick() {
    let mut world = SimWorld::new(quiet_config()).unwrap();
    let north = lane(Direction::North);
    world.insert_vehicle(north, VehicleType::Normal, 50.0).unwrap();
    let follower = world.insert_vehicle(north, VehicleType::Normal, 45.0).unwrap();
    world.submit(Command::Start).unwrap();

    let events = run_until(&mut world, 1);
    let violations: Vec<&Event> = events
        .iter()
        .map(|(_, e)| e)
        .filter(|e| matches!(e, Event::InvariantViolation { .. }))
        .collect();
    assert_eq!(
        violations,
        vec![&Event::InvariantViolation {
            vehicle_id: follower,
            lane: north,
        }]
    );
    assert_eq!(world.vehicle(follower).unwrap().position.into_inner(), 45.0);

    // Spacing is restored on the next tick
    let events = run_until(&mut world, 10);
    assert!(!events
        .iter()
        .any(|(_, e)| matches!(e, Event::InvariantViolation { .. })));
    assert_eq!(world.stats().invariant_violations, 1);
}

#[test]
fn test_emergency_vehicle_denied_entry_until_box_clears() {
    let mut config = quiet_config();
    config.max_speed.normal = 0.5;
    config.detection_distance = 30.0;
    let mut world = SimWorld::new(config).unwrap();
    let east = lane(Direction::East);
    let slow = world
        .insert_vehicle(lane(Direction::North), VehicleType::Normal, 99.0)
        .unwrap();
    let ambulance = world
        .insert_vehicle(east, VehicleType::Ambulance, 0.0)
        .unwrap();
    world.submit(Command::Start).unwrap();

    let mut events = Vec::new();
    let mut ambulance_entered = None;
    while world.tick() < 60 {
        for event in world.advance() {
            events.push((world.tick(), event));
        }
        assert!(world.crossing_groups().len() <= 1);
        let crossing = world
            .vehicle(ambulance)
            .is_some_and(|v| v.state == VehicleState::Crossing);
        if crossing && ambulance_entered.is_none() {
            ambulance_entered = Some(world.tick());
        }
    }

    let green_for_ambulance = signal_changes(&events)
        .into_iter()
        .find(|(_, phase, _)| *phase == SignalPhase::Green(ConflictGroup::EastWest))
        .map(|(tick, _, mode)| (tick, mode));
    assert_eq!(green_for_ambulance, Some((29, SignalMode::Preempted)));

    let denials: Vec<(u64, VehicleId, LaneId)> = events
        .iter()
        .filter_map(|(tick, event)| match event {
            Event::CollisionAvoided { vehicle_id, lane } => Some((*tick, *vehicle_id, *lane)),
            _ => None,
        })
        .collect();
    assert_eq!(denials.len(), 13);
    assert!(denials
        .iter()
        .all(|&(_, id, lane_id)| id == ambulance && lane_id == east));
    assert_eq!(denials.first().map(|d| d.0), Some(29));
    assert_eq!(denials.last().map(|d| d.0), Some(41));
    assert_eq!(world.stats().collisions_avoided, 13);

    // Entry is granted on the tick the N/S vehicle leaves the box
    let slow_gone = departure_tick(&events, slow);
    assert_eq!(slow_gone, Some(42));
    assert_eq!(ambulance_entered, slow_gone);
}

#[test]
fn test_conflicting_crossings_reported() {
    let config = SimConfig::default();
    let network = SimRoadNetwork::new(&config);
    let vehicle = |id: usize, direction: Direction, state: VehicleState| {
        let mut vehicle = Vehicle::new(
            VehicleId(id),
            VehicleType::Normal,
            lane(direction),
            config.max_speed.normal,
            0,
        );
        vehicle.state = state;
        (vehicle.id, vehicle)
    };

    let mut vehicles: BTreeMap<VehicleId, Vehicle> = [
        vehicle(0, Direction::North, VehicleState::Crossing),
        vehicle(1, Direction::East, VehicleState::Crossing),
        vehicle(2, Direction::South, VehicleState::Crossing),
        vehicle(3, Direction::West, VehicleState::Approaching),
    ]
    .into_iter()
    .collect();
    assert_eq!(
        find_conflicting_crossings(&vehicles, &network),
        vec![VehicleId(1)]
    );

    // Both N/S vehicles share the box without conflict
    vehicles.remove(&VehicleId(1));
    assert!(find_conflicting_crossings(&vehicles, &network).is_empty());
}

#[test]
fn test_long_run_keeps_safety_invariants() {
    let config = SimConfig {
        spawn_rate_per_lane: 0.4,
        emergency_vehicle_probability: 0.05,
        lanes_per_direction: 2,
        seed: Some(42),
        ..SimConfig::default()
    };
    let min_gap = config.min_following_distance;
    let clearance = config.clearance_ticks;
    let mut world = started_world(config);
    let lanes: Vec<LaneId> = world.road_network().lane_ids().collect();
    assert_eq!(lanes.len(), 8);

    let mut last_green = world.signal().phase().green_group();
    let mut all_red_run = 0;

    for _ in 0..3000 {
        let events = world.advance();
        assert!(!events
            .iter()
            .any(|e| matches!(e, Event::InvariantViolation { .. })));

        // Mutual exclusion inside the box
        assert!(world.crossing_groups().len() <= 1);

        // Minimum spacing in every lane
        for &lane_id in &lanes {
            let vehicles = world.lane_vehicles(lane_id).unwrap();
            for pair in vehicles.windows(2) {
                let gap = (pair[0].position - pair[1].position).into_inner();
                assert!(gap >= min_gap - 1e-3, "gap {} in lane {}", gap, lane_id);
            }
        }

        // Green passes to the other group only after a full all-red clearance
        let phase = world.signal().phase();
        if phase == SignalPhase::AllRed {
            all_red_run += 1;
        } else {
            if let Some(group) = phase.green_group() {
                if last_green.is_some_and(|last| last != group) {
                    assert!(
                        all_red_run >= clearance,
                        "green for {} after {} all-red ticks",
                        group,
                        all_red_run
                    );
                }
                last_green = Some(group);
            }
            all_red_run = 0;
        }
    }

    assert!(world.stats().vehicles_departed > 0);
    assert_eq!(world.stats().invariant_violations, 0);
}

#[test]
fn test_every_vehicle_eventually_departs() {
    let config = SimConfig {
        spawn_rate_per_lane: 0.3,
        seed: Some(7),
        ..SimConfig::default()
    };
    let mut world = started_world(config);
    run_until(&mut world, 2000);
    assert!(world.stats().vehicles_spawned > 0);

    let lanes: Vec<LaneId> = world.road_network().lane_ids().collect();
    for lane_id in lanes {
        world
            .submit(Command::SetSpawnRate {
                lane: lane_id,
                rate: 0.0,
            })
            .unwrap();
    }

    run_until(&mut world, 3500);
    assert_eq!(world.vehicle_count(), 0);
    assert_eq!(
        world.stats().vehicles_spawned,
        world.stats().vehicles_departed
    );
}

#[test]
fn test_road_network_conflicts() {
    let world = SimWorld::new(SimConfig {
        lanes_per_direction: 2,
        ..quiet_config()
    })
    .unwrap();
    let network = world.road_network();
    assert_eq!(network.lane_count(), 8);

    let east = LaneId::new(Direction::East, 1);
    assert_eq!(network.conflict_group(east).unwrap(), ConflictGroup::EastWest);
    assert!(network.groups_conflict(ConflictGroup::NorthSouth, ConflictGroup::EastWest));
    assert!(!network.groups_conflict(ConflictGroup::EastWest, ConflictGroup::EastWest));

    let conflicting = network.conflicting_lanes(east).unwrap();
    assert_eq!(conflicting.len(), 4);
    assert!(conflicting
        .iter()
        .all(|lane| lane.direction.conflict_group() == ConflictGroup::NorthSouth));

    let missing = LaneId::new(Direction::West, 2);
    assert!(matches!(
        network.conflicting_lanes(missing),
        Err(SimError::InvalidLane(_))
    ));
}

#[test]
fn test_config_validation() {
    assert!(SimConfig::default().validate().is_ok());

    let bad = [
        SimConfig {
            phases: Vec::new(),
            ..SimConfig::default()
        },
        SimConfig {
            phases: vec![
                PhaseConfig {
                    group: ConflictGroup::EastWest,
                    green_ticks: 30,
                },
                PhaseConfig {
                    group: ConflictGroup::EastWest,
                    green_ticks: 30,
                },
            ],
            ..SimConfig::default()
        },
        SimConfig {
            clearance_ticks: 0,
            ..SimConfig::default()
        },
        SimConfig {
            max_preemption_ticks: 10,
            clearance_ticks: 10,
            ..SimConfig::default()
        },
        SimConfig {
            min_following_distance: 0.0,
            ..SimConfig::default()
        },
        SimConfig {
            emergency_vehicle_probability: 1.5,
            ..SimConfig::default()
        },
        SimConfig {
            lanes_per_direction: 0,
            ..SimConfig::default()
        },
    ];

    for config in bad {
        assert!(matches!(
            SimWorld::new(config),
            Err(SimError::Configuration(_))
        ));
    }
}

#[test]
fn test_config_from_json() {
    let config = SimConfig::from_json(r#"{ "clearance_ticks": 5, "seed": 7 }"#).unwrap();
    assert_eq!(config.clearance_ticks, 5);
    assert_eq!(config.seed, Some(7));
    assert_eq!(config.yellow_ticks, SimConfig::default().yellow_ticks);

    let config = SimConfig::from_json(
        r#"{ "phases": [ { "group": "EastWest", "green_ticks": 40 } ] }"#,
    )
    .unwrap();
    let world = SimWorld::new(config).unwrap();
    assert_eq!(
        world.signal().phase(),
        SignalPhase::Green(ConflictGroup::EastWest)
    );

    assert!(matches!(
        SimConfig::from_json("{ not json"),
        Err(SimError::Configuration(_))
    ));
    assert!(SimConfig::load("does/not/exist.json").is_err());
}

#[derive(Default)]
struct Recorder {
    events: Vec<(u64, Event)>,
    batches: usize,
}

struct SharedRecorder(Rc<RefCell<Recorder>>);

impl EventSubscriber for SharedRecorder {
    fn on_event(&mut self, tick: u64, event: &Event) {
        self.0.borrow_mut().events.push((tick, *event));
    }

    fn on_tick_end(&mut self, _tick: u64, _events: &[Event]) {
        self.0.borrow_mut().batches += 1;
    }
}

#[test]
fn test_subscribers_see_published_batches() {
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    let mut world = SimWorld::new(quiet_config()).unwrap();
    world.subscribe(Box::new(SharedRecorder(Rc::clone(&recorder))));

    let id = world
        .insert_vehicle(lane(Direction::North), VehicleType::Normal, 0.0)
        .unwrap();
    world.submit(Command::Start).unwrap();
    let returned = run_until(&mut world, 50);

    let recorder = recorder.borrow();
    assert_eq!(recorder.batches, 50);
    assert_eq!(recorder.events, returned);
    assert_eq!(departure_tick(&recorder.events, id), Some(48));
}
