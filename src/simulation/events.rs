//! Typed output events and the bus that delivers them
//!
//! Events raised during a tick are buffered and published together at the
//! end of the tick, so subscribers never observe a partial tick.

use log::info;
use std::fmt;

use super::signal::{SignalMode, SignalPhase};
use super::types::{Direction, LaneId, VehicleId, VehicleType};

/// A simulation state change
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    VehicleSpawned {
        id: VehicleId,
        vehicle_type: VehicleType,
        lane: LaneId,
    },
    VehicleDeparted {
        id: VehicleId,
    },
    SignalChanged {
        phase: SignalPhase,
        mode: SignalMode,
    },
    PreemptionStarted {
        vehicle_id: VehicleId,
        direction: Direction,
    },
    PreemptionEnded {
        vehicle_id: VehicleId,
    },
    CollisionAvoided {
        vehicle_id: VehicleId,
        lane: LaneId,
    },
    InvariantViolation {
        vehicle_id: VehicleId,
        lane: LaneId,
    },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::VehicleSpawned {
                id,
                vehicle_type,
                lane,
            } => write!(f, "{:?} {} spawned in lane {}", vehicle_type, id, lane),
            Event::VehicleDeparted { id } => write!(f, "vehicle {} departed", id),
            Event::SignalChanged { phase, mode } => {
                write!(f, "signal changed to {} ({:?})", phase, mode)
            }
            Event::PreemptionStarted {
                vehicle_id,
                direction,
            } => write!(f, "preemption started for {} from {}", vehicle_id, direction),
            Event::PreemptionEnded { vehicle_id } => {
                write!(f, "preemption ended for {}", vehicle_id)
            }
            Event::CollisionAvoided { vehicle_id, lane } => {
                write!(f, "collision avoided: {} held in lane {}", vehicle_id, lane)
            }
            Event::InvariantViolation { vehicle_id, lane } => {
                write!(f, "invariant violation: {} in lane {}", vehicle_id, lane)
            }
        }
    }
}

/// Consumer of published events
///
/// Both methods default to no-ops so implementors override what they need.
pub trait EventSubscriber {
    /// Called for each event of a tick, in emission order
    fn on_event(&mut self, _tick: u64, _event: &Event) {}

    /// Called once per published batch, after every `on_event`
    fn on_tick_end(&mut self, _tick: u64, _events: &[Event]) {}
}

/// Writes every event to the log
pub struct LogSubscriber;

impl EventSubscriber for LogSubscriber {
    fn on_event(&mut self, tick: u64, event: &Event) {
        info!("[tick {}] {}", tick, event);
    }
}

#[derive(Default)]
pub struct EventBus {
    pending: Vec<Event>,
    subscribers: Vec<Box<dyn EventSubscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: Box<dyn EventSubscriber>) {
        self.subscribers.push(subscriber);
    }

    /// Buffer an event for the current tick
    pub fn emit(&mut self, event: Event) {
        self.pending.push(event);
    }

    /// Drop everything buffered without delivering it
    pub fn discard(&mut self) {
        self.pending.clear();
    }

    /// Deliver the buffered batch to all subscribers and hand it back
    pub fn publish(&mut self, tick: u64) -> Vec<Event> {
        let batch = std::mem::take(&mut self.pending);
        for subscriber in &mut self.subscribers {
            for event in &batch {
                subscriber.on_event(tick, event);
            }
            subscriber.on_tick_end(tick, &batch);
        }
        batch
    }
}
