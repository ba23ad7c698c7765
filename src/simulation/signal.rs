//! Traffic signal state machine
//!
//! Normal cycling walks the configured green phases in order, inserting an
//! optional amber interval and an all-red clearance between every pair of
//! greens. In preempted mode timers no longer end the green; the
//! preemption manager drives the controller directly. A phase of duration
//! `D` is in effect for exactly `D` motion steps.

use log::debug;
use std::fmt;

use super::config::{PhaseConfig, SimConfig};
use super::road_network::SimRoadNetwork;
use super::types::ConflictGroup;

/// The indication shown by the intersection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalPhase {
    Green(ConflictGroup),
    Yellow(ConflictGroup),
    AllRed,
}

impl SignalPhase {
    /// The group currently allowed to enter the box
    pub fn green_group(self) -> Option<ConflictGroup> {
        match self {
            SignalPhase::Green(group) => Some(group),
            _ => None,
        }
    }
}

impl fmt::Display for SignalPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalPhase::Green(group) => write!(f, "{}-green", group),
            SignalPhase::Yellow(group) => write!(f, "{}-yellow", group),
            SignalPhase::AllRed => write!(f, "all-red"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalMode {
    Normal,
    Preempted,
}

/// A phase or mode change produced by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalChange {
    pub phase: SignalPhase,
    pub mode: SignalMode,
}

#[derive(Debug, Clone)]
pub struct SignalController {
    cycle: Vec<PhaseConfig>,
    yellow_ticks: u32,
    clearance_ticks: u32,
    phase: SignalPhase,
    /// Motion steps the current phase has been in effect
    phase_elapsed: u32,
    mode: SignalMode,
    /// Cycle entry of the current (or last) normal green
    cycle_index: usize,
    /// Group that gets green when the current clearance ends
    next_green: ConflictGroup,
}

impl SignalController {
    /// Starts green for the first configured phase
    pub fn new(config: &SimConfig) -> Self {
        let cycle = config.phases.clone();
        let first = cycle
            .first()
            .map(|p| p.group)
            .unwrap_or(ConflictGroup::NorthSouth);
        let mut controller = Self {
            cycle,
            yellow_ticks: config.yellow_ticks,
            clearance_ticks: config.clearance_ticks,
            phase: SignalPhase::Green(first),
            phase_elapsed: 0,
            mode: SignalMode::Normal,
            cycle_index: 0,
            next_green: first,
        };
        controller.next_green = controller.group_after(0);
        controller
    }

    /// Return to the first phase of the cycle in normal mode
    pub fn reset(&mut self) {
        let first = self.first_group();
        self.phase = SignalPhase::Green(first);
        self.phase_elapsed = 0;
        self.mode = SignalMode::Normal;
        self.cycle_index = 0;
        self.next_green = self.group_after(0);
    }

    pub fn phase(&self) -> SignalPhase {
        self.phase
    }

    pub fn mode(&self) -> SignalMode {
        self.mode
    }

    pub fn phase_elapsed(&self) -> u32 {
        self.phase_elapsed
    }

    /// The phase the controller starts in and returns to after a reset
    pub fn initial_phase(&self) -> SignalPhase {
        SignalPhase::Green(self.first_group())
    }

    /// Whether the current phase grants right-of-way to `group`
    pub fn grants(&self, group: ConflictGroup) -> bool {
        self.phase == SignalPhase::Green(group)
    }

    fn change(&self) -> SignalChange {
        SignalChange {
            phase: self.phase,
            mode: self.mode,
        }
    }

    fn first_group(&self) -> ConflictGroup {
        self.cycle
            .first()
            .map(|p| p.group)
            .unwrap_or(ConflictGroup::NorthSouth)
    }

    fn group_after(&self, index: usize) -> ConflictGroup {
        if self.cycle.is_empty() {
            return ConflictGroup::NorthSouth;
        }
        self.cycle[(index + 1) % self.cycle.len()].group
    }

    /// Duration of the current phase, `None` while held by preemption
    fn current_duration(&self) -> Option<u32> {
        match (self.phase, self.mode) {
            (SignalPhase::Green(_), SignalMode::Preempted) => None,
            (SignalPhase::Green(_), SignalMode::Normal) => {
                self.cycle.get(self.cycle_index).map(|p| p.green_ticks)
            }
            (SignalPhase::Yellow(_), _) => Some(self.yellow_ticks),
            (SignalPhase::AllRed, _) => Some(self.clearance_ticks),
        }
    }

    fn set_phase(&mut self, phase: SignalPhase) {
        debug!(
            "Signal {} -> {} after {} ticks ({:?})",
            self.phase, phase, self.phase_elapsed, self.mode
        );
        self.phase = phase;
        self.phase_elapsed = 0;
    }

    /// Leave a green through amber (normal mode only) or straight to all-red
    fn begin_clearance(&mut self, from: ConflictGroup) {
        if self.mode == SignalMode::Normal && self.yellow_ticks > 0 {
            self.set_phase(SignalPhase::Yellow(from));
        } else {
            self.set_phase(SignalPhase::AllRed);
        }
    }

    fn expire_phase(&mut self) -> SignalChange {
        match self.phase {
            SignalPhase::Green(group) => {
                if self.next_green == group {
                    // Single-phase cycle: keep the green and restart its timer
                    self.phase_elapsed = 0;
                } else {
                    self.begin_clearance(group);
                }
            }
            SignalPhase::Yellow(_) => self.set_phase(SignalPhase::AllRed),
            SignalPhase::AllRed => {
                let group = self.next_green;
                self.set_phase(SignalPhase::Green(group));
                if self.mode == SignalMode::Normal {
                    if let Some(index) = self.cycle.iter().position(|p| p.group == group) {
                        self.cycle_index = index;
                    }
                    self.next_green = self.group_after(self.cycle_index);
                }
            }
        }
        self.change()
    }

    /// Advance timers by one tick
    ///
    /// Returns the new phase when a transition happened.
    pub fn advance(&mut self) -> Option<SignalChange> {
        let previous = self.phase;
        let change = match self.current_duration() {
            Some(duration) if self.phase_elapsed >= duration => Some(self.expire_phase()),
            _ => None,
        };
        self.phase_elapsed += 1;
        change.filter(|c| c.phase != previous)
    }

    /// Force right-of-way toward `group` and enter preempted mode
    ///
    /// A conflicting green is cleared through all-red first; an all-red
    /// already in progress keeps its elapsed clearance.
    pub fn preempt(&mut self, group: ConflictGroup, network: &SimRoadNetwork) -> SignalChange {
        self.mode = SignalMode::Preempted;
        self.next_green = group;

        match self.phase {
            SignalPhase::Green(current) if current == group => {}
            SignalPhase::Green(current) if !network.groups_conflict(current, group) => {
                self.set_phase(SignalPhase::Green(group));
            }
            SignalPhase::Green(_) => self.set_phase(SignalPhase::AllRed),
            SignalPhase::Yellow(current) if current == group => {
                self.set_phase(SignalPhase::Green(group));
            }
            SignalPhase::Yellow(_) => self.set_phase(SignalPhase::AllRed),
            SignalPhase::AllRed => {}
        }

        self.change()
    }

    /// Leave preempted mode and restart the cycle at its first phase
    pub fn end_preemption(&mut self) -> SignalChange {
        self.mode = SignalMode::Normal;
        let first = self.first_group();

        match self.phase {
            SignalPhase::Green(current) if current == first => {
                self.cycle_index = 0;
                self.next_green = self.group_after(0);
                self.phase_elapsed = 0;
            }
            SignalPhase::Green(current) => {
                self.next_green = first;
                self.begin_clearance(current);
            }
            SignalPhase::Yellow(_) | SignalPhase::AllRed => {
                self.next_green = first;
            }
        }

        self.change()
    }
}
