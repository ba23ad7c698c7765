//! Static geometry of the intersection
//!
//! Lanes and conflict groups are fixed at construction. The conflict
//! relation is kept as an undirected petgraph graph over conflict groups;
//! two lanes conflict when their groups are adjacent in that graph.

use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::{BTreeMap, HashMap};

use super::config::SimConfig;
use super::error::{SimError, SimResult};
use super::types::{ConflictGroup, Direction, LaneId};

/// Pure lookup table over lanes and their conflict groups
#[derive(Debug, Clone)]
pub struct SimRoadNetwork {
    /// Conflict graph: an edge means the two groups may not share right-of-way
    graph: UnGraph<ConflictGroup, ()>,

    /// Maps conflict groups to their node indices in the graph
    group_to_node: HashMap<ConflictGroup, NodeIndex>,

    /// Every lane with the group its movement belongs to
    lanes: BTreeMap<LaneId, ConflictGroup>,

    stop_line_position: f32,
    far_edge_position: f32,
}

impl SimRoadNetwork {
    /// Build the four-approach intersection described by the config
    pub fn new(config: &SimConfig) -> Self {
        let mut graph = UnGraph::new_undirected();
        let mut group_to_node = HashMap::new();

        for group in [ConflictGroup::NorthSouth, ConflictGroup::EastWest] {
            group_to_node.insert(group, graph.add_node(group));
        }

        // Crossing streams conflict with each other
        graph.add_edge(
            group_to_node[&ConflictGroup::NorthSouth],
            group_to_node[&ConflictGroup::EastWest],
            (),
        );

        let mut lanes = BTreeMap::new();
        for direction in Direction::ALL {
            for index in 0..config.lanes_per_direction {
                lanes.insert(LaneId::new(direction, index), direction.conflict_group());
            }
        }

        Self {
            graph,
            group_to_node,
            lanes,
            stop_line_position: config.stop_line_position,
            far_edge_position: config.far_edge_position(),
        }
    }

    /// All lanes in the fixed processing order
    pub fn lane_ids(&self) -> impl Iterator<Item = LaneId> + '_ {
        self.lanes.keys().copied()
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    pub fn contains_lane(&self, lane: LaneId) -> bool {
        self.lanes.contains_key(&lane)
    }

    /// Errors with `InvalidLane` when the lane does not exist
    pub fn validate_lane(&self, lane: LaneId) -> SimResult<()> {
        if self.contains_lane(lane) {
            Ok(())
        } else {
            Err(SimError::InvalidLane(lane))
        }
    }

    /// Gets the conflict group of a lane
    pub fn conflict_group(&self, lane: LaneId) -> SimResult<ConflictGroup> {
        self.lanes
            .get(&lane)
            .copied()
            .ok_or(SimError::InvalidLane(lane))
    }

    /// Whether the two groups may not hold right-of-way together
    pub fn groups_conflict(&self, a: ConflictGroup, b: ConflictGroup) -> bool {
        if a == b {
            return false;
        }
        match (self.group_to_node.get(&a), self.group_to_node.get(&b)) {
            (Some(&node_a), Some(&node_b)) => self.graph.find_edge(node_a, node_b).is_some(),
            // Unknown groups are treated as conflicting
            _ => true,
        }
    }

    /// Lanes whose active crossing would conflict with this lane's movement
    pub fn conflicting_lanes(&self, lane: LaneId) -> SimResult<Vec<LaneId>> {
        let group = self.conflict_group(lane)?;
        Ok(self
            .lanes
            .iter()
            .filter(|(_, other)| self.groups_conflict(group, **other))
            .map(|(id, _)| *id)
            .collect())
    }

    pub fn stop_line_position(&self) -> f32 {
        self.stop_line_position
    }

    pub fn far_edge_position(&self) -> f32 {
        self.far_edge_position
    }
}
