use thiserror::Error;

use super::types::{LaneId, VehicleId};

#[derive(Debug, Error)]
pub enum SimError {
    #[error("simulation configuration error: {0}")]
    Configuration(String),

    #[error("unknown lane {0}")]
    InvalidLane(LaneId),

    #[error("invariant violated by vehicle {vehicle_id} in lane {lane}: {detail}")]
    InvariantViolation {
        vehicle_id: VehicleId,
        lane:       LaneId,
        detail:     String,
    },
}

pub type SimResult<T> = Result<T, SimError>;
