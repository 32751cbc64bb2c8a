use a1_physics::SimulationState;

use crate::ml::Observation;

/// Positions first, then velocities.
pub fn encode(state: &SimulationState) -> Observation {
    let mut values = Vec::with_capacity(state.qpos.len() + state.qvel.len());
    values.extend_from_slice(&state.qpos);
    values.extend_from_slice(&state.qvel);
    Observation { values }
}
