//! Lane state machine.

use serde::{Deserialize, Serialize};

/// Worker ownership of a lane.
///
/// State transitions:
/// - Idle -> Draining: a submit finds no worker and claims the lane for a new one
/// - Draining -> Idle: the worker finds the lane empty (checked under the
///   registry and lane locks together)
///
/// `generation` counts workers started on this lane; it only shows up in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LaneState {
    Idle,
    Draining { generation: u64 },
}

impl LaneState {
    pub fn is_draining(self) -> bool {
        matches!(self, LaneState::Draining { .. })
    }
}
