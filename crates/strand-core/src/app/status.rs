//! Status - キューの状態スナップショット
//!
//! 読み取り専用です。返した時点で古くなっている可能性があり、
//! 順序の保証には使えません。

use serde::{Deserialize, Serialize};

pub use crate::queue::LaneStatus;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub accepting: bool,
    pub active_workers: usize,
    /// Sorted by key.
    pub lanes: Vec<LaneStatus>,
}

impl QueueSnapshot {
    pub fn total_pending(&self) -> usize {
        self.lanes.iter().map(|l| l.pending).sum()
    }

    pub fn lane(&self, key: &str) -> Option<&LaneStatus> {
        self.lanes.iter().find(|l| l.key == key)
    }
}
