//! Shutdown coordinator.
//!
//! 1. stop accepting submissions
//! 2. `Discard`: resolve every not-yet-started task as cancelled
//! 3. wait (up to the deadline) for all lane workers to exit
//! 4. deadline hit: abort running apply calls (timed out) and cancel the rest

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::queue::{Abandoned, LaneRegistry};

/// What happens to tasks that are queued but not started when shutdown begins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownMode {
    /// Keep processing until lanes are empty (or the deadline hits).
    #[default]
    Drain,
    /// Finish only the task each lane is running now.
    Discard,
}

impl fmt::Display for ShutdownMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownMode::Drain => f.write_str("drain"),
            ShutdownMode::Discard => f.write_str("discard"),
        }
    }
}

impl FromStr for ShutdownMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drain" => Ok(ShutdownMode::Drain),
            "discard" => Ok(ShutdownMode::Discard),
            other => Err(format!("unknown shutdown mode: {other}")),
        }
    }
}

/// Summary of one shutdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    pub mode: ShutdownMode,
    /// Every worker exited before the deadline.
    pub completed_in_time: bool,
    /// Tasks resolved `Cancelled` (discarded, or never started before the deadline).
    pub cancelled: usize,
    /// Tasks resolved `TimedOut` (running when the deadline hit).
    pub timed_out: usize,
    pub elapsed_ms: u64,
}

pub(crate) async fn coordinate<P, T>(
    registry: &LaneRegistry<P, T>,
    mode: ShutdownMode,
    deadline: Duration,
) -> ShutdownReport {
    let started = Instant::now();
    let lanes = registry.close();
    info!(%mode, lanes = lanes.len(), deadline_ms = deadline.as_millis() as u64, "shutdown started");

    let mut cancelled = 0;
    if mode == ShutdownMode::Discard {
        for lane in &lanes {
            cancelled += lane.lock().cancel_waiting();
        }
        if cancelled > 0 {
            info!(cancelled, "discarded queued tasks");
        }
    }

    let completed_in_time = tokio::time::timeout(deadline, registry.workers().wait_idle())
        .await
        .is_ok();

    let mut timed_out = 0;
    if !completed_in_time {
        let mut abandoned = Abandoned::default();
        for lane in registry.lanes() {
            let a = lane.lock().abandon();
            abandoned.timed_out += a.timed_out;
            abandoned.cancelled += a.cancelled;
        }
        timed_out = abandoned.timed_out;
        cancelled += abandoned.cancelled;
        warn!(
            timed_out,
            cancelled = abandoned.cancelled,
            "shutdown deadline elapsed; abandoned outstanding tasks"
        );
    }

    let report = ShutdownReport {
        mode,
        completed_in_time,
        cancelled,
        timed_out,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        completed_in_time,
        cancelled, timed_out, elapsed_ms = report.elapsed_ms, "shutdown finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::drain("drain", ShutdownMode::Drain)]
    #[case::discard("discard", ShutdownMode::Discard)]
    #[case::upper("DRAIN", ShutdownMode::Drain)]
    fn mode_parses(#[case] raw: &str, #[case] expected: ShutdownMode) {
        assert_eq!(raw.parse::<ShutdownMode>(), Ok(expected));
    }

    #[test]
    fn unknown_mode_is_an_error() {
        assert!("later".parse::<ShutdownMode>().is_err());
    }

    #[tokio::test]
    async fn empty_registry_shuts_down_immediately() {
        let registry = LaneRegistry::<(), ()>::new();
        let report = coordinate(&registry, ShutdownMode::Drain, Duration::from_secs(5)).await;

        assert!(report.completed_in_time);
        assert_eq!(report.cancelled, 0);
        assert_eq!(report.timed_out, 0);
        assert!(!registry.is_accepting());
    }
}
