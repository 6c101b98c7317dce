//! Scheduler status shared between the scheduler task and its handle.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// What the scheduler is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Fetching,
    Deriving,
    Scoring,
    /// Waiting out the backoff before retry `attempt`.
    Retrying {
        attempt: u32,
    },
    Publishing,
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => f.write_str("idle"),
            Phase::Fetching => f.write_str("fetching"),
            Phase::Deriving => f.write_str("deriving"),
            Phase::Scoring => f.write_str("scoring"),
            Phase::Retrying { attempt } => write!(f, "retrying (attempt {})", attempt),
            Phase::Publishing => f.write_str("publishing"),
            Phase::Stopped => f.write_str("stopped"),
        }
    }
}

/// Point-in-time view of a scheduler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulerStatus {
    pub phase: Phase,
    /// Cycles that reached the publish step.
    pub cycles_completed: u64,
    pub last_integrity: Option<f64>,
    /// Snapshot artifact of the last cycle, if it was written.
    pub last_artifact: Option<PathBuf>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub next_cycle_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub(crate) struct StatusCell {
    inner: RwLock<SchedulerStatus>,
}

impl StatusCell {
    pub(crate) fn snapshot(&self) -> SchedulerStatus {
        self.inner.read().clone()
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        self.inner.write().phase = phase;
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut SchedulerStatus)) {
        f(&mut self.inner.write());
    }
}
