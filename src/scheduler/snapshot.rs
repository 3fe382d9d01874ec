//! Schedule snapshot - save/load computed scenario state.
//!
//! Serializes the reporter-facing result of one scheduled scenario.
//! The snapshot embeds the SHA-256 fingerprint of the frozen graph so a
//! snapshot can only be replayed against the project that produced it.
//!
//! # Critical Invariants
//!
//! - **Determinism**: a snapshot of `schedule()` output restores the
//!   exact intervals and assignments.
//! - **Graph matching**: restore fails on a fingerprint mismatch.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ids::Slot;
use crate::models::project::ProjectGraph;
use crate::scheduler::engine::{ScenarioOutcome, ScenarioSchedule, TaskResultState};

/// Errors raised while saving or restoring a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("snapshot fingerprint {found} does not match project {expected}")]
    FingerprintMismatch { expected: String, found: String },
}

/// Serializable image of one scheduled scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    /// SHA-256 fingerprint of the frozen graph.
    pub fingerprint: String,

    pub scenario_name: String,

    pub outcome: SnapshotOutcome,

    pub tasks: Vec<TaskSnapshot>,
}

/// Scenario outcome in snapshot form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotOutcome {
    Scheduled,
    Aborted,
}

/// Task state in snapshot form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotTaskState {
    Scheduled,
    Infeasible,
    Aborted,
}

/// One task's computed results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub path: String,
    pub state: SnapshotTaskState,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub remaining_effort: f64,
    pub complete_percent: Option<f64>,
    pub cost: i64,
    pub revenue: i64,
    pub assignments: Vec<AssignmentSnapshot>,
}

/// One assignment, with entity ids replaced by stable paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentSnapshot {
    pub resource_path: String,
    pub slot: Slot,
    pub share: f64,
    pub from_booking: bool,
    pub sloppy: u8,
}

impl ScheduleSnapshot {
    /// Captures a snapshot of a scheduled scenario.
    pub fn capture(graph: &ProjectGraph, schedule: &ScenarioSchedule) -> Self {
        let tasks = schedule
            .tasks
            .iter()
            .map(|t| TaskSnapshot {
                path: t.path.clone(),
                state: match t.state {
                    TaskResultState::Scheduled => SnapshotTaskState::Scheduled,
                    TaskResultState::Infeasible => SnapshotTaskState::Infeasible,
                    TaskResultState::Aborted => SnapshotTaskState::Aborted,
                },
                start: t.start,
                end: t.end,
                remaining_effort: t.remaining_effort,
                complete_percent: t.complete_percent,
                cost: t.cost,
                revenue: t.revenue,
                assignments: t
                    .assignments
                    .iter()
                    .map(|a| AssignmentSnapshot {
                        resource_path: graph.resource(a.resource).path.clone(),
                        slot: a.slot,
                        share: a.share,
                        from_booking: a.from_booking,
                        sloppy: a.sloppy,
                    })
                    .collect(),
            })
            .collect();

        Self {
            fingerprint: graph.fingerprint(),
            scenario_name: schedule.scenario_name.clone(),
            outcome: match schedule.outcome {
                ScenarioOutcome::Scheduled => SnapshotOutcome::Scheduled,
                ScenarioOutcome::Aborted => SnapshotOutcome::Aborted,
            },
            tasks,
        }
    }

    /// Serializes to JSON.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a snapshot and verifies it belongs to `graph`.
    pub fn from_json(json: &str, graph: &ProjectGraph) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(json)?;
        let expected = graph.fingerprint();
        if snapshot.fingerprint != expected {
            return Err(SnapshotError::FingerprintMismatch {
                expected,
                found: snapshot.fingerprint,
            });
        }
        Ok(snapshot)
    }
}

impl ScenarioSchedule {
    /// Captures a snapshot of this schedule against its graph.
    pub fn snapshot(&self, graph: &ProjectGraph) -> ScheduleSnapshot {
        ScheduleSnapshot::capture(graph, self)
    }

    /// Parses a snapshot and verifies it belongs to `graph`.
    pub fn from_snapshot(json: &str, graph: &ProjectGraph) -> Result<ScheduleSnapshot, SnapshotError> {
        ScheduleSnapshot::from_json(json, graph)
    }
}
