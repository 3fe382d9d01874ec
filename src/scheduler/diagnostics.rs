//! Structured scheduling diagnostics.
//!
//! Constraint failures never abort a scenario; they are collected here
//! and attached to the schedule result. Advisories are kept in a
//! separate list so callers can treat them as informational.

use serde::{Deserialize, Serialize};

use crate::models::ids::{ResourceId, ScenarioId, Slot, TaskId};

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// The affected task is infeasible or the data is inconsistent.
    Error,
    /// Suspicious but schedulable.
    Warning,
    /// Informational; reported and ignored.
    Advisory,
}

/// What went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// Window constraints contradict each other (ES > LF).
    BoundsViolation,
    /// A mandatory allocation could not be satisfied inside the window.
    MandatoryUnsatisfiable,
    /// A predecessor can never be scheduled, so neither can this task.
    DependencyUnschedulable,
    /// Container interval is not the hull of its children.
    ContainerHullViolation,
    /// Assigned shares exceed a resource's efficiency at a slot.
    ResourceOverbooked,
    /// Booked work differs from declared effort beyond tolerance.
    EffortMismatch,
    /// A booking exceeds the declared effort.
    BookingBeyondEffort,
    /// A booking slot was dropped or accepted outside working time.
    BookingOutsideWorkingTime,
    /// The scenario was cancelled or hit its deadline.
    ScenarioAborted,
    /// A declared resource received no assignments.
    UnusedResource,
    /// A resource is assigned less than a tenth of its working time.
    UnderUtilisedResource,
}

/// One diagnostic record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub scenario: ScenarioId,
    pub task: Option<TaskId>,
    pub resource: Option<ResourceId>,
    pub slot: Option<Slot>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        kind: DiagnosticKind,
        scenario: ScenarioId,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            kind,
            scenario,
            task: None,
            resource: None,
            slot: None,
            message: message.into(),
        }
    }

    pub fn error(kind: DiagnosticKind, scenario: ScenarioId, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, kind, scenario, message)
    }

    pub fn advisory(kind: DiagnosticKind, scenario: ScenarioId, message: impl Into<String>) -> Self {
        Self::new(Severity::Advisory, kind, scenario, message)
    }

    pub fn with_task(mut self, task: TaskId) -> Self {
        self.task = Some(task);
        self
    }

    pub fn with_resource(mut self, resource: ResourceId) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_slot(mut self, slot: Slot) -> Self {
        self.slot = Some(slot);
        self
    }
}
