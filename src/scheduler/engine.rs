//! Scheduler driver.
//!
//! Runs the fixed-point loop for one scenario: every pass sweeps all
//! unsettled tasks in priority order, each task pass either completes
//! the task, marks it infeasible, or leaves it blocked on another task.
//! The loop ends when everything settled or a full pass made no
//! progress, in which case the remaining tasks are marked infeasible
//! with diagnostics naming their blockers.
//!
//! # Determinism
//!
//! Pass order is a stable sort of the frozen topological order by
//! descending task priority; the allocator's only randomness is keyed by
//! `(project seed, task id, slot)`. Same graph + same options =
//! identical results.
//!
//! # Cancellation
//!
//! The cancel flag and the wall-clock deadline are checked between
//! passes only; on abort the scenario's partial state is discarded and
//! every task reports `Aborted`.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::models::ids::{AccountId, ResourceId, ScenarioId, Slot, TaskId};
use crate::models::project::ProjectGraph;
use crate::scheduler::diagnostics::{Diagnostic, DiagnosticKind};
use crate::scheduler::state::{ScenarioState, TaskState};
use crate::scheduler::task_scheduler::{schedule_task_pass, PassResult};
use crate::scheduler::{accrual, projection, validation};

// ============================================================================
// Options and errors
// ============================================================================

/// Per-invocation scheduling options.
#[derive(Debug, Clone, Default)]
pub struct ScheduleOptions {
    /// Status date: recorded bookings lie before it, computed slots in a
    /// projection scenario after it, and completion derives from it.
    pub now: Option<NaiveDateTime>,

    /// Cooperative cancellation, checked between passes.
    pub cancel: Option<Arc<AtomicBool>>,

    /// Wall-clock deadline, checked between passes.
    pub deadline: Option<Instant>,
}

/// Errors that prevent a scenario from being scheduled at all.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("unknown scenario id {0:?}")]
    UnknownScenario(ScenarioId),

    #[error("scenario {0} is disabled")]
    ScenarioDisabled(String),
}

// ============================================================================
// Result types
// ============================================================================

/// Terminal state of one task in one scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskResultState {
    Scheduled,
    Infeasible,
    Aborted,
}

/// Scenario-level outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScenarioOutcome {
    /// The fixed-point loop ran to quiescence (individual tasks may
    /// still be infeasible).
    Scheduled,
    /// Cancelled or deadline hit; partial state was discarded.
    Aborted,
}

/// Derived schedule health of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskHealth {
    OnTrack,
    Behind,
    Complete,
}

/// One booked (resource, slot, share) triple in reporter form.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AssignmentRecord {
    pub resource: ResourceId,
    pub slot: Slot,
    pub share: f64,
    pub from_booking: bool,
    pub sloppy: u8,
}

/// Everything the reporter needs for one (task, scenario) pair.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub task: TaskId,
    pub path: String,
    pub state: TaskResultState,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub assignments: Vec<AssignmentRecord>,
    /// Resource-slot units delivered.
    pub booked_effort: f64,
    /// Declared effort not yet covered.
    pub remaining_effort: f64,
    pub complete_percent: Option<f64>,
    pub health: TaskHealth,
    pub cost: i64,
    pub revenue: i64,
}

/// Per-resource reporting data.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceReport {
    pub resource: ResourceId,
    pub path: String,
    /// Distinct assigned slots, ascending.
    pub assigned: Vec<Slot>,
    /// Working slots of the resource over the whole project window.
    pub working_slots: usize,
    /// assigned / working over the whole window.
    pub utilisation: f64,
}

impl ResourceReport {
    /// Utilisation over a reporting interval `[from, until)`.
    pub fn utilisation_in(
        &self,
        map: &crate::models::calendar::WorkingMap,
        from: Slot,
        until: Slot,
    ) -> f64 {
        let working = map.count_range(from, until);
        if working == 0 {
            return 0.0;
        }
        let assigned = self
            .assigned
            .iter()
            .filter(|&&s| s >= from && s < until)
            .count();
        assigned as f64 / working as f64
    }
}

/// Per-account accrual totals.
#[derive(Debug, Clone, Serialize)]
pub struct AccountReport {
    pub account: AccountId,
    pub path: String,
    pub cost: i64,
    pub revenue: i64,
    pub balance: i64,
}

/// Complete result of scheduling one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioSchedule {
    pub scenario: ScenarioId,
    pub scenario_name: String,
    pub outcome: ScenarioOutcome,
    pub tasks: Vec<TaskResult>,
    pub resources: Vec<ResourceReport>,
    pub accounts: Vec<AccountReport>,
    /// Constraint errors and warnings.
    pub diagnostics: Vec<Diagnostic>,
    /// Informational advisories.
    pub advisories: Vec<Diagnostic>,
}

impl ScenarioSchedule {
    /// Task result by id.
    pub fn task(&self, id: TaskId) -> &TaskResult {
        &self.tasks[id.index()]
    }

    /// Whether any error-severity diagnostic was collected.
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == crate::scheduler::diagnostics::Severity::Error)
    }
}

/// Results of all enabled scenarios, in declaration order.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSchedule {
    pub scenarios: Vec<ScenarioSchedule>,
}

impl ProjectSchedule {
    pub fn scenario(&self, name: &str) -> Option<&ScenarioSchedule> {
        self.scenarios.iter().find(|s| s.scenario_name == name)
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Schedules scenarios of one frozen project graph.
pub struct Scheduler<'g> {
    graph: &'g ProjectGraph,
}

impl<'g> Scheduler<'g> {
    pub fn new(graph: &'g ProjectGraph) -> Self {
        Self { graph }
    }

    /// Schedules every enabled scenario in declaration order.
    pub fn schedule_all(&self, opts: &ScheduleOptions) -> Result<ProjectSchedule, ScheduleError> {
        let mut scenarios = Vec::new();
        for def in &self.graph.scenarios {
            if def.disabled {
                debug!(scenario = %def.name, "skipping disabled scenario");
                continue;
            }
            scenarios.push(self.schedule(def.id, opts)?);
        }
        Ok(ProjectSchedule { scenarios })
    }

    /// Schedules one scenario to quiescence.
    pub fn schedule(
        &self,
        scenario: ScenarioId,
        opts: &ScheduleOptions,
    ) -> Result<ScenarioSchedule, ScheduleError> {
        let graph = self.graph;
        let def = graph
            .scenarios
            .get(scenario.index())
            .ok_or(ScheduleError::UnknownScenario(scenario))?;
        if def.disabled {
            return Err(ScheduleError::ScenarioDisabled(def.name.clone()));
        }

        let mut state = ScenarioState::new(graph, scenario);
        let now_slot = opts.now.and_then(|t| graph.grid.slot_of(t));

        projection::apply_bookings(graph, &mut state, now_slot);

        // In projection mode recorded work owns the past; computed slots
        // start at the status date.
        let floor = if def.projection {
            now_slot.unwrap_or(0)
        } else {
            0
        };

        // Pass order: topological order, stably re-sorted so higher
        // priority tasks reach contended resources first.
        let mut order = graph.topo_order().to_vec();
        order.sort_by_key(|&t| std::cmp::Reverse(graph.task(t).priority));

        let mut aborted_reason: Option<String> = None;
        loop {
            if let Some(reason) = self.abort_reason(opts) {
                aborted_reason = Some(reason);
                break;
            }

            let mut progressed = 0usize;
            let mut open = 0usize;
            for &task in &order {
                match schedule_task_pass(graph, &mut state, task, floor) {
                    PassResult::Advanced => progressed += 1,
                    PassResult::Blocked => open += 1,
                    PassResult::Settled => {}
                }
            }
            debug!(
                scenario = %def.name,
                progressed, open, "scheduling pass finished"
            );

            if open == 0 {
                break;
            }
            if progressed == 0 {
                self.mark_stuck_tasks(&mut state, &order);
                break;
            }
        }

        if let Some(reason) = aborted_reason {
            info!(scenario = %def.name, reason = %reason, "scenario aborted");
            return Ok(self.aborted_schedule(def.id, &def.name, reason));
        }

        accrual::run(graph, &mut state, now_slot);
        validation::run(graph, &mut state);

        let schedule = self.build_schedule(def.id, &def.name, state, now_slot);
        info!(
            scenario = %def.name,
            tasks = schedule.tasks.len(),
            diagnostics = schedule.diagnostics.len(),
            "scenario scheduled"
        );
        Ok(schedule)
    }

    fn abort_reason(&self, opts: &ScheduleOptions) -> Option<String> {
        if let Some(cancel) = &opts.cancel {
            if cancel.load(Ordering::Relaxed) {
                return Some("cancelled".to_string());
            }
        }
        if let Some(deadline) = opts.deadline {
            if Instant::now() >= deadline {
                return Some("deadline expired".to_string());
            }
        }
        None
    }

    /// A full pass made no progress: whatever is still open can never
    /// settle. Name the blockers.
    fn mark_stuck_tasks(&self, state: &mut ScenarioState, order: &[TaskId]) {
        for &task in order {
            let i = task.index();
            if matches!(
                state.task_state[i],
                TaskState::Scheduled | TaskState::Infeasible
            ) {
                continue;
            }
            let message = match state.blocked_on[i] {
                Some(blocker) => format!(
                    "{} is blocked by {}, which never completed",
                    self.graph.task(task).path,
                    self.graph.task(blocker).path
                ),
                None => format!(
                    "{} could not be scheduled; its children or dependencies never settled",
                    self.graph.task(task).path
                ),
            };
            state.diagnostics.push(
                Diagnostic::error(DiagnosticKind::DependencyUnschedulable, state.scenario, message)
                    .with_task(task),
            );
            state.task_state[i] = TaskState::Infeasible;
        }
    }

    fn aborted_schedule(
        &self,
        scenario: ScenarioId,
        name: &str,
        reason: String,
    ) -> ScenarioSchedule {
        let graph = self.graph;
        let tasks = graph
            .tasks
            .iter()
            .map(|t| TaskResult {
                task: t.id,
                path: t.path.clone(),
                state: TaskResultState::Aborted,
                start: None,
                end: None,
                assignments: Vec::new(),
                booked_effort: 0.0,
                remaining_effort: 0.0,
                complete_percent: None,
                health: TaskHealth::OnTrack,
                cost: 0,
                revenue: 0,
            })
            .collect();
        ScenarioSchedule {
            scenario,
            scenario_name: name.to_string(),
            outcome: ScenarioOutcome::Aborted,
            tasks,
            resources: Vec::new(),
            accounts: Vec::new(),
            diagnostics: vec![Diagnostic::error(
                DiagnosticKind::ScenarioAborted,
                scenario,
                format!("scenario {name} aborted: {reason}"),
            )],
            advisories: Vec::new(),
        }
    }

    fn build_schedule(
        &self,
        scenario: ScenarioId,
        name: &str,
        mut state: ScenarioState,
        now_slot: Option<Slot>,
    ) -> ScenarioSchedule {
        let graph = self.graph;

        // Deterministic reporter order.
        state
            .assignments
            .sort_by_key(|a| (a.task, a.slot, a.resource));

        let mut per_task: Vec<Vec<AssignmentRecord>> = vec![Vec::new(); graph.tasks.len()];
        let mut per_resource: Vec<Vec<Slot>> = vec![Vec::new(); graph.resources.len()];
        for a in &state.assignments {
            per_task[a.task.index()].push(AssignmentRecord {
                resource: a.resource,
                slot: a.slot,
                share: a.share,
                from_booking: a.from_booking,
                sloppy: a.sloppy,
            });
            per_resource[a.resource.index()].push(a.slot);
        }

        let tasks = graph
            .tasks
            .iter()
            .map(|t| {
                let i = t.id.index();
                let assignments = std::mem::take(&mut per_task[i]);
                let booked_effort: f64 = assignments.iter().map(|a| a.share).sum();
                let result_state = match state.task_state[i] {
                    TaskState::Scheduled => TaskResultState::Scheduled,
                    _ => TaskResultState::Infeasible,
                };
                let complete = state.complete[i];
                let health = self.task_health(t.id, &state, complete, now_slot);
                TaskResult {
                    task: t.id,
                    path: t.path.clone(),
                    state: result_state,
                    start: state.start[i].map(|s| graph.grid.datetime_of(s)),
                    end: state.end[i].map(|s| graph.grid.datetime_of(s)),
                    assignments,
                    booked_effort,
                    remaining_effort: state.remaining_effort[i].max(0.0),
                    complete_percent: complete,
                    health,
                    cost: state.task_cost[i],
                    revenue: state.task_revenue[i],
                }
            })
            .collect();

        let resources = graph
            .resources
            .iter()
            .map(|r| {
                let mut assigned = std::mem::take(&mut per_resource[r.id.index()]);
                assigned.sort_unstable();
                assigned.dedup();
                let working_slots = graph
                    .resource_map(r.id)
                    .count_range(0, graph.grid.num_slots());
                let utilisation = if working_slots > 0 {
                    assigned.len() as f64 / working_slots as f64
                } else {
                    0.0
                };
                ResourceReport {
                    resource: r.id,
                    path: r.path.clone(),
                    assigned,
                    working_slots,
                    utilisation,
                }
            })
            .collect();

        let accounts = graph
            .accounts
            .iter()
            .map(|a| {
                let i = a.id.index();
                AccountReport {
                    account: a.id,
                    path: a.path.clone(),
                    cost: state.account_cost[i],
                    revenue: state.account_revenue[i],
                    balance: state.account_revenue[i] - state.account_cost[i],
                }
            })
            .collect();

        ScenarioSchedule {
            scenario,
            scenario_name: name.to_string(),
            outcome: ScenarioOutcome::Scheduled,
            tasks,
            resources,
            accounts,
            diagnostics: state.diagnostics,
            advisories: state.advisories,
        }
    }

    fn task_health(
        &self,
        id: TaskId,
        state: &ScenarioState,
        complete: Option<f64>,
        now_slot: Option<Slot>,
    ) -> TaskHealth {
        let Some(complete) = complete else {
            return TaskHealth::OnTrack;
        };
        if complete >= 100.0 - 1e-9 {
            return TaskHealth::Complete;
        }
        let (Some(now), Some(start), Some(end)) = (
            now_slot,
            state.start[id.index()],
            state.end[id.index()],
        ) else {
            return TaskHealth::OnTrack;
        };
        if now <= start || end <= start {
            return TaskHealth::OnTrack;
        }
        let map = self.graph.task_map(id);
        let total = map.count_range(start, end);
        if total == 0 {
            return TaskHealth::OnTrack;
        }
        let elapsed = map.count_range(start, now.min(end));
        let expected = 100.0 * elapsed as f64 / total as f64;
        if complete + 1e-9 < expected {
            TaskHealth::Behind
        } else {
            TaskHealth::OnTrack
        }
    }
}
