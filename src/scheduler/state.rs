//! Per-scenario derived state.
//!
//! Everything the scheduler computes for one scenario lives here: task
//! states, scheduled intervals, the assignment map, remaining effort and
//! accrued amounts. The structural graph is never mutated; a fresh
//! `ScenarioState` is built per scheduled scenario, which is what makes
//! cross-scenario parallelism sound.
//!
//! # Critical Invariants
//!
//! 1. For every resource and slot, the shares recorded in `usage` sum to
//!    at most the resource's effective efficiency.
//! 2. `assignments` and the per-resource usage maps describe the same
//!    bookings; `book()` is the only writer of both.

use rustc_hash::FxHashMap;

use crate::models::ids::{ResourceId, ScenarioId, Slot, TaskId};
use crate::models::project::ProjectGraph;
use crate::scheduler::diagnostics::Diagnostic;

/// Effort comparisons tolerate accumulated float error.
pub(crate) const EFFORT_EPS: f64 = 1e-9;

/// Lifecycle of one task within one scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Not yet examined.
    Init,
    /// Bounds resolved; placement may start.
    Ready,
    /// A sweep is placing slots.
    Running,
    /// Container waiting for children.
    PendingChildren,
    /// Waiting for another task's progress.
    Blocked,
    /// Interval and bookings are final.
    Scheduled,
    /// Constraints cannot be satisfied.
    Infeasible,
}

/// One booked (task, resource, slot) triple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    pub task: TaskId,
    pub resource: ResourceId,
    pub slot: Slot,
    /// Efficiency share delivered in this slot.
    pub share: f64,
    /// Whether the assignment came from a user booking.
    pub from_booking: bool,
    /// Sloppy level of the originating booking (0 for computed slots).
    pub sloppy: u8,
}

/// Per-resource assignment bookkeeping for one scenario.
#[derive(Debug, Clone, Default)]
pub struct ResourceUsage {
    /// Share already assigned per slot.
    used: FxHashMap<Slot, f64>,

    /// Total shares assigned across the scenario (for `minloaded`).
    pub total_shares: f64,

    /// Slots booked per task (for `minallocated`).
    per_task: FxHashMap<TaskId, u32>,

    /// Cap counters, keyed by the slot's wall-clock period.
    day_counts: FxHashMap<(i32, u32, u32), u32>,
    week_counts: FxHashMap<(i32, u32), u32>,
    month_counts: FxHashMap<(i32, u32), u32>,
}

impl ResourceUsage {
    /// Share already assigned at a slot.
    pub fn used_share(&self, slot: Slot) -> f64 {
        self.used.get(&slot).copied().unwrap_or(0.0)
    }

    /// Slots booked on one task so far.
    pub fn booked_on(&self, task: TaskId) -> u32 {
        self.per_task.get(&task).copied().unwrap_or(0)
    }

    /// Whether assigning one more slot at `slot` would break a cap.
    pub fn would_exceed_caps(
        &self,
        graph: &ProjectGraph,
        resource: ResourceId,
        slot: Slot,
    ) -> bool {
        let limits = &graph.resource(resource).limits;
        if limits.is_unlimited() {
            return false;
        }
        if let Some(daily) = limits.daily_max {
            let date = graph.grid.date_of(slot);
            let key = (
                chrono::Datelike::year(&date),
                chrono::Datelike::month(&date),
                chrono::Datelike::day(&date),
            );
            if self.day_counts.get(&key).copied().unwrap_or(0) >= daily {
                return true;
            }
        }
        if let Some(weekly) = limits.weekly_max {
            let key = graph.grid.iso_week_of(slot);
            if self.week_counts.get(&key).copied().unwrap_or(0) >= weekly {
                return true;
            }
        }
        if let Some(monthly) = limits.monthly_max {
            let key = graph.grid.month_of(slot);
            if self.month_counts.get(&key).copied().unwrap_or(0) >= monthly {
                return true;
            }
        }
        false
    }

    fn record(&mut self, graph: &ProjectGraph, task: TaskId, slot: Slot, share: f64, caps: bool) {
        *self.used.entry(slot).or_insert(0.0) += share;
        self.total_shares += share;
        *self.per_task.entry(task).or_insert(0) += 1;
        if caps {
            let date = graph.grid.date_of(slot);
            let day_key = (
                chrono::Datelike::year(&date),
                chrono::Datelike::month(&date),
                chrono::Datelike::day(&date),
            );
            *self.day_counts.entry(day_key).or_insert(0) += 1;
            *self.week_counts.entry(graph.grid.iso_week_of(slot)).or_insert(0) += 1;
            *self.month_counts.entry(graph.grid.month_of(slot)).or_insert(0) += 1;
        }
    }
}

/// Complete derived state for one scenario being scheduled.
#[derive(Debug, Clone)]
pub struct ScenarioState {
    pub scenario: ScenarioId,

    pub task_state: Vec<TaskState>,

    /// Anchored start instant (slot index).
    pub start: Vec<Option<Slot>>,

    /// Exclusive end bound.
    pub end: Vec<Option<Slot>>,

    /// First and last slots with actual bookings.
    pub first_booked: Vec<Option<Slot>>,
    pub last_booked: Vec<Option<Slot>>,

    /// Remaining effort in resource-slot units (effort tasks).
    pub remaining_effort: Vec<f64>,

    /// Declared effort (resolved once at construction).
    pub total_effort: Vec<f64>,

    /// Effort consumed by bookings before the status date.
    pub consumed_before_now: Vec<f64>,

    /// Next slot a forward sweep will try.
    pub cursor_forward: Vec<Slot>,

    /// Persistent allocation choices: task → allocation index → resource.
    pub persistent_choice: Vec<FxHashMap<usize, ResourceId>>,

    /// Per-resource assignment bookkeeping.
    pub usage: Vec<ResourceUsage>,

    /// All assignments, in booking order.
    pub assignments: Vec<Assignment>,

    /// Accrued amounts, minor currency units.
    pub task_cost: Vec<i64>,
    pub task_revenue: Vec<i64>,
    pub account_cost: Vec<i64>,
    pub account_revenue: Vec<i64>,

    /// Derived completion percentage.
    pub complete: Vec<Option<f64>>,

    /// For blocked tasks, the dependency last waited on.
    pub blocked_on: Vec<Option<TaskId>>,

    /// Collected constraint diagnostics (errors and warnings).
    pub diagnostics: Vec<Diagnostic>,

    /// Collected advisories.
    pub advisories: Vec<Diagnostic>,
}

impl ScenarioState {
    /// Fresh derived state for one scenario.
    pub fn new(graph: &ProjectGraph, scenario: ScenarioId) -> Self {
        let n = graph.tasks.len();
        let total_effort: Vec<f64> = graph
            .tasks
            .iter()
            .map(|t| {
                t.effort
                    .resolve(scenario, &graph.scenarios)
                    .copied()
                    .unwrap_or(0.0)
            })
            .collect();
        Self {
            scenario,
            task_state: vec![TaskState::Init; n],
            start: vec![None; n],
            end: vec![None; n],
            first_booked: vec![None; n],
            last_booked: vec![None; n],
            remaining_effort: total_effort.clone(),
            total_effort,
            consumed_before_now: vec![0.0; n],
            cursor_forward: vec![0; n],
            persistent_choice: vec![FxHashMap::default(); n],
            usage: graph.resources.iter().map(|_| ResourceUsage::default()).collect(),
            assignments: Vec::new(),
            task_cost: vec![0; n],
            task_revenue: vec![0; n],
            account_cost: vec![0; graph.accounts.len()],
            account_revenue: vec![0; graph.accounts.len()],
            complete: vec![None; n],
            blocked_on: vec![None; n],
            diagnostics: Vec::new(),
            advisories: Vec::new(),
        }
    }

    /// Records one assignment. The single writer of the assignment map.
    ///
    /// `caps` is false only for sloppy-2 vacation spillover, which does
    /// not count toward period caps.
    #[allow(clippy::too_many_arguments)]
    pub fn book(
        &mut self,
        graph: &ProjectGraph,
        task: TaskId,
        resource: ResourceId,
        slot: Slot,
        share: f64,
        from_booking: bool,
        sloppy: u8,
        caps: bool,
    ) {
        self.usage[resource.index()].record(graph, task, slot, share, caps);
        self.assignments.push(Assignment {
            task,
            resource,
            slot,
            share,
            from_booking,
            sloppy,
        });
        let t = task.index();
        self.first_booked[t] = Some(match self.first_booked[t] {
            Some(s) => s.min(slot),
            None => slot,
        });
        self.last_booked[t] = Some(match self.last_booked[t] {
            Some(s) => s.max(slot),
            None => slot,
        });
    }

    /// Whether every task reached a terminal state.
    pub fn all_settled(&self) -> bool {
        self.task_state
            .iter()
            .all(|s| matches!(s, TaskState::Scheduled | TaskState::Infeasible))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::project::ProjectBuilder;
    use crate::models::resource::ResourceLimits;
    use crate::models::task::TaskKind;
    use chrono::NaiveDate;

    fn dt(y: i32, m: u32, d: u32, h: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn graph_with_limits(limits: ResourceLimits) -> (ProjectGraph, ResourceId, TaskId) {
        let mut b = ProjectBuilder::new("test", dt(2024, 1, 1, 0), dt(2024, 2, 1, 0)).unwrap();
        let plan = b.add_scenario("plan", None);
        let r = b.add_resource("r", None);
        b.resource_mut(r).limits = limits;
        let t = b.add_task("t", None, TaskKind::Effort);
        b.task_mut(t).effort.set(plan, 8.0);
        (b.freeze().unwrap(), r, t)
    }

    #[test]
    fn test_book_updates_usage_and_extent() {
        let (graph, r, t) = graph_with_limits(ResourceLimits::default());
        let mut state = ScenarioState::new(&graph, ScenarioId(0));
        state.book(&graph, t, r, 10, 1.0, false, 0, true);
        state.book(&graph, t, r, 12, 1.0, false, 0, true);
        assert_eq!(state.usage[r.index()].used_share(10), 1.0);
        assert_eq!(state.usage[r.index()].used_share(11), 0.0);
        assert_eq!(state.usage[r.index()].booked_on(t), 2);
        assert_eq!(state.first_booked[t.index()], Some(10));
        assert_eq!(state.last_booked[t.index()], Some(12));
        assert_eq!(state.assignments.len(), 2);
    }

    #[test]
    fn test_daily_cap() {
        let (graph, r, t) = graph_with_limits(ResourceLimits {
            daily_max: Some(2),
            ..Default::default()
        });
        let mut state = ScenarioState::new(&graph, ScenarioId(0));
        // Two slots on Jan 1 fill the cap; slot on Jan 2 does not count.
        state.book(&graph, t, r, 9, 1.0, false, 0, true);
        assert!(!state.usage[r.index()].would_exceed_caps(&graph, r, 10));
        state.book(&graph, t, r, 10, 1.0, false, 0, true);
        assert!(state.usage[r.index()].would_exceed_caps(&graph, r, 11));
        assert!(!state.usage[r.index()].would_exceed_caps(&graph, r, 24 + 9));
    }

    #[test]
    fn test_caps_skipped_for_uncounted_bookings() {
        let (graph, r, t) = graph_with_limits(ResourceLimits {
            daily_max: Some(1),
            ..Default::default()
        });
        let mut state = ScenarioState::new(&graph, ScenarioId(0));
        state.book(&graph, t, r, 9, 1.0, true, 2, false);
        // The uncounted booking does not consume the daily cap.
        assert!(!state.usage[r.index()].would_exceed_caps(&graph, r, 10));
    }

    #[test]
    fn test_effort_resolution_at_construction() {
        let (graph, _r, t) = graph_with_limits(ResourceLimits::default());
        let state = ScenarioState::new(&graph, ScenarioId(0));
        assert_eq!(state.total_effort[t.index()], 8.0);
        assert_eq!(state.remaining_effort[t.index()], 8.0);
    }
}
