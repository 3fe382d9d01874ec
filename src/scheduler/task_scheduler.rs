//! Per-task scheduling state machine.
//!
//! One pass drives a single task as far as it can go: a leaf whose
//! bounds resolve is swept slot by slot to completion (or marked
//! infeasible); a leaf waiting on a dependency is left blocked for a
//! later pass; a container settles once all children have.
//!
//! Start/end anchoring: when the earliest start derives from a
//! dependency or an explicit date, the reported start is that instant
//! even if the first booked slot is later. Otherwise the start floats to
//! the first slot actually booked. Backward tasks mirror this on the end
//! side.

use tracing::debug;

use crate::models::ids::{Slot, TaskId};
use crate::models::project::ProjectGraph;
use crate::models::task::{Direction, TaskKind};
use crate::scheduler::allocator::{allocate_slot, SlotOutcome};
use crate::scheduler::bounds::{self, BoundsStatus, TaskBounds};
use crate::scheduler::diagnostics::{Diagnostic, DiagnosticKind};
use crate::scheduler::state::{ScenarioState, TaskState, EFFORT_EPS};

/// What one pass over one task achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassResult {
    /// The task reached a terminal state this pass.
    Advanced,
    /// The task waits on another task's progress.
    Blocked,
    /// The task was already terminal.
    Settled,
}

/// Runs one pass over `id`. `floor` is the lowest slot computed work may
/// occupy (the status date in projection scenarios, otherwise zero).
pub fn schedule_task_pass(
    graph: &ProjectGraph,
    state: &mut ScenarioState,
    id: TaskId,
    floor: Slot,
) -> PassResult {
    let i = id.index();
    if matches!(
        state.task_state[i],
        TaskState::Scheduled | TaskState::Infeasible
    ) {
        return PassResult::Settled;
    }

    let task = graph.task(id);
    if task.is_container() {
        return container_pass(graph, state, id);
    }

    let bounds = match bounds::resolve(graph, state, id) {
        BoundsStatus::Ready(b) => b,
        BoundsStatus::Waiting(dep) => {
            state.task_state[i] = TaskState::Blocked;
            state.blocked_on[i] = Some(dep);
            return PassResult::Blocked;
        }
        BoundsStatus::Infeasible(diag) => {
            state.diagnostics.push(diag);
            state.task_state[i] = TaskState::Infeasible;
            return PassResult::Advanced;
        }
    };

    state.task_state[i] = TaskState::Ready;
    let direction = task.effective_direction(state.scenario, &graph.scenarios);
    state.task_state[i] = TaskState::Running;

    match task.kind {
        TaskKind::Milestone => milestone_pass(graph, state, id, &bounds, direction),
        TaskKind::Duration => duration_pass(graph, state, id, &bounds, direction),
        TaskKind::Length => length_pass(graph, state, id, &bounds, direction, floor),
        TaskKind::Effort => effort_pass(graph, state, id, &bounds, direction, floor),
    }
}

fn infeasible(
    state: &mut ScenarioState,
    id: TaskId,
    kind: DiagnosticKind,
    message: String,
) -> PassResult {
    state
        .diagnostics
        .push(Diagnostic::error(kind, state.scenario, message).with_task(id));
    state.task_state[id.index()] = TaskState::Infeasible;
    PassResult::Advanced
}

/// Applies the start/end caps and commits the final interval.
fn finalize(
    graph: &ProjectGraph,
    state: &mut ScenarioState,
    id: TaskId,
    bounds: &TaskBounds,
    start: Slot,
    end: Slot,
) -> PassResult {
    if let Some(max_start) = bounds.max_start {
        if start > max_start {
            return infeasible(
                state,
                id,
                DiagnosticKind::BoundsViolation,
                format!(
                    "{} starts at slot {start}, after maxStart {max_start}",
                    graph.task(id).path
                ),
            );
        }
    }
    if let Some(min_end) = bounds.min_end {
        if end < min_end {
            return infeasible(
                state,
                id,
                DiagnosticKind::BoundsViolation,
                format!(
                    "{} ends at slot {end}, before minEnd {min_end}",
                    graph.task(id).path
                ),
            );
        }
    }
    let i = id.index();
    state.start[i] = Some(start);
    state.end[i] = Some(end);
    state.task_state[i] = TaskState::Scheduled;
    debug!(task = %graph.task(id).path, start, end, "task scheduled");
    PassResult::Advanced
}

fn container_pass(graph: &ProjectGraph, state: &mut ScenarioState, id: TaskId) -> PassResult {
    let task = graph.task(id);
    for &child in &task.children {
        if state.task_state[child.index()] == TaskState::Infeasible {
            return infeasible(
                state,
                id,
                DiagnosticKind::DependencyUnschedulable,
                format!(
                    "container {} has infeasible child {}",
                    task.path,
                    graph.task(child).path
                ),
            );
        }
    }
    let all_scheduled = task
        .children
        .iter()
        .all(|c| state.task_state[c.index()] == TaskState::Scheduled);
    if !all_scheduled {
        state.task_state[id.index()] = TaskState::PendingChildren;
        return PassResult::Blocked;
    }

    // Union-hull of the children.
    let mut start = Slot::MAX;
    let mut end = 0;
    for &child in &task.children {
        if let (Some(s), Some(e)) = (state.start[child.index()], state.end[child.index()]) {
            start = start.min(s);
            end = end.max(e);
        }
    }
    let i = id.index();
    state.start[i] = Some(start);
    state.end[i] = Some(end);
    state.task_state[i] = TaskState::Scheduled;
    PassResult::Advanced
}

fn milestone_pass(
    graph: &ProjectGraph,
    state: &mut ScenarioState,
    id: TaskId,
    bounds: &TaskBounds,
    direction: Direction,
) -> PassResult {
    if bounds.es > bounds.lf {
        return infeasible(
            state,
            id,
            DiagnosticKind::BoundsViolation,
            format!(
                "{} has empty window: earliest start {} after latest finish {}",
                graph.task(id).path,
                bounds.es,
                bounds.lf
            ),
        );
    }
    let at = match direction {
        Direction::Forward => bounds.es,
        Direction::Backward => bounds.lf,
    };
    finalize(graph, state, id, bounds, at, at)
}

fn duration_pass(
    graph: &ProjectGraph,
    state: &mut ScenarioState,
    id: TaskId,
    bounds: &TaskBounds,
    direction: Direction,
) -> PassResult {
    let span = graph
        .task(id)
        .span_slots
        .resolve(state.scenario, &graph.scenarios)
        .copied()
        .unwrap_or(0);
    let (start, end) = match direction {
        Direction::Forward => (bounds.es, bounds.es + span),
        Direction::Backward => {
            if bounds.lf < span {
                return infeasible(
                    state,
                    id,
                    DiagnosticKind::BoundsViolation,
                    format!("{} does not fit before its latest finish", graph.task(id).path),
                );
            }
            (bounds.lf - span, bounds.lf)
        }
    };
    if end > bounds.lf || start < bounds.es || end > graph.grid.num_slots() {
        return infeasible(
            state,
            id,
            DiagnosticKind::BoundsViolation,
            format!("{} does not fit inside its window", graph.task(id).path),
        );
    }
    finalize(graph, state, id, bounds, start, end)
}

fn length_pass(
    graph: &ProjectGraph,
    state: &mut ScenarioState,
    id: TaskId,
    bounds: &TaskBounds,
    direction: Direction,
    floor: Slot,
) -> PassResult {
    let i = id.index();
    let span = graph
        .task(id)
        .span_slots
        .resolve(state.scenario, &graph.scenarios)
        .copied()
        .unwrap_or(0);
    // The allocator gates progress only when a mandatory allocation is
    // declared.
    let gated = graph
        .effective_allocations(id)
        .iter()
        .any(|a| a.mandatory);
    let num_slots = graph.grid.num_slots();

    let mut counted = 0usize;
    let mut lowest: Option<Slot> = None;
    let mut highest: Option<Slot> = None;

    match direction {
        Direction::Forward => {
            let mut s = state.cursor_forward[i].max(bounds.es).max(floor);
            while counted < span {
                if let Some(max_start) = bounds.max_start {
                    if lowest.is_none() && s > max_start {
                        return infeasible(
                            state,
                            id,
                            DiagnosticKind::BoundsViolation,
                            format!(
                                "{} cannot start by maxStart slot {max_start}",
                                graph.task(id).path
                            ),
                        );
                    }
                }
                if s >= bounds.lf || s >= num_slots {
                    return infeasible(
                        state,
                        id,
                        DiagnosticKind::BoundsViolation,
                        format!("{} ran out of window", graph.task(id).path),
                    );
                }
                if graph.task_map(id).is_working(s) {
                    let placed = !gated
                        || matches!(
                            allocate_slot(graph, state, id, s),
                            SlotOutcome::Booked(_)
                        );
                    if placed {
                        counted += 1;
                        lowest.get_or_insert(s);
                        highest = Some(s);
                    }
                }
                s += 1;
                state.cursor_forward[i] = s;
            }
        }
        Direction::Backward => {
            let mut s = bounds.lf;
            while counted < span {
                if s <= bounds.es {
                    return infeasible(
                        state,
                        id,
                        DiagnosticKind::BoundsViolation,
                        format!("{} ran out of window", graph.task(id).path),
                    );
                }
                s -= 1;
                if graph.task_map(id).is_working(s) {
                    let placed = !gated
                        || matches!(
                            allocate_slot(graph, state, id, s),
                            SlotOutcome::Booked(_)
                        );
                    if placed {
                        counted += 1;
                        highest.get_or_insert(s);
                        lowest = Some(s);
                    }
                }
            }
        }
    }

    let (start, end) = interval_for(bounds, direction, lowest, highest.map(|h| h + 1));
    finalize(graph, state, id, bounds, start, end)
}

fn effort_pass(
    graph: &ProjectGraph,
    state: &mut ScenarioState,
    id: TaskId,
    bounds: &TaskBounds,
    direction: Direction,
    floor: Slot,
) -> PassResult {
    let i = id.index();
    let num_slots = graph.grid.num_slots();
    let mandatory = graph.effective_allocations(id).iter().any(|a| a.mandatory);

    match direction {
        Direction::Forward => {
            let mut s = state.cursor_forward[i].max(bounds.es).max(floor);
            while state.remaining_effort[i] > EFFORT_EPS {
                // The start is still open until the first booking; once
                // it cannot satisfy maxStart, stop before booking.
                if let Some(max_start) = bounds.max_start {
                    if state.first_booked[i].is_none() && s > max_start {
                        return infeasible(
                            state,
                            id,
                            DiagnosticKind::BoundsViolation,
                            format!(
                                "{} cannot start by maxStart slot {max_start}",
                                graph.task(id).path
                            ),
                        );
                    }
                }
                if s >= bounds.lf || s >= num_slots {
                    let kind = if mandatory {
                        DiagnosticKind::MandatoryUnsatisfiable
                    } else {
                        DiagnosticKind::BoundsViolation
                    };
                    return infeasible(
                        state,
                        id,
                        kind,
                        format!(
                            "{} has {:.2} effort left at the end of its window",
                            graph.task(id).path,
                            state.remaining_effort[i]
                        ),
                    );
                }
                if graph.task_map(id).is_working(s) {
                    if let SlotOutcome::Booked(booked) = allocate_slot(graph, state, id, s) {
                        let work: f64 = booked.iter().map(|b| b.share).sum();
                        state.remaining_effort[i] -= work;
                    }
                }
                s += 1;
                state.cursor_forward[i] = s;
            }
        }
        Direction::Backward => {
            let mut s = bounds.lf;
            while state.remaining_effort[i] > EFFORT_EPS {
                if s <= bounds.es {
                    let kind = if mandatory {
                        DiagnosticKind::MandatoryUnsatisfiable
                    } else {
                        DiagnosticKind::BoundsViolation
                    };
                    return infeasible(
                        state,
                        id,
                        kind,
                        format!(
                            "{} has {:.2} effort left at the start of its window",
                            graph.task(id).path,
                            state.remaining_effort[i]
                        ),
                    );
                }
                s -= 1;
                if graph.task_map(id).is_working(s) {
                    if let SlotOutcome::Booked(booked) = allocate_slot(graph, state, id, s) {
                        let work: f64 = booked.iter().map(|b| b.share).sum();
                        state.remaining_effort[i] -= work;
                    }
                }
            }
        }
    }

    let (start, end) = interval_for(
        bounds,
        direction,
        state.first_booked[i],
        state.last_booked[i].map(|l| l + 1),
    );
    finalize(graph, state, id, bounds, start, end)
}

/// Reported interval under the anchoring rules.
fn interval_for(
    bounds: &TaskBounds,
    direction: Direction,
    lowest: Option<Slot>,
    past_highest: Option<Slot>,
) -> (Slot, Slot) {
    match direction {
        Direction::Forward => {
            let start = if bounds.start_anchored {
                bounds.es
            } else {
                lowest.unwrap_or(bounds.es)
            };
            let end = past_highest.unwrap_or(start);
            (start, end)
        }
        Direction::Backward => {
            let end = if bounds.end_anchored {
                bounds.lf
            } else {
                past_highest.unwrap_or(bounds.lf)
            };
            let start = lowest.unwrap_or(end);
            (start, end)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ids::ScenarioId;
    use crate::models::project::ProjectBuilder;
    use crate::models::task::{Allocation, Dependency};
    use chrono::NaiveDate;

    fn dt(y: i32, m: u32, d: u32, h: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn builder() -> ProjectBuilder {
        ProjectBuilder::new("test", dt(2024, 1, 1, 0), dt(2024, 2, 1, 0)).unwrap()
    }

    #[test]
    fn test_milestone_places_at_earliest_start() {
        let mut b = builder();
        let plan = b.add_scenario("plan", None);
        let m = b.add_task("m", None, TaskKind::Milestone);
        b.task_mut(m).min_start.set(plan, 40);
        let graph = b.freeze().unwrap();
        let mut state = ScenarioState::new(&graph, ScenarioId(0));
        assert_eq!(
            schedule_task_pass(&graph, &mut state, m, 0),
            PassResult::Advanced
        );
        assert_eq!(state.start[m.index()], Some(40));
        assert_eq!(state.end[m.index()], Some(40));
        assert!(state.assignments.is_empty());
    }

    #[test]
    fn test_milestone_empty_window_is_infeasible() {
        let mut b = builder();
        let plan = b.add_scenario("plan", None);
        let m = b.add_task("m", None, TaskKind::Milestone);
        b.task_mut(m).min_start.set(plan, 100);
        b.task_mut(m).max_end.set(plan, 50);
        let graph = b.freeze().unwrap();
        let mut state = ScenarioState::new(&graph, ScenarioId(0));
        schedule_task_pass(&graph, &mut state, m, 0);
        assert_eq!(state.task_state[m.index()], TaskState::Infeasible);
        assert_eq!(state.diagnostics.len(), 1);
        assert_eq!(state.diagnostics[0].kind, DiagnosticKind::BoundsViolation);
    }

    #[test]
    fn test_duration_ignores_calendar() {
        let mut b = builder();
        let plan = b.add_scenario("plan", None);
        let t = b.add_task("t", None, TaskKind::Duration);
        b.task_mut(t).span_slots.set(plan, 48);
        let graph = b.freeze().unwrap();
        let mut state = ScenarioState::new(&graph, ScenarioId(0));
        schedule_task_pass(&graph, &mut state, t, 0);
        // Two wall-clock days from the window start, weekend or not.
        assert_eq!(state.start[t.index()], Some(0));
        assert_eq!(state.end[t.index()], Some(48));
    }

    #[test]
    fn test_length_counts_working_slots_only() {
        let mut b = builder();
        let plan = b.add_scenario("plan", None);
        let t = b.add_task("t", None, TaskKind::Length);
        b.task_mut(t).span_slots.set(plan, 10);
        let graph = b.freeze().unwrap();
        let mut state = ScenarioState::new(&graph, ScenarioId(0));
        schedule_task_pass(&graph, &mut state, t, 0);
        // 8 slots Monday + 2 slots Tuesday; floating start.
        assert_eq!(state.start[t.index()], Some(9));
        assert_eq!(state.end[t.index()], Some(24 + 11));
    }

    #[test]
    fn test_effort_books_and_floats_start() {
        let mut b = builder();
        let plan = b.add_scenario("plan", None);
        let r = b.add_resource("r", None);
        let t = b.add_task("t", None, TaskKind::Effort);
        b.task_mut(t).effort.set(plan, 16.0);
        b.task_mut(t).allocations.push(Allocation::new(vec![r]));
        let graph = b.freeze().unwrap();
        let mut state = ScenarioState::new(&graph, ScenarioId(0));
        schedule_task_pass(&graph, &mut state, t, 0);
        assert_eq!(state.task_state[t.index()], TaskState::Scheduled);
        assert_eq!(state.start[t.index()], Some(9));
        assert_eq!(state.end[t.index()], Some(24 + 17));
        assert_eq!(state.assignments.len(), 16);
        assert!(state.remaining_effort[t.index()].abs() < 1e-9);
    }

    #[test]
    fn test_dependency_blocks_until_predecessor_done() {
        let mut b = builder();
        let plan = b.add_scenario("plan", None);
        let r = b.add_resource("r", None);
        let a = b.add_task("a", None, TaskKind::Effort);
        let t = b.add_task("t", None, TaskKind::Effort);
        b.task_mut(a).effort.set(plan, 8.0);
        b.task_mut(t).effort.set(plan, 8.0);
        b.task_mut(a).allocations.push(Allocation::new(vec![r]));
        b.task_mut(t).allocations.push(Allocation::new(vec![r]));
        b.depends(t, Dependency::new(a));
        let graph = b.freeze().unwrap();
        let mut state = ScenarioState::new(&graph, ScenarioId(0));

        assert_eq!(
            schedule_task_pass(&graph, &mut state, t, 0),
            PassResult::Blocked
        );
        assert_eq!(state.blocked_on[t.index()], Some(a));

        schedule_task_pass(&graph, &mut state, a, 0);
        assert_eq!(
            schedule_task_pass(&graph, &mut state, t, 0),
            PassResult::Advanced
        );
        // Anchored start: a's end.
        assert_eq!(state.start[t.index()], state.end[a.index()]);
    }

    #[test]
    fn test_backward_effort_ends_at_max_end() {
        let mut b = builder();
        let plan = b.add_scenario("plan", None);
        let r = b.add_resource("r", None);
        let t = b.add_task("t", None, TaskKind::Effort);
        b.task_mut(t).effort.set(plan, 8.0);
        b.task_mut(t).direction.set(plan, Direction::Backward);
        // Friday 2024-01-05 17:00.
        let max_end = b.grid().slot_of(dt(2024, 1, 5, 17)).unwrap();
        b.task_mut(t).max_end.set(plan, max_end);
        b.task_mut(t).allocations.push(Allocation::new(vec![r]));
        let graph = b.freeze().unwrap();
        let mut state = ScenarioState::new(&graph, ScenarioId(0));
        schedule_task_pass(&graph, &mut state, t, 0);
        assert_eq!(state.task_state[t.index()], TaskState::Scheduled);
        // End pinned exactly to maxEnd; work fills the Friday.
        assert_eq!(state.end[t.index()], Some(max_end));
        assert_eq!(
            state.start[t.index()],
            Some(graph.grid.slot_of(dt(2024, 1, 5, 9)).unwrap())
        );
    }

    #[test]
    fn test_container_hull() {
        let mut b = builder();
        let plan = b.add_scenario("plan", None);
        let r = b.add_resource("r", None);
        let p = b.add_task("p", None, TaskKind::Effort);
        let a = b.add_task("a", Some(p), TaskKind::Effort);
        let c = b.add_task("c", Some(p), TaskKind::Effort);
        for (task, effort) in [(a, 16.0), (c, 8.0)] {
            b.task_mut(task).effort.set(plan, effort);
            b.task_mut(task).allocations.push(Allocation::new(vec![r]));
        }
        b.depends(c, Dependency::new(a));
        let graph = b.freeze().unwrap();
        let mut state = ScenarioState::new(&graph, ScenarioId(0));

        assert_eq!(
            schedule_task_pass(&graph, &mut state, p, 0),
            PassResult::Blocked
        );
        assert_eq!(state.task_state[p.index()], TaskState::PendingChildren);
        schedule_task_pass(&graph, &mut state, a, 0);
        schedule_task_pass(&graph, &mut state, c, 0);
        schedule_task_pass(&graph, &mut state, p, 0);

        assert_eq!(state.start[p.index()], state.start[a.index()]);
        assert_eq!(state.end[p.index()], state.end[c.index()]);
    }

    #[test]
    fn test_fixed_start_beyond_max_start_is_infeasible() {
        let mut b = builder();
        let plan = b.add_scenario("plan", None);
        let t = b.add_task("t", None, TaskKind::Effort);
        let start = b.clamp_slot(dt(2024, 2, 1, 0));
        let max_start = b.grid().slot_of(dt(2024, 1, 15, 0)).unwrap();
        b.task_mut(t).start.set(plan, start);
        b.task_mut(t).max_start.set(plan, max_start);
        b.task_mut(t).effort.set(plan, 8.0);
        let graph = b.freeze().unwrap();
        let mut state = ScenarioState::new(&graph, ScenarioId(0));
        schedule_task_pass(&graph, &mut state, t, 0);
        assert_eq!(state.task_state[t.index()], TaskState::Infeasible);
        assert_eq!(state.diagnostics.len(), 1);
        assert!(state.assignments.is_empty());
    }
}
