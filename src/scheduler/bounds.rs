//! Dependency and constraint resolution.
//!
//! Translates declared links and window attributes into per-task bounds:
//! the earliest permissible start `es` and the latest permissible finish
//! `lf` (exclusive). Dependency anchors resolve against the current
//! scenario state, so a task whose predecessor has not finished yet
//! reports `Waiting` and is retried by the driver on a later pass.
//!
//! `es > lf` is not an error here; the task scheduler turns an empty
//! window into an `Infeasible` mark, as do violations of `max_start` /
//! `min_end` after placement.

use crate::models::ids::{Slot, TaskId};
use crate::models::project::ProjectGraph;
use crate::models::task::{DependencyAnchor, Direction};
use crate::scheduler::diagnostics::{Diagnostic, DiagnosticKind};
use crate::scheduler::state::{ScenarioState, TaskState};

/// Resolved scheduling window for one task.
#[derive(Debug, Clone, Copy)]
pub struct TaskBounds {
    /// Earliest permissible start instant.
    pub es: Slot,
    /// Latest permissible finish (exclusive bound).
    pub lf: Slot,
    /// The start may not exceed this instant.
    pub max_start: Option<Slot>,
    /// The end may not fall short of this bound.
    pub min_end: Option<Slot>,
    /// Whether `es` derives from a dependency or an explicit date, which
    /// pins the reported start to `es`.
    pub start_anchored: bool,
    /// Mirror for backward tasks: `lf` derives from a successor or an
    /// explicit date and pins the reported end.
    pub end_anchored: bool,
}

/// Outcome of a bounds resolution attempt.
#[derive(Debug)]
pub enum BoundsStatus {
    Ready(TaskBounds),
    /// A dependency anchor is not available yet.
    Waiting(TaskId),
    /// A dependency can never be satisfied.
    Infeasible(Diagnostic),
}

/// Resolves the scheduling window of a leaf task under the current state.
pub fn resolve(graph: &ProjectGraph, state: &ScenarioState, id: TaskId) -> BoundsStatus {
    let scen = state.scenario;
    let scenarios = &graph.scenarios;
    let task = graph.task(id);
    let direction = task.effective_direction(scen, scenarios);
    let num_slots = graph.grid.num_slots();

    let mut es: Slot = 0;
    let mut lf: Slot = num_slots;
    let mut start_anchored = false;
    let mut end_anchored = false;

    // Explicit window attributes, own and inherited from containers.
    let mut chain = Some(id);
    while let Some(tid) = chain {
        let node = graph.task(tid);
        if let Some(&v) = node.start.resolve(scen, scenarios) {
            es = es.max(v);
            start_anchored = true;
        }
        if let Some(&v) = node.min_start.resolve(scen, scenarios) {
            es = es.max(v);
            start_anchored = true;
        }
        if let Some(&v) = node.end.resolve(scen, scenarios) {
            lf = lf.min(v);
            end_anchored = true;
        }
        if let Some(&v) = node.max_end.resolve(scen, scenarios) {
            lf = lf.min(v);
            end_anchored = true;
        }
        chain = node.parent;
    }

    let max_start = task.max_start.resolve(scen, scenarios).copied();
    let min_end = task.min_end.resolve(scen, scenarios).copied();

    // Predecessor anchors push `es` up.
    for dep in &task.predecessors {
        let pred = dep.other;
        if state.task_state[pred.index()] == TaskState::Infeasible {
            return BoundsStatus::Infeasible(
                Diagnostic::error(
                    DiagnosticKind::DependencyUnschedulable,
                    scen,
                    format!(
                        "{} depends on infeasible task {}",
                        task.path,
                        graph.task(pred).path
                    ),
                )
                .with_task(id),
            );
        }
        let anchor = match dep.anchor {
            DependencyAnchor::OnEnd => state.end[pred.index()],
            DependencyAnchor::OnStart => state.start[pred.index()],
        };
        let Some(anchor) = anchor else {
            return BoundsStatus::Waiting(pred);
        };
        let mut bound = anchor + dep.gap_duration;
        if dep.gap_length > 0 {
            bound = graph
                .task_map(id)
                .advance_working(bound, dep.gap_length)
                .unwrap_or(num_slots);
        }
        es = es.max(bound);
        start_anchored = true;
    }

    // Successor anchors pull `lf` down. A forward task does not wait for
    // its successors; a backward task cannot place itself until they are
    // fixed.
    for dep in &task.successors {
        let succ = dep.other;
        if state.task_state[succ.index()] == TaskState::Infeasible {
            if direction == Direction::Backward {
                return BoundsStatus::Infeasible(
                    Diagnostic::error(
                        DiagnosticKind::DependencyUnschedulable,
                        scen,
                        format!(
                            "{} precedes infeasible task {}",
                            task.path,
                            graph.task(succ).path
                        ),
                    )
                    .with_task(id),
                );
            }
            continue;
        }
        // A successor that has not settled yet may still expose an
        // explicit start: that is a sound stand-in anchor, because
        // dependencies can only push its real start later.
        let succ_start = state.start[succ.index()].or_else(|| {
            graph
                .task(succ)
                .start
                .resolve(scen, scenarios)
                .copied()
        });
        let Some(succ_start) = succ_start else {
            if direction == Direction::Backward {
                return BoundsStatus::Waiting(succ);
            }
            continue;
        };
        match dep.anchor {
            DependencyAnchor::OnEnd => {
                let mut bound = succ_start.saturating_sub(dep.gap_duration);
                if dep.gap_length > 0 {
                    bound = graph
                        .task_map(id)
                        .retreat_working(bound, dep.gap_length)
                        .unwrap_or(0);
                }
                lf = lf.min(bound);
                end_anchored = true;
            }
            DependencyAnchor::OnStart => {
                // Constrains this task's start, not its end.
                let bound = succ_start.saturating_sub(dep.gap_duration);
                if es > bound {
                    return BoundsStatus::Infeasible(
                        Diagnostic::error(
                            DiagnosticKind::BoundsViolation,
                            scen,
                            format!(
                                "{} must start by slot {bound} to precede {}",
                                task.path,
                                graph.task(succ).path
                            ),
                        )
                        .with_task(id),
                    );
                }
            }
        }
    }

    BoundsStatus::Ready(TaskBounds {
        es,
        lf,
        max_start,
        min_end,
        start_anchored,
        end_anchored,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ids::ScenarioId;
    use crate::models::project::ProjectBuilder;
    use crate::models::task::{Dependency, TaskKind};
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
    fn test_unconstrained_task_gets_full_window() {
        let mut b = builder();
        b.add_scenario("plan", None);
        let t = b.add_task("t", None, TaskKind::Effort);
        let graph = b.freeze().unwrap();
        let state = ScenarioState::new(&graph, ScenarioId(0));
        match resolve(&graph, &state, t) {
            BoundsStatus::Ready(bounds) => {
                assert_eq!(bounds.es, 0);
                assert_eq!(bounds.lf, graph.grid.num_slots());
                assert!(!bounds.start_anchored);
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[test]
    fn test_waits_for_unscheduled_predecessor() {
        let mut b = builder();
        b.add_scenario("plan", None);
        let a = b.add_task("a", None, TaskKind::Effort);
        let t = b.add_task("t", None, TaskKind::Effort);
        b.depends(t, Dependency::new(a));
        let graph = b.freeze().unwrap();
        let state = ScenarioState::new(&graph, ScenarioId(0));
        assert!(matches!(
            resolve(&graph, &state, t),
            BoundsStatus::Waiting(dep) if dep == a
        ));
    }

    #[test]
    fn test_dependency_gap_pushes_earliest_start() {
        let mut b = builder();
        b.add_scenario("plan", None);
        let a = b.add_task("a", None, TaskKind::Effort);
        let t = b.add_task("t", None, TaskKind::Effort);
        b.depends(t, Dependency::new(a).with_gap_duration(48));
        let graph = b.freeze().unwrap();
        let mut state = ScenarioState::new(&graph, ScenarioId(0));
        state.end[a.index()] = Some(17);
        state.task_state[a.index()] = TaskState::Scheduled;
        match resolve(&graph, &state, t) {
            BoundsStatus::Ready(bounds) => {
                assert_eq!(bounds.es, 65);
                assert!(bounds.start_anchored);
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[test]
    fn test_gap_length_counts_working_slots() {
        let mut b = builder();
        b.add_scenario("plan", None);
        let a = b.add_task("a", None, TaskKind::Effort);
        let t = b.add_task("t", None, TaskKind::Effort);
        b.depends(t, Dependency::new(a).with_gap_length(8));
        let graph = b.freeze().unwrap();
        let mut state = ScenarioState::new(&graph, ScenarioId(0));
        // a ends Monday 17:00; 8 working slots of gap cover Tuesday.
        state.end[a.index()] = Some(17);
        state.task_state[a.index()] = TaskState::Scheduled;
        match resolve(&graph, &state, t) {
            BoundsStatus::Ready(bounds) => assert_eq!(bounds.es, 24 + 17),
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[test]
    fn test_infeasible_predecessor_propagates() {
        let mut b = builder();
        b.add_scenario("plan", None);
        let a = b.add_task("a", None, TaskKind::Effort);
        let t = b.add_task("t", None, TaskKind::Effort);
        b.depends(t, Dependency::new(a));
        let graph = b.freeze().unwrap();
        let mut state = ScenarioState::new(&graph, ScenarioId(0));
        state.task_state[a.index()] = TaskState::Infeasible;
        assert!(matches!(
            resolve(&graph, &state, t),
            BoundsStatus::Infeasible(_)
        ));
    }

    #[test]
    fn test_container_window_bounds_children() {
        let mut b = builder();
        let plan = b.add_scenario("plan", None);
        let p = b.add_task("p", None, TaskKind::Effort);
        let c = b.add_task("c", Some(p), TaskKind::Effort);
        b.task_mut(p).min_start.set(plan, 100);
        let graph = b.freeze().unwrap();
        let state = ScenarioState::new(&graph, ScenarioId(0));
        match resolve(&graph, &state, c) {
            BoundsStatus::Ready(bounds) => {
                assert_eq!(bounds.es, 100);
                assert!(bounds.start_anchored);
            }
            other => panic!("expected ready, got {other:?}"),
        }
    }
}
