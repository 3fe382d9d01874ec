//! Post-schedule invariant checks and advisories.
//!
//! Runs after accrual. Violations here indicate either inconsistent
//! input that slipped through, or a scheduler bug; both surface as
//! diagnostics rather than panics so the rest of the result stays
//! usable.

use rustc_hash::FxHashMap;

use crate::models::ids::Slot;
use crate::models::project::ProjectGraph;
use crate::models::task::TaskKind;
use crate::scheduler::diagnostics::{Diagnostic, DiagnosticKind, Severity};
use crate::scheduler::state::{ScenarioState, TaskState, EFFORT_EPS};

/// Runs all structural post-checks on a settled scenario.
pub fn run(graph: &ProjectGraph, state: &mut ScenarioState) {
    check_container_hulls(graph, state);
    check_oversubscription(graph, state);
    check_effort_balance(graph, state);
    advise_resource_usage(graph, state);
}

fn check_container_hulls(graph: &ProjectGraph, state: &mut ScenarioState) {
    for task in &graph.tasks {
        if !task.is_container() || state.task_state[task.id.index()] != TaskState::Scheduled {
            continue;
        }
        let mut hull_start = Slot::MAX;
        let mut hull_end = 0;
        let mut any = false;
        for &child in &task.children {
            if let (Some(s), Some(e)) = (state.start[child.index()], state.end[child.index()]) {
                hull_start = hull_start.min(s);
                hull_end = hull_end.max(e);
                any = true;
            }
        }
        if !any {
            continue;
        }
        if state.start[task.id.index()] != Some(hull_start)
            || state.end[task.id.index()] != Some(hull_end)
        {
            state.diagnostics.push(
                Diagnostic::error(
                    DiagnosticKind::ContainerHullViolation,
                    state.scenario,
                    format!(
                        "container {} interval differs from the hull of its children",
                        task.path
                    ),
                )
                .with_task(task.id),
            );
        }
    }
}

fn check_oversubscription(graph: &ProjectGraph, state: &mut ScenarioState) {
    // Rebuild per-slot sums from the assignment list; the usage maps are
    // cross-checked by construction, the list is the source of truth.
    let mut sums: FxHashMap<(u32, Slot), f64> = FxHashMap::default();
    for a in &state.assignments {
        *sums.entry((a.resource.0, a.slot)).or_insert(0.0) += a.share;
    }
    let mut reported = Vec::new();
    for (&(rid, slot), &sum) in &sums {
        let resource = crate::models::ids::ResourceId(rid);
        let capacity = graph.effective_efficiency(resource, slot);
        if sum > capacity + EFFORT_EPS {
            reported.push((resource, slot, sum, capacity));
        }
    }
    // Deterministic report order.
    reported.sort_by_key(|&(r, s, _, _)| (r, s));
    for (resource, slot, sum, capacity) in reported {
        state.diagnostics.push(
            Diagnostic::error(
                DiagnosticKind::ResourceOverbooked,
                state.scenario,
                format!(
                    "resource {} carries {sum:.2} shares at slot {slot}, capacity {capacity:.2}",
                    graph.resource(resource).path
                ),
            )
            .with_resource(resource)
            .with_slot(slot),
        );
    }
}

fn check_effort_balance(graph: &ProjectGraph, state: &mut ScenarioState) {
    for task in &graph.tasks {
        let i = task.id.index();
        if task.kind != TaskKind::Effort
            || state.task_state[i] != TaskState::Scheduled
            || state.total_effort[i] <= 0.0
        {
            continue;
        }
        let declared_done = task
            .declared_scheduled
            .resolve(state.scenario, &graph.scenarios)
            .copied()
            .unwrap_or(false);
        if declared_done {
            continue;
        }
        // Tolerance: one slot at the strongest share this task received.
        let max_share = state
            .assignments
            .iter()
            .filter(|a| a.task == task.id)
            .map(|a| a.share)
            .fold(1.0_f64, f64::max);
        let remaining = state.remaining_effort[i];
        if remaining > EFFORT_EPS || remaining < -(max_share + EFFORT_EPS) {
            state.diagnostics.push(
                Diagnostic::new(
                    Severity::Warning,
                    DiagnosticKind::EffortMismatch,
                    state.scenario,
                    format!(
                        "{} booked work differs from declared effort by {remaining:.2} resource-slots",
                        task.path
                    ),
                )
                .with_task(task.id),
            );
        }
    }
}

fn advise_resource_usage(graph: &ProjectGraph, state: &mut ScenarioState) {
    let mut assigned: FxHashMap<u32, usize> = FxHashMap::default();
    for a in &state.assignments {
        *assigned.entry(a.resource.0).or_insert(0) += 1;
    }
    for resource in &graph.resources {
        if resource.is_group() {
            continue;
        }
        let count = assigned.get(&resource.id.0).copied().unwrap_or(0);
        if count == 0 {
            state.advisories.push(
                Diagnostic::advisory(
                    DiagnosticKind::UnusedResource,
                    state.scenario,
                    format!("resource {} received no assignments", resource.path),
                )
                .with_resource(resource.id),
            );
            continue;
        }
        let working = graph
            .resource_map(resource.id)
            .count_range(0, graph.grid.num_slots());
        if working > 0 && (count as f64) < working as f64 * 0.1 {
            state.advisories.push(
                Diagnostic::advisory(
                    DiagnosticKind::UnderUtilisedResource,
                    state.scenario,
                    format!(
                        "resource {} is assigned {count} of {working} working slots",
                        resource.path
                    ),
                )
                .with_resource(resource.id),
            );
        }
    }
}
