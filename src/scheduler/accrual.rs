//! Cost, revenue and derived completion.
//!
//! Runs once after the fixed-point loop: folds resource rates over the
//! assignment map into task and account totals, fires declared charge
//! events, and recomputes completion percentages.
//!
//! Completion rules: a task with bookings gets `consumed / total`
//! effort, where recorded bookings count as performed regardless of the
//! status date but computed slots count only once the status date passes
//! them. A user-supplied value survives only on booking-free leaves;
//! containers always derive an effort-weighted average from children.

use rustc_hash::FxHashSet;

use crate::models::ids::{AccountId, Slot, TaskId};
use crate::models::project::ProjectGraph;
use crate::models::task::{ChargeKind, ChargeTrigger, TaskKind};
use crate::scheduler::state::{ScenarioState, TaskState};

/// Folds charges and rates over the scheduled timeline.
pub fn run(graph: &ProjectGraph, state: &mut ScenarioState, now_slot: Option<Slot>) {
    accrue_resource_costs(graph, state);
    fire_charges(graph, state);
    derive_completion(graph, state, now_slot);
}

fn add_to_account(
    graph: &ProjectGraph,
    state: &mut ScenarioState,
    account: Option<AccountId>,
    kind: ChargeKind,
    amount: i64,
) {
    let mut current = account;
    while let Some(id) = current {
        match kind {
            ChargeKind::Cost => state.account_cost[id.index()] += amount,
            ChargeKind::Revenue => state.account_revenue[id.index()] += amount,
        }
        current = graph.account(id).parent;
    }
}

fn accrue_resource_costs(graph: &ProjectGraph, state: &mut ScenarioState) {
    for idx in 0..state.assignments.len() {
        let assignment = state.assignments[idx];
        let rate = graph.resource(assignment.resource).rate_per_slot;
        if rate == 0 {
            continue;
        }
        let amount = (rate as f64 * assignment.share).round() as i64;
        state.task_cost[assignment.task.index()] += amount;
        let account = graph.effective_account(assignment.task);
        add_to_account(graph, state, account, ChargeKind::Cost, amount);
    }
}

fn fire_charges(graph: &ProjectGraph, state: &mut ScenarioState) {
    for task in &graph.tasks {
        if state.task_state[task.id.index()] != TaskState::Scheduled || task.charges.is_empty() {
            continue;
        }
        for charge in &task.charges {
            let multiplier = match charge.trigger {
                ChargeTrigger::OnStart | ChargeTrigger::OnEnd => 1,
                ChargeTrigger::PerSlot => occupied_slots(state, task.id) as i64,
            };
            let amount = charge.amount * multiplier;
            if amount == 0 {
                continue;
            }
            match charge.kind {
                ChargeKind::Cost => state.task_cost[task.id.index()] += amount,
                ChargeKind::Revenue => state.task_revenue[task.id.index()] += amount,
            }
            let account = charge.account.or_else(|| graph.effective_account(task.id));
            add_to_account(graph, state, account, charge.kind, amount);
        }
    }
}

/// Slots a task occupies: distinct booked slots, or the wall-clock span
/// for tasks that book nothing.
fn occupied_slots(state: &ScenarioState, id: TaskId) -> usize {
    let distinct: FxHashSet<Slot> = state
        .assignments
        .iter()
        .filter(|a| a.task == id)
        .map(|a| a.slot)
        .collect();
    if !distinct.is_empty() {
        return distinct.len();
    }
    match (state.start[id.index()], state.end[id.index()]) {
        (Some(s), Some(e)) if e > s => e - s,
        _ => 0,
    }
}

fn derive_completion(graph: &ProjectGraph, state: &mut ScenarioState, now_slot: Option<Slot>) {
    let scen = state.scenario;
    // Computed slots count as done only once the status date passes them.
    let computed_horizon = now_slot.unwrap_or(0);

    // Leaves first; containers aggregate afterwards in reverse
    // dependency order so nested containers see their children.
    for task in &graph.tasks {
        if task.is_container() {
            continue;
        }
        let i = task.id.index();
        let has_bookings = state.assignments.iter().any(|a| a.task == task.id && a.from_booking);

        let derived = match task.kind {
            TaskKind::Effort if state.total_effort[i] > 0.0 => {
                let computed_done: f64 = state
                    .assignments
                    .iter()
                    .filter(|a| a.task == task.id && !a.from_booking && a.slot < computed_horizon)
                    .map(|a| a.share)
                    .sum();
                Some(
                    (100.0 * (state.consumed_before_now[i] + computed_done)
                        / state.total_effort[i])
                        .clamp(0.0, 100.0),
                )
            }
            TaskKind::Milestone => match (state.end[i], now_slot) {
                (Some(end), Some(now)) => Some(if end <= now { 100.0 } else { 0.0 }),
                _ => None,
            },
            _ => match (state.start[i], state.end[i], now_slot) {
                (Some(start), Some(end), Some(now)) if end > start => {
                    let done = now.clamp(start, end) - start;
                    Some(100.0 * done as f64 / (end - start) as f64)
                }
                _ => None,
            },
        };

        state.complete[i] = if has_bookings {
            derived
        } else {
            // User-supplied completion survives only without bookings.
            task.complete
                .resolve(scen, &graph.scenarios)
                .copied()
                .or(derived)
        };
    }

    // Containers: effort-weighted over children; user values ignored.
    for &id in graph.topo_order().iter().rev() {
        let task = graph.task(id);
        if !task.is_container() {
            continue;
        }
        let mut weighted = 0.0;
        let mut weight = 0.0;
        for &child in &task.children {
            if let Some(c) = state.complete[child.index()] {
                let w = state.total_effort[child.index()].max(1.0);
                weighted += c * w;
                weight += w;
            }
        }
        state.complete[id.index()] = if weight > 0.0 {
            Some(weighted / weight)
        } else {
            None
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ids::ScenarioId;
    use crate::models::project::ProjectBuilder;
    use crate::models::task::{Allocation, BookingSpec, Charge};
    use crate::scheduler::task_scheduler::schedule_task_pass;
    use chrono::NaiveDate;

    fn dt(y: i32, m: u32, d: u32, h: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_resource_cost_accrues_to_task_and_account_chain() {
        let mut b = ProjectBuilder::new("test", dt(2024, 1, 1, 0), dt(2024, 2, 1, 0)).unwrap();
        let plan = b.add_scenario("plan", None);
        let root_acc = b.add_account("project", None);
        let labor = b.add_account("labor", Some(root_acc));
        let r = b.add_resource("r", None);
        b.resource_mut(r).rate_per_slot = 5000;
        let t = b.add_task("t", None, TaskKind::Effort);
        b.task_mut(t).effort.set(plan, 8.0);
        b.task_mut(t).allocations.push(Allocation::new(vec![r]));
        b.task_mut(t).account = Some(labor);
        let graph = b.freeze().unwrap();
        let mut state = ScenarioState::new(&graph, ScenarioId(0));
        schedule_task_pass(&graph, &mut state, t, 0);
        run(&graph, &mut state, None);

        assert_eq!(state.task_cost[t.index()], 8 * 5000);
        assert_eq!(state.account_cost[labor.index()], 8 * 5000);
        assert_eq!(state.account_cost[root_acc.index()], 8 * 5000);
    }

    #[test]
    fn test_charges_fire_on_triggers() {
        let mut b = ProjectBuilder::new("test", dt(2024, 1, 1, 0), dt(2024, 2, 1, 0)).unwrap();
        let plan = b.add_scenario("plan", None);
        let acc = b.add_account("sales", None);
        let r = b.add_resource("r", None);
        let t = b.add_task("t", None, TaskKind::Effort);
        b.task_mut(t).effort.set(plan, 8.0);
        b.task_mut(t).allocations.push(Allocation::new(vec![r]));
        b.task_mut(t).charges.push(Charge {
            trigger: ChargeTrigger::OnEnd,
            kind: ChargeKind::Revenue,
            amount: 100_000,
            account: Some(acc),
        });
        b.task_mut(t).charges.push(Charge {
            trigger: ChargeTrigger::PerSlot,
            kind: ChargeKind::Cost,
            amount: 100,
            account: Some(acc),
        });
        let graph = b.freeze().unwrap();
        let mut state = ScenarioState::new(&graph, ScenarioId(0));
        schedule_task_pass(&graph, &mut state, t, 0);
        run(&graph, &mut state, None);

        assert_eq!(state.task_revenue[t.index()], 100_000);
        assert_eq!(state.task_cost[t.index()], 8 * 100);
        assert_eq!(state.account_revenue[acc.index()], 100_000);
        assert_eq!(state.account_cost[acc.index()], 800);
    }

    #[test]
    fn test_completion_from_bookings() {
        let mut b = ProjectBuilder::new("test", dt(2024, 1, 1, 0), dt(2024, 2, 1, 0)).unwrap();
        let plan = b.add_scenario("plan", None);
        let r = b.add_resource("r", None);
        let t = b.add_task("t", None, TaskKind::Effort);
        b.task_mut(t).effort.set(plan, 16.0);
        b.task_mut(t).allocations.push(Allocation::new(vec![r]));
        b.task_mut(t).bookings.set(plan, vec![BookingSpec::new(r, 9, 17)]);
        // A user value that must be ignored because bookings exist.
        b.task_mut(t).complete.set(plan, 99.0);
        let graph = b.freeze().unwrap();
        let mut state = ScenarioState::new(&graph, ScenarioId(0));
        crate::scheduler::projection::apply_bookings(&graph, &mut state, None);
        schedule_task_pass(&graph, &mut state, t, 0);
        run(&graph, &mut state, None);

        assert_eq!(state.complete[t.index()], Some(50.0));
    }

    #[test]
    fn test_user_completion_survives_without_bookings() {
        let mut b = ProjectBuilder::new("test", dt(2024, 1, 1, 0), dt(2024, 2, 1, 0)).unwrap();
        let plan = b.add_scenario("plan", None);
        let r = b.add_resource("r", None);
        let t = b.add_task("t", None, TaskKind::Effort);
        b.task_mut(t).effort.set(plan, 8.0);
        b.task_mut(t).allocations.push(Allocation::new(vec![r]));
        b.task_mut(t).complete.set(plan, 25.0);
        let graph = b.freeze().unwrap();
        let mut state = ScenarioState::new(&graph, ScenarioId(0));
        schedule_task_pass(&graph, &mut state, t, 0);
        run(&graph, &mut state, None);

        assert_eq!(state.complete[t.index()], Some(25.0));
    }
}
