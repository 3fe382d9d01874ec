//! Resource allocator.
//!
//! Given a task, a slot and the task's allocation list, picks one leaf
//! resource per allocation under eligibility rules (working time,
//! vacation, saturation, period caps) and the declared selection policy.
//!
//! Selections for a slot are tentative until every mandatory allocation
//! has a candidate; a mandatory failure books nothing, and the task
//! scheduler moves on to the next slot.

use tracing::trace;

use crate::models::ids::{ResourceId, Slot, TaskId};
use crate::models::project::ProjectGraph;
use crate::models::task::{Allocation, AllocationPolicy};
use crate::rng::SlotRng;
use crate::scheduler::state::{ScenarioState, EFFORT_EPS};

/// One committed pick.
#[derive(Debug, Clone, Copy)]
pub struct SlotBooking {
    pub resource: ResourceId,
    pub share: f64,
}

/// Result of an allocation attempt at one slot.
#[derive(Debug)]
pub enum SlotOutcome {
    /// All mandatory allocations satisfied; the listed bookings were
    /// committed (possibly none if the task declares no allocations).
    Booked(Vec<SlotBooking>),
    /// A mandatory allocation had no eligible candidate; nothing was
    /// committed.
    MandatoryFailed,
}

/// Runs the allocation list of `task` against one slot.
pub fn allocate_slot(
    graph: &ProjectGraph,
    state: &mut ScenarioState,
    task: TaskId,
    slot: Slot,
) -> SlotOutcome {
    let allocations = graph.effective_allocations(task);
    let mut tentative: Vec<(usize, ResourceId, f64)> = Vec::with_capacity(allocations.len());

    for (idx, alloc) in allocations.iter().enumerate() {
        let mut leaves = Vec::new();
        for &candidate in &alloc.candidates {
            graph.expand_leaves(candidate, &mut leaves);
        }

        let eligible: Vec<ResourceId> = leaves
            .into_iter()
            .filter(|&r| {
                graph.resource_map(r).is_working(slot)
                    && !graph.resource(r).on_vacation(slot)
                    && state.usage[r.index()].used_share(slot) <= EFFORT_EPS
                    && !tentative.iter().any(|&(_, picked, _)| picked == r)
                    && !state.usage[r.index()].would_exceed_caps(graph, r, slot)
            })
            .collect();

        if eligible.is_empty() {
            if alloc.mandatory {
                trace!(task = task.0, slot, alloc = idx, "mandatory allocation failed");
                return SlotOutcome::MandatoryFailed;
            }
            continue;
        }

        // A persistent allocation sticks to its earlier pick while that
        // pick stays eligible; otherwise it falls through to the policy.
        let prior = if alloc.persistent {
            state.persistent_choice[task.index()]
                .get(&idx)
                .copied()
                .filter(|prev| eligible.contains(prev))
        } else {
            None
        };

        let chosen = match prior {
            Some(resource) => resource,
            None => pick_by_policy(graph, state, task, slot, idx, alloc, &eligible),
        };
        tentative.push((idx, chosen, graph.effective_efficiency(chosen, slot)));
    }

    let mut booked = Vec::with_capacity(tentative.len());
    for (idx, resource, share) in tentative {
        state.book(graph, task, resource, slot, share, false, 0, true);
        if allocations[idx].persistent {
            state.persistent_choice[task.index()].insert(idx, resource);
        }
        booked.push(SlotBooking { resource, share });
    }
    SlotOutcome::Booked(booked)
}

/// Applies the selection policy; ties break by declaration order.
fn pick_by_policy(
    graph: &ProjectGraph,
    state: &ScenarioState,
    task: TaskId,
    slot: Slot,
    alloc_idx: usize,
    alloc: &Allocation,
    eligible: &[ResourceId],
) -> ResourceId {
    match alloc.policy {
        AllocationPolicy::Order => eligible[0],
        AllocationPolicy::MinLoaded => {
            let mut best = eligible[0];
            for &r in &eligible[1..] {
                if state.usage[r.index()].total_shares
                    < state.usage[best.index()].total_shares - EFFORT_EPS
                {
                    best = r;
                }
            }
            best
        }
        AllocationPolicy::MaxLoaded => {
            let mut best = eligible[0];
            for &r in &eligible[1..] {
                if state.usage[r.index()].total_shares
                    > state.usage[best.index()].total_shares + EFFORT_EPS
                {
                    best = r;
                }
            }
            best
        }
        AllocationPolicy::MinAllocated => {
            let mut best = eligible[0];
            for &r in &eligible[1..] {
                if state.usage[r.index()].booked_on(task) < state.usage[best.index()].booked_on(task)
                {
                    best = r;
                }
            }
            best
        }
        AllocationPolicy::Random => {
            let mut rng = SlotRng::keyed(graph.config.seed, task, slot);
            // Skip one draw per preceding allocation so sibling
            // allocations at the same slot decorrelate.
            let mut pick = rng.pick(eligible.len());
            for _ in 0..alloc_idx {
                pick = rng.pick(eligible.len());
            }
            eligible[pick]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ids::ScenarioId;
    use crate::models::project::{ProjectBuilder, ProjectGraph};
    use crate::models::task::TaskKind;
    use chrono::NaiveDate;

    fn dt(y: i32, m: u32, d: u32, h: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    struct Fixture {
        graph: ProjectGraph,
        task: TaskId,
        r1: ResourceId,
        r2: ResourceId,
    }

    fn fixture(policy: AllocationPolicy, mandatory: bool) -> Fixture {
        let mut b = ProjectBuilder::new("test", dt(2024, 1, 1, 0), dt(2024, 2, 1, 0)).unwrap();
        let plan = b.add_scenario("plan", None);
        let r1 = b.add_resource("r1", None);
        let r2 = b.add_resource("r2", None);
        let task = b.add_task("t", None, TaskKind::Effort);
        b.task_mut(task).effort.set(plan, 8.0);
        let mut alloc = Allocation::new(vec![r1, r2]).with_policy(policy);
        if mandatory {
            alloc = alloc.mandatory();
        }
        b.task_mut(task).allocations.push(alloc);
        Fixture {
            graph: b.freeze().unwrap(),
            task,
            r1,
            r2,
        }
    }

    fn booked_resource(outcome: &SlotOutcome) -> ResourceId {
        match outcome {
            SlotOutcome::Booked(b) if b.len() == 1 => b[0].resource,
            other => panic!("expected one booking, got {other:?}"),
        }
    }

    #[test]
    fn test_order_policy_prefers_declaration_order() {
        let f = fixture(AllocationPolicy::Order, false);
        let mut state = ScenarioState::new(&f.graph, ScenarioId(0));
        let outcome = allocate_slot(&f.graph, &mut state, f.task, 9);
        assert_eq!(booked_resource(&outcome), f.r1);
    }

    #[test]
    fn test_saturated_resource_is_skipped() {
        let f = fixture(AllocationPolicy::Order, false);
        let mut state = ScenarioState::new(&f.graph, ScenarioId(0));
        // Occupy r1 at the slot with another task's booking.
        state.book(&f.graph, TaskId(0), f.r1, 9, 1.0, true, 0, true);
        let outcome = allocate_slot(&f.graph, &mut state, f.task, 9);
        assert_eq!(booked_resource(&outcome), f.r2);
    }

    #[test]
    fn test_non_working_slot_fails_mandatory() {
        let f = fixture(AllocationPolicy::Order, true);
        let mut state = ScenarioState::new(&f.graph, ScenarioId(0));
        // Slot 0 is midnight: nobody works.
        assert!(matches!(
            allocate_slot(&f.graph, &mut state, f.task, 0),
            SlotOutcome::MandatoryFailed
        ));
        assert!(state.assignments.is_empty());
    }

    #[test]
    fn test_min_loaded_balances() {
        let f = fixture(AllocationPolicy::MinLoaded, false);
        let mut state = ScenarioState::new(&f.graph, ScenarioId(0));
        state.book(&f.graph, TaskId(9), f.r1, 10, 1.0, true, 0, true);
        let outcome = allocate_slot(&f.graph, &mut state, f.task, 9);
        assert_eq!(booked_resource(&outcome), f.r2);
    }

    #[test]
    fn test_max_loaded_concentrates() {
        let f = fixture(AllocationPolicy::MaxLoaded, false);
        let mut state = ScenarioState::new(&f.graph, ScenarioId(0));
        state.book(&f.graph, TaskId(9), f.r2, 10, 1.0, true, 0, true);
        let outcome = allocate_slot(&f.graph, &mut state, f.task, 9);
        assert_eq!(booked_resource(&outcome), f.r2);
    }

    #[test]
    fn test_random_policy_is_reproducible() {
        let f1 = fixture(AllocationPolicy::Random, false);
        let f2 = fixture(AllocationPolicy::Random, false);
        let mut s1 = ScenarioState::new(&f1.graph, ScenarioId(0));
        let mut s2 = ScenarioState::new(&f2.graph, ScenarioId(0));
        let a = booked_resource(&allocate_slot(&f1.graph, &mut s1, f1.task, 9));
        let b = booked_resource(&allocate_slot(&f2.graph, &mut s2, f2.task, 9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_persistent_allocation_reuses_choice() {
        let mut b = ProjectBuilder::new("test", dt(2024, 1, 1, 0), dt(2024, 2, 1, 0)).unwrap();
        let plan = b.add_scenario("plan", None);
        let r1 = b.add_resource("r1", None);
        let r2 = b.add_resource("r2", None);
        let task = b.add_task("t", None, TaskKind::Effort);
        b.task_mut(task).effort.set(plan, 8.0);
        b.task_mut(task)
            .allocations
            .push(Allocation::new(vec![r1, r2]).with_policy(AllocationPolicy::MinLoaded).persistent());
        let graph = b.freeze().unwrap();
        let mut state = ScenarioState::new(&graph, ScenarioId(0));

        // First pick lands on r1 (tie broken by order) and sticks, even
        // though minloaded alone would alternate.
        let first = booked_resource(&allocate_slot(&graph, &mut state, task, 9));
        assert_eq!(first, r1);
        let second = booked_resource(&allocate_slot(&graph, &mut state, task, 10));
        assert_eq!(second, r1);
    }

    #[test]
    fn test_group_expansion_books_leaf() {
        let mut b = ProjectBuilder::new("test", dt(2024, 1, 1, 0), dt(2024, 2, 1, 0)).unwrap();
        let plan = b.add_scenario("plan", None);
        let team = b.add_resource("team", None);
        let d1 = b.add_resource("d1", Some(team));
        let _d2 = b.add_resource("d2", Some(team));
        let task = b.add_task("t", None, TaskKind::Effort);
        b.task_mut(task).effort.set(plan, 8.0);
        b.task_mut(task).allocations.push(Allocation::new(vec![team]));
        let graph = b.freeze().unwrap();
        let mut state = ScenarioState::new(&graph, ScenarioId(0));
        let chosen = booked_resource(&allocate_slot(&graph, &mut state, task, 9));
        assert_eq!(chosen, d1);
    }
}
