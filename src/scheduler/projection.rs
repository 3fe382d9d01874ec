//! Booking pre-load and projection.
//!
//! User bookings are immovable: they are applied to the assignment map
//! before any scheduling pass, consume declared effort, and push the
//! task's sweep cursor past the last booked slot. In a projection
//! scenario the status date additionally floors all computed slots, so
//! recorded work and planned work partition cleanly at `now`.
//!
//! Booking slots are re-validated under the booking's `sloppy` level:
//! level 0 permits sharing a partially used slot, level 1 additionally
//! permits non-working hours, level 2 additionally permits vacation
//! slots (which then do not count toward period caps). Slots that fail
//! even the relaxed predicate are dropped with an advisory.

use tracing::warn;

use crate::models::ids::Slot;
use crate::models::task::TaskKind;
use crate::models::project::ProjectGraph;
use crate::scheduler::diagnostics::{Diagnostic, DiagnosticKind, Severity};
use crate::scheduler::state::{ScenarioState, TaskState, EFFORT_EPS};

/// Applies all user bookings of the scenario to the derived state.
pub fn apply_bookings(graph: &ProjectGraph, state: &mut ScenarioState, now_slot: Option<Slot>) {
    let scen = state.scenario;
    let booking_horizon = now_slot.unwrap_or_else(|| graph.grid.num_slots());

    for task in &graph.tasks {
        if task.is_container() {
            continue;
        }
        let Some(bookings) = task.bookings.resolve(scen, &graph.scenarios) else {
            continue;
        };
        if bookings.is_empty() {
            continue;
        }
        let i = task.id.index();

        for booking in bookings {
            let resource = booking.resource;
            for slot in booking.from..booking.until {
                let working = graph.resource_map(resource).is_working(slot);
                let vacation = graph.resource(resource).on_vacation(slot);

                if !working && booking.sloppy < 1 {
                    state.advisories.push(
                        Diagnostic::advisory(
                            DiagnosticKind::BookingOutsideWorkingTime,
                            scen,
                            format!(
                                "booking of {} on {} dropped: slot {slot} is outside working time",
                                task.path,
                                graph.resource(resource).path
                            ),
                        )
                        .with_task(task.id)
                        .with_resource(resource)
                        .with_slot(slot),
                    );
                    continue;
                }
                if vacation && booking.sloppy < 2 {
                    state.advisories.push(
                        Diagnostic::advisory(
                            DiagnosticKind::BookingOutsideWorkingTime,
                            scen,
                            format!(
                                "booking of {} on {} dropped: slot {slot} falls in a vacation",
                                task.path,
                                graph.resource(resource).path
                            ),
                        )
                        .with_task(task.id)
                        .with_resource(resource)
                        .with_slot(slot),
                    );
                    continue;
                }

                let efficiency = graph.effective_efficiency(resource, slot);
                let capacity = efficiency - state.usage[resource.index()].used_share(slot);
                if capacity <= EFFORT_EPS {
                    state.advisories.push(
                        Diagnostic::advisory(
                            DiagnosticKind::ResourceOverbooked,
                            scen,
                            format!(
                                "booking of {} on {} dropped: slot {slot} is saturated",
                                task.path,
                                graph.resource(resource).path
                            ),
                        )
                        .with_task(task.id)
                        .with_resource(resource)
                        .with_slot(slot),
                    );
                    continue;
                }

                // Vacation spillover accepted under sloppy 2 does not
                // count toward period caps.
                let counts_toward_caps = !vacation;
                state.book(
                    graph,
                    task.id,
                    resource,
                    slot,
                    capacity,
                    true,
                    booking.sloppy,
                    counts_toward_caps,
                );
                if !working || vacation {
                    state.advisories.push(
                        Diagnostic::advisory(
                            DiagnosticKind::BookingOutsideWorkingTime,
                            scen,
                            format!(
                                "booking of {} on {} accepted into {} slot {slot} (sloppy {})",
                                task.path,
                                graph.resource(resource).path,
                                if vacation { "vacation" } else { "non-working" },
                                booking.sloppy
                            ),
                        )
                        .with_task(task.id)
                        .with_resource(resource)
                        .with_slot(slot),
                    );
                }

                let work = capacity * (1.0 - booking.overhead);
                state.remaining_effort[i] -= work;
                if slot < booking_horizon {
                    state.consumed_before_now[i] += work;
                }
            }
        }

        // The sweep resumes past the recorded work.
        if let Some(last) = state.last_booked[i] {
            state.cursor_forward[i] = state.cursor_forward[i].max(last + 1);
        }

        let declared_done = task
            .declared_scheduled
            .resolve(scen, &graph.scenarios)
            .copied()
            .unwrap_or(false);

        // Booked beyond declared effort: `actual:scheduled` wins with an
        // advisory; strict scenarios treat it as an error.
        if task.kind == TaskKind::Effort && state.remaining_effort[i] < -EFFORT_EPS {
            let overshoot = -state.remaining_effort[i];
            if declared_done || !graph.scenario(scen).strict_bookings {
                state.advisories.push(
                    Diagnostic::advisory(
                        DiagnosticKind::BookingBeyondEffort,
                        scen,
                        format!(
                            "bookings of {} exceed declared effort by {overshoot:.2} resource-slots",
                            task.path
                        ),
                    )
                    .with_task(task.id),
                );
            } else {
                warn!(task = %task.path, overshoot, "booking beyond effort in strict scenario");
                state.diagnostics.push(
                    Diagnostic::new(
                        Severity::Error,
                        DiagnosticKind::BookingBeyondEffort,
                        scen,
                        format!(
                            "bookings of {} exceed declared effort by {overshoot:.2} resource-slots",
                            task.path
                        ),
                    )
                    .with_task(task.id),
                );
                state.task_state[i] = TaskState::Infeasible;
                continue;
            }
        }

        // A task declared `actual:scheduled` takes its interval straight
        // from the bookings, whatever effort remains.
        if declared_done {
            if let (Some(first), Some(last)) = (state.first_booked[i], state.last_booked[i]) {
                state.start[i] = Some(first);
                state.end[i] = Some(last + 1);
                state.task_state[i] = TaskState::Scheduled;
            }
        }
    }
}
