//! Integration tests for vacations, mandatory allocations, and caps
//!
//! Tests cover:
//! - Mandatory allocation silently waiting out a vacation
//! - Non-mandatory allocation behaving the same for a lone candidate
//! - Daily assignment caps stretching a task
//! - Shift overrides relocating work

use chrono::{NaiveDate, NaiveDateTime};
use project_scheduler_core_rs::models::{
    Allocation, ProjectBuilder, ShiftAssignment, TaskKind, WorkingHours,
};
use project_scheduler_core_rs::scheduler::{ScheduleOptions, Scheduler, TaskResultState};

fn dt(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

#[test]
fn test_mandatory_allocation_waits_out_vacation() {
    let mut b = ProjectBuilder::new("vac", dt(2024, 1, 1, 0), dt(2024, 2, 1, 0)).unwrap();
    let plan = b.add_scenario("plan", None);
    let r = b.add_resource("r", None);
    // On vacation through January 10.
    b.add_vacation(r, dt(2024, 1, 1, 0), dt(2024, 1, 11, 0));
    let t = b.add_task("t", None, TaskKind::Effort);
    let effort = b.effort_days(1.0);
    b.task_mut(t).effort.set(plan, effort);
    b.task_mut(t).allocations.push(Allocation::new(vec![r]).mandatory());
    let graph = b.freeze().unwrap();

    let schedule = Scheduler::new(&graph)
        .schedule(plan, &ScheduleOptions::default())
        .unwrap();
    let result = schedule.task(t);

    // January 11 is the first working day after the vacation.
    assert_eq!(result.state, TaskResultState::Scheduled);
    assert_eq!(result.start, Some(dt(2024, 1, 11, 9)));
    assert_eq!(result.end, Some(dt(2024, 1, 11, 17)));
    // Waiting out unavailability is not an error.
    assert!(schedule.diagnostics.is_empty());
}

#[test]
fn test_daily_cap_stretches_task() {
    let mut b = ProjectBuilder::new("caps", dt(2024, 1, 1, 0), dt(2024, 2, 1, 0)).unwrap();
    let plan = b.add_scenario("plan", None);
    let r = b.add_resource("r", None);
    b.resource_mut(r).limits.daily_max = Some(4);
    let t = b.add_task("t", None, TaskKind::Effort);
    let effort = b.effort_days(1.0);
    b.task_mut(t).effort.set(plan, effort);
    b.task_mut(t).allocations.push(Allocation::new(vec![r]).mandatory());
    let graph = b.freeze().unwrap();

    let schedule = Scheduler::new(&graph)
        .schedule(plan, &ScheduleOptions::default())
        .unwrap();
    let result = schedule.task(t);

    // Four slots per day: one nominal day of effort spans two days.
    assert_eq!(result.start, Some(dt(2024, 1, 1, 9)));
    assert_eq!(result.end, Some(dt(2024, 1, 2, 13)));
    assert_eq!(result.assignments.len(), 8);
}

#[test]
fn test_weekly_cap_spills_into_next_week() {
    let mut b = ProjectBuilder::new("caps", dt(2024, 1, 1, 0), dt(2024, 2, 1, 0)).unwrap();
    let plan = b.add_scenario("plan", None);
    let r = b.add_resource("r", None);
    b.resource_mut(r).limits.weekly_max = Some(8);
    let t = b.add_task("t", None, TaskKind::Effort);
    let effort = b.effort_days(2.0);
    b.task_mut(t).effort.set(plan, effort);
    b.task_mut(t).allocations.push(Allocation::new(vec![r]).mandatory());
    let graph = b.freeze().unwrap();

    let schedule = Scheduler::new(&graph)
        .schedule(plan, &ScheduleOptions::default())
        .unwrap();
    let result = schedule.task(t);

    // Eight slots in week one (Monday), eight more the next Monday.
    assert_eq!(result.start, Some(dt(2024, 1, 1, 9)));
    assert_eq!(result.end, Some(dt(2024, 1, 8, 17)));
}

#[test]
fn test_shift_relocates_working_hours() {
    let mut b = ProjectBuilder::new("shift", dt(2024, 1, 1, 0), dt(2024, 2, 1, 0)).unwrap();
    let plan = b.add_scenario("plan", None);
    let night = b.add_calendar("night");
    b.calendar_mut(night).hours = WorkingHours::empty()
        .with_weekday(0, vec![(18 * 3600, 22 * 3600)])
        .with_weekday(1, vec![(18 * 3600, 22 * 3600)])
        .with_weekday(2, vec![(18 * 3600, 22 * 3600)])
        .with_weekday(3, vec![(18 * 3600, 22 * 3600)])
        .with_weekday(4, vec![(18 * 3600, 22 * 3600)]);
    let r = b.add_resource("r", None);
    b.resource_mut(r).shifts.push(ShiftAssignment {
        calendar: night,
        from: dt(2024, 1, 1, 0),
        until: dt(2024, 1, 8, 0),
    });
    let t = b.add_task("t", None, TaskKind::Effort);
    // The task itself works the night calendar too during that week.
    b.task_mut(t).shifts.push(ShiftAssignment {
        calendar: night,
        from: dt(2024, 1, 1, 0),
        until: dt(2024, 1, 8, 0),
    });
    b.task_mut(t).effort.set(plan, 4.0);
    b.task_mut(t).allocations.push(Allocation::new(vec![r]).mandatory());
    let graph = b.freeze().unwrap();

    let schedule = Scheduler::new(&graph)
        .schedule(plan, &ScheduleOptions::default())
        .unwrap();
    let result = schedule.task(t);

    // Work lands in the Monday night shift.
    assert_eq!(result.start, Some(dt(2024, 1, 1, 18)));
    assert_eq!(result.end, Some(dt(2024, 1, 1, 22)));
}
