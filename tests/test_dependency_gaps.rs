//! Integration tests for dependency resolution
//!
//! Tests cover:
//! - Wall-clock gaps (`gapDuration`) anchoring the successor start
//! - Working-time gaps (`gapLength`)
//! - `onstart` anchoring
//! - `precedes` declared from the predecessor side

use chrono::{NaiveDate, NaiveDateTime};
use project_scheduler_core_rs::models::{Allocation, Dependency, ProjectBuilder, TaskKind};
use project_scheduler_core_rs::scheduler::{ScheduleOptions, Scheduler};
use project_scheduler_core_rs::TaskId;

fn dt(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

/// Helper: two one-day effort tasks on one resource.
fn two_task_builder() -> (ProjectBuilder, TaskId, TaskId) {
    let mut b = ProjectBuilder::new("deps", dt(2024, 1, 1, 0), dt(2024, 2, 1, 0)).unwrap();
    let plan = b.add_scenario("plan", None);
    let r = b.add_resource("r", None);
    let a = b.add_task("a", None, TaskKind::Effort);
    let t = b.add_task("b", None, TaskKind::Effort);
    for task in [a, t] {
        let effort = b.effort_days(1.0);
        b.task_mut(task).effort.set(plan, effort);
        b.task_mut(task).allocations.push(Allocation::new(vec![r]));
    }
    (b, a, t)
}

#[test]
fn test_wall_clock_gap() {
    let (mut b, a, t) = two_task_builder();
    // Two days of wall-clock gap after `a` ends.
    b.depends(t, Dependency::new(a).with_gap_duration(48));
    let graph = b.freeze().unwrap();

    let schedule = Scheduler::new(&graph)
        .schedule(project_scheduler_core_rs::ScenarioId(0), &ScheduleOptions::default())
        .unwrap();

    assert_eq!(schedule.task(a).end, Some(dt(2024, 1, 1, 17)));
    // The dependency instant is the reported start, wall-clock gap
    // included; actual work begins the next working morning.
    assert_eq!(schedule.task(t).start, Some(dt(2024, 1, 3, 17)));
    assert_eq!(schedule.task(t).end, Some(dt(2024, 1, 4, 17)));
    assert_eq!(
        schedule.task(t).assignments.first().map(|x| x.slot),
        graph.grid.slot_of(dt(2024, 1, 4, 9))
    );
    assert!(schedule.diagnostics.is_empty());
}

#[test]
fn test_working_time_gap_counts_working_slots() {
    let (mut b, a, t) = two_task_builder();
    // Eight working slots of gap: one full working day.
    b.depends(t, Dependency::new(a).with_gap_length(8));
    let graph = b.freeze().unwrap();

    let schedule = Scheduler::new(&graph)
        .schedule(project_scheduler_core_rs::ScenarioId(0), &ScheduleOptions::default())
        .unwrap();

    // Gap covers Tuesday; b starts Tuesday 17:00 and works Wednesday.
    assert_eq!(schedule.task(t).start, Some(dt(2024, 1, 2, 17)));
    assert_eq!(schedule.task(t).end, Some(dt(2024, 1, 3, 17)));
}

#[test]
fn test_onstart_anchor_allows_parallel_work() {
    let (mut b, a, t) = two_task_builder();
    // b may start as soon as a starts.
    b.depends(t, Dependency::new(a).on_start());
    let graph = b.freeze().unwrap();

    let schedule = Scheduler::new(&graph)
        .schedule(project_scheduler_core_rs::ScenarioId(0), &ScheduleOptions::default())
        .unwrap();

    // Anchored to a's start (Monday 09:00); the shared resource pushes
    // the actual work to Tuesday.
    assert_eq!(schedule.task(t).start, Some(dt(2024, 1, 1, 9)));
    assert_eq!(schedule.task(t).end, Some(dt(2024, 1, 2, 17)));
}

#[test]
fn test_precedes_mirrors_depends() {
    let (mut b, a, t) = two_task_builder();
    b.precedes(a, Dependency::new(t).with_gap_duration(24));
    let graph = b.freeze().unwrap();

    let schedule = Scheduler::new(&graph)
        .schedule(project_scheduler_core_rs::ScenarioId(0), &ScheduleOptions::default())
        .unwrap();

    assert_eq!(schedule.task(a).end, Some(dt(2024, 1, 1, 17)));
    assert_eq!(schedule.task(t).start, Some(dt(2024, 1, 2, 17)));
    assert_eq!(schedule.task(t).end, Some(dt(2024, 1, 3, 17)));
}

#[test]
fn test_dependency_chain_orders_three_tasks() {
    let mut b = ProjectBuilder::new("chain", dt(2024, 1, 1, 0), dt(2024, 2, 1, 0)).unwrap();
    let plan = b.add_scenario("plan", None);
    let r = b.add_resource("r", None);
    let mut tasks = Vec::new();
    for name in ["design", "build", "test"] {
        let t = b.add_task(name, None, TaskKind::Effort);
        let effort = b.effort_days(1.0);
        b.task_mut(t).effort.set(plan, effort);
        b.task_mut(t).allocations.push(Allocation::new(vec![r]));
        tasks.push(t);
    }
    b.depends(tasks[1], Dependency::new(tasks[0]));
    b.depends(tasks[2], Dependency::new(tasks[1]));
    let graph = b.freeze().unwrap();

    let schedule = Scheduler::new(&graph)
        .schedule(plan, &ScheduleOptions::default())
        .unwrap();

    let mut previous_end = None;
    for &t in &tasks {
        let result = schedule.task(t);
        if let Some(prev) = previous_end {
            assert!(result.start >= Some(prev));
        }
        previous_end = result.end;
    }
    assert_eq!(schedule.task(tasks[2]).end, Some(dt(2024, 1, 3, 17)));
}
