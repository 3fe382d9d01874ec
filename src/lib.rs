//! Project Scheduler Core - Rust Engine
//!
//! Deterministic project scheduling engine: given a frozen property
//! graph (tasks, resources, calendars, accounts, scenarios) it computes
//! per-scenario start/end dates, resource assignments per time slot,
//! cost and revenue accruals, and structured diagnostics.
//!
//! # Architecture
//!
//! - **core**: Discrete time grid and wall-clock conversion
//! - **models**: Frozen structural graph (project, calendar, resource,
//!   task, account) plus the per-scenario attribute overlay
//! - **scheduler**: Bounds resolution, slot allocation, per-task state
//!   machine, fixed-point driver, projection, accrual, validation
//! - **rng**: Deterministic random number generation
//! - **export**: Re-ingestible textual booking export
//!
//! # Critical Invariants
//!
//! 1. The structural graph is frozen before scheduling; per-scenario
//!    derived state is owned by the scheduler of that scenario.
//! 2. All randomness is deterministic (seeded, keyed xorshift64*).
//! 3. All money values are i64 (minor currency units).
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use project_scheduler_core_rs::models::{Allocation, ProjectBuilder, TaskKind};
//! use project_scheduler_core_rs::scheduler::{ScheduleOptions, Scheduler};
//!
//! let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
//! let end = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
//! let mut builder = ProjectBuilder::new("demo", start, end).unwrap();
//! let plan = builder.add_scenario("plan", None);
//! let dev = builder.add_resource("dev", None);
//! let task = builder.add_task("impl", None, TaskKind::Effort);
//! let effort = builder.effort_days(2.0);
//! builder.task_mut(task).effort.set(plan, effort);
//! builder.task_mut(task).allocations.push(Allocation::new(vec![dev]));
//!
//! let graph = builder.freeze().unwrap();
//! let schedule = Scheduler::new(&graph)
//!     .schedule(plan, &ScheduleOptions::default())
//!     .unwrap();
//! assert_eq!(schedule.task(task).assignments.len(), 16);
//! ```

// Module declarations
pub mod core;
pub mod export;
pub mod models;
pub mod rng;
pub mod scheduler;

// Re-exports for convenience
pub use crate::core::time::{TimeGrid, TimeGridError};
pub use export::{
    export_bookings, inject_bookings, parse_bookings, verify_fingerprint, BookingExport,
    ExportError, ExportedBooking,
};
pub use models::ids::{AccountId, CalendarId, ResourceId, ScenarioId, Slot, TaskId};
pub use models::{
    Allocation, AllocationPolicy, BookingSpec, Calendar, Charge, ChargeKind, ChargeTrigger,
    Dependency, Direction, ProjectBuilder, ProjectGraph, ScenarioDef, StructureError, TaskKind,
    TaskNode, WorkingHours,
};
pub use rng::SlotRng;
pub use scheduler::{
    Diagnostic, DiagnosticKind, ProjectSchedule, ScenarioOutcome, ScenarioSchedule, ScheduleError,
    ScheduleOptions, ScheduleSnapshot, Scheduler, Severity, TaskHealth, TaskResult,
    TaskResultState,
};
