//! Task model.
//!
//! Tasks form an ordered forest. A task with children is a container: it
//! carries no own work, allocations or bookings and derives its scheduled
//! interval from the union-hull of its children. Leaf tasks come in four
//! kinds, dispatched on a tag:
//!
//! - `Effort`: consumes a declared amount of resource-work; duration
//!   follows from the efficiency of whatever the allocator books.
//! - `Duration`: occupies a fixed number of wall-clock slots.
//! - `Length`: occupies a fixed number of working slots of the task
//!   calendar.
//! - `Milestone`: a zero-duration event.
//!
//! Scenario-specific attributes (work amounts, date bounds, direction,
//! completion, bookings) live in [`PerScenario`] tables; structural
//! attributes (kind, dependencies, allocations, charges) are shared by
//! all scenarios.

use serde::{Deserialize, Serialize};

use crate::models::attributes::PerScenario;
use crate::models::calendar::ShiftAssignment;
use crate::models::ids::{AccountId, CalendarId, ResourceId, Slot, TaskId};
use crate::models::project::ScenarioDef;

/// The four task shapes. Container-ness is orthogonal: any kind with
/// children schedules as a container and its own shape is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    /// Work amount in resource-slots; see [`TaskNode::effort`].
    Effort,
    /// Fixed wall-clock span; see [`TaskNode::span_slots`].
    Duration,
    /// Fixed working-time span; see [`TaskNode::span_slots`].
    Length,
    /// Zero-duration event.
    Milestone,
}

/// Scheduling direction of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    /// ASAP from the earliest permissible start.
    #[default]
    Forward,
    /// ALAP from the latest permissible finish.
    Backward,
}

/// Which point of the predecessor a dependency anchors to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DependencyAnchor {
    /// Successor start follows predecessor end (the default).
    #[default]
    OnEnd,
    /// Successor start follows predecessor start.
    OnStart,
}

/// A declared dependency edge.
///
/// Stored on both endpoints: in the successor's `predecessors` list
/// (`other` = predecessor) and the predecessor's `successors` list
/// (`other` = successor). `anchor` always names the point on the
/// predecessor side.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Dependency {
    pub other: TaskId,
    pub anchor: DependencyAnchor,
    /// Gap in wall-clock slots.
    pub gap_duration: usize,
    /// Gap in working slots of the dependent task's calendar.
    pub gap_length: usize,
}

impl Dependency {
    pub fn new(other: TaskId) -> Self {
        Self {
            other,
            anchor: DependencyAnchor::OnEnd,
            gap_duration: 0,
            gap_length: 0,
        }
    }

    pub fn with_gap_duration(mut self, slots: usize) -> Self {
        self.gap_duration = slots;
        self
    }

    pub fn with_gap_length(mut self, slots: usize) -> Self {
        self.gap_length = slots;
        self
    }

    pub fn on_start(mut self) -> Self {
        self.anchor = DependencyAnchor::OnStart;
        self
    }
}

/// Resource selection policy for one allocation candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AllocationPolicy {
    /// First eligible candidate in declaration order.
    #[default]
    Order,
    /// Least allocated effort across the whole scenario.
    MinLoaded,
    /// Most allocated effort across the whole scenario.
    MaxLoaded,
    /// Fewest slots booked on this task.
    MinAllocated,
    /// Deterministic PRNG keyed by `(project seed, task id, slot)`.
    Random,
}

/// One allocation: an ordered candidate set plus selection policy.
///
/// At every working slot of an effort task the allocator tries to book
/// one leaf resource per allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    /// Candidate resources (leaves or groups), declaration order.
    pub candidates: Vec<ResourceId>,

    /// Selection policy; ties break by declaration order.
    pub policy: AllocationPolicy,

    /// Reuse the previously chosen resource for the whole task while it
    /// remains eligible.
    pub persistent: bool,

    /// If no candidate is available at a slot, the whole slot fails and
    /// the scheduler moves on to the next slot.
    pub mandatory: bool,
}

impl Allocation {
    pub fn new(candidates: Vec<ResourceId>) -> Self {
        Self {
            candidates,
            policy: AllocationPolicy::Order,
            persistent: false,
            mandatory: false,
        }
    }

    pub fn with_policy(mut self, policy: AllocationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }
}

/// A user-supplied booking: `resource` worked on the task during
/// `[from, until)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingSpec {
    pub resource: ResourceId,

    /// First booked slot.
    pub from: Slot,

    /// First slot past the booking.
    pub until: Slot,

    /// Fraction of the booked interval that was unproductive overhead;
    /// reduces the effort credited, never the occupied slots.
    pub overhead: f64,

    /// Relaxation level for validation: 0 permits sharing a partially
    /// used slot, 1 additionally permits non-working hours, 2
    /// additionally permits vacation slots.
    pub sloppy: u8,
}

impl BookingSpec {
    pub fn new(resource: ResourceId, from: Slot, until: Slot) -> Self {
        Self {
            resource,
            from,
            until,
            overhead: 0.0,
            sloppy: 0,
        }
    }

    pub fn with_sloppy(mut self, level: u8) -> Self {
        self.sloppy = level;
        self
    }

    pub fn with_overhead(mut self, overhead: f64) -> Self {
        self.overhead = overhead;
        self
    }
}

/// When a charge event fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargeTrigger {
    OnStart,
    OnEnd,
    PerSlot,
}

/// Whether a charge accrues as cost or revenue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargeKind {
    Cost,
    Revenue,
}

/// A declared charge or credit against an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Charge {
    pub trigger: ChargeTrigger,
    pub kind: ChargeKind,

    /// Amount in minor currency units (per event, or per slot for
    /// `PerSlot`).
    pub amount: i64,

    /// Target account; `None` = the task's effective account.
    pub account: Option<AccountId>,
}

/// A task node in the frozen structural graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: TaskId,

    /// Hierarchical dot-path (e.g. `release.impl.backend`).
    pub path: String,

    pub name: String,

    pub parent: Option<TaskId>,

    /// Child tasks in declaration order. Non-empty = container.
    pub children: Vec<TaskId>,

    pub kind: TaskKind,

    /// Contention tie-breaker; higher schedules first. Defaults to 500.
    pub priority: i32,

    /// Incoming dependency edges (`other` = predecessor).
    pub predecessors: Vec<Dependency>,

    /// Outgoing dependency edges (`other` = successor).
    pub successors: Vec<Dependency>,

    /// Allocation list; empty lists inherit from the parent task.
    pub allocations: Vec<Allocation>,

    /// Charge events.
    pub charges: Vec<Charge>,

    /// Ledger account; `None` inherits from the parent task.
    pub account: Option<AccountId>,

    /// Calendar override; `None` inherits from parent task, then project.
    pub calendar: Option<CalendarId>,

    /// Shift overrides applied over the effective calendar.
    pub shifts: Vec<ShiftAssignment>,

    // --- per-scenario attributes ---
    /// Work amount in resource-slot units (Effort kind).
    pub effort: PerScenario<f64>,

    /// Span in slots (Duration and Length kinds).
    pub span_slots: PerScenario<usize>,

    pub direction: PerScenario<Direction>,

    /// Fixed start/end instants.
    pub start: PerScenario<Slot>,
    pub end: PerScenario<Slot>,

    /// Window constraints.
    pub min_start: PerScenario<Slot>,
    pub max_start: PerScenario<Slot>,
    pub min_end: PerScenario<Slot>,
    pub max_end: PerScenario<Slot>,

    /// User-reported completion percentage.
    pub complete: PerScenario<f64>,

    /// User-supplied bookings.
    pub bookings: PerScenario<Vec<BookingSpec>>,

    /// The task was declared already scheduled (`actual:scheduled`):
    /// bookings are the full truth regardless of remaining effort.
    pub declared_scheduled: PerScenario<bool>,
}

impl TaskNode {
    /// Whether this task is a container.
    #[inline]
    pub fn is_container(&self) -> bool {
        !self.children.is_empty()
    }

    /// Effective scheduling direction under a scenario.
    pub fn effective_direction(&self, scenario: crate::models::ids::ScenarioId, scenarios: &[ScenarioDef]) -> Direction {
        self.direction
            .resolve(scenario, scenarios)
            .copied()
            .unwrap_or_default()
    }
}
