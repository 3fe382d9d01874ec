//! Domain models: the frozen structural graph and its entities.

pub mod account;
pub mod attributes;
pub mod calendar;
pub mod ids;
pub mod project;
pub mod resource;
pub mod task;

// Re-exports
pub use account::AccountNode;
pub use attributes::PerScenario;
pub use calendar::{Calendar, ResolvedShift, ShiftAssignment, WorkingHours, WorkingMap};
pub use project::{ProjectBuilder, ProjectConfig, ProjectGraph, ScenarioDef, StructureError};
pub use resource::{ResourceLimits, ResourceNode};
pub use task::{
    Allocation, AllocationPolicy, BookingSpec, Charge, ChargeKind, ChargeTrigger, Dependency,
    DependencyAnchor, Direction, TaskKind, TaskNode,
};
