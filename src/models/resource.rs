//! Resource model.
//!
//! A resource is a leaf worker/machine or a group. Groups carry no own
//! bookings; allocating a group expands to its member leaves in
//! declaration order. Efficiency, calendar, shifts, vacations, caps and
//! the cost rate all live on leaves.
//!
//! CRITICAL: all money values are i64 (minor currency units per slot).

use serde::{Deserialize, Serialize};

use crate::models::calendar::ShiftAssignment;
use crate::models::ids::{CalendarId, ResourceId, Slot};

/// Caps on how many slots a leaf resource may be assigned per period.
///
/// Periods are keyed by the wall-clock time of the slot: calendar day,
/// ISO week, calendar month.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub daily_max: Option<u32>,
    pub weekly_max: Option<u32>,
    pub monthly_max: Option<u32>,
}

impl ResourceLimits {
    pub fn is_unlimited(&self) -> bool {
        self.daily_max.is_none() && self.weekly_max.is_none() && self.monthly_max.is_none()
    }
}

/// A resource node in the declaration forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceNode {
    /// Identifier within the frozen graph.
    pub id: ResourceId,

    /// Hierarchical dot-path (e.g. `team.dev1`).
    pub path: String,

    /// Human-readable name.
    pub name: String,

    /// Parent group, if nested.
    pub parent: Option<ResourceId>,

    /// Member resources, in declaration order. Non-empty = group.
    pub children: Vec<ResourceId>,

    /// Work delivered per occupied slot, as a fraction of a nominal
    /// resource-slot. Non-negative; typically 1.0.
    pub efficiency: f64,

    /// Calendar override; `None` = project calendar.
    pub calendar: Option<CalendarId>,

    /// Shift overrides, applied over the base calendar.
    pub shifts: Vec<ShiftAssignment>,

    /// Vacation intervals, half-open slot ranges. Resolved from
    /// wall-clock input at freeze time.
    pub vacations: Vec<(Slot, Slot)>,

    /// Assignment caps.
    pub limits: ResourceLimits,

    /// Cost rate in minor currency units per assigned slot.
    pub rate_per_slot: i64,
}

impl ResourceNode {
    /// Whether this node is a group (has members).
    #[inline]
    pub fn is_group(&self) -> bool {
        !self.children.is_empty()
    }

    /// Whether `slot` falls inside a declared vacation.
    pub fn on_vacation(&self, slot: Slot) -> bool {
        self.vacations
            .iter()
            .any(|&(from, until)| slot >= from && slot < until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: u32) -> ResourceNode {
        ResourceNode {
            id: ResourceId(id),
            path: format!("r{id}"),
            name: format!("r{id}"),
            parent: None,
            children: Vec::new(),
            efficiency: 1.0,
            calendar: None,
            shifts: Vec::new(),
            vacations: Vec::new(),
            limits: ResourceLimits::default(),
            rate_per_slot: 0,
        }
    }

    #[test]
    fn test_group_detection() {
        let mut group = leaf(0);
        assert!(!group.is_group());
        group.children.push(ResourceId(1));
        assert!(group.is_group());
    }

    #[test]
    fn test_vacation_interval_is_half_open() {
        let mut r = leaf(0);
        r.vacations.push((10, 20));
        assert!(!r.on_vacation(9));
        assert!(r.on_vacation(10));
        assert!(r.on_vacation(19));
        assert!(!r.on_vacation(20));
    }
}
