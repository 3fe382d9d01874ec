//! Working-time calendars.
//!
//! A calendar answers `working?(slot)` by composing a weekly working-hour
//! template with absolute holiday intervals. Shifts override a base
//! calendar for a sub-interval of the project window; vacations are a
//! per-resource concern and live on the resource, not here.
//!
//! The scheduler never consults a calendar directly: at freeze time each
//! calendar (and each resource/task shift composition) is compiled into a
//! [`WorkingMap`] bitmap over the project window, making the predicate
//! O(1) and range counts O(slots/64).

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::core::time::TimeGrid;
use crate::models::ids::{CalendarId, Slot};

/// Weekly working-hour template.
///
/// Ranges are half-open `[start, end)` seconds past midnight, per weekday
/// (index 0 = Monday).
///
/// # Example
/// ```
/// use project_scheduler_core_rs::models::WorkingHours;
///
/// let hours = WorkingHours::standard();
/// // Monday 09:00 is inside the default 09:00-17:00 template.
/// assert!(hours.is_working_at(0, 9 * 3600));
/// assert!(!hours.is_working_at(0, 8 * 3600));
/// // Saturday is off.
/// assert!(!hours.is_working_at(5, 12 * 3600));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingHours {
    weekday_ranges: [Vec<(u32, u32)>; 7],
}

impl WorkingHours {
    /// Template with no working time at all.
    pub fn empty() -> Self {
        Self {
            weekday_ranges: Default::default(),
        }
    }

    /// The default project template: Monday-Friday, 09:00-17:00.
    pub fn standard() -> Self {
        let mut hours = Self::empty();
        for weekday in 0..5 {
            hours.weekday_ranges[weekday].push((9 * 3600, 17 * 3600));
        }
        hours
    }

    /// Replaces the ranges for one weekday (0 = Monday .. 6 = Sunday).
    pub fn with_weekday(mut self, weekday: usize, ranges: Vec<(u32, u32)>) -> Self {
        self.weekday_ranges[weekday] = ranges;
        self
    }

    /// Whether `second_of_day` on the given weekday (0 = Monday) falls in
    /// a working range.
    pub fn is_working_at(&self, weekday: usize, second_of_day: u32) -> bool {
        self.weekday_ranges[weekday]
            .iter()
            .any(|&(start, end)| second_of_day >= start && second_of_day < end)
    }

    /// Number of working seconds declared per week.
    pub fn weekly_working_secs(&self) -> u64 {
        self.weekday_ranges
            .iter()
            .flatten()
            .map(|&(start, end)| (end - start) as u64)
            .sum()
    }
}

/// A named working-time calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calendar {
    /// Identifier within the frozen graph.
    pub id: CalendarId,

    /// Human-readable name (dot-path for nested declarations).
    pub name: String,

    /// Weekly template.
    pub hours: WorkingHours,

    /// Absolute non-working intervals, half-open `[from, until)`.
    pub holidays: Vec<(NaiveDateTime, NaiveDateTime)>,

    /// Productivity multiplier applied to resources working under this
    /// calendar (1.0 = nominal).
    pub productivity: f64,
}

impl Calendar {
    /// Creates a calendar with the standard template and no holidays.
    pub fn new(id: CalendarId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            hours: WorkingHours::standard(),
            holidays: Vec::new(),
            productivity: 1.0,
        }
    }

    /// Whether the instant at the start of `slot` is working time.
    pub fn is_working(&self, grid: &TimeGrid, slot: Slot) -> bool {
        let t = grid.datetime_of(slot);
        if self.holidays.iter().any(|&(from, until)| t >= from && t < until) {
            return false;
        }
        let weekday = t.weekday().num_days_from_monday() as usize;
        self.hours.is_working_at(weekday, grid.second_of_day(slot))
    }
}

/// A shift assignment: a calendar override during a wall-clock interval.
///
/// May be attached to a resource or a task; during `[from, until)` the
/// shift calendar replaces the entity's base calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftAssignment {
    pub calendar: CalendarId,
    pub from: NaiveDateTime,
    pub until: NaiveDateTime,
}

/// Shift interval resolved to slot indices at freeze time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResolvedShift {
    pub calendar: CalendarId,
    pub from: Slot,
    pub until: Slot,
}

/// Working-time bitmap over the project window for one effective calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingMap {
    words: Vec<u64>,
    num_slots: usize,
}

impl WorkingMap {
    /// Compiles a calendar, with optional shift overrides, into a bitmap.
    pub fn build(
        base: &Calendar,
        shifts: &[ResolvedShift],
        calendars: &[Calendar],
        grid: &TimeGrid,
    ) -> Self {
        let num_slots = grid.num_slots();
        let mut map = Self {
            words: vec![0; (num_slots + 63) / 64],
            num_slots,
        };
        for slot in 0..num_slots {
            let cal = shifts
                .iter()
                .find(|s| slot >= s.from && slot < s.until)
                .map(|s| &calendars[s.calendar.index()])
                .unwrap_or(base);
            if cal.is_working(grid, slot) {
                map.set(slot);
            }
        }
        map
    }

    fn set(&mut self, slot: Slot) {
        self.words[slot / 64] |= 1u64 << (slot % 64);
    }

    /// O(1) working-time predicate.
    #[inline]
    pub fn is_working(&self, slot: Slot) -> bool {
        slot < self.num_slots && self.words[slot / 64] & (1u64 << (slot % 64)) != 0
    }

    /// Number of working slots in `[from, until)`.
    pub fn count_range(&self, from: Slot, until: Slot) -> usize {
        let until = until.min(self.num_slots);
        if from >= until {
            return 0;
        }
        // Whole-word popcounts with masked edges.
        let (first_word, last_word) = (from / 64, (until - 1) / 64);
        let mut count = 0usize;
        for w in first_word..=last_word {
            let mut word = self.words[w];
            if w == first_word {
                word &= !0u64 << (from % 64);
            }
            if w == last_word {
                let tail = until % 64;
                if tail != 0 {
                    word &= !0u64 >> (64 - tail);
                }
            }
            count += word.count_ones() as usize;
        }
        count
    }

    /// First working slot at or after `from`.
    pub fn next_working(&self, from: Slot) -> Option<Slot> {
        (from..self.num_slots).find(|&s| self.is_working(s))
    }

    /// Last working slot at or before `from`.
    pub fn prev_working(&self, from: Slot) -> Option<Slot> {
        let from = from.min(self.num_slots.saturating_sub(1));
        (0..=from).rev().find(|&s| self.is_working(s))
    }

    /// Advances `from` by `working` working slots and returns the slot
    /// just past the last one counted, or `None` if the window runs out.
    pub fn advance_working(&self, from: Slot, working: usize) -> Option<Slot> {
        let mut remaining = working;
        let mut slot = from;
        while remaining > 0 {
            slot = self.next_working(slot)? + 1;
            remaining -= 1;
        }
        Some(slot)
    }

    /// Retreats from the exclusive bound `until` by `working` working
    /// slots and returns the first slot of the covered range, or `None`
    /// if the window start is hit first.
    pub fn retreat_working(&self, until: Slot, working: usize) -> Option<Slot> {
        let mut remaining = working;
        let mut bound = until;
        while remaining > 0 {
            if bound == 0 {
                return None;
            }
            bound = self.prev_working(bound - 1)?;
            remaining -= 1;
        }
        Some(bound)
    }
}
