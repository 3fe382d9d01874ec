//! Time grid for the scheduling engine.
//!
//! The project window is discretised into fixed-width slots (default one
//! hour). All scheduling arithmetic happens on slot indices; wall-clock
//! values exist only at the edges (input bounds, reports, booking export).
//!
//! # Determinism
//!
//! Slot indexing is pure integer arithmetic on the project window. The
//! configured UTC offset is carried as metadata for renderers; internal
//! datetimes are local wall-clock values.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ids::Slot;

/// Errors rejected when constructing a [`TimeGrid`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeGridError {
    #[error("project start {start} is not before project end {end}")]
    StartNotBeforeEnd {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    #[error("slot duration {slot_secs}s does not divide a day evenly")]
    SlotSizeNotDividingDay { slot_secs: u32 },
}

/// Discrete slot index ↔ wall-clock conversion for one project window.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use project_scheduler_core_rs::TimeGrid;
///
/// let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
/// let end = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
/// let grid = TimeGrid::new(start, end, 3600, 0).unwrap();
///
/// assert_eq!(grid.num_slots(), 31 * 24);
/// assert_eq!(grid.slots_per_day(), 24);
/// let nine_am = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(9, 0, 0).unwrap();
/// assert_eq!(grid.slot_of(nine_am), Some(9));
/// assert_eq!(grid.datetime_of(9), nine_am);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeGrid {
    /// First instant of the project window (local wall-clock).
    start: NaiveDateTime,

    /// First instant past the project window.
    end: NaiveDateTime,

    /// Slot width in seconds. Must divide a day evenly.
    slot_secs: u32,

    /// Configured UTC offset of the project, in seconds. Carried for
    /// renderers and the booking export; slot arithmetic never uses it.
    utc_offset_secs: i32,

    /// Total number of slots in the window.
    num_slots: usize,
}

impl TimeGrid {
    /// Builds a grid over `[start, end)` with the given slot width.
    ///
    /// Rejects a window whose start is not before its end, and a slot
    /// width that does not divide 24 hours evenly.
    pub fn new(
        start: NaiveDateTime,
        end: NaiveDateTime,
        slot_secs: u32,
        utc_offset_secs: i32,
    ) -> Result<Self, TimeGridError> {
        if slot_secs == 0 || 86_400 % slot_secs != 0 {
            return Err(TimeGridError::SlotSizeNotDividingDay { slot_secs });
        }
        if start >= end {
            return Err(TimeGridError::StartNotBeforeEnd { start, end });
        }

        let total_secs = end.signed_duration_since(start).num_seconds();
        // Round up so the final partial slot, if any, is addressable.
        let num_slots = ((total_secs + slot_secs as i64 - 1) / slot_secs as i64) as usize;

        Ok(Self {
            start,
            end,
            slot_secs,
            utc_offset_secs,
            num_slots,
        })
    }

    /// Total number of slots in the project window.
    #[inline]
    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    /// Slot width in seconds.
    #[inline]
    pub fn slot_secs(&self) -> u32 {
        self.slot_secs
    }

    /// Number of slots in one calendar day.
    #[inline]
    pub fn slots_per_day(&self) -> usize {
        (86_400 / self.slot_secs) as usize
    }

    /// First instant of the window.
    #[inline]
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    /// First instant past the window.
    #[inline]
    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// Configured UTC offset in seconds.
    #[inline]
    pub fn utc_offset_secs(&self) -> i32 {
        self.utc_offset_secs
    }

    /// Slot containing the given instant.
    ///
    /// Returns `None` for instants before the window start or after its
    /// end. The window end itself maps to `num_slots()` so it can serve
    /// as an exclusive bound.
    pub fn slot_of(&self, t: NaiveDateTime) -> Option<Slot> {
        let secs = t.signed_duration_since(self.start).num_seconds();
        if secs < 0 {
            return None;
        }
        let slot = (secs / self.slot_secs as i64) as usize;
        if slot > self.num_slots || (slot == self.num_slots && t > self.end) {
            return None;
        }
        Some(slot)
    }

    /// Start instant of the given slot. `slot` may equal `num_slots()`
    /// when used as an exclusive interval end.
    pub fn datetime_of(&self, slot: Slot) -> NaiveDateTime {
        self.start + chrono::Duration::seconds(slot as i64 * self.slot_secs as i64)
    }

    /// Calendar date the slot falls on.
    pub fn date_of(&self, slot: Slot) -> NaiveDate {
        self.datetime_of(slot).date()
    }

    /// Seconds past midnight at the start of the slot.
    pub fn second_of_day(&self, slot: Slot) -> u32 {
        self.datetime_of(slot).time().num_seconds_from_midnight()
    }

    /// ISO week the slot falls in, as `(iso_year, iso_week)`.
    pub fn iso_week_of(&self, slot: Slot) -> (i32, u32) {
        let week = self.date_of(slot).iso_week();
        (week.year(), week.week())
    }

    /// Calendar month the slot falls in, as `(year, month)`.
    pub fn month_of(&self, slot: Slot) -> (i32, u32) {
        let date = self.date_of(slot);
        (date.year(), date.month())
    }

    /// Whether `slot` is a valid bookable index (strictly inside the window).
    #[inline]
    pub fn contains(&self, slot: Slot) -> bool {
        slot < self.num_slots
    }
}
