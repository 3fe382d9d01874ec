//! Core time-grid machinery.

pub mod time;

pub use time::{TimeGrid, TimeGridError};
