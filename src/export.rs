//! Booking export and re-ingest.
//!
//! The assignment map of a scheduled scenario serializes to a
//! line-oriented textual form that the builder can re-ingest as user
//! bookings. The export is deterministic (tasks in id order, intervals
//! ascending), and re-scheduling a project with its own exported
//! bookings injected reproduces the same intervals and assignments.
//!
//! Format:
//!
//! ```text
//! # projsched bookings v1
//! # project: accounting
//! # fingerprint: 3f7a…
//! # scenario: plan
//! booking "impl.backend" "team.dev1" 2024-01-01-09:00 - 2024-01-01-17:00 sloppy 0
//! ```

use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use thiserror::Error;

use crate::models::ids::{ResourceId, ScenarioId, Slot};
use crate::models::project::{ProjectBuilder, ProjectGraph};
use crate::models::task::BookingSpec;
use crate::scheduler::engine::ScenarioSchedule;

const HEADER: &str = "# projsched bookings v1";
const DATE_FORMAT: &str = "%Y-%m-%d-%H:%M";

/// Errors raised while parsing or injecting a booking export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("line {line}: {detail}")]
    ParseError { line: usize, detail: String },

    #[error("export references unknown task {0}")]
    UnknownTask(String),

    #[error("export references unknown resource {0}")]
    UnknownResource(String),

    #[error("export fingerprint {found} does not match project {expected}")]
    FingerprintMismatch { expected: String, found: String },
}

/// One parsed booking line.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedBooking {
    pub task_path: String,
    pub resource_path: String,
    pub from: NaiveDateTime,
    pub until: NaiveDateTime,
    pub sloppy: u8,
}

/// A parsed booking export.
#[derive(Debug, Clone, Default)]
pub struct BookingExport {
    pub fingerprint: Option<String>,
    pub scenario: Option<String>,
    pub entries: Vec<ExportedBooking>,
}

/// Serializes the assignment map of a scheduled scenario.
pub fn export_bookings(graph: &ProjectGraph, schedule: &ScenarioSchedule) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{HEADER}");
    let _ = writeln!(out, "# project: {}", graph.config.name);
    let _ = writeln!(out, "# fingerprint: {}", graph.fingerprint());
    let _ = writeln!(out, "# scenario: {}", schedule.scenario_name);

    for task in &schedule.tasks {
        if task.assignments.is_empty() {
            continue;
        }
        // Group slots per (resource, sloppy); assignments arrive sorted
        // by slot, so each group is ascending.
        let mut groups: BTreeMap<(ResourceId, u8), Vec<Slot>> = BTreeMap::new();
        for a in &task.assignments {
            groups.entry((a.resource, a.sloppy)).or_default().push(a.slot);
        }
        for ((resource, sloppy), slots) in groups {
            for (from, until) in merge_runs(&slots) {
                let _ = writeln!(
                    out,
                    "booking \"{}\" \"{}\" {} - {} sloppy {}",
                    task.path,
                    graph.resource(resource).path,
                    graph.grid.datetime_of(from).format(DATE_FORMAT),
                    graph.grid.datetime_of(until).format(DATE_FORMAT),
                    sloppy
                );
            }
        }
    }
    out
}

/// Merges an ascending slot list into half-open runs.
fn merge_runs(slots: &[Slot]) -> Vec<(Slot, Slot)> {
    let mut runs = Vec::new();
    let mut iter = slots.iter().copied();
    let Some(first) = iter.next() else {
        return runs;
    };
    let (mut start, mut prev) = (first, first);
    for slot in iter {
        if slot == prev {
            continue;
        }
        if slot == prev + 1 {
            prev = slot;
        } else {
            runs.push((start, prev + 1));
            start = slot;
            prev = slot;
        }
    }
    runs.push((start, prev + 1));
    runs
}

/// Parses an export back into booking entries.
pub fn parse_bookings(text: &str) -> Result<BookingExport, ExportError> {
    let mut export = BookingExport::default();
    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix('#') {
            let rest = rest.trim();
            if let Some(v) = rest.strip_prefix("fingerprint:") {
                export.fingerprint = Some(v.trim().to_string());
            } else if let Some(v) = rest.strip_prefix("scenario:") {
                export.scenario = Some(v.trim().to_string());
            }
            continue;
        }
        export.entries.push(parse_booking_line(line, line_no)?);
    }
    Ok(export)
}

fn parse_booking_line(line: &str, line_no: usize) -> Result<ExportedBooking, ExportError> {
    let err = |detail: &str| ExportError::ParseError {
        line: line_no,
        detail: detail.to_string(),
    };

    let mut quoted = line.split('"');
    let keyword = quoted.next().ok_or_else(|| err("empty line"))?;
    if keyword.trim() != "booking" {
        return Err(err("expected `booking`"));
    }
    let task_path = quoted.next().ok_or_else(|| err("missing task path"))?;
    quoted.next(); // separator between the quoted paths
    let resource_path = quoted.next().ok_or_else(|| err("missing resource path"))?;
    let tail = quoted.next().ok_or_else(|| err("missing interval"))?;

    let tokens: Vec<&str> = tail.split_whitespace().collect();
    // <from> - <until> [sloppy <n>]
    if tokens.len() < 3 || tokens[1] != "-" {
        return Err(err("malformed interval"));
    }
    let from = NaiveDateTime::parse_from_str(tokens[0], DATE_FORMAT)
        .map_err(|e| err(&format!("bad start datetime: {e}")))?;
    let until = NaiveDateTime::parse_from_str(tokens[2], DATE_FORMAT)
        .map_err(|e| err(&format!("bad end datetime: {e}")))?;
    if until <= from {
        return Err(err("interval end not after start"));
    }
    let sloppy = match tokens.get(3) {
        Some(&"sloppy") => tokens
            .get(4)
            .and_then(|t| t.parse::<u8>().ok())
            .ok_or_else(|| err("bad sloppy level"))?,
        Some(_) => return Err(err("unexpected trailing tokens")),
        None => 0,
    };

    Ok(ExportedBooking {
        task_path: task_path.to_string(),
        resource_path: resource_path.to_string(),
        from,
        until,
        sloppy,
    })
}

/// Verifies a parsed export against a frozen graph's fingerprint.
pub fn verify_fingerprint(graph: &ProjectGraph, export: &BookingExport) -> Result<(), ExportError> {
    if let Some(found) = &export.fingerprint {
        let expected = graph.fingerprint();
        if *found != expected {
            return Err(ExportError::FingerprintMismatch {
                expected,
                found: found.clone(),
            });
        }
    }
    Ok(())
}

/// Injects parsed bookings into a project under construction.
pub fn inject_bookings(
    builder: &mut ProjectBuilder,
    scenario: ScenarioId,
    export: &BookingExport,
) -> Result<(), ExportError> {
    for entry in &export.entries {
        let task = builder
            .find_task_by_path(&entry.task_path)
            .ok_or_else(|| ExportError::UnknownTask(entry.task_path.clone()))?;
        let resource = builder
            .find_resource_by_path(&entry.resource_path)
            .ok_or_else(|| ExportError::UnknownResource(entry.resource_path.clone()))?;
        let from = builder.clamp_slot(entry.from);
        let until = builder.clamp_slot(entry.until);
        builder.add_booking(
            task,
            scenario,
            BookingSpec::new(resource, from, until).with_sloppy(entry.sloppy),
        );
    }
    Ok(())
}
