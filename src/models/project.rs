//! Project configuration, scenarios, and the frozen structural graph.
//!
//! Entities are created through [`ProjectBuilder`] and frozen into a
//! [`ProjectGraph`] before any scheduling happens. The frozen graph is
//! immutable and shared by all scenario schedulers; per-scenario derived
//! state lives in the scheduler, never here.
//!
//! # Critical Invariants
//!
//! 1. After `freeze()` succeeds, every id stored anywhere in the graph
//!    indexes a valid entity of the right table.
//! 2. The dependency DAG (augmented with container→child edges) is
//!    acyclic; `topo_order` lists every task, predecessors and parents
//!    first.
//! 3. Containers carry no own work, allocations, or bookings.

use chrono::NaiveDateTime;
use rustc_hash::FxHashSet;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BinaryHeap;

use crate::core::time::{TimeGrid, TimeGridError};
use crate::models::account::AccountNode;
use crate::models::attributes::PerScenario;
use crate::models::calendar::{Calendar, ResolvedShift, ShiftAssignment, WorkingHours, WorkingMap};
use crate::models::ids::{AccountId, CalendarId, ResourceId, ScenarioId, Slot, TaskId};
use crate::models::resource::{ResourceLimits, ResourceNode};
use crate::models::task::{Allocation, Dependency, TaskKind, TaskNode};

/// A named branch of per-task attributes.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioDef {
    pub id: ScenarioId,
    pub name: String,

    /// Attribute values unset here resolve through the parent.
    pub parent: Option<ScenarioId>,

    /// Bookings are ground truth up to `now`; the scheduler fills the
    /// remainder.
    pub projection: bool,

    /// A booking beyond declared effort is an error instead of an
    /// advisory.
    pub strict_bookings: bool,

    /// Excluded from `schedule_all`.
    pub disabled: bool,
}

impl ScenarioDef {
    pub fn new(id: ScenarioId, name: impl Into<String>, parent: Option<ScenarioId>) -> Self {
        Self {
            id,
            name: name.into(),
            parent,
            projection: false,
            strict_bookings: false,
            disabled: false,
        }
    }
}

/// Global project configuration.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectConfig {
    pub name: String,

    /// Seed for the deterministic `random` allocation policy.
    pub seed: u64,

    /// Digits of currency precision carried by reports.
    pub currency_scale: u32,

    /// Working slots that make up one nominal day of effort; used to
    /// convert day-denominated effort input.
    pub daily_working_slots: f64,
}

/// Errors detected while freezing the structural graph.
#[derive(Debug, thiserror::Error)]
pub enum StructureError {
    #[error("dependency cycle: {}", .members.join(" -> "))]
    DependencyCycle { members: Vec<String> },

    #[error("container task {task} carries its own work or allocations")]
    ContainerWithWork { task: String },

    #[error("{entity} references unknown {what}")]
    UnknownReference { entity: String, what: String },

    #[error("task {task} books group resource {resource}; only leaves can be booked")]
    GroupBooked { task: String, resource: String },

    #[error("task {task} has a booking with an empty or out-of-window interval")]
    InvalidBooking { task: String },

    #[error("project declares no scenarios")]
    NoScenarios,
}

/// The frozen, immutable structural graph.
///
/// Shared read-only by every scenario scheduler; freezing is the last
/// mutation it ever sees.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectGraph {
    pub config: ProjectConfig,
    pub grid: TimeGrid,
    pub calendars: Vec<Calendar>,
    pub scenarios: Vec<ScenarioDef>,
    pub resources: Vec<ResourceNode>,
    pub tasks: Vec<TaskNode>,
    pub accounts: Vec<AccountNode>,

    /// Tasks in dependency order (predecessors and parents first).
    topo_order: Vec<TaskId>,

    /// Effective working map per resource (calendar + shifts).
    resource_maps: Vec<WorkingMap>,

    /// Effective working map per task (calendar + shifts).
    task_maps: Vec<WorkingMap>,

    /// Resolved shift intervals per resource, for productivity lookups.
    resource_shifts: Vec<Vec<ResolvedShift>>,
}

impl ProjectGraph {
    #[inline]
    pub fn task(&self, id: TaskId) -> &TaskNode {
        &self.tasks[id.index()]
    }

    #[inline]
    pub fn resource(&self, id: ResourceId) -> &ResourceNode {
        &self.resources[id.index()]
    }

    #[inline]
    pub fn scenario(&self, id: ScenarioId) -> &ScenarioDef {
        &self.scenarios[id.index()]
    }

    #[inline]
    pub fn account(&self, id: AccountId) -> &AccountNode {
        &self.accounts[id.index()]
    }

    #[inline]
    pub fn calendar(&self, id: CalendarId) -> &Calendar {
        &self.calendars[id.index()]
    }

    /// Tasks in dependency order.
    pub fn topo_order(&self) -> &[TaskId] {
        &self.topo_order
    }

    /// Effective working map of a task.
    pub fn task_map(&self, id: TaskId) -> &WorkingMap {
        &self.task_maps[id.index()]
    }

    /// Effective working map of a resource.
    pub fn resource_map(&self, id: ResourceId) -> &WorkingMap {
        &self.resource_maps[id.index()]
    }

    /// Effective efficiency of a resource at a slot: declared efficiency
    /// times the productivity of the calendar in effect there.
    pub fn effective_efficiency(&self, id: ResourceId, slot: Slot) -> f64 {
        let resource = self.resource(id);
        let cal = self.resource_shifts[id.index()]
            .iter()
            .find(|s| slot >= s.from && slot < s.until)
            .map(|s| s.calendar)
            .or(resource.calendar)
            .unwrap_or(CalendarId(0));
        resource.efficiency * self.calendar(cal).productivity
    }

    /// Expands a resource (group or leaf) to leaves in declaration order.
    pub fn expand_leaves(&self, id: ResourceId, out: &mut Vec<ResourceId>) {
        let node = self.resource(id);
        if node.is_group() {
            for &child in &node.children {
                self.expand_leaves(child, out);
            }
        } else {
            out.push(id);
        }
    }

    /// Allocation list in effect for a task: its own, or the nearest
    /// ancestor's.
    pub fn effective_allocations(&self, id: TaskId) -> &[Allocation] {
        let mut current = Some(id);
        while let Some(tid) = current {
            let node = self.task(tid);
            if !node.allocations.is_empty() {
                return &node.allocations;
            }
            current = node.parent;
        }
        &[]
    }

    /// Account in effect for a task: its own, or the nearest ancestor's.
    pub fn effective_account(&self, id: TaskId) -> Option<AccountId> {
        let mut current = Some(id);
        while let Some(tid) = current {
            let node = self.task(tid);
            if node.account.is_some() {
                return node.account;
            }
            current = node.parent;
        }
        None
    }

    /// Looks up a task by its dot-path.
    pub fn find_task_by_path(&self, path: &str) -> Option<TaskId> {
        self.tasks.iter().find(|t| t.path == path).map(|t| t.id)
    }

    /// Looks up a resource by its dot-path.
    pub fn find_resource_by_path(&self, path: &str) -> Option<ResourceId> {
        self.resources.iter().find(|r| r.path == path).map(|r| r.id)
    }

    /// Looks up a scenario by name.
    pub fn find_scenario(&self, name: &str) -> Option<ScenarioId> {
        self.scenarios.iter().find(|s| s.name == name).map(|s| s.id)
    }

    /// SHA-256 fingerprint of the structural graph. Embedded in exports
    /// and snapshots so stale artefacts are detected on re-ingest.
    ///
    /// Bookings and completion data are deliberately excluded: injecting
    /// an exported booking file must not change the fingerprint.
    pub fn fingerprint(&self) -> String {
        #[derive(Serialize)]
        struct TaskView<'a> {
            path: &'a str,
            kind: &'a TaskKind,
            parent: Option<TaskId>,
            priority: i32,
            predecessors: &'a [Dependency],
            allocations: &'a [Allocation],
            effort: &'a PerScenario<f64>,
            span_slots: &'a PerScenario<usize>,
        }
        #[derive(Serialize)]
        struct View<'a> {
            config: &'a ProjectConfig,
            grid: &'a TimeGrid,
            calendars: &'a [Calendar],
            scenarios: &'a [ScenarioDef],
            resources: &'a [ResourceNode],
            accounts: &'a [AccountNode],
            tasks: Vec<TaskView<'a>>,
        }
        let view = View {
            config: &self.config,
            grid: &self.grid,
            calendars: &self.calendars,
            scenarios: &self.scenarios,
            resources: &self.resources,
            accounts: &self.accounts,
            tasks: self
                .tasks
                .iter()
                .map(|t| TaskView {
                    path: &t.path,
                    kind: &t.kind,
                    parent: t.parent,
                    priority: t.priority,
                    predecessors: &t.predecessors,
                    allocations: &t.allocations,
                    effort: &t.effort,
                    span_slots: &t.span_slots,
                })
                .collect(),
        };
        let bytes = serde_json::to_vec(&view).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        format!("{:x}", hasher.finalize())
    }
}

/// Mutable builder; the only way to construct a [`ProjectGraph`].
pub struct ProjectBuilder {
    config: ProjectConfig,
    grid: TimeGrid,
    calendars: Vec<Calendar>,
    scenarios: Vec<ScenarioDef>,
    resources: Vec<ResourceNode>,
    tasks: Vec<TaskNode>,
    accounts: Vec<AccountNode>,
}

impl ProjectBuilder {
    /// Starts a project over `[start, end)` with one-hour slots and UTC.
    pub fn new(
        name: impl Into<String>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Self, TimeGridError> {
        Self::with_grid(name, start, end, 3600, 0)
    }

    /// Starts a project with an explicit slot width and UTC offset.
    pub fn with_grid(
        name: impl Into<String>,
        start: NaiveDateTime,
        end: NaiveDateTime,
        slot_secs: u32,
        utc_offset_secs: i32,
    ) -> Result<Self, TimeGridError> {
        let grid = TimeGrid::new(start, end, slot_secs, utc_offset_secs)?;
        let project_calendar = Calendar {
            id: CalendarId(0),
            name: "project".into(),
            hours: WorkingHours::standard(),
            holidays: Vec::new(),
            productivity: 1.0,
        };
        Ok(Self {
            config: ProjectConfig {
                name: name.into(),
                seed: 0,
                currency_scale: 2,
                daily_working_slots: 8.0 * 3600.0 / slot_secs as f64,
            },
            grid,
            calendars: vec![project_calendar],
            scenarios: Vec::new(),
            resources: Vec::new(),
            tasks: Vec::new(),
            accounts: Vec::new(),
        })
    }

    /// Seed for the `random` allocation policy.
    pub fn set_seed(&mut self, seed: u64) {
        self.config.seed = seed;
    }

    /// Replaces the project working-hour template.
    pub fn set_working_hours(&mut self, hours: WorkingHours) {
        self.calendars[0].hours = hours;
    }

    /// Nominal working slots per day of effort input.
    pub fn set_daily_working_slots(&mut self, slots: f64) {
        self.config.daily_working_slots = slots;
    }

    /// The grid under construction (for slot conversions in input code).
    pub fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    /// Converts an instant to a slot, clamping to the project window.
    pub fn clamp_slot(&self, t: NaiveDateTime) -> Slot {
        if t <= self.grid.start() {
            0
        } else {
            self.grid.slot_of(t).unwrap_or_else(|| self.grid.num_slots())
        }
    }

    /// Converts day-denominated effort to resource-slot units.
    pub fn effort_days(&self, days: f64) -> f64 {
        days * self.config.daily_working_slots
    }

    pub fn add_scenario(&mut self, name: impl Into<String>, parent: Option<ScenarioId>) -> ScenarioId {
        let id = ScenarioId(self.scenarios.len() as u32);
        self.scenarios.push(ScenarioDef::new(id, name, parent));
        id
    }

    pub fn scenario_mut(&mut self, id: ScenarioId) -> &mut ScenarioDef {
        &mut self.scenarios[id.index()]
    }

    pub fn add_calendar(&mut self, name: impl Into<String>) -> CalendarId {
        let id = CalendarId(self.calendars.len() as u32);
        self.calendars.push(Calendar::new(id, name));
        id
    }

    pub fn calendar_mut(&mut self, id: CalendarId) -> &mut Calendar {
        &mut self.calendars[id.index()]
    }

    pub fn add_resource(&mut self, name: impl Into<String>, parent: Option<ResourceId>) -> ResourceId {
        let name = name.into();
        let id = ResourceId(self.resources.len() as u32);
        let path = match parent {
            Some(p) => format!("{}.{}", self.resources[p.index()].path, name),
            None => name.clone(),
        };
        if let Some(p) = parent {
            self.resources[p.index()].children.push(id);
        }
        self.resources.push(ResourceNode {
            id,
            path,
            name,
            parent,
            children: Vec::new(),
            efficiency: 1.0,
            calendar: None,
            shifts: Vec::new(),
            vacations: Vec::new(),
            limits: ResourceLimits::default(),
            rate_per_slot: 0,
        });
        id
    }

    pub fn resource_mut(&mut self, id: ResourceId) -> &mut ResourceNode {
        &mut self.resources[id.index()]
    }

    /// Declares a vacation interval `[from, until)` on a resource.
    pub fn add_vacation(&mut self, id: ResourceId, from: NaiveDateTime, until: NaiveDateTime) {
        let interval = (self.clamp_slot(from), self.clamp_slot(until));
        self.resources[id.index()].vacations.push(interval);
    }

    pub fn add_task(&mut self, name: impl Into<String>, parent: Option<TaskId>, kind: TaskKind) -> TaskId {
        let name = name.into();
        let id = TaskId(self.tasks.len() as u32);
        let path = match parent {
            Some(p) => format!("{}.{}", self.tasks[p.index()].path, name),
            None => name.clone(),
        };
        if let Some(p) = parent {
            self.tasks[p.index()].children.push(id);
        }
        self.tasks.push(TaskNode {
            id,
            path,
            name,
            parent,
            children: Vec::new(),
            kind,
            priority: 500,
            predecessors: Vec::new(),
            successors: Vec::new(),
            allocations: Vec::new(),
            charges: Vec::new(),
            account: None,
            calendar: None,
            shifts: Vec::new(),
            effort: PerScenario::default(),
            span_slots: PerScenario::default(),
            direction: PerScenario::default(),
            start: PerScenario::default(),
            end: PerScenario::default(),
            min_start: PerScenario::default(),
            max_start: PerScenario::default(),
            min_end: PerScenario::default(),
            max_end: PerScenario::default(),
            complete: PerScenario::default(),
            bookings: PerScenario::default(),
            declared_scheduled: PerScenario::default(),
        });
        id
    }

    pub fn task_mut(&mut self, id: TaskId) -> &mut TaskNode {
        &mut self.tasks[id.index()]
    }

    pub fn add_account(&mut self, name: impl Into<String>, parent: Option<AccountId>) -> AccountId {
        let name = name.into();
        let id = AccountId(self.accounts.len() as u32);
        let path = match parent {
            Some(p) => format!("{}.{}", self.accounts[p.index()].path, name),
            None => name.clone(),
        };
        if let Some(p) = parent {
            self.accounts[p.index()].children.push(id);
        }
        self.accounts.push(AccountNode {
            id,
            path,
            name,
            parent,
            children: Vec::new(),
        });
        id
    }

    /// Looks up a task by its dot-path.
    pub fn find_task_by_path(&self, path: &str) -> Option<TaskId> {
        self.tasks.iter().find(|t| t.path == path).map(|t| t.id)
    }

    /// Looks up a resource by its dot-path.
    pub fn find_resource_by_path(&self, path: &str) -> Option<ResourceId> {
        self.resources.iter().find(|r| r.path == path).map(|r| r.id)
    }

    /// Appends a booking to a task under one scenario.
    pub fn add_booking(
        &mut self,
        task: TaskId,
        scenario: ScenarioId,
        booking: crate::models::task::BookingSpec,
    ) {
        let node = &mut self.tasks[task.index()];
        let mut bookings = node.bookings.get(scenario).cloned().unwrap_or_default();
        bookings.push(booking);
        node.bookings.set(scenario, bookings);
    }

    /// Declares `task depends dep.other`: the task starts after the
    /// predecessor's anchor point plus the gap.
    pub fn depends(&mut self, task: TaskId, dep: Dependency) {
        self.tasks[task.index()].predecessors.push(dep);
        let mirror = Dependency { other: task, ..dep };
        self.tasks[dep.other.index()].successors.push(mirror);
    }

    /// Declares `task precedes dep.other`: the successor starts after
    /// this task's anchor point plus the gap.
    pub fn precedes(&mut self, task: TaskId, dep: Dependency) {
        self.tasks[task.index()].successors.push(dep);
        let mirror = Dependency { other: task, ..dep };
        self.tasks[dep.other.index()].predecessors.push(mirror);
    }

    /// Validates and freezes the graph.
    pub fn freeze(self) -> Result<ProjectGraph, Vec<StructureError>> {
        let mut errors = Vec::new();

        if self.scenarios.is_empty() {
            errors.push(StructureError::NoScenarios);
        }

        self.check_references(&mut errors);
        self.check_containers(&mut errors);
        self.check_bookings(&mut errors);

        if let Some(cycle) = self.find_cycle() {
            let members = cycle
                .iter()
                .map(|&t| self.tasks[t.index()].path.clone())
                .collect();
            errors.push(StructureError::DependencyCycle { members });
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let topo_order = self.topological_order();
        let (resource_maps, resource_shifts) = self.build_resource_maps();
        let task_maps = self.build_task_maps();

        Ok(ProjectGraph {
            config: self.config,
            grid: self.grid,
            calendars: self.calendars,
            scenarios: self.scenarios,
            resources: self.resources,
            tasks: self.tasks,
            accounts: self.accounts,
            topo_order,
            resource_maps,
            task_maps,
            resource_shifts,
        })
    }

    fn check_references(&self, errors: &mut Vec<StructureError>) {
        for task in &self.tasks {
            for dep in task.predecessors.iter().chain(&task.successors) {
                if dep.other.index() >= self.tasks.len() {
                    errors.push(StructureError::UnknownReference {
                        entity: task.path.clone(),
                        what: format!("task {}", dep.other),
                    });
                }
            }
            for alloc in &task.allocations {
                for &candidate in &alloc.candidates {
                    if candidate.index() >= self.resources.len() {
                        errors.push(StructureError::UnknownReference {
                            entity: task.path.clone(),
                            what: format!("resource {}", candidate),
                        });
                    }
                }
            }
            if let Some(account) = task.account {
                if account.index() >= self.accounts.len() {
                    errors.push(StructureError::UnknownReference {
                        entity: task.path.clone(),
                        what: format!("account {}", account),
                    });
                }
            }
            if let Some(calendar) = task.calendar {
                if calendar.index() >= self.calendars.len() {
                    errors.push(StructureError::UnknownReference {
                        entity: task.path.clone(),
                        what: format!("calendar {}", calendar),
                    });
                }
            }
        }
        for resource in &self.resources {
            if let Some(calendar) = resource.calendar {
                if calendar.index() >= self.calendars.len() {
                    errors.push(StructureError::UnknownReference {
                        entity: resource.path.clone(),
                        what: format!("calendar {}", calendar),
                    });
                }
            }
        }
    }

    fn check_containers(&self, errors: &mut Vec<StructureError>) {
        for task in &self.tasks {
            if !task.is_container() {
                continue;
            }
            let has_work = !task.effort.is_empty()
                || !task.span_slots.is_empty()
                || !task.allocations.is_empty()
                || !task.bookings.is_empty();
            if has_work {
                errors.push(StructureError::ContainerWithWork {
                    task: task.path.clone(),
                });
            }
        }
    }

    fn check_bookings(&self, errors: &mut Vec<StructureError>) {
        for task in &self.tasks {
            for scenario in &self.scenarios {
                let Some(bookings) = task.bookings.get(scenario.id) else {
                    continue;
                };
                for booking in bookings {
                    if booking.resource.index() >= self.resources.len() {
                        errors.push(StructureError::UnknownReference {
                            entity: task.path.clone(),
                            what: format!("resource {}", booking.resource),
                        });
                        continue;
                    }
                    if self.resources[booking.resource.index()].is_group() {
                        errors.push(StructureError::GroupBooked {
                            task: task.path.clone(),
                            resource: self.resources[booking.resource.index()].path.clone(),
                        });
                    }
                    if booking.from >= booking.until || booking.until > self.grid.num_slots() {
                        errors.push(StructureError::InvalidBooking {
                            task: task.path.clone(),
                        });
                    }
                }
            }
        }
    }

    /// Successor edges of the scheduling DAG: declared dependencies plus
    /// implicit container→child edges.
    fn dag_successors(&self, id: TaskId) -> Vec<TaskId> {
        let task = &self.tasks[id.index()];
        let mut out: Vec<TaskId> = task
            .successors
            .iter()
            .filter(|d| d.other.index() < self.tasks.len())
            .map(|d| d.other)
            .collect();
        out.extend(task.children.iter().copied());
        out
    }

    /// DFS cycle search; returns the members of the first cycle found.
    fn find_cycle(&self) -> Option<Vec<TaskId>> {
        let mut visited = FxHashSet::default();
        let mut stack = Vec::new();
        let mut on_stack = FxHashSet::default();
        for start in 0..self.tasks.len() {
            let start = TaskId(start as u32);
            if !visited.contains(&start) {
                if let Some(cycle) =
                    self.cycle_dfs(start, &mut visited, &mut stack, &mut on_stack)
                {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn cycle_dfs(
        &self,
        node: TaskId,
        visited: &mut FxHashSet<TaskId>,
        stack: &mut Vec<TaskId>,
        on_stack: &mut FxHashSet<TaskId>,
    ) -> Option<Vec<TaskId>> {
        visited.insert(node);
        stack.push(node);
        on_stack.insert(node);

        for next in self.dag_successors(node) {
            if on_stack.contains(&next) {
                // Back edge: the cycle is the stack suffix from `next`.
                if let Some(pos) = stack.iter().position(|&t| t == next) {
                    return Some(stack[pos..].to_vec());
                }
            }
            if !visited.contains(&next) {
                if let Some(cycle) = self.cycle_dfs(next, visited, stack, on_stack) {
                    return Some(cycle);
                }
            }
        }

        stack.pop();
        on_stack.remove(&node);
        None
    }

    /// Kahn's algorithm with a min-id ready queue for determinism.
    fn topological_order(&self) -> Vec<TaskId> {
        let n = self.tasks.len();
        let mut in_degree = vec![0usize; n];
        for id in 0..n {
            for succ in self.dag_successors(TaskId(id as u32)) {
                in_degree[succ.index()] += 1;
            }
        }

        let mut ready: BinaryHeap<std::cmp::Reverse<u32>> = (0..n)
            .filter(|&i| in_degree[i] == 0)
            .map(|i| std::cmp::Reverse(i as u32))
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(std::cmp::Reverse(id)) = ready.pop() {
            let id = TaskId(id);
            order.push(id);
            for succ in self.dag_successors(id) {
                in_degree[succ.index()] -= 1;
                if in_degree[succ.index()] == 0 {
                    ready.push(std::cmp::Reverse(succ.0));
                }
            }
        }
        order
    }

    fn resolve_shifts(&self, shifts: &[ShiftAssignment]) -> Vec<ResolvedShift> {
        shifts
            .iter()
            .map(|s| ResolvedShift {
                calendar: s.calendar,
                from: self.clamp_slot(s.from),
                until: self.clamp_slot(s.until),
            })
            .collect()
    }

    fn build_resource_maps(&self) -> (Vec<WorkingMap>, Vec<Vec<ResolvedShift>>) {
        let mut maps = Vec::with_capacity(self.resources.len());
        let mut all_shifts = Vec::with_capacity(self.resources.len());
        for resource in &self.resources {
            let base = &self.calendars[resource.calendar.unwrap_or(CalendarId(0)).index()];
            let shifts = self.resolve_shifts(&resource.shifts);
            maps.push(WorkingMap::build(base, &shifts, &self.calendars, &self.grid));
            all_shifts.push(shifts);
        }
        (maps, all_shifts)
    }

    fn build_task_maps(&self) -> Vec<WorkingMap> {
        self.tasks
            .iter()
            .map(|task| {
                // Calendar inherits through the task forest.
                let mut calendar = task.calendar;
                let mut current = task.parent;
                while calendar.is_none() {
                    match current {
                        Some(p) => {
                            calendar = self.tasks[p.index()].calendar;
                            current = self.tasks[p.index()].parent;
                        }
                        None => break,
                    }
                }
                let base = &self.calendars[calendar.unwrap_or(CalendarId(0)).index()];
                let shifts = self.resolve_shifts(&task.shifts);
                WorkingMap::build(base, &shifts, &self.calendars, &self.grid)
            })
            .collect()
    }
}
