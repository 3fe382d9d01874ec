//! Per-scenario attribute overlay.
//!
//! Scenario-specific attributes are stored in dense per-entity tables
//! indexed by scenario id. A read resolves, in order: the explicit value
//! for the queried scenario, then the scenario's parent chain, then the
//! caller-supplied fallback (typically the parent entity's table under
//! the same scenario, then a documented default). No runtime attribute
//! dictionary exists; each attribute is a typed field.

use serde::{Deserialize, Serialize};

use crate::models::ids::ScenarioId;
use crate::models::project::ScenarioDef;

/// A typed attribute with one optional value per scenario.
///
/// # Example
/// ```
/// use project_scheduler_core_rs::models::{PerScenario, ScenarioDef};
/// use project_scheduler_core_rs::models::ids::ScenarioId;
///
/// let scenarios = vec![
///     ScenarioDef::new(ScenarioId(0), "plan", None),
///     ScenarioDef::new(ScenarioId(1), "actual", Some(ScenarioId(0))),
/// ];
/// let mut effort = PerScenario::new(scenarios.len());
/// effort.set(ScenarioId(0), 16.0);
///
/// // The child scenario inherits the parent's value until set.
/// assert_eq!(effort.resolve(ScenarioId(1), &scenarios), Some(&16.0));
/// effort.set(ScenarioId(1), 24.0);
/// assert_eq!(effort.resolve(ScenarioId(1), &scenarios), Some(&24.0));
/// assert_eq!(effort.resolve(ScenarioId(0), &scenarios), Some(&16.0));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerScenario<T> {
    values: Vec<Option<T>>,
}

impl<T> Default for PerScenario<T> {
    fn default() -> Self {
        Self { values: Vec::new() }
    }
}

impl<T> PerScenario<T> {
    /// Table with no explicit values for `num_scenarios` scenarios.
    pub fn new(num_scenarios: usize) -> Self {
        Self {
            values: (0..num_scenarios).map(|_| None).collect(),
        }
    }

    /// Sets the explicit value for one scenario, growing the table as
    /// needed.
    pub fn set(&mut self, scenario: ScenarioId, value: T) {
        if self.values.len() <= scenario.index() {
            self.values.resize_with(scenario.index() + 1, || None);
        }
        self.values[scenario.index()] = Some(value);
    }

    /// Explicit value for one scenario; no inheritance.
    pub fn get(&self, scenario: ScenarioId) -> Option<&T> {
        self.values.get(scenario.index()).and_then(|v| v.as_ref())
    }

    /// Resolves through the scenario parent chain.
    pub fn resolve<'a>(
        &'a self,
        scenario: ScenarioId,
        scenarios: &[ScenarioDef],
    ) -> Option<&'a T> {
        let mut current = Some(scenario);
        while let Some(id) = current {
            if let Some(value) = self.get(id) {
                return Some(value);
            }
            current = scenarios[id.index()].parent;
        }
        None
    }

    /// Whether any scenario carries an explicit value.
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|v| v.is_none())
    }
}
