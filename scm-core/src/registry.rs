//! Chart registry.
//!
//! Stores compiled charts by id together with a prototype runtime tree.
//! Machines are instantiated by deep-copying the prototype, so the compiled
//! chart is the only state shared between instances.

use crate::chart::Chart;
use crate::error::ScmError;
use crate::machine::Machine;
use crate::state::StateNode;
use dashmap::DashMap;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// A compiled chart and the pristine runtime tree machines start from.
#[derive(Debug)]
pub struct CompiledChart {
    chart: Arc<Chart>,
    prototype: Vec<StateNode>,
}

impl CompiledChart {
    pub fn new(chart: Chart) -> Self {
        let prototype = chart.states().map(|(_, spec)| StateNode::new(spec)).collect();
        Self {
            chart: Arc::new(chart),
            prototype,
        }
    }

    pub fn chart(&self) -> &Arc<Chart> {
        &self.chart
    }

    /// A fresh, stopped machine with no bindings.
    pub fn instantiate(&self) -> Machine {
        Machine::from_parts(Arc::clone(&self.chart), self.prototype.clone())
    }
}

/// Registry of compiled charts keyed by chart id.
#[derive(Debug, Default)]
pub struct ChartRegistry {
    charts: DashMap<String, Arc<CompiledChart>>,
}

impl ChartRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a chart. Registering the same definition again is a no-op;
    /// a different definition under an existing id is rejected.
    ///
    /// Returns the checksum and whether the chart was newly added.
    pub fn put_chart(&self, chart: Chart) -> Result<(String, bool), ScmError> {
        let id = chart.id().to_string();

        if let Some(existing) = self.charts.get(&id) {
            if existing.chart.checksum() == chart.checksum() {
                return Ok((existing.chart.checksum().to_string(), false));
            }
            return Err(ScmError::ChartExists { chart: id });
        }

        let checksum = chart.checksum().to_string();
        tracing::info!(
            "registered chart '{}' ({} states, checksum {})",
            id,
            chart.len(),
            checksum
        );
        self.charts.insert(id, Arc::new(CompiledChart::new(chart)));

        Ok((checksum, true))
    }

    /// Parses, validates and registers a chart from JSON.
    pub fn put_chart_json(&self, json: &Value) -> Result<(String, bool), ScmError> {
        self.put_chart(Chart::from_json(json)?)
    }

    /// Loads a chart document (JSON or YAML) and registers it. Returns the
    /// chart id.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<String, ScmError> {
        let chart = Chart::from_file(path)?;
        let id = chart.id().to_string();
        self.put_chart(chart)?;
        Ok(id)
    }

    pub fn get_chart(&self, id: &str) -> Result<Arc<CompiledChart>, ScmError> {
        self.charts
            .get(id)
            .map(|r| r.clone())
            .ok_or_else(|| ScmError::ChartNotFound {
                chart: id.to_string(),
            })
    }

    /// Registered chart ids, sorted.
    pub fn list_charts(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.charts.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// A fresh machine for chart `id`.
    pub fn instantiate(&self, id: &str) -> Result<Machine, ScmError> {
        let compiled = self.get_chart(id)?;
        tracing::debug!("instantiating chart '{}'", id);
        Ok(compiled.instantiate())
    }

    pub fn remove_chart(&self, id: &str) -> Result<(), ScmError> {
        self.charts
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ScmError::ChartNotFound {
                chart: id.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }
}
