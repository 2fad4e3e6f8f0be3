//! Per-machine hook bindings.
//!
//! Charts refer to guards, actions and tick callbacks by name. The embedding
//! binds those names before starting the machine. Hooks receive the machine
//! so they can post events, schedule timers or inspect the configuration.

use crate::chart::{Chart, HookName};
use crate::error::{HookKind, ScmError};
use crate::guard::{Guard, GuardEvaluator};
use crate::history::parse_clear_history;
use crate::machine::Machine;
use std::collections::HashMap;
use std::rc::Rc;

pub type GuardFn = Rc<dyn Fn(&Machine) -> bool>;
pub type ActionFn = Rc<dyn Fn(&mut Machine)>;
pub type TickFn = Rc<dyn Fn(&mut Machine, f64)>;

/// Name to callback mapping for one machine.
#[derive(Clone, Default)]
pub struct Bindings {
    guards: HashMap<String, GuardFn>,
    actions: HashMap<String, ActionFn>,
    ticks: HashMap<String, TickFn>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_guard<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&Machine) -> bool + 'static,
    {
        self.guards.insert(name.into(), Rc::new(f));
    }

    pub fn bind_action<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&mut Machine) + 'static,
    {
        self.actions.insert(name.into(), Rc::new(f));
    }

    pub fn bind_tick<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&mut Machine, f64) + 'static,
    {
        self.ticks.insert(name.into(), Rc::new(f));
    }

    pub fn unbind(&mut self, name: &str) {
        self.guards.remove(name);
        self.actions.remove(name);
        self.ticks.remove(name);
    }

    pub fn guard(&self, name: &str) -> Option<GuardFn> {
        self.guards.get(name).cloned()
    }

    pub fn action(&self, name: &str) -> Option<ActionFn> {
        self.actions.get(name).cloned()
    }

    pub fn tick(&self, name: &str) -> Option<TickFn> {
        self.ticks.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.guards.len() + self.actions.len() + self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks that every explicitly named hook in `chart` has a binding.
    /// Defaulted entry/exit/tick names are optional.
    pub fn validate(&self, chart: &Chart) -> Result<(), ScmError> {
        for (_, spec) in chart.states() {
            let missing = |kind: HookKind, name: &str| ScmError::MissingBinding {
                kind,
                name: name.to_string(),
                state: spec.uid.clone(),
            };

            for hook in [&spec.onentry, &spec.onexit] {
                if !hook.defaulted && !self.has_action(&hook.name, chart) {
                    return Err(missing(HookKind::Action, &hook.name));
                }
            }
            if !spec.on_tick.defaulted && !self.ticks.contains_key(&spec.on_tick.name) {
                return Err(missing(HookKind::Tick, &spec.on_tick.name));
            }

            for t in &spec.transitions {
                if let Some(name) = t.guard.as_ref().and_then(|g| g.predicate_name()) {
                    if !self.guards.contains_key(name) {
                        return Err(missing(HookKind::Guard, name));
                    }
                }
                if let Some(action) = &t.action {
                    if !self.has_action(action, chart) {
                        return Err(missing(HookKind::Action, action));
                    }
                }
            }
        }
        Ok(())
    }

    fn has_action(&self, name: &str, chart: &Chart) -> bool {
        match parse_clear_history(name) {
            Some((uid, _)) => chart.lookup(uid).is_some(),
            None => self.actions.contains_key(name),
        }
    }
}

impl std::fmt::Debug for Bindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut guards: Vec<_> = self.guards.keys().collect();
        let mut actions: Vec<_> = self.actions.keys().collect();
        let mut ticks: Vec<_> = self.ticks.keys().collect();
        guards.sort();
        actions.sort();
        ticks.sort();
        f.debug_struct("Bindings")
            .field("guards", &guards)
            .field("actions", &actions)
            .field("ticks", &ticks)
            .finish()
    }
}

impl Machine {
    /// Runs an entry/exit hook. Defaulted names without a binding are skipped.
    pub(crate) fn run_hook(&mut self, hook: &HookName) {
        self.run_action(&hook.name, hook.defaulted);
    }

    /// Runs a named action. `clh(uid)` and `clh(uid*)` clear history without
    /// a binding.
    pub(crate) fn run_action(&mut self, name: &str, optional: bool) {
        if let Some((uid, deep)) = parse_clear_history(name) {
            if let Some(id) = self.chart.lookup(uid) {
                self.clear_history_of(id, deep);
            }
            return;
        }
        match self.bindings.action(name) {
            Some(action) => {
                if self.trace_hooks {
                    tracing::debug!("[{}] action {}", self.chart.id(), name);
                }
                action(self);
            }
            None if optional => {}
            None => tracing::warn!("[{}] action '{}' has no binding", self.chart.id(), name),
        }
    }

    pub(crate) fn run_tick_hook(&mut self, hook: &HookName, dt: f64) {
        match self.bindings.tick(&hook.name) {
            Some(tick) => tick(self, dt),
            None if hook.defaulted => {}
            None => tracing::warn!(
                "[{}] tick hook '{}' has no binding",
                self.chart.id(),
                hook.name
            ),
        }
    }

    /// Evaluates an optional transition guard. Unbound predicates are false.
    pub(crate) fn guard_passes(&self, guard: Option<&Guard>) -> bool {
        GuardEvaluator::evaluate_opt(
            guard,
            |name| match self.bindings.guard(name) {
                Some(predicate) => predicate(self),
                None => {
                    tracing::warn!("[{}] guard '{}' has no binding", self.chart.id(), name);
                    false
                }
            },
            |uid| self.is_in(uid),
        )
    }
}
