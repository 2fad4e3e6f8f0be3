//! Runtime state nodes.
//!
//! The runtime tree mirrors the compiled chart: `Machine::nodes[i]` holds the
//! mutable flags of `chart.state(StateId(i))`. Hierarchy links live in the
//! shared chart, so nodes only carry what changes while the machine runs.

use crate::chart::{StateId, StateKind, StateSpec, DONE_STATE_PREFIX};
use crate::machine::Machine;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Kind-specific runtime data.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeKind {
    /// Plain (compound or atomic) state: at most one active child.
    Plain {
        current: Option<StateId>,
        history: Option<StateId>,
    },
    /// All children active; tracks which of them have completed.
    Parallel { finished: BTreeSet<StateId> },
    Final,
}

/// A transition captured while its source waits out a leaving delay.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingLeave {
    pub targets: Vec<StateId>,
    pub action: Option<String>,
    pub elapsed: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StateNode {
    pub active: bool,
    pub done: bool,
    /// Seconds since the state was last entered.
    pub elapsed: f64,
    /// Number of times the state has been entered.
    pub entries: u64,
    pub leaving_delay: f64,
    pub pending_leave: Option<PendingLeave>,
    pub kind: NodeKind,
}

impl StateNode {
    pub fn new(spec: &StateSpec) -> Self {
        let kind = match spec.kind {
            StateKind::State => NodeKind::Plain {
                current: None,
                history: None,
            },
            StateKind::Parallel => NodeKind::Parallel {
                finished: BTreeSet::new(),
            },
            StateKind::Final => NodeKind::Final,
        };
        Self {
            active: false,
            done: false,
            elapsed: 0.0,
            entries: 0,
            leaving_delay: spec.leaving_delay,
            pending_leave: None,
            kind,
        }
    }

    /// Marks the node inactive without running hooks. History survives.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.done = false;
        self.pending_leave = None;
        match &mut self.kind {
            NodeKind::Plain { current, .. } => *current = None,
            NodeKind::Parallel { finished } => finished.clear(),
            NodeKind::Final => {}
        }
    }

    pub fn is_leaving(&self) -> bool {
        self.pending_leave.is_some()
    }

    pub fn current(&self) -> Option<StateId> {
        match &self.kind {
            NodeKind::Plain { current, .. } => *current,
            _ => None,
        }
    }
}

impl Machine {
    /// Enters `id`. With `enter_children` the state continues into its
    /// remembered, initial or first child (all children for a parallel).
    pub(crate) fn enter_state(&mut self, id: StateId, enter_children: bool) {
        if self.nodes[id.0].active {
            return;
        }

        let chart = Arc::clone(&self.chart);
        let spec = chart.state(id);

        if let Some(parent) = spec.parent {
            let keep_history = chart.state(parent).history.is_some();
            if let NodeKind::Plain { current, history } = &mut self.nodes[parent.0].kind {
                *current = Some(id);
                if keep_history {
                    *history = Some(id);
                }
            }
        }

        let node = &mut self.nodes[id.0];
        node.active = true;
        node.done = false;
        node.elapsed = 0.0;
        node.entries += 1;
        node.pending_leave = None;
        if let NodeKind::Parallel { finished } = &mut node.kind {
            finished.clear();
        }
        self.current_leaf = id;

        tracing::debug!("[{}] enter {}", chart.id(), spec.uid);
        self.run_hook(&spec.onentry);

        // The entry hook may already have moved the machine elsewhere.
        if !self.nodes[id.0].active {
            return;
        }

        if enter_children {
            self.enter_children(id);
        }

        if spec.is_final() {
            if let Some(parent) = spec.parent {
                self.nodes[parent.0].done = true;
                self.enqueue(format!("{}{}", DONE_STATE_PREFIX, chart.state(parent).uid));
            }
        }
    }

    /// Enters the default children of an active state.
    pub(crate) fn enter_children(&mut self, id: StateId) {
        let chart = Arc::clone(&self.chart);
        let spec = chart.state(id);

        match &self.nodes[id.0].kind {
            NodeKind::Final => {}
            NodeKind::Parallel { .. } => {
                for &child in &spec.children {
                    if !self.nodes[id.0].active {
                        return;
                    }
                    self.enter_state(child, true);
                }
            }
            NodeKind::Plain { history, .. } => {
                if spec.children.is_empty() {
                    return;
                }
                let remembered = history.filter(|_| spec.history.is_some());
                if let Some(child) = remembered {
                    self.enter_state(child, true);
                } else if !spec.initial.is_empty() {
                    let targets: Vec<StateId> = spec
                        .initial
                        .iter()
                        .filter_map(|uid| chart.lookup(uid))
                        .collect();
                    self.enter_paths(id, &targets);
                    if let Some(child) = self.nodes[id.0].current() {
                        self.make_sure_entered(child);
                    }
                } else {
                    self.enter_state(spec.children[0], true);
                }
            }
        }
    }

    /// Exits `id` and everything active below it, children first.
    pub(crate) fn exit_state(&mut self, id: StateId) {
        if !self.nodes[id.0].active {
            return;
        }

        let chart = Arc::clone(&self.chart);
        let spec = chart.state(id);

        match &self.nodes[id.0].kind {
            NodeKind::Plain {
                current: Some(child),
                ..
            } => {
                let child = *child;
                self.exit_state(child);
            }
            NodeKind::Parallel { .. } => {
                for &child in &spec.children {
                    self.exit_state(child);
                }
            }
            _ => {}
        }

        let node = &mut self.nodes[id.0];
        node.active = false;
        node.pending_leave = None;
        if let NodeKind::Plain { current, .. } = &mut node.kind {
            *current = None;
        }
        if let Some(parent) = spec.parent {
            let parent = &mut self.nodes[parent.0];
            match &mut parent.kind {
                NodeKind::Plain { current, .. } => {
                    if *current == Some(id) {
                        *current = None;
                    }
                }
                NodeKind::Parallel { finished } => {
                    if finished.remove(&id) {
                        parent.done = false;
                    }
                }
                NodeKind::Final => {}
            }
        }
        self.current_leaf = id;

        tracing::debug!("[{}] exit {}", chart.id(), spec.uid);
        self.run_hook(&spec.onexit);
    }

    /// Offers `event` to `id` and its active descendants, outermost first.
    /// Returns whether some transition fired.
    pub(crate) fn handle_in(&mut self, id: StateId, event: &str) -> bool {
        let node = &self.nodes[id.0];
        if !node.active || node.done || node.is_leaving() {
            return false;
        }

        let chart = Arc::clone(&self.chart);
        let spec = chart.state(id);

        if spec.is_parallel() {
            let completed = event
                .strip_prefix(DONE_STATE_PREFIX)
                .and_then(|uid| chart.lookup(uid))
                .filter(|child| chart.state(*child).parent == Some(id));
            if let (Some(child), NodeKind::Parallel { finished }) =
                (completed, &mut self.nodes[id.0].kind)
            {
                finished.insert(child);
            }
        }

        for transition in &spec.transitions {
            if transition.event == event && self.guard_passes(transition.guard.as_ref()) {
                tracing::debug!(
                    "[{}] {} handles '{}'",
                    chart.id(),
                    spec.uid,
                    event
                );
                self.fire_transition(id, transition);
                return true;
            }
        }

        match self.nodes[id.0].kind {
            NodeKind::Plain {
                current: Some(child),
                ..
            } => self.handle_in(child, event),
            NodeKind::Parallel { .. } => {
                let entries = self.region_entries(id);
                let mut handled = false;
                for (&child, before) in spec.children.iter().zip(entries) {
                    if !self.nodes[id.0].active {
                        return handled;
                    }
                    // Re-entered by a sibling region's transition: this event
                    // has already been handled.
                    if self.nodes[child.0].entries != before {
                        break;
                    }
                    handled |= self.handle_in(child, event);
                }
                self.check_parallel_done(id);
                handled
            }
            _ => false,
        }
    }

    fn region_entries(&self, id: StateId) -> Vec<u64> {
        self.chart
            .state(id)
            .children
            .iter()
            .map(|c| self.nodes[c.0].entries)
            .collect()
    }

    /// Signals completion once every region of a parallel state is done.
    fn check_parallel_done(&mut self, id: StateId) {
        let regions = self.chart.state(id).children.len();
        let node = &mut self.nodes[id.0];
        if !node.active || node.done {
            return;
        }
        let complete = matches!(&node.kind, NodeKind::Parallel { finished } if finished.len() == regions);
        if complete {
            node.done = true;
            let event = format!("{}{}", DONE_STATE_PREFIX, self.chart.state(id).uid);
            tracing::debug!("[{}] all regions done, raising {}", self.chart.id(), event);
            self.enqueue(event);
        }
    }

    /// Advances `id` by `dt`: pending leave, children, event-less
    /// transitions, then the tick hook. `leaving_above` suppresses event-less
    /// transitions below a state that is waiting to leave.
    pub(crate) fn tick_state(&mut self, id: StateId, dt: f64, leaving_above: bool) {
        if !self.nodes[id.0].active {
            return;
        }

        let chart = Arc::clone(&self.chart);
        let spec = chart.state(id);

        let node = &mut self.nodes[id.0];
        node.elapsed += dt;
        let delay = node.leaving_delay;
        let mut leaving = leaving_above;
        if let Some(pending) = node.pending_leave.as_mut() {
            pending.elapsed += dt;
            if delay >= 0.0 && pending.elapsed >= delay {
                self.commit_leave(id);
                return;
            }
            leaving = true;
        }

        match self.nodes[id.0].kind {
            NodeKind::Plain {
                current: Some(child),
                ..
            } => self.tick_state(child, dt, leaving),
            NodeKind::Parallel { .. } => {
                let entries = self.region_entries(id);
                for (&child, before) in spec.children.iter().zip(entries) {
                    if !self.nodes[id.0].active {
                        return;
                    }
                    if self.nodes[child.0].entries != before {
                        break;
                    }
                    self.tick_state(child, dt, leaving);
                }
            }
            _ => {}
        }
        if !self.nodes[id.0].active {
            return;
        }

        if !leaving {
            let eventless = spec.transitions.iter().filter(|t| t.is_eventless());
            for transition in eventless {
                if self.guard_passes(transition.guard.as_ref()) {
                    tracing::debug!("[{}] {} takes event-less transition", chart.id(), spec.uid);
                    self.fire_transition(id, transition);
                    break;
                }
            }
            if !self.nodes[id.0].active {
                return;
            }
        }

        self.run_tick_hook(&spec.on_tick, dt);
    }
}
