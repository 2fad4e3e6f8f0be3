//! Transition resolution.
//!
//! A firing transition is resolved to concrete target states (random pick,
//! history substitution), then applied within the lowest common ancestor of
//! the source and all targets: the active part below the ancestor is exited,
//! the transition action runs, and the paths down to every target are entered.

use crate::chart::{StateId, StateKind, TargetSet, TransitionSpec};
use crate::error::ScmError;
use crate::machine::Machine;
use crate::state::{NodeKind, PendingLeave};
use rand::Rng;
use std::sync::Arc;

impl Machine {
    /// Fires `transition` owned by `source`.
    pub(crate) fn fire_transition(&mut self, source: StateId, transition: &TransitionSpec) {
        let names: Vec<&String> = match &transition.targets {
            TargetSet::Fixed(targets) => targets.iter().collect(),
            TargetSet::Random(targets) => {
                let pick = self.rng.gen_range(0..targets.len());
                vec![&targets[pick]]
            }
        };

        let chart = Arc::clone(&self.chart);
        let mut targets = Vec::with_capacity(names.len());
        for name in names {
            if let Some(id) = chart.lookup(name) {
                targets.push(id);
            } else if let Some(owner) = chart.history_owner(name) {
                targets.extend(self.history_targets(owner));
            } else {
                tracing::error!("[{}] target '{}' does not exist", chart.id(), name);
                return;
            }
        }

        self.change_state(source, targets, transition.action.clone());
    }

    /// Moves from `source` to `targets`, unless `source` has a leaving delay,
    /// in which case the move is parked until the delay runs out.
    pub(crate) fn change_state(
        &mut self,
        source: StateId,
        targets: Vec<StateId>,
        action: Option<String>,
    ) {
        if targets.is_empty() {
            return;
        }
        self.transition_source = Some(source);
        self.transition_target = targets.first().copied();

        let node = &mut self.nodes[source.0];
        if node.leaving_delay != 0.0 && !node.is_leaving() {
            tracing::debug!(
                "[{}] {} leaving after {}s",
                self.chart.id(),
                self.chart.state(source).uid,
                node.leaving_delay
            );
            node.pending_leave = Some(PendingLeave {
                targets,
                action,
                elapsed: 0.0,
            });
            return;
        }

        self.apply_transition(source, &targets, action.as_deref());
    }

    /// Commits the parked transition of `id`, if any.
    pub(crate) fn commit_leave(&mut self, id: StateId) -> bool {
        match self.nodes[id.0].pending_leave.take() {
            Some(pending) => {
                tracing::debug!(
                    "[{}] {} leaves after {}s",
                    self.chart.id(),
                    self.chart.state(id).uid,
                    pending.elapsed
                );
                self.transition_source = Some(id);
                self.transition_target = pending.targets.first().copied();
                self.apply_transition(id, &pending.targets, pending.action.as_deref());
                true
            }
            None => false,
        }
    }

    /// Exit, action, entry.
    pub(crate) fn apply_transition(
        &mut self,
        source: StateId,
        targets: &[StateId],
        action: Option<&str>,
    ) {
        let chart = Arc::clone(&self.chart);

        if targets.len() > 1 {
            let regions = targets[1..]
                .iter()
                .fold(targets[0], |lca, &t| chart.lca(lca, t));
            if !chart.state(regions).is_parallel() {
                tracing::error!(
                    "[{}] targets of transition from {} share no parallel ancestor",
                    chart.id(),
                    chart.state(source).uid
                );
                return;
            }
        }

        let scope = targets
            .iter()
            .fold(source, |lca, &t| chart.lca(lca, t));

        if targets.len() == 1 && targets[0] == scope {
            // Reentry: the target contains the source (or is it).
            self.transition_source = Some(scope);
            self.exit_state(scope);
            if let Some(action) = action {
                self.run_action(action, false);
            }
            self.enter_state(scope, true);
            return;
        }

        match &self.nodes[scope.0].kind {
            NodeKind::Plain {
                current: Some(child),
                ..
            } => {
                let child = *child;
                self.transition_source = Some(child);
                self.exit_state(child);
            }
            NodeKind::Parallel { .. } => {
                for &region in &chart.state(scope).children {
                    self.exit_state(region);
                }
            }
            _ => {}
        }

        if let Some(action) = action {
            self.run_action(action, false);
        }

        self.enter_paths(scope, targets);
        self.make_sure_entered(scope);
    }

    /// Enters the states between `scope` (exclusive) and each target
    /// (inclusive), outermost first, without entering default children.
    pub(crate) fn enter_paths(&mut self, scope: StateId, targets: &[StateId]) {
        let chart = Arc::clone(&self.chart);
        for &target in targets {
            let mut path = Vec::with_capacity(chart.state(target).depth);
            let mut cur = Some(target);
            while let Some(id) = cur {
                if id == scope {
                    break;
                }
                path.push(id);
                cur = chart.state(id).parent;
            }
            for &id in path.iter().rev() {
                self.enter_state(id, false);
                if !self.nodes[id.0].active || !self.nodes[scope.0].active {
                    return;
                }
            }
        }
    }

    /// Completes entry below `id`: any active compound state without an
    /// active child enters its default child, and every parallel region is
    /// entered.
    pub(crate) fn make_sure_entered(&mut self, id: StateId) {
        self.enter_state(id, true);
        if !self.nodes[id.0].active {
            return;
        }

        let chart = Arc::clone(&self.chart);
        let spec = chart.state(id);
        match spec.kind {
            StateKind::State => match self.nodes[id.0].current() {
                Some(child) => self.make_sure_entered(child),
                None if !spec.children.is_empty() => self.enter_children(id),
                None => {}
            },
            StateKind::Parallel => {
                for &region in &spec.children {
                    if !self.nodes[id.0].active {
                        return;
                    }
                    self.make_sure_entered(region);
                }
            }
            StateKind::Final => {}
        }
    }

    /// Commits a pending leave immediately. This is the only way out of a
    /// state with a negative leaving delay.
    pub fn release_leave(&mut self, uid: &str) -> Result<bool, ScmError> {
        let id = self.require_state(uid)?;
        self.require_started()?;
        let released = self.with_dispatch(|m| m.commit_leave(id));
        Ok(released)
    }

    /// Changes the leaving delay of `uid` at runtime.
    pub fn set_leaving_delay(
        &mut self,
        uid: &str,
        seconds: f64,
    ) -> Result<(), ScmError> {
        let id = self.require_state(uid)?;
        self.nodes[id.0].leaving_delay = seconds;
        Ok(())
    }
}
