//! Shallow and deep history.
//!
//! Every compound state with a history type remembers its last entered
//! child. Deep history is propagated to all descendants when the chart is
//! compiled, so restoring a deep configuration is just each level resuming
//! its own remembered child.

use crate::chart::StateId;
use crate::error::ScmError;
use crate::machine::Machine;
use crate::state::NodeKind;
use serde::{Deserialize, Serialize};

/// History type of a compound state or history marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryType {
    #[default]
    Shallow,
    Deep,
}

/// Parses the built-in `clh(uid)` / `clh(uid*)` action names.
/// Returns the uid and whether the clear is deep.
pub(crate) fn parse_clear_history(name: &str) -> Option<(&str, bool)> {
    let inner = name.strip_prefix("clh(")?.strip_suffix(')')?;
    match inner.strip_suffix('*') {
        Some(uid) => Some((uid, true)),
        None => Some((inner, false)),
    }
}

impl Machine {
    /// States a history marker owned by `owner` currently resolves to: the
    /// remembered child, else the declared initial targets, else the first
    /// child.
    pub(crate) fn history_targets(&self, owner: StateId) -> Vec<StateId> {
        if let NodeKind::Plain {
            history: Some(child),
            ..
        } = &self.nodes[owner.0].kind
        {
            return vec![*child];
        }

        let spec = self.chart.state(owner);
        let initial: Vec<StateId> = spec
            .initial
            .iter()
            .filter_map(|uid| self.chart.lookup(uid))
            .collect();
        if !initial.is_empty() {
            return initial;
        }
        vec![spec.children.first().copied().unwrap_or(owner)]
    }

    pub(crate) fn clear_history_of(&mut self, id: StateId, deep: bool) {
        if let NodeKind::Plain { history, .. } = &mut self.nodes[id.0].kind {
            *history = None;
        }
        tracing::debug!(
            "[{}] cleared {}history of {}",
            self.chart.id(),
            if deep { "deep " } else { "" },
            self.chart.state(id).uid
        );
        if deep {
            let chart = self.chart.clone();
            for &child in &chart.state(id).children {
                self.clear_history_of(child, true);
            }
        }
    }

    /// Forgets the remembered child of `uid`.
    pub fn clear_history(&mut self, uid: &str) -> Result<(), ScmError> {
        let id = self.require_state(uid)?;
        self.clear_history_of(id, false);
        Ok(())
    }

    /// Forgets the remembered children of `uid` and all its descendants.
    pub fn clear_deep_history(&mut self, uid: &str) -> Result<(), ScmError> {
        let id = self.require_state(uid)?;
        self.clear_history_of(id, true);
        Ok(())
    }

    /// The child `uid` will resume, if it remembers one.
    pub fn remembered_child(&self, uid: &str) -> Option<&str> {
        let id = self.chart.lookup(uid)?;
        match &self.nodes[id.0].kind {
            NodeKind::Plain {
                history: Some(child),
                ..
            } => Some(self.chart.state(*child).uid.as_str()),
            _ => None,
        }
    }
}
