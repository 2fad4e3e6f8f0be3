//! Chart definitions.
//!
//! Charts use a nested JSON/YAML document:
//!
//! ```json
//! {
//!   "id": "candy",
//!   "states": [
//!     {"id": "idle", "transitions": [{"event": "coin", "target": "active"}]},
//!     {"id": "active", "transitions": [
//!       {"event": "release-candy", "action": "releaseCandy", "target": "releasing"}
//!     ]},
//!     {"id": "releasing", "transitions": [
//!       {"event": "candy-released", "cond": "condNoCandy", "target": "disabled"},
//!       {"event": "candy-released", "target": "idle"}
//!     ]},
//!     {"id": "disabled"}
//!   ]
//! }
//! ```
//!
//! A [`ChartDef`] is the raw document. [`Chart::compile`] validates it and
//! produces the immutable, indexed [`Chart`] that machines share.

use crate::error::ScmError;
use crate::guard::{Guard, GuardKind};
use crate::history::HistoryType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

/// Prefix of the synthetic completion event, followed by the state uid.
pub const DONE_STATE_PREFIX: &str = "done.state.";

/// Index of a state inside a compiled chart. The root is always `StateId(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(pub usize);

impl StateId {
    pub const ROOT: StateId = StateId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// Kind of a state node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateKind {
    #[default]
    State,
    Parallel,
    Final,
}

// ============================================================================
// Raw document
// ============================================================================

/// Raw chart definition as stored/transmitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartDef {
    /// Chart id. Also the uid of the root state.
    pub id: String,

    /// Initial child (or children) of the root.
    #[serde(
        default,
        deserialize_with = "deserialize_targets",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub initial: Vec<String>,

    /// Local ids that are qualified by their parent's uid.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub non_unique: Vec<String>,

    /// Top-level states.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<StateDef>,

    /// Transitions owned by the root.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<TransitionDef>,

    /// Optional metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

/// Raw state definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDef {
    /// Local id. Anonymous states get a generated `_st<N>` id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub kind: StateKind,

    #[serde(
        default,
        deserialize_with = "deserialize_targets",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub initial: Vec<String>,

    /// History type of this compound state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<HistoryType>,

    /// History markers usable as transition targets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history_states: Vec<HistoryDef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onentry: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onexit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_tick: Option<String>,

    /// Seconds to stay in the state after a transition out of it fires.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub leaving_delay: f64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<TransitionDef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<StateDef>,
}

/// History marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryDef {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: HistoryType,
}

/// Raw transition definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitionDef {
    /// Triggering event. Empty means evaluated on every tick.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub event: String,

    /// Optional guard expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cond: Option<String>,

    /// Action fired between exit and entry.
    #[serde(default, alias = "ontransit", skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    /// Target(s). A string may hold several comma separated targets.
    #[serde(
        default,
        deserialize_with = "deserialize_targets",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub target: Vec<String>,

    /// One of these is picked uniformly at fire time.
    #[serde(
        default,
        deserialize_with = "deserialize_targets",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub random_target: Vec<String>,
}

fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

/// Splits a target attribute on commas and whitespace.
fn split_targets(s: &str) -> Vec<String> {
    s.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

fn deserialize_targets<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};
    use std::fmt;

    struct TargetsVisitor;

    impl<'de> Visitor<'de> for TargetsVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or array of strings")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(split_targets(v))
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Vec::new())
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut targets = Vec::new();
            while let Some(s) = seq.next_element::<String>()? {
                targets.extend(split_targets(&s));
            }
            Ok(targets)
        }
    }

    deserializer.deserialize_any(TargetsVisitor)
}

impl ChartDef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_state(mut self, state: StateDef) -> Self {
        self.states.push(state);
        self
    }

    pub fn with_transition(mut self, transition: TransitionDef) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn with_initial(mut self, initial: &str) -> Self {
        self.initial = split_targets(initial);
        self
    }

    pub fn with_non_unique(mut self, ids: &[&str]) -> Self {
        self.non_unique.extend(ids.iter().map(|s| s.to_string()));
        self
    }
}

impl StateDef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn anonymous(kind: StateKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn parallel(id: impl Into<String>) -> Self {
        Self {
            kind: StateKind::Parallel,
            ..Self::new(id)
        }
    }

    pub fn final_state(id: impl Into<String>) -> Self {
        Self {
            kind: StateKind::Final,
            ..Self::new(id)
        }
    }

    pub fn with_state(mut self, state: StateDef) -> Self {
        self.states.push(state);
        self
    }

    pub fn with_transition(mut self, transition: TransitionDef) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn with_initial(mut self, initial: &str) -> Self {
        self.initial = split_targets(initial);
        self
    }

    pub fn with_history(mut self, kind: HistoryType) -> Self {
        self.history = Some(kind);
        self
    }

    pub fn with_history_state(mut self, id: impl Into<String>, kind: HistoryType) -> Self {
        self.history_states.push(HistoryDef {
            id: id.into(),
            kind,
        });
        self
    }

    pub fn with_leaving_delay(mut self, seconds: f64) -> Self {
        self.leaving_delay = seconds;
        self
    }

    pub fn with_on_tick(mut self, name: impl Into<String>) -> Self {
        self.on_tick = Some(name.into());
        self
    }
}

impl TransitionDef {
    /// A transition on `event` to `target` (comma separated for several).
    pub fn new(event: impl Into<String>, target: &str) -> Self {
        Self {
            event: event.into(),
            target: split_targets(target),
            ..Default::default()
        }
    }

    /// An event-less transition, evaluated every tick.
    pub fn always(target: &str) -> Self {
        Self::new("", target)
    }

    pub fn random(event: impl Into<String>, targets: &[&str]) -> Self {
        Self {
            event: event.into(),
            random_target: targets.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_cond(mut self, cond: impl Into<String>) -> Self {
        self.cond = Some(cond.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }
}

// ============================================================================
// Compiled chart
// ============================================================================

/// A hook name and whether it was derived from the state uid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookName {
    pub name: String,
    /// Defaulted hooks are optional: a missing binding is not an error.
    pub defaulted: bool,
}

impl HookName {
    fn resolve(declared: Option<&String>, default: String) -> Self {
        match declared {
            Some(name) if !name.is_empty() => Self {
                name: name.clone(),
                defaulted: false,
            },
            _ => Self {
                name: default,
                defaulted: true,
            },
        }
    }
}

/// Resolved transition targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSet {
    /// All listed targets are entered. Several targets address distinct
    /// regions of one parallel state.
    Fixed(Vec<String>),
    /// One target picked uniformly at fire time.
    Random(Vec<String>),
}

/// A validated transition. Targets hold state uids or history ids.
#[derive(Debug, Clone)]
pub struct TransitionSpec {
    pub event: String,
    pub guard: Option<Guard>,
    pub action: Option<String>,
    pub targets: TargetSet,
}

impl TransitionSpec {
    pub fn is_eventless(&self) -> bool {
        self.event.is_empty()
    }
}

/// A validated state.
#[derive(Debug, Clone)]
pub struct StateSpec {
    pub uid: String,
    pub local_id: String,
    pub kind: StateKind,
    pub parent: Option<StateId>,
    pub children: Vec<StateId>,
    pub depth: usize,
    /// Resolved initial target uids. Empty means the first child.
    pub initial: Vec<String>,
    /// Effective history type (deep propagates to descendants).
    pub history: Option<HistoryType>,
    pub onentry: HookName,
    pub onexit: HookName,
    pub on_tick: HookName,
    pub leaving_delay: f64,
    pub transitions: Vec<TransitionSpec>,
}

impl StateSpec {
    pub fn is_final(&self) -> bool {
        self.kind == StateKind::Final
    }

    pub fn is_parallel(&self) -> bool {
        self.kind == StateKind::Parallel
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Validated and indexed chart shared by all machines built from it.
#[derive(Debug, Clone)]
pub struct Chart {
    id: String,
    states: Vec<StateSpec>,
    index: HashMap<String, StateId>,
    history_owner: HashMap<String, StateId>,
    raw: ChartDef,
    checksum: String,
}

/// Pending transition definitions collected during the first compile pass.
struct Unresolved<'a> {
    state: StateId,
    initial: &'a [String],
    transitions: &'a [TransitionDef],
}

impl Chart {
    /// Parses and validates a chart from a JSON value.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, ScmError> {
        let raw: ChartDef = serde_json::from_value(json.clone())?;
        Self::compile(raw)
    }

    /// Parses and validates a chart document, JSON or YAML.
    pub fn parse(text: &str) -> Result<Self, ScmError> {
        let raw: ChartDef = if text.trim_start().starts_with('{') {
            serde_json::from_str(text)?
        } else {
            serde_yaml::from_str(text)?
        };
        Self::compile(raw)
    }

    /// Loads a chart document from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScmError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ScmError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let raw: ChartDef = match ext {
            "json" => serde_json::from_str(&text)?,
            "yaml" | "yml" => serde_yaml::from_str(&text)?,
            _ => return Self::parse(&text),
        };
        Self::compile(raw)
    }

    /// Validates a raw definition and builds the indexed chart.
    pub fn compile(raw: ChartDef) -> Result<Self, ScmError> {
        if raw.id.is_empty() {
            return Err(ScmError::InvalidChart {
                chart: String::new(),
                reason: "chart id is empty".to_string(),
            });
        }

        let mut chart = Chart {
            id: raw.id.clone(),
            states: Vec::new(),
            index: HashMap::new(),
            history_owner: HashMap::new(),
            raw: ChartDef::default(),
            checksum: String::new(),
        };
        let non_unique: HashSet<&str> = raw.non_unique.iter().map(|s| s.as_str()).collect();

        // Pass 1: build the hierarchy.
        let mut pending = Vec::new();
        chart.states.push(StateSpec {
            uid: raw.id.clone(),
            local_id: raw.id.clone(),
            kind: StateKind::State,
            parent: None,
            children: Vec::new(),
            depth: 0,
            initial: Vec::new(),
            history: None,
            onentry: HookName::resolve(None, format!("onentry_{}", raw.id)),
            onexit: HookName::resolve(None, format!("onexit_{}", raw.id)),
            on_tick: HookName::resolve(None, raw.id.clone()),
            leaving_delay: 0.0,
            transitions: Vec::new(),
        });
        chart.index.insert(raw.id.clone(), StateId::ROOT);
        pending.push(Unresolved {
            state: StateId::ROOT,
            initial: &raw.initial,
            transitions: &raw.transitions,
        });
        for def in &raw.states {
            chart.add_state(def, StateId::ROOT, &non_unique, &mut pending)?;
        }

        // Pass 2: resolve names now that every state exists.
        for item in pending {
            let initial = item
                .initial
                .iter()
                .map(|name| chart.resolve_state(item.state, name))
                .collect::<Result<Vec<_>, _>>()?;
            for uid in &initial {
                let inside = chart
                    .lookup(uid)
                    .is_some_and(|t| t != item.state && chart.is_descendant(t, item.state));
                if !inside {
                    return Err(ScmError::InvalidChart {
                        chart: chart.id.clone(),
                        reason: format!(
                            "initial '{}' of '{}' is not a descendant",
                            uid, chart.states[item.state.0].uid
                        ),
                    });
                }
            }
            if initial.len() > 1 {
                let uid = chart.states[item.state.0].uid.clone();
                chart.check_parallel_targets(&uid, &initial)?;
            }
            let mut transitions = Vec::with_capacity(item.transitions.len());
            for t in item.transitions {
                transitions.push(chart.resolve_transition(item.state, t)?);
            }
            let spec = &mut chart.states[item.state.0];
            spec.initial = initial;
            spec.transitions = transitions;
        }

        // Compute checksum
        let json_bytes = serde_json::to_vec(&raw)?;
        chart.checksum = format!("{:08x}", crc32c::crc32c(&json_bytes));
        chart.raw = raw;

        tracing::debug!(
            "compiled chart '{}': {} states, checksum {}",
            chart.id,
            chart.states.len(),
            chart.checksum
        );

        Ok(chart)
    }

    fn add_state<'a>(
        &mut self,
        def: &'a StateDef,
        parent: StateId,
        non_unique: &HashSet<&str>,
        pending: &mut Vec<Unresolved<'a>>,
    ) -> Result<StateId, ScmError> {
        let id = StateId(self.states.len());
        let parent_spec = &self.states[parent.0];
        if parent_spec.is_final() {
            return Err(ScmError::InvalidChart {
                chart: self.id.clone(),
                reason: format!("final state '{}' cannot have children", parent_spec.uid),
            });
        }

        let local_id = match &def.id {
            Some(local) if local.starts_with('_') => {
                return Err(ScmError::ReservedStateId {
                    state: local.clone(),
                });
            }
            Some(local) if !local.is_empty() => local.clone(),
            _ => format!("_st{}", self.states.len()),
        };
        let uid = if non_unique.contains(local_id.as_str()) {
            format!("{}.{}", parent_spec.uid, local_id)
        } else {
            local_id.clone()
        };
        if self.index.contains_key(&uid) || self.history_owner.contains_key(&uid) {
            return Err(ScmError::DuplicateState { state: uid });
        }

        let declared = def.history.or_else(|| def.history_states.first().map(|h| h.kind));
        let history = match parent_spec.history {
            Some(HistoryType::Deep) => Some(HistoryType::Deep),
            _ => declared,
        };
        let depth = parent_spec.depth + 1;

        self.states.push(StateSpec {
            uid: uid.clone(),
            local_id,
            kind: def.kind,
            parent: Some(parent),
            children: Vec::new(),
            depth,
            initial: Vec::new(),
            history,
            onentry: HookName::resolve(def.onentry.as_ref(), format!("onentry_{}", uid)),
            onexit: HookName::resolve(def.onexit.as_ref(), format!("onexit_{}", uid)),
            on_tick: HookName::resolve(def.on_tick.as_ref(), uid.clone()),
            leaving_delay: def.leaving_delay,
            transitions: Vec::new(),
        });
        self.states[parent.0].children.push(id);
        self.index.insert(uid.clone(), id);

        for marker in &def.history_states {
            if self.index.contains_key(&marker.id) || self.history_owner.contains_key(&marker.id)
            {
                return Err(ScmError::DuplicateState {
                    state: marker.id.clone(),
                });
            }
            self.history_owner.insert(marker.id.clone(), id);
        }

        pending.push(Unresolved {
            state: id,
            initial: &def.initial,
            transitions: &def.transitions,
        });

        for child in &def.states {
            self.add_state(child, id, non_unique, pending)?;
        }

        if def.kind == StateKind::Parallel && self.states[id.0].children.is_empty() {
            return Err(ScmError::InvalidChart {
                chart: self.id.clone(),
                reason: format!("parallel state '{}' has no regions", uid),
            });
        }

        Ok(id)
    }

    fn resolve_transition(
        &self,
        from: StateId,
        def: &TransitionDef,
    ) -> Result<TransitionSpec, ScmError> {
        let source = &self.states[from.0].uid;

        let guard = match def.cond.as_deref() {
            Some(cond) if !cond.trim().is_empty() => {
                let mut guard = Guard::parse(cond)?;
                if let GuardKind::InState(name) = &guard.kind {
                    let state = self.resolve_state(from, name)?;
                    guard.kind = GuardKind::InState(state);
                }
                Some(guard)
            }
            _ => None,
        };

        let targets = if !def.random_target.is_empty() {
            let resolved = def
                .random_target
                .iter()
                .map(|name| self.resolve_target(from, name))
                .collect::<Result<Vec<_>, _>>()?;
            TargetSet::Random(resolved)
        } else if !def.target.is_empty() {
            let resolved = def
                .target
                .iter()
                .map(|name| self.resolve_target(from, name))
                .collect::<Result<Vec<_>, _>>()?;
            if resolved.len() > 1 {
                self.check_parallel_targets(source, &resolved)?;
            }
            TargetSet::Fixed(resolved)
        } else {
            return Err(ScmError::InvalidChart {
                chart: self.id.clone(),
                reason: format!(
                    "transition on '{}' in state '{}' has no target",
                    def.event, source
                ),
            });
        };

        Ok(TransitionSpec {
            event: def.event.clone(),
            guard,
            action: def.action.clone().filter(|a| !a.is_empty()),
            targets,
        })
    }

    fn check_parallel_targets(&self, source: &str, targets: &[String]) -> Result<(), ScmError> {
        let ambiguous = || ScmError::AmbiguousTargets {
            state: source.to_string(),
            targets: targets.to_vec(),
        };
        let mut ids = Vec::with_capacity(targets.len());
        for t in targets {
            if self.history_owner.contains_key(t) {
                return Err(ScmError::InvalidChart {
                    chart: self.id.clone(),
                    reason: format!(
                        "history marker '{}' not allowed in multi-target transition of '{}'",
                        t, source
                    ),
                });
            }
            ids.push(self.lookup(t).ok_or_else(ambiguous)?);
        }
        let mut lca = ids[0];
        for id in &ids[1..] {
            lca = self.lca(lca, *id);
        }
        if !self.states[lca.0].is_parallel() || ids.contains(&lca) {
            return Err(ambiguous());
        }
        Ok(())
    }

    /// Resolves a transition target name to a state uid or history id.
    fn resolve_target(&self, from: StateId, name: &str) -> Result<String, ScmError> {
        if self.history_owner.contains_key(name) {
            return Ok(name.to_string());
        }
        self.resolve_state(from, name)
            .map_err(|_| ScmError::UnknownTarget {
                state: self.states[from.0].uid.clone(),
                target: name.to_string(),
            })
    }

    /// Resolves a state name (uid, or a non-unique local id searched from
    /// `from`) to a uid.
    fn resolve_state(&self, from: StateId, name: &str) -> Result<String, ScmError> {
        if self.index.contains_key(name) {
            return Ok(name.to_string());
        }
        self.find_state(from, name, None, true)
            .map(|id| self.states[id.0].uid.clone())
            .ok_or_else(|| ScmError::UnknownState {
                state: name.to_string(),
            })
    }

    /// Finds a state by local id: direct children first, then each child's
    /// subtree, then outward through the ancestors.
    pub fn find_state(
        &self,
        from: StateId,
        local_id: &str,
        exclude: Option<StateId>,
        check_parent: bool,
    ) -> Option<StateId> {
        let spec = &self.states[from.0];
        if let Some(found) = spec
            .children
            .iter()
            .find(|c| self.states[c.0].local_id == local_id)
        {
            return Some(*found);
        }
        for child in &spec.children {
            if Some(*child) != exclude {
                if let Some(found) = self.find_state(*child, local_id, exclude, false) {
                    return Some(found);
                }
            }
        }
        if check_parent {
            if let Some(parent) = spec.parent {
                return self.find_state(parent, local_id, Some(from), true);
            }
        }
        None
    }

    /// Lowest common ancestor of two states. A state is its own ancestor.
    pub fn lca(&self, a: StateId, b: StateId) -> StateId {
        let (mut a, mut b) = (a, b);
        while self.states[a.0].depth > self.states[b.0].depth {
            a = self.parent_or_root(a);
        }
        while self.states[b.0].depth > self.states[a.0].depth {
            b = self.parent_or_root(b);
        }
        while a != b {
            a = self.parent_or_root(a);
            b = self.parent_or_root(b);
        }
        a
    }

    fn parent_or_root(&self, id: StateId) -> StateId {
        self.states[id.0].parent.unwrap_or(StateId::ROOT)
    }

    /// Returns true if `id` is `ancestor` or lies below it.
    pub fn is_descendant(&self, id: StateId, ancestor: StateId) -> bool {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.states[c.0].parent;
        }
        false
    }

    // ------------------------------------------------------------------------
    // Query interface
    // ------------------------------------------------------------------------

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn raw(&self) -> &ChartDef {
        &self.raw
    }

    /// Returns the raw definition as JSON.
    pub fn to_json(&self) -> Result<serde_json::Value, ScmError> {
        Ok(serde_json::to_value(&self.raw)?)
    }

    /// Number of states, root included.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.len() <= 1
    }

    pub fn state(&self, id: StateId) -> &StateSpec {
        &self.states[id.0]
    }

    pub fn states(&self) -> impl Iterator<Item = (StateId, &StateSpec)> {
        self.states.iter().enumerate().map(|(i, s)| (StateId(i), s))
    }

    pub fn lookup(&self, uid: &str) -> Option<StateId> {
        self.index.get(uid).copied()
    }

    /// All state uids in document order, root first.
    pub fn state_ids(&self) -> Vec<&str> {
        self.states.iter().map(|s| s.uid.as_str()).collect()
    }

    pub fn initial_of(&self, uid: &str) -> Option<&[String]> {
        self.lookup(uid).map(|id| self.states[id.0].initial.as_slice())
    }

    pub fn history_type(&self, uid: &str) -> Option<HistoryType> {
        self.lookup(uid).and_then(|id| self.states[id.0].history)
    }

    /// State owning the history marker `history_id`.
    pub fn history_owner(&self, history_id: &str) -> Option<StateId> {
        self.history_owner.get(history_id).copied()
    }

    pub fn transitions(&self, uid: &str) -> &[TransitionSpec] {
        self.lookup(uid)
            .map(|id| self.states[id.0].transitions.as_slice())
            .unwrap_or(&[])
    }

    pub fn onentry_hook(&self, uid: &str) -> Option<&HookName> {
        self.lookup(uid).map(|id| &self.states[id.0].onentry)
    }

    pub fn onexit_hook(&self, uid: &str) -> Option<&HookName> {
        self.lookup(uid).map(|id| &self.states[id.0].onexit)
    }

    pub fn tick_hook(&self, uid: &str) -> Option<&HookName> {
        self.lookup(uid).map(|id| &self.states[id.0].on_tick)
    }

    /// Names of all predicates referenced by guards.
    pub fn guard_names(&self) -> BTreeSet<&str> {
        self.states
            .iter()
            .flat_map(|s| s.transitions.iter())
            .filter_map(|t| t.guard.as_ref().and_then(|g| g.predicate_name()))
            .collect()
    }

    /// Names of all transition actions.
    pub fn action_names(&self) -> BTreeSet<&str> {
        self.states
            .iter()
            .flat_map(|s| s.transitions.iter())
            .filter_map(|t| t.action.as_deref())
            .collect()
    }
}
