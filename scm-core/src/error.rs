//! Core error types.

use std::path::PathBuf;
use thiserror::Error;

/// Kind of named hook a chart refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Guard,
    Action,
    Tick,
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookKind::Guard => f.write_str("guard"),
            HookKind::Action => f.write_str("action"),
            HookKind::Tick => f.write_str("tick"),
        }
    }
}

/// Errors from the statechart engine.
#[derive(Debug, Error)]
pub enum ScmError {
    #[error("invalid chart '{chart}': {reason}")]
    InvalidChart { chart: String, reason: String },

    #[error("state id '{state}' uses the reserved '_' prefix")]
    ReservedStateId { state: String },

    #[error("duplicate state '{state}'")]
    DuplicateState { state: String },

    #[error("unknown state '{state}'")]
    UnknownState { state: String },

    #[error("transition in '{state}' has unresolvable target '{target}'")]
    UnknownTarget { state: String, target: String },

    #[error("transition in '{state}' targets {targets:?} without a parallel common ancestor")]
    AmbiguousTargets { state: String, targets: Vec<String> },

    #[error("invalid guard expression: {reason}")]
    InvalidGuard { reason: String },

    #[error("{kind} '{name}' used by state '{state}' has no binding")]
    MissingBinding {
        kind: HookKind,
        name: String,
        state: String,
    },

    #[error("chart not found: {chart}")]
    ChartNotFound { chart: String },

    #[error("chart already registered with a different definition: {chart}")]
    ChartExists { chart: String },

    #[error("machine not found: {key}")]
    MachineNotFound { key: u64 },

    #[error("machine '{chart}' is not started")]
    NotStarted { chart: String },

    #[error("recursive advance on machine '{chart}'")]
    RecursiveAdvance { chart: String },

    #[error("invalid time step {dt} on machine '{chart}'")]
    InvalidTimeStep { chart: String, dt: f64 },

    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ScmError {
    /// Returns whether this error is a defect in the chart or its bindings,
    /// as opposed to a misuse of a running machine.
    pub fn is_model_error(&self) -> bool {
        matches!(
            self,
            ScmError::InvalidChart { .. }
                | ScmError::ReservedStateId { .. }
                | ScmError::DuplicateState { .. }
                | ScmError::UnknownState { .. }
                | ScmError::UnknownTarget { .. }
                | ScmError::AmbiguousTargets { .. }
                | ScmError::InvalidGuard { .. }
                | ScmError::MissingBinding { .. }
        )
    }

    /// Returns a short error code suitable for display.
    pub fn error_code(&self) -> &'static str {
        match self {
            ScmError::InvalidChart { .. } => "INVALID_CHART",
            ScmError::ReservedStateId { .. } => "INVALID_CHART",
            ScmError::DuplicateState { .. } => "INVALID_CHART",
            ScmError::UnknownState { .. } => "UNKNOWN_STATE",
            ScmError::UnknownTarget { .. } => "UNKNOWN_TARGET",
            ScmError::AmbiguousTargets { .. } => "AMBIGUOUS_TARGETS",
            ScmError::InvalidGuard { .. } => "INVALID_GUARD",
            ScmError::MissingBinding { .. } => "MISSING_BINDING",
            ScmError::ChartNotFound { .. } => "CHART_NOT_FOUND",
            ScmError::ChartExists { .. } => "CHART_EXISTS",
            ScmError::MachineNotFound { .. } => "MACHINE_NOT_FOUND",
            ScmError::NotStarted { .. } => "NOT_STARTED",
            ScmError::RecursiveAdvance { .. } => "RECURSIVE_ADVANCE",
            ScmError::InvalidTimeStep { .. } => "INVALID_TIME_STEP",
            ScmError::Io { .. } => "IO_ERROR",
            ScmError::Json(_) => "BAD_DOCUMENT",
            ScmError::Yaml(_) => "BAD_DOCUMENT",
        }
    }
}
