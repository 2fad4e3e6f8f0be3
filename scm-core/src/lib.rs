//! # scm-core
//!
//! Hierarchical and parallel statechart interpreter.
//!
//! This crate provides:
//! - Chart documents (JSON/YAML) compiled into validated, shared charts
//! - Runtime state trees with plain, parallel and final states
//! - Transition resolution with reentry and multi-target transitions
//! - Shallow and deep history
//! - Event queueing, leaving delays and delayed timers driven by `advance`
//! - A chart registry and a scheduler for driving many machines

pub mod chart;
pub mod driver;
pub mod error;
pub mod guard;
pub mod history;
pub mod hooks;
pub mod machine;
pub mod registry;
mod resolver;
mod state;
pub mod timer;

#[cfg(test)]
mod scenarios;

pub use chart::{
    Chart, ChartDef, StateDef, StateId, StateKind, TargetSet, TransitionDef, DONE_STATE_PREFIX,
};
pub use driver::{MachineKey, Scheduler};
pub use error::{HookKind, ScmError};
pub use guard::{Guard, GuardEvaluator, GuardKind};
pub use history::HistoryType;
pub use hooks::Bindings;
pub use machine::{Machine, Timer};
pub use registry::{ChartRegistry, CompiledChart};
pub use timer::{TimerHandle, TimerQueue};
