//! Live statechart machines.
//!
//! A [`Machine`] owns the runtime tree of one chart instance, its event
//! queue and its timers. All processing is synchronous on the calling
//! thread. Events raised while the machine is already dispatching (from a
//! hook, a timer or a final state) are queued and drained in FIFO order
//! before the outer call returns.

use crate::chart::{Chart, StateId};
use crate::error::ScmError;
use crate::hooks::Bindings;
use crate::machine::Timer::{Action, Event};
use crate::state::StateNode;
use crate::timer::{TimerHandle, TimerQueue};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::VecDeque;
use std::sync::Arc;

/// Payload of a delayed timer.
pub enum Timer {
    /// Queued as an event when due.
    Event(String),
    /// Invoked directly when due.
    Action(Box<dyn FnOnce(&mut Machine)>),
}

/// One running instance of a chart.
pub struct Machine {
    pub(crate) chart: Arc<Chart>,
    pub(crate) nodes: Vec<StateNode>,
    pub(crate) bindings: Bindings,
    pub(crate) events: VecDeque<String>,
    pub(crate) timers: TimerQueue<Timer>,
    pub(crate) rng: Box<dyn RngCore>,
    seed: Option<u64>,
    pub(crate) current_leaf: StateId,
    pub(crate) transition_source: Option<StateId>,
    pub(crate) transition_target: Option<StateId>,
    pub(crate) trace_hooks: bool,
    time: f64,
    started: bool,
    paused: bool,
    dispatching: bool,
    advancing: bool,
}

impl Machine {
    /// Creates a stopped machine for `chart`.
    pub fn new(chart: Arc<Chart>) -> Self {
        let nodes = chart.states().map(|(_, spec)| StateNode::new(spec)).collect();
        Self::from_parts(chart, nodes)
    }

    pub(crate) fn from_parts(chart: Arc<Chart>, nodes: Vec<StateNode>) -> Self {
        Self {
            chart,
            nodes,
            bindings: Bindings::new(),
            events: VecDeque::new(),
            timers: TimerQueue::new(),
            rng: Box::new(StdRng::from_entropy()),
            seed: None,
            current_leaf: StateId::ROOT,
            transition_source: None,
            transition_target: None,
            trace_hooks: false,
            time: 0.0,
            started: false,
            paused: false,
            dispatching: false,
            advancing: false,
        }
    }

    // =========================================================================
    // Bindings
    // =========================================================================

    pub fn bind_guard<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&Machine) -> bool + 'static,
    {
        self.bindings.bind_guard(name, f);
    }

    pub fn bind_action<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&mut Machine) + 'static,
    {
        self.bindings.bind_action(name, f);
    }

    pub fn bind_tick<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&mut Machine, f64) + 'static,
    {
        self.bindings.bind_tick(name, f);
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn bindings_mut(&mut self) -> &mut Bindings {
        &mut self.bindings
    }

    pub fn set_bindings(&mut self, bindings: Bindings) {
        self.bindings = bindings;
    }

    /// Logs every bound action at debug level as it runs.
    pub fn set_trace_hooks(&mut self, enabled: bool) {
        self.trace_hooks = enabled;
    }

    /// Replaces the random source used by random-target transitions.
    pub fn set_rng(&mut self, rng: Box<dyn RngCore>) {
        self.rng = rng;
        self.seed = None;
    }

    /// Seeds a deterministic random source. Forks of this machine start
    /// from the same seed.
    pub fn seed_rng(&mut self, seed: u64) {
        self.rng = Box::new(StdRng::seed_from_u64(seed));
        self.seed = Some(seed);
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Validates bindings and enters the initial configuration. Events raised
    /// during entry stay queued until the next advance or pump.
    pub fn start(&mut self) -> Result<(), ScmError> {
        if self.started {
            return Ok(());
        }
        self.bindings.validate(&self.chart)?;

        tracing::info!("[{}] starting", self.chart.id());
        self.started = true;
        let was_dispatching = std::mem::replace(&mut self.dispatching, true);
        self.enter_state(StateId::ROOT, true);
        self.dispatching = was_dispatching;
        Ok(())
    }

    /// Stops the machine. With `exit_states` every active state is exited
    /// (running exit hooks) first. Queued events and timers are discarded.
    pub fn stop(&mut self, exit_states: bool) {
        if !self.started {
            return;
        }
        tracing::info!("[{}] stopping", self.chart.id());
        if exit_states {
            let was_dispatching = std::mem::replace(&mut self.dispatching, true);
            self.exit_state(StateId::ROOT);
            self.dispatching = was_dispatching;
        }
        for node in &mut self.nodes {
            node.deactivate();
        }
        self.events.clear();
        self.timers.clear();
        self.started = false;
        self.paused = false;
    }

    /// Stops with exit hooks and starts again.
    pub fn restart(&mut self) -> Result<(), ScmError> {
        self.stop(true);
        self.start()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// A paused machine ignores `advance`.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub(crate) fn enqueue(&mut self, event: String) {
        tracing::trace!("[{}] queue '{}'", self.chart.id(), event);
        self.events.push_back(event);
    }

    /// Queues `event` for the next `advance` or `pump_events`.
    pub fn post_event(&mut self, event: impl Into<String>) {
        self.enqueue(event.into());
    }

    /// Dispatches `event` now. While the machine is already dispatching the
    /// event is queued instead and handled after the current one.
    pub fn handle_event(&mut self, event: impl Into<String>) -> Result<(), ScmError> {
        self.require_started()?;
        let event = event.into();
        if self.dispatching {
            self.enqueue(event);
            return Ok(());
        }
        self.with_dispatch(|m| m.dispatch(&event));
        Ok(())
    }

    /// Drains queued events without advancing time.
    pub fn pump_events(&mut self) -> Result<(), ScmError> {
        self.require_started()?;
        self.with_dispatch(|_| {});
        Ok(())
    }

    pub fn has_pending_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn pending_events(&self) -> impl Iterator<Item = &str> {
        self.events.iter().map(|e| e.as_str())
    }

    /// Runs `f` as part of a dispatch. The outermost call drains the queue.
    pub(crate) fn with_dispatch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        if self.dispatching {
            return f(self);
        }
        self.dispatching = true;
        let result = f(self);
        self.drain_events();
        self.dispatching = false;
        result
    }

    fn drain_events(&mut self) {
        while self.started {
            let Some(event) = self.events.pop_front() else {
                break;
            };
            self.dispatch(&event);
        }
    }

    fn dispatch(&mut self, event: &str) {
        tracing::debug!("[{}] event '{}'", self.chart.id(), event);
        if !self.handle_in(StateId::ROOT, event) {
            tracing::trace!("[{}] event '{}' not handled", self.chart.id(), event);
        }
    }

    // =========================================================================
    // Time
    // =========================================================================

    /// Advances the machine by `dt` seconds: ticks active states (delayed
    /// leaves, event-less transitions, tick hooks), fires the timers that are
    /// due, then drains the event queue. Timers registered while firing or
    /// draining wait for the next advance, even with a zero delay.
    pub fn advance(&mut self, dt: f64) -> Result<(), ScmError> {
        self.require_started()?;
        if !dt.is_finite() || dt < 0.0 {
            tracing::error!("[{}] invalid time step {}", self.chart.id(), dt);
            return Err(ScmError::InvalidTimeStep {
                chart: self.chart.id().to_string(),
                dt,
            });
        }
        if self.advancing {
            tracing::error!("[{}] advance called from within advance", self.chart.id());
            return Err(ScmError::RecursiveAdvance {
                chart: self.chart.id().to_string(),
            });
        }
        if self.paused {
            return Ok(());
        }

        self.advancing = true;
        self.with_dispatch(|m| {
            m.time += dt;
            m.tick_state(StateId::ROOT, dt, false);
            let watermark = m.timers.watermark();
            while let Some(timer) = m.timers.pop_due_before(m.time, watermark) {
                match timer {
                    Event(event) => m.enqueue(event),
                    Action(action) => action(m),
                }
            }
        });
        self.advancing = false;
        Ok(())
    }

    /// Machine time in seconds.
    pub fn elapsed(&self) -> f64 {
        self.time
    }

    /// Seconds since `uid` was last entered.
    pub fn state_elapsed(&self, uid: &str) -> Option<f64> {
        self.chart.lookup(uid).map(|id| self.nodes[id.0].elapsed)
    }

    /// Absolute fire time for `delay`. Negative and NaN delays fire on the
    /// next advance.
    fn fire_time(&self, delay: f64) -> f64 {
        if delay.is_nan() || delay < 0.0 {
            tracing::warn!(
                "[{}] timer delay {} clamped to 0",
                self.chart.id(),
                delay
            );
            return self.time;
        }
        self.time + delay
    }

    /// Queues `event` after `delay` seconds.
    pub fn schedule_event(&mut self, delay: f64, event: impl Into<String>) {
        let fire_at = self.fire_time(delay);
        self.timers.schedule(fire_at, Event(event.into()));
    }

    /// Queues `event` after `delay` seconds unless every returned handle has
    /// been dropped by then.
    pub fn schedule_event_cancelable(&mut self, delay: f64, event: impl Into<String>) -> TimerHandle {
        let fire_at = self.fire_time(delay);
        self.timers.schedule_cancelable(fire_at, Event(event.into()))
    }

    /// Runs `action` after `delay` seconds.
    pub fn schedule_action<F>(&mut self, delay: f64, action: F)
    where
        F: FnOnce(&mut Machine) + 'static,
    {
        let fire_at = self.fire_time(delay);
        self.timers.schedule(fire_at, Action(Box::new(action)));
    }

    pub fn schedule_action_cancelable<F>(&mut self, delay: f64, action: F) -> TimerHandle
    where
        F: FnOnce(&mut Machine) + 'static,
    {
        let fire_at = self.fire_time(delay);
        self.timers.schedule_cancelable(fire_at, Action(Box::new(action)))
    }

    pub fn clear_timers(&mut self) {
        self.timers.clear();
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn chart(&self) -> &Arc<Chart> {
        &self.chart
    }

    pub fn id(&self) -> &str {
        self.chart.id()
    }

    pub fn state_ids(&self) -> Vec<&str> {
        self.chart.state_ids()
    }

    /// Whether `uid` is active.
    pub fn is_in(&self, uid: &str) -> bool {
        self.chart
            .lookup(uid)
            .is_some_and(|id| self.nodes[id.0].active)
    }

    /// Whether `uid` has completed (reached a final child, or all regions
    /// did for a parallel state).
    pub fn is_done(&self, uid: &str) -> bool {
        self.chart
            .lookup(uid)
            .is_some_and(|id| self.nodes[id.0].done)
    }

    /// The state most recently entered or exited.
    pub fn current_leaf(&self) -> &str {
        &self.chart.state(self.current_leaf).uid
    }

    /// Active states with no active child, in document order.
    pub fn active_configuration(&self) -> Vec<&str> {
        self.chart
            .states()
            .filter(|(id, spec)| {
                self.nodes[id.0].active
                    && !spec.children.iter().any(|c| self.nodes[c.0].active)
            })
            .map(|(_, spec)| spec.uid.as_str())
            .collect()
    }

    /// Every active state, in document order.
    pub fn active_states(&self) -> Vec<&str> {
        self.chart
            .states()
            .filter(|(id, _)| self.nodes[id.0].active)
            .map(|(_, spec)| spec.uid.as_str())
            .collect()
    }

    pub fn transition_source(&self) -> Option<&str> {
        self.transition_source
            .map(|id| self.chart.state(id).uid.as_str())
    }

    pub fn transition_target(&self) -> Option<&str> {
        self.transition_target
            .map(|id| self.chart.state(id).uid.as_str())
    }

    /// Whether the last transition left and re-entered the same state.
    pub fn is_reentry(&self) -> bool {
        self.transition_source.is_some() && self.transition_source == self.transition_target
    }

    /// Whether the current leaf or one of its ancestors waits out a leaving
    /// delay.
    pub fn is_leaving(&self) -> bool {
        let mut cur = Some(self.current_leaf);
        while let Some(id) = cur {
            if self.nodes[id.0].active && self.nodes[id.0].is_leaving() {
                return true;
            }
            cur = self.chart.state(id).parent;
        }
        false
    }

    /// Whether `uid` itself waits out a leaving delay.
    pub fn is_state_leaving(&self, uid: &str) -> bool {
        self.chart
            .lookup(uid)
            .is_some_and(|id| self.nodes[id.0].is_leaving())
    }

    /// Deep copy of the runtime tree (active/done flags, history, elapsed
    /// times, queued events) sharing the compiled chart. Bindings and timers
    /// are not copied: hooks must be bound again on the copy.
    ///
    /// A machine seeded with [`seed_rng`](Self::seed_rng) hands its seed to
    /// the copy, which starts a fresh sequence from it. A random source
    /// installed with [`set_rng`](Self::set_rng) cannot be copied; the copy
    /// draws from entropy until given one.
    pub fn fork(&self) -> Machine {
        let mut copy = Machine::from_parts(Arc::clone(&self.chart), self.nodes.clone());
        copy.events = self.events.clone();
        copy.current_leaf = self.current_leaf;
        copy.transition_source = self.transition_source;
        copy.transition_target = self.transition_target;
        copy.trace_hooks = self.trace_hooks;
        copy.time = self.time;
        copy.started = self.started;
        copy.paused = self.paused;
        if let Some(seed) = self.seed {
            copy.seed_rng(seed);
        }
        copy
    }

    pub(crate) fn require_state(&self, uid: &str) -> Result<StateId, ScmError> {
        self.chart.lookup(uid).ok_or_else(|| ScmError::UnknownState {
            state: uid.to_string(),
        })
    }

    pub(crate) fn require_started(&self) -> Result<(), ScmError> {
        if self.started {
            Ok(())
        } else {
            tracing::error!("[{}] machine is not started", self.chart.id());
            Err(ScmError::NotStarted {
                chart: self.chart.id().to_string(),
            })
        }
    }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("chart", &self.chart.id())
            .field("started", &self.started)
            .field("paused", &self.paused)
            .field("time", &self.time)
            .field("configuration", &self.active_configuration())
            .field("events", &self.events)
            .field("timers", &self.timers)
            .finish()
    }
}
