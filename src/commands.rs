//! Command execution.

use crate::config::RuntimeConfig;
use colored::Colorize;
use scm_core::{Chart, ChartRegistry, HistoryType, Machine, ScmError, StateKind};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

type Flags = Rc<RefCell<BTreeMap<String, bool>>>;
type Trace = Rc<RefCell<Vec<String>>>;

/// A machine whose guards read settable flags and whose hooks print what
/// they would do.
pub struct Session {
    pub machine: Machine,
    flags: Flags,
    trace: Trace,
    tick_seconds: f64,
}

impl Session {
    pub fn new(mut machine: Machine, runtime: &RuntimeConfig) -> Self {
        let flags: Flags = Rc::default();
        let trace: Trace = Rc::default();
        let chart = Arc::clone(machine.chart());

        for name in chart.guard_names() {
            flags.borrow_mut().insert(name.to_string(), false);
            let flags = flags.clone();
            let key = name.to_string();
            machine.bind_guard(name, move |_| flags.borrow().get(&key).copied().unwrap_or(false));
        }

        for name in chart.action_names() {
            if name.starts_with("clh(") {
                continue;
            }
            let line = format!("action {}", name);
            machine.bind_action(name, printer(&trace, line));
        }

        for (_, spec) in chart.states() {
            let enter = format!("enter {}", spec.uid);
            machine.bind_action(spec.onentry.name.clone(), printer(&trace, enter));
            let exit = format!("exit {}", spec.uid);
            machine.bind_action(spec.onexit.name.clone(), printer(&trace, exit));

            if !spec.on_tick.defaulted {
                let name = spec.on_tick.name.clone();
                machine.bind_tick(spec.on_tick.name.clone(), move |m, dt| {
                    tracing::trace!("[{}] tick {} ({}s)", m.id(), name, dt)
                });
            }
        }

        if let Some(seed) = runtime.seed {
            machine.seed_rng(seed);
        }
        machine.set_trace_hooks(runtime.trace_hooks);

        Self {
            machine,
            flags,
            trace,
            tick_seconds: runtime.tick_seconds,
        }
    }

    /// Sets a guard flag. Returns false if no guard uses `name`.
    pub fn set_flag(&self, name: &str, value: bool) -> bool {
        match self.flags.borrow_mut().get_mut(name) {
            Some(flag) => {
                *flag = value;
                true
            }
            None => false,
        }
    }

    pub fn flags(&self) -> Vec<(String, bool)> {
        self.flags
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    pub fn tick_seconds(&self) -> f64 {
        self.tick_seconds
    }

    /// Advances `n` ticks of the configured length.
    pub fn tick(&mut self, n: u32) -> Result<(), ScmError> {
        for _ in 0..n {
            self.machine.advance(self.tick_seconds)?;
        }
        Ok(())
    }

    /// Hook output recorded since the last call.
    pub fn take_trace(&self) -> Vec<String> {
        std::mem::take(&mut *self.trace.borrow_mut())
    }

    /// Recorded hook output, one indented line each.
    pub fn drain_output(&self) -> String {
        self.take_trace()
            .iter()
            .map(|line| format!("  {}\n", line.dimmed()))
            .collect()
    }
}

fn printer(trace: &Trace, line: String) -> impl Fn(&mut Machine) + 'static {
    let trace = trace.clone();
    move |m| {
        tracing::info!("[{}] {}", m.id(), line);
        trace.borrow_mut().push(line.clone());
    }
}

/// Loads a chart document into a registry and builds a session for it.
pub fn open_session(path: &Path, runtime: &RuntimeConfig) -> Result<Session, ScmError> {
    let registry = ChartRegistry::new();
    let id = registry.load_file(path)?;
    Ok(Session::new(registry.instantiate(&id)?, runtime))
}

/// `validate`: compiles the chart and reports its checksum.
pub fn validate(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    let registry = ChartRegistry::new();
    let id = registry.load_file(path)?;
    let compiled = registry.get_chart(&id)?;
    let chart = compiled.chart();

    Ok(format!(
        "{} chart {}\n  States: {}\n  Guards: {}\n  Actions: {}\n  Checksum: {}",
        "Valid".green(),
        id.cyan(),
        chart.len(),
        join(chart.guard_names()),
        join(chart.action_names()),
        chart.checksum()
    ))
}

/// `states`: prints the state hierarchy.
pub fn states(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    let chart = Chart::from_file(path)?;
    Ok(format_tree(&chart))
}

/// Renders the hierarchy of `chart`, one state per line.
pub fn format_tree(chart: &Chart) -> String {
    let mut output = String::new();
    for (_, spec) in chart.states() {
        let mut line = format!("{}{}", "  ".repeat(spec.depth), spec.uid.cyan());
        match spec.kind {
            StateKind::Parallel => line.push_str(&format!(" {}", "[parallel]".yellow())),
            StateKind::Final => line.push_str(&format!(" {}", "[final]".yellow())),
            StateKind::State => {}
        }
        match spec.history {
            Some(HistoryType::Shallow) => line.push_str(" H"),
            Some(HistoryType::Deep) => line.push_str(" H*"),
            None => {}
        }
        if spec.leaving_delay != 0.0 {
            line.push_str(&format!(" (leaving {}s)", spec.leaving_delay));
        }
        output.push_str(&line);
        output.push('\n');

        for t in &spec.transitions {
            let event = if t.is_eventless() { "<always>" } else { t.event.as_str() };
            let mut detail = format!("{}  {} ->", "  ".repeat(spec.depth), event.dimmed());
            match &t.targets {
                scm_core::TargetSet::Fixed(targets) => {
                    detail.push_str(&format!(" {}", targets.join(", ")))
                }
                scm_core::TargetSet::Random(targets) => {
                    detail.push_str(&format!(" random({})", targets.join(", ")))
                }
            }
            if let Some(guard) = &t.guard {
                detail.push_str(&format!(" [{}]", guard));
            }
            if let Some(action) = &t.action {
                detail.push_str(&format!(" / {}", action));
            }
            output.push_str(&detail);
            output.push('\n');
        }
    }
    output
}

/// Options of the `run` command.
#[derive(Debug, Default)]
pub struct RunOptions {
    pub events: Vec<String>,
    pub ticks: u32,
    pub flags: Vec<(String, bool)>,
}

/// `run`: starts the chart, posts each event followed by one tick, then
/// runs the remaining ticks and prints the final configuration.
pub fn run(
    path: &Path,
    runtime: &RuntimeConfig,
    options: &RunOptions,
) -> Result<String, Box<dyn std::error::Error>> {
    let mut session = open_session(path, runtime)?;
    for (name, value) in &options.flags {
        if !session.set_flag(name, *value) {
            return Err(format!("no guard named '{}'", name).into());
        }
    }

    let mut output = format!("{} {}\n", "Started".green(), session.machine.id().cyan());
    session.machine.start()?;
    output.push_str(&session.drain_output());

    for event in &options.events {
        output.push_str(&format!("{} {}\n", ">".bold(), event.cyan()));
        session.machine.post_event(event.as_str());
        session.tick(1)?;
        output.push_str(&session.drain_output());
    }

    if options.ticks > 0 {
        session.tick(options.ticks)?;
        output.push_str(&session.drain_output());
    }

    output.push_str(&format!(
        "Configuration: {}\nElapsed: {:.3}s",
        session.machine.active_configuration().join(", ").yellow(),
        session.machine.elapsed()
    ));
    Ok(output)
}

/// Parses a `name=true|false` flag argument.
pub fn parse_flag(arg: &str) -> Result<(String, bool), String> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected name=true|false, got '{}'", arg))?;
    let value = parse_bool(value).ok_or_else(|| format!("invalid boolean '{}'", value))?;
    Ok((name.trim().to_string(), value))
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

fn join<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    let names: Vec<&str> = names.into_iter().collect();
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(", ")
    }
}
