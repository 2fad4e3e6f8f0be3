//! End-to-end behaviour of complete charts.

use crate::chart::Chart;
use crate::machine::Machine;
use proptest::prelude::*;
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

type Log = Rc<RefCell<Vec<String>>>;

fn compile(json: serde_json::Value) -> Arc<Chart> {
    Arc::new(Chart::from_json(&json).unwrap())
}

/// Binds entry and exit recorders for every state of the machine's chart.
fn record_all(machine: &mut Machine) -> Log {
    let log: Log = Rc::default();
    let uids: Vec<String> = machine.state_ids().iter().map(|s| s.to_string()).collect();
    for uid in uids {
        let entry = log.clone();
        let name = uid.clone();
        machine.bind_action(format!("onentry_{}", uid), move |_| {
            entry.borrow_mut().push(format!("enter {}", name))
        });
        let exit = log.clone();
        let name = uid.clone();
        machine.bind_action(format!("onexit_{}", uid), move |_| {
            exit.borrow_mut().push(format!("exit {}", name))
        });
    }
    log
}

/// Every active compound state has exactly one active child, every active
/// parallel state has all regions active, and inactive states have no
/// active children.
fn assert_structure(machine: &Machine) {
    let chart = machine.chart();
    for (_, spec) in chart.states() {
        let active = machine.is_in(&spec.uid);
        let active_children = spec
            .children
            .iter()
            .filter(|c| machine.is_in(&chart.state(**c).uid))
            .count();
        if !active {
            assert_eq!(active_children, 0, "inactive {} has active children", spec.uid);
        } else if spec.children.is_empty() {
            continue;
        } else if spec.is_parallel() {
            assert_eq!(
                active_children,
                spec.children.len(),
                "parallel {} has inactive regions",
                spec.uid
            );
        } else {
            assert_eq!(active_children, 1, "{} has {} active children", spec.uid, active_children);
        }
    }
}

// ============================================================================
// Candy machine
// ============================================================================

fn candy_chart() -> Arc<Chart> {
    compile(json!({
        "id": "candy",
        "states": [
            {"id": "idle", "transitions": [
                {"event": "empty", "target": "disabled"},
                {"event": "coin", "target": "active"}
            ]},
            {"id": "active", "transitions": [
                {"event": "release-candy", "ontransit": "releaseCandy", "target": "releasing"},
                {"event": "withdraw-coin", "ontransit": "withdrawCoins", "target": "idle"}
            ]},
            {"id": "releasing", "transitions": [
                {"event": "candy-released", "cond": "condNoCandy", "target": "disabled"},
                {"event": "candy-released", "target": "idle"}
            ]},
            {"id": "disabled", "transitions": [
                {"event": "add-candy", "cond": "condNoCredit", "target": "idle"},
                {"event": "add-candy", "target": "active"}
            ]}
        ]
    }))
}

fn candy_machine(stock: u32) -> (Machine, Rc<Cell<u32>>) {
    let stock = Rc::new(Cell::new(stock));
    let credit = Rc::new(Cell::new(0u32));
    let mut machine = Machine::new(candy_chart());

    let s = stock.clone();
    machine.bind_guard("condNoCandy", move |_| s.get() == 0);
    let c = credit.clone();
    machine.bind_guard("condNoCredit", move |_| c.get() == 0);

    let s = stock.clone();
    let c = credit.clone();
    machine.bind_action("releaseCandy", move |m| {
        s.set(s.get().saturating_sub(1));
        c.set(c.get().saturating_sub(25));
        m.post_event("candy-released");
    });
    let c = credit.clone();
    machine.bind_action("withdrawCoins", move |_| c.set(0));
    let c = credit.clone();
    machine.bind_action("onentry_active", move |_| c.set(c.get() + 25));

    machine.start().unwrap();
    (machine, stock)
}

#[test]
fn test_candy_machine_runs_out() {
    let (mut machine, stock) = candy_machine(1);
    machine.post_event("coin");
    machine.post_event("release-candy");
    machine.advance(0.0).unwrap();

    assert_eq!(stock.get(), 0);
    assert!(machine.is_in("disabled"));
    assert_eq!(machine.transition_source(), Some("releasing"));
    assert_eq!(machine.transition_target(), Some("disabled"));
}

#[test]
fn test_candy_machine_with_stock_returns_to_idle() {
    let (mut machine, stock) = candy_machine(3);
    machine.post_event("coin");
    machine.post_event("release-candy");
    machine.advance(0.0).unwrap();

    assert_eq!(stock.get(), 2);
    assert!(machine.is_in("idle"));
    assert_eq!(machine.active_configuration(), vec!["idle"]);
}

#[test]
fn test_candy_machine_refill() {
    let (mut machine, _stock) = candy_machine(0);
    machine.handle_event("empty").unwrap();
    assert!(machine.is_in("disabled"));
    machine.handle_event("add-candy").unwrap();
    assert!(machine.is_in("idle"));
}

// ============================================================================
// Leaving delay
// ============================================================================

fn delayed_chart(delay: f64) -> Arc<Chart> {
    compile(json!({
        "id": "door",
        "states": [
            {"id": "a", "leaving_delay": delay, "transitions": [
                {"event": "go", "target": "b", "action": "slam"},
                {"event": "other", "target": "c"}
            ]},
            {"id": "b"},
            {"id": "c"}
        ]
    }))
}

#[test]
fn test_leaving_delay_commits_after_cumulative_time() {
    let mut machine = Machine::new(delayed_chart(2.0));
    let log = record_all(&mut machine);
    let slam = log.clone();
    machine.bind_action("slam", move |_| slam.borrow_mut().push("slam".to_string()));
    machine.start().unwrap();
    log.borrow_mut().clear();

    machine.handle_event("go").unwrap();
    assert!(machine.is_in("a"));
    assert!(machine.is_leaving());
    assert!(machine.is_state_leaving("a"));

    machine.advance(1.0).unwrap();
    assert!(machine.is_in("a"));
    assert!(log.borrow().is_empty());

    machine.advance(1.0).unwrap();
    assert!(machine.is_in("b"));
    assert!(!machine.is_leaving());
    assert_eq!(*log.borrow(), vec!["exit a", "slam", "enter b"]);
}

#[test]
fn test_leaving_state_ignores_events() {
    let mut machine = Machine::new(delayed_chart(2.0));
    machine.bind_action("slam", |_| {});
    machine.start().unwrap();

    machine.handle_event("go").unwrap();
    machine.handle_event("other").unwrap();
    machine.advance(2.0).unwrap();
    assert!(machine.is_in("b"));
    assert!(!machine.is_in("c"));
}

#[test]
fn test_negative_delay_waits_for_release() {
    let mut machine = Machine::new(delayed_chart(-1.0));
    machine.bind_action("slam", |_| {});
    machine.start().unwrap();

    machine.handle_event("go").unwrap();
    machine.advance(100.0).unwrap();
    assert!(machine.is_in("a"));
    assert!(machine.is_leaving());

    assert!(machine.release_leave("a").unwrap());
    assert!(machine.is_in("b"));
    assert!(!machine.release_leave("a").unwrap());
}

#[test]
fn test_set_leaving_delay_at_runtime() {
    let mut machine = Machine::new(delayed_chart(0.0));
    machine.bind_action("slam", |_| {});
    machine.start().unwrap();
    machine.set_leaving_delay("a", 0.5).unwrap();

    machine.handle_event("go").unwrap();
    assert!(machine.is_in("a"));
    machine.advance(0.5).unwrap();
    assert!(machine.is_in("b"));
    assert!(machine.set_leaving_delay("nope", 1.0).is_err());
}

#[test]
fn test_leaving_delay_suppresses_eventless_transitions_below() {
    let chart = compile(json!({
        "id": "slow",
        "states": [
            {"id": "outer", "leaving_delay": 1.0,
             "transitions": [{"event": "leave", "target": "gone"}],
             "states": [
                {"id": "inner", "transitions": [{"cond": "always", "target": "inner2"}]},
                {"id": "inner2"}
             ]},
            {"id": "gone"}
        ]
    }));
    let mut machine = Machine::new(chart);
    machine.bind_guard("always", |_| true);
    machine.start().unwrap();

    machine.handle_event("leave").unwrap();
    machine.advance(0.5).unwrap();
    assert!(machine.is_in("inner"));
    machine.advance(0.5).unwrap();
    assert!(machine.is_in("gone"));
}

// ============================================================================
// Timers
// ============================================================================

#[test]
fn test_dropped_cancelable_event_is_discarded() {
    let mut machine = Machine::new(delayed_chart(0.0));
    machine.bind_action("slam", |_| {});
    machine.start().unwrap();

    let handle = machine.schedule_event_cancelable(1.0, "go");
    drop(handle);
    machine.advance(2.0).unwrap();

    assert!(machine.is_in("a"));
    assert!(!machine.has_pending_events());
    assert_eq!(machine.pending_timers(), 0);
}

#[test]
fn test_held_cancelable_event_fires() {
    let mut machine = Machine::new(delayed_chart(0.0));
    machine.bind_action("slam", |_| {});
    machine.start().unwrap();

    let handle = machine.schedule_event_cancelable(1.0, "go");
    machine.advance(2.0).unwrap();
    assert!(machine.is_in("b"));
    drop(handle);
}

#[test]
fn test_timer_scheduled_while_draining_waits_for_next_advance() {
    let chart = compile(json!({
        "id": "chain",
        "states": [
            {"id": "a", "transitions": [{"event": "go", "target": "b", "action": "arm"}]},
            {"id": "b", "transitions": [{"event": "other", "target": "c"}]},
            {"id": "c"}
        ]
    }));
    let mut machine = Machine::new(chart);
    machine.bind_action("arm", |m| m.schedule_event(0.0, "other"));
    machine.start().unwrap();

    machine.post_event("go");
    machine.advance(0.1).unwrap();
    assert!(machine.is_in("b"));
    assert_eq!(machine.pending_timers(), 1);

    machine.advance(0.1).unwrap();
    assert!(machine.is_in("c"));
    assert_eq!(machine.pending_timers(), 0);
}

#[test]
fn test_zero_delay_ping_pong_advances_one_step_per_tick() {
    let chart = compile(json!({
        "id": "osc",
        "states": [
            {"id": "a", "transitions": [{"event": "go", "target": "b"}]},
            {"id": "b", "transitions": [{"event": "back", "target": "a"}]}
        ]
    }));
    let mut machine = Machine::new(chart);
    machine.bind_action("onentry_a", |m| m.schedule_event(0.0, "go"));
    machine.bind_action("onentry_b", |m| m.schedule_event(0.0, "back"));
    machine.start().unwrap();
    assert_eq!(machine.pending_timers(), 1);

    machine.advance(0.1).unwrap();
    assert!(machine.is_in("b"));
    assert_eq!(machine.pending_timers(), 1);

    machine.advance(0.1).unwrap();
    assert!(machine.is_in("a"));
    assert_eq!(machine.pending_timers(), 1);
}

#[test]
fn test_nan_delay_does_not_block_other_timers() {
    let mut machine = Machine::new(delayed_chart(0.0));
    machine.bind_action("slam", |_| {});
    machine.start().unwrap();

    machine.schedule_event(0.5, "go");
    machine.schedule_event(f64::NAN, "ping");
    machine.advance(1.0).unwrap();

    assert!(machine.is_in("b"));
    assert_eq!(machine.pending_timers(), 0);
}

// ============================================================================
// Reentry and FIFO dispatch
// ============================================================================

#[test]
fn test_reentering_current_child_through_history() {
    let chart = compile(json!({
        "id": "clock",
        "states": [
            {"id": "update",
             "history_states": [{"id": "histu", "type": "shallow"}],
             "transitions": [{"event": "d", "target": "histu"}],
             "states": [
                {"id": "sec", "transitions": [{"event": "c", "target": "min"}]},
                {"id": "min"}
             ]}
        ]
    }));
    let mut machine = Machine::new(chart);
    let resets = Rc::new(Cell::new(0));
    let r = resets.clone();
    machine.bind_action("onentry_sec", move |m| {
        if m.is_reentry() {
            r.set(r.get() + 1);
        }
    });
    machine.start().unwrap();

    machine.handle_event("d").unwrap();
    machine.handle_event("d").unwrap();
    assert_eq!(resets.get(), 2);
    assert!(machine.is_in("sec"));

    machine.handle_event("c").unwrap();
    machine.handle_event("d").unwrap();
    assert!(machine.is_in("min"));
    assert!(machine.is_reentry());
}

#[test]
fn test_events_posted_during_handle_wait_for_outer_dispatch() {
    let chart = compile(json!({
        "id": "q",
        "states": [
            {"id": "s0", "transitions": [{"event": "e1", "target": "s1"}]},
            {"id": "s1", "transitions": [{"event": "e2", "target": "s2"}]},
            {"id": "s2", "transitions": [{"event": "e3", "target": "s3"}]},
            {"id": "s3"}
        ]
    }));
    let mut machine = Machine::new(chart);
    let order: Log = Rc::default();
    let o = order.clone();
    machine.bind_action("onentry_s1", move |m| {
        o.borrow_mut().push("s1 entered".to_string());
        m.handle_event("e2").unwrap();
        m.handle_event("e3").unwrap();
        o.borrow_mut().push(format!("still {}", m.active_configuration()[0]));
    });
    let o = order.clone();
    machine.bind_action("onentry_s2", move |_| o.borrow_mut().push("s2 entered".to_string()));
    let o = order.clone();
    machine.bind_action("onentry_s3", move |_| o.borrow_mut().push("s3 entered".to_string()));
    machine.start().unwrap();

    machine.handle_event("e1").unwrap();
    assert_eq!(
        *order.borrow(),
        vec!["s1 entered", "still s1", "s2 entered", "s3 entered"]
    );
}

// ============================================================================
// Parallel completion
// ============================================================================

fn job_chart() -> Arc<Chart> {
    compile(json!({
        "id": "job",
        "states": [
            {"id": "running",
             "transitions": [{"event": "done.state.work", "action": "finished", "target": "complete"}],
             "states": [
                {"id": "work", "kind": "parallel", "states": [
                    {"id": "r1", "states": [
                        {"id": "a1", "transitions": [{"event": "f1", "target": "end1"}]},
                        {"id": "end1", "kind": "final"}
                    ]},
                    {"id": "r2", "states": [
                        {"id": "a2", "transitions": [{"event": "f2", "target": "end2"}]},
                        {"id": "end2", "kind": "final"}
                    ]}
                ]}
             ]},
            {"id": "complete"}
        ]
    }))
}

fn run_job(events: &[&str]) -> (Machine, Rc<Cell<u32>>) {
    let mut machine = Machine::new(job_chart());
    let count = Rc::new(Cell::new(0));
    let c = count.clone();
    machine.bind_action("finished", move |_| c.set(c.get() + 1));
    machine.start().unwrap();
    for event in events {
        machine.handle_event(*event).unwrap();
    }
    (machine, count)
}

#[test]
fn test_parallel_done_once_in_order() {
    let (machine, count) = run_job(&["f1", "f2"]);
    assert_eq!(count.get(), 1);
    assert!(machine.is_in("complete"));
}

#[test]
fn test_parallel_done_once_reverse_order() {
    let (machine, count) = run_job(&["f2", "f1", "f1", "f2"]);
    assert_eq!(count.get(), 1);
    assert!(machine.is_in("complete"));
}

#[test]
fn test_parallel_not_done_until_all_regions() {
    let (machine, count) = run_job(&["f1", "f1"]);
    assert_eq!(count.get(), 0);
    assert!(machine.is_in("end1"));
    assert!(machine.is_in("a2"));
    assert!(machine.is_done("r1"));
    assert!(!machine.is_done("work"));
    assert_eq!(machine.active_configuration(), vec!["end1", "a2"]);
}

fn regions_chart() -> Arc<Chart> {
    compile(json!({
        "id": "regions",
        "states": [
            {"id": "p", "kind": "parallel", "states": [
                {"id": "r1", "states": [
                    {"id": "a1", "transitions": [
                        {"event": "x", "target": "b2"},
                        {"event": "y", "target": ["a2", "b2"]}
                    ]},
                    {"id": "a2"}
                ]},
                {"id": "r2", "states": [
                    {"id": "b1"},
                    {"id": "b2", "transitions": [
                        {"event": "x", "target": "b1"},
                        {"event": "y", "target": "b1"}
                    ]}
                ]}
            ]}
        ]
    }))
}

#[test]
fn test_transition_into_sibling_region_fires_once() {
    let mut machine = Machine::new(regions_chart());
    let log = record_all(&mut machine);
    machine.start().unwrap();
    log.borrow_mut().clear();

    machine.handle_event("x").unwrap();
    assert_structure(&machine);
    assert_eq!(machine.active_configuration(), vec!["a1", "b2"]);
    assert_eq!(
        *log.borrow(),
        vec![
            "exit a1", "exit r1", "exit b1", "exit r2",
            "enter r2", "enter b2", "enter r1", "enter a1",
        ]
    );
}

#[test]
fn test_multi_target_from_inside_parallel() {
    let mut machine = Machine::new(regions_chart());
    let log = record_all(&mut machine);
    machine.start().unwrap();
    log.borrow_mut().clear();

    machine.handle_event("y").unwrap();
    assert_structure(&machine);
    assert_eq!(machine.active_configuration(), vec!["a2", "b2"]);
    assert_eq!(
        *log.borrow(),
        vec![
            "exit a1", "exit r1", "exit b1", "exit r2",
            "enter r1", "enter a2", "enter r2", "enter b2",
        ]
    );
}

#[test]
fn test_reentered_region_loses_completion() {
    let chart = compile(json!({
        "id": "p",
        "states": [
            {"id": "work", "kind": "parallel", "states": [
                {"id": "r1", "states": [
                    {"id": "a1", "transitions": [{"event": "f1", "target": "end1"}]},
                    {"id": "end1", "kind": "final"}
                ]},
                {"id": "r2", "states": [
                    {"id": "a2", "transitions": [
                        {"event": "f2", "target": "end2"},
                        {"event": "reset", "target": "a1"}
                    ]},
                    {"id": "end2", "kind": "final"}
                ]}
            ]}
        ]
    }));
    let mut machine = Machine::new(chart);
    machine.start().unwrap();

    machine.handle_event("f1").unwrap();
    assert!(machine.is_done("r1"));
    machine.handle_event("reset").unwrap();
    assert_eq!(machine.active_configuration(), vec!["a1", "a2"]);

    machine.handle_event("f2").unwrap();
    assert!(!machine.is_done("work"));
    machine.handle_event("f1").unwrap();
    assert!(machine.is_done("work"));
}

#[test]
fn test_completed_parallel_ignores_further_events() {
    let chart = compile(json!({
        "id": "p",
        "states": [
            {"id": "work", "kind": "parallel", "states": [
                {"id": "r1", "states": [
                    {"id": "a1", "transitions": [{"event": "f", "target": "end1"}]},
                    {"id": "end1", "kind": "final"}
                ]},
                {"id": "r2", "states": [
                    {"id": "a2", "transitions": [{"event": "f", "target": "end2"}]},
                    {"id": "end2", "kind": "final"}
                ]}
            ]}
        ]
    }));
    let mut machine = Machine::new(chart);
    machine.start().unwrap();

    machine.handle_event("f").unwrap();
    assert!(machine.is_done("work"));
    assert!(!machine.has_pending_events());

    machine.handle_event("f").unwrap();
    machine.advance(0.1).unwrap();
    assert!(machine.is_done("work"));
    assert_eq!(machine.active_configuration(), vec!["end1", "end2"]);
}

// ============================================================================
// History
// ============================================================================

fn watch_chart() -> Arc<Chart> {
    compile(json!({
        "id": "watch",
        "non_unique": ["on", "off"],
        "states": [
            {"id": "time", "transitions": [{"event": "a", "target": "alarm1"}]},
            {"id": "alarm1", "history": "shallow",
             "transitions": [{"event": "a", "target": "chime"}],
             "states": [
                {"id": "off", "transitions": [{"event": "d", "target": "on"}]},
                {"id": "on", "transitions": [{"event": "d", "target": "off"}]}
             ]},
            {"id": "chime", "history": "shallow",
             "transitions": [{"event": "a", "target": "stopwatch"}],
             "states": [
                {"id": "off", "transitions": [{"event": "d", "target": "on"}]},
                {"id": "on", "transitions": [{"event": "d", "target": "off"}]}
             ]},
            {"id": "stopwatch", "history": "deep",
             "transitions": [{"event": "a", "target": "time"}],
             "states": [
                {"id": "zero", "transitions": [{"event": "b", "target": "on,regular"}]},
                {"kind": "parallel", "states": [
                    {"id": "run", "states": [
                        {"id": "on", "transitions": [{"event": "b", "target": "off"}]},
                        {"id": "off", "transitions": [{"event": "b", "target": "on"}]}
                    ]},
                    {"id": "display", "states": [
                        {"id": "regular", "transitions": [
                            {"event": "d", "cond": "In(on)", "target": "lap"},
                            {"event": "d", "cond": "In(off)", "target": "zero"}
                        ]},
                        {"id": "lap", "transitions": [{"event": "d", "target": "regular"}]}
                    ]}
                ]}
             ]}
        ]
    }))
}

fn send(machine: &mut Machine, events: &str) {
    for event in events.split_whitespace() {
        machine.handle_event(event).unwrap();
        assert_structure(machine);
    }
}

#[test]
fn test_shallow_history_round_trip() {
    let mut machine = Machine::new(watch_chart());
    machine.start().unwrap();

    send(&mut machine, "a");
    assert!(machine.is_in("alarm1.off"));
    send(&mut machine, "d");
    assert!(machine.is_in("alarm1.on"));
    assert_eq!(machine.remembered_child("alarm1"), Some("alarm1.on"));

    // alarm1 -> chime -> stopwatch -> time -> alarm1
    send(&mut machine, "a a a a");
    assert!(machine.is_in("alarm1.on"));
    assert!(!machine.is_in("alarm1.off"));
}

#[test]
fn test_deep_history_round_trip() {
    let mut machine = Machine::new(watch_chart());
    machine.start().unwrap();

    send(&mut machine, "a a a");
    assert_eq!(machine.active_configuration(), vec!["zero"]);

    send(&mut machine, "b");
    assert_eq!(machine.active_configuration(), vec!["run.on", "regular"]);

    send(&mut machine, "d");
    assert_eq!(machine.active_configuration(), vec!["run.on", "lap"]);

    // stopwatch -> time -> alarm1 -> chime -> stopwatch
    send(&mut machine, "a a a a");
    assert!(machine.is_in("stopwatch"));
    assert_eq!(machine.active_configuration(), vec!["run.on", "lap"]);
}

#[test]
fn test_clear_history_falls_back_to_initial() {
    let mut machine = Machine::new(watch_chart());
    machine.start().unwrap();

    send(&mut machine, "a a a b d");
    assert_eq!(machine.active_configuration(), vec!["run.on", "lap"]);
    send(&mut machine, "a");
    machine.clear_deep_history("stopwatch").unwrap();
    assert_eq!(machine.remembered_child("run"), None);

    send(&mut machine, "a a a");
    assert_eq!(machine.active_configuration(), vec!["zero"]);
}

#[test]
fn test_shallow_history_does_not_restore_nested_children() {
    let chart = compile(json!({
        "id": "h",
        "states": [
            {"id": "outer", "history": "shallow",
             "transitions": [{"event": "out", "target": "away"}],
             "states": [
                {"id": "first"},
                {"id": "mid", "states": [
                    {"id": "m1"},
                    {"id": "m2"}
                ]}
             ]},
            {"id": "away", "transitions": [{"event": "back", "target": "outer"}]}
        ],
        "transitions": [{"event": "deep", "target": "m2"}]
    }));
    let mut machine = Machine::new(chart);
    machine.start().unwrap();

    send(&mut machine, "deep out back");
    assert!(machine.is_in("mid"));
    assert!(machine.is_in("m1"));
}

#[test]
fn test_clear_history_builtin_action() {
    let chart = compile(json!({
        "id": "h",
        "states": [
            {"id": "outer", "history": "shallow",
             "transitions": [
                {"event": "out", "target": "away"},
                {"event": "forget", "target": "away", "action": "clh(outer)"}
             ],
             "states": [{"id": "first", "transitions": [{"event": "next", "target": "second"}]}, {"id": "second"}]},
            {"id": "away", "transitions": [{"event": "back", "target": "outer"}]}
        ]
    }));
    let mut machine = Machine::new(chart);
    machine.start().unwrap();

    send(&mut machine, "next out back");
    assert!(machine.is_in("second"));
    send(&mut machine, "forget back");
    assert!(machine.is_in("first"));
}

// ============================================================================
// Random targets
// ============================================================================

fn dice_chart() -> Arc<Chart> {
    compile(json!({
        "id": "dice",
        "states": [
            {"id": "cup", "transitions": [{"event": "roll", "random_target": ["one", "two", "three"]}]},
            {"id": "one", "transitions": [{"event": "again", "target": "cup"}]},
            {"id": "two", "transitions": [{"event": "again", "target": "cup"}]},
            {"id": "three", "transitions": [{"event": "again", "target": "cup"}]}
        ]
    }))
}

fn roll(machine: &mut Machine, times: usize) -> Vec<String> {
    let mut faces = Vec::new();
    for _ in 0..times {
        machine.handle_event("roll").unwrap();
        faces.push(machine.active_configuration()[0].to_string());
        machine.handle_event("again").unwrap();
    }
    faces
}

#[test]
fn test_random_target_is_deterministic_with_seed() {
    let chart = dice_chart();
    let seeded = |seed: u64| {
        let mut machine = Machine::new(chart.clone());
        machine.seed_rng(seed);
        machine.start().unwrap();
        roll(&mut machine, 20)
    };

    let first = seeded(7);
    assert_eq!(first, seeded(7));
    assert!(first.iter().all(|f| ["one", "two", "three"].contains(&f.as_str())));
}

#[test]
fn test_fork_of_seeded_machine_is_reproducible() {
    let mut machine = Machine::new(dice_chart());
    machine.seed_rng(11);
    machine.start().unwrap();

    let mut first = machine.fork();
    let mut second = machine.fork();
    assert_eq!(roll(&mut first, 20), roll(&mut second, 20));

    let mut fresh = Machine::new(dice_chart());
    fresh.seed_rng(11);
    fresh.start().unwrap();
    assert_eq!(roll(&mut machine.fork(), 20), roll(&mut fresh, 20));
}

// ============================================================================
// Structural invariant
// ============================================================================

proptest! {
    #[test]
    fn test_structure_holds_under_random_events(
        events in prop::collection::vec(prop::sample::select(vec!["a", "b", "d", "x"]), 0..40),
        ticks in prop::collection::vec(0.0f64..1.0, 0..5),
    ) {
        let mut machine = Machine::new(watch_chart());
        machine.start().unwrap();
        assert_structure(&machine);

        for event in &events {
            machine.post_event(*event);
            for dt in &ticks {
                machine.advance(*dt).unwrap();
                assert_structure(&machine);
            }
            machine.pump_events().unwrap();
            assert_structure(&machine);
        }

        machine.stop(true);
        prop_assert!(machine.active_states().is_empty());
    }
}
